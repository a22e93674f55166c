//! CLI argument definitions for the Lighthouse intake console.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::{Path, PathBuf};

/// Lighthouse: a gentle, conversational intake for people who have just lost
/// someone.
#[derive(Parser, Debug)]
#[command(name = "lighthouse", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the checkpoint database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Discard any saved conversation and start over.
    #[arg(long = "fresh", conflicts_with = "resume")]
    pub fresh: bool,

    /// Continue a saved conversation without asking.
    #[arg(long = "resume")]
    pub resume: bool,
}

/// What to do with a saved conversation found at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeChoice {
    Resume,
    Discard,
    Ask,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > LIGHTHOUSE_CONFIG env var > ~/.lighthouse/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("LIGHTHOUSE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }

    pub fn resume_choice(&self) -> ResumeChoice {
        if self.fresh {
            ResumeChoice::Discard
        } else if self.resume {
            ResumeChoice::Resume
        } else {
            ResumeChoice::Ask
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".lighthouse").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        Some(rest) => home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => Path::new(path).to_path_buf(),
    }
}
