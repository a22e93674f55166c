use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LighthouseError, Result};

/// Top-level configuration for the Lighthouse intake engine.
///
/// Loaded from `~/.lighthouse/config.toml` by default. Each section corresponds
/// to one part of the intake pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LighthouseConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub understanding: UnderstandingConfig,
}

impl LighthouseConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LighthouseConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| LighthouseError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite checkpoint database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.lighthouse/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Conversation timing and turn-taking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Inactivity before the silence monitor offers a gentle nudge.
    pub silence_threshold_ms: u64,
    /// Cadence at which silence is checked while listening.
    pub silence_poll_ms: u64,
    /// Silence nudges are only offered while the turn counter is below this.
    pub silence_max_turns: u32,
    /// Completed turns required before field-specific nudges are spoken.
    pub nudge_after_turns: u32,
    /// Pause after the closing acknowledgment before finalizing.
    pub finalize_pause_ms: u64,
    /// Upper bound on a single fact-extraction call.
    pub extraction_timeout_secs: u64,
    /// Upper bound on the interstate logistics enrichment call.
    pub enrichment_timeout_secs: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ms: 5_000,
            silence_poll_ms: 1_000,
            silence_max_turns: 3,
            nudge_after_turns: 2,
            finalize_pause_ms: 1_500,
            extraction_timeout_secs: 20,
            enrichment_timeout_secs: 30,
        }
    }
}

impl IntakeConfig {
    pub fn silence_threshold(&self) -> Duration {
        Duration::from_millis(self.silence_threshold_ms)
    }

    pub fn silence_poll(&self) -> Duration {
        Duration::from_millis(self.silence_poll_ms.max(1))
    }

    pub fn finalize_pause(&self) -> Duration {
        Duration::from_millis(self.finalize_pause_ms)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment_timeout_secs)
    }
}

/// Checkpoint persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Durable-store key under which the checkpoint blob is kept.
    pub key: String,
    /// Quiet period after the last mutation before an autosave happens.
    pub autosave_debounce_ms: u64,
    /// Checkpoints older than this are deleted instead of restored.
    pub max_age_hours: u32,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            key: "lighthouse.intake.checkpoint".to_string(),
            autosave_debounce_ms: 10_000,
            max_age_hours: 24,
        }
    }
}

impl CheckpointConfig {
    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.max_age_hours))
    }
}

/// Remote language-understanding endpoint (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnderstandingConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    /// Sampling temperature for extraction requests.
    pub temperature: f32,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UnderstandingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "LIGHTHOUSE_LLM_API_KEY".to_string(),
            temperature: 0.1,
            request_timeout_secs: 30,
        }
    }
}

impl UnderstandingConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
