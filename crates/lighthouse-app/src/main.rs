//! Lighthouse application binary - composition root.
//!
//! 1. Load configuration from TOML, apply CLI overrides
//! 2. Open the SQLite checkpoint store and resolve any saved conversation
//! 3. Wire the understanding client and console collaborators
//! 4. Run one intake session and print the resulting record

mod cli;
mod console;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use lighthouse_core::config::LighthouseConfig;
use lighthouse_intake::{
    HttpUnderstandingService, IntakeOutcome, NoSpeechInput, NoSpeechOutput, TurnOrchestrator,
};
use lighthouse_storage::{build_resume_greeting, CheckpointStore, Database, DurableStore, SqliteStore};

use crate::cli::{expand_home, CliArgs, ResumeChoice};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = LighthouseConfig::load_or_default(&config_file);
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing. Conversation goes to stdout, logs to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Lighthouse v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("lighthouse.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let store: Arc<dyn DurableStore> = Arc::new(SqliteStore::new(db));
    let mut checkpoint = CheckpointStore::open(store, config.checkpoint.clone(), None);

    // Resume decision happens before the session exists.
    if let Some(available) = checkpoint.resume_available() {
        let greeting = build_resume_greeting(available);
        let resume = match args.resume_choice() {
            ResumeChoice::Resume => true,
            ResumeChoice::Discard => false,
            ResumeChoice::Ask => console::ask_resume(&greeting)?,
        };
        if resume {
            checkpoint.restore();
        } else {
            checkpoint.discard_resume();
        }
    }

    // Understanding.
    let understanding = HttpUnderstandingService::new(&config.understanding);
    if !understanding.has_api_key() {
        tracing::warn!(
            env = %config.understanding.api_key_env,
            "No API key configured; requests will be sent without authorization"
        );
    }

    // Session.
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let mut orchestrator = TurnOrchestrator::new(
        config.intake.clone(),
        checkpoint,
        Arc::new(understanding),
        Box::new(NoSpeechInput),
        Box::new(NoSpeechOutput),
        input_rx,
    )
    .with_extraction_temperature(config.understanding.temperature)
    .with_events(events_tx);

    let printer = tokio::spawn(console::print_events(events_rx));
    console::spawn_input_reader(input_tx);

    println!("(Type your reply and press Enter. /abandon to stop and forget, /quit to pause.)");
    let outcome = orchestrator.run().await?;

    // Dropping the orchestrator closes the event stream.
    drop(orchestrator);
    console::join_printer(printer).await;

    if let IntakeOutcome::Completed(record) = outcome {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }

    tracing::info!("Lighthouse stopped");
    Ok(())
}
