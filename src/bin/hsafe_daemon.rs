use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use hsafe::config::Config;
use hsafe::output::{OutputFormat, OutputHandler};
use hsafe::persistence::SqliteRuleRepository;
use hsafe::rules::{RuleService, RuleStore};
use hsafe::simulation::Simulator;

/// Runs the traffic simulation against the configured user's rules
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting H-SAFE simulator daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    // Setup graceful shutdown signal handling
    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        let _ = shutdown_tx.send(());
    })?;

    let mut output_handler = OutputHandler::new(
        OutputFormat::from_str(&config.output.format),
        config.output.file_path.clone(),
    )?;

    // Load rules for the session user
    let repository = Arc::new(SqliteRuleRepository::new(&config.persistence.db_path)?);
    let rules = RuleStore::shared();
    let service = RuleService::new(repository, rules.clone(), config.session.user_id.clone());
    service.refresh()?;

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let simulator = Simulator::new(rules, &config.simulation).with_event_sink(event_tx);

    if config.simulation.autostart {
        simulator.start()?;
    } else {
        log::info!("Autostart disabled; stepping is left to the caller");
    }

    log::info!("Daemon running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => match event {
                Some(event) => output_handler.write_event(&event)?,
                None => break,
            },
        }
    }

    simulator.stop();
    output_handler.flush()?;
    log::info!("H-SAFE simulator daemon stopped");
    Ok(())
}
