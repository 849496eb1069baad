use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::detection::{DEFAULT_LOG_CAPACITY, DEFAULT_SIGNATURE_MATCH_RATE};

/// Values that parse but cannot drive a simulation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("signature_match_rate must be a number between 0 and 1, got {0}")]
    InvalidMatchRate(f64),
}

/// Configuration for the H-SAFE simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Session configuration
    pub session: SessionConfig,
    /// Simulation loop configuration
    pub simulation: SimulationConfig,
    /// Rule persistence configuration
    pub persistence: PersistenceConfig,
    /// Output configuration
    pub output: OutputConfig,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// User whose active rules are loaded
    pub user_id: String,
}

/// Simulation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Milliseconds between generated traffic events
    pub tick_interval_ms: u64,
    /// Number of events kept in the rolling log
    pub log_capacity: usize,
    /// Probability that a Signature rule fires on an evaluation
    pub signature_match_rate: f64,
    /// Start the ticker as soon as the daemon is up
    pub autostart: bool,
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.signature_match_rate) {
            return Err(ConfigError::InvalidMatchRate(self.signature_match_rate));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            tick_interval_ms: 2000,
            log_capacity: DEFAULT_LOG_CAPACITY,
            signature_match_rate: DEFAULT_SIGNATURE_MATCH_RATE,
            autostart: true,
        }
    }
}

/// Rule persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite rule database
    pub db_path: PathBuf,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "json", "jsonl", or "console"
    pub format: String,
    /// Output file path (stdout when absent)
    pub file_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            session: SessionConfig {
                user_id: "local".to_string(),
            },
            simulation: SimulationConfig::default(),
            persistence: PersistenceConfig {
                db_path: PathBuf::from("hsafe.db"),
            },
            output: OutputConfig {
                format: "console".to_string(),
                file_path: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.simulation.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
