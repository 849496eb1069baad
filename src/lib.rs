pub mod analysis;
pub mod config;
pub mod detection;
pub mod models;
pub mod output;
pub mod persistence;
pub mod rules;
pub mod simulation;

// Re-export commonly used types
pub use config::Config;
pub use detection::{EventLog, MatchResult, ProbabilitySource, RuleEvaluator, TrafficGenerator};
pub use models::{NewRule, Rule, RuleAction, RuleCondition, TrafficEvent, TrafficStatus};
pub use persistence::{RuleRepository, SqliteRuleRepository};
pub use rules::{RuleService, RuleStore, SharedRuleStore};
pub use simulation::Simulator;
