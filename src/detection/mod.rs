pub mod evaluator;
pub mod event_log;
pub mod generator;

pub use evaluator::{
    FixedChance, MatchResult, ProbabilitySource, RandomChance, RuleEvaluator,
    DEFAULT_SIGNATURE_MATCH_RATE,
};
pub use event_log::{EventLog, DEFAULT_LOG_CAPACITY};
pub use generator::{TrafficGenerator, TrafficSource};
