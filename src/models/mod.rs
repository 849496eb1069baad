pub mod rule;
pub mod traffic;

pub use rule::{IpCondition, NewRule, Rule, RuleAction, RuleCondition, RuleError, RuleId, RuleKind};
pub use traffic::{Protocol, TrafficEvent, TrafficStatus};
