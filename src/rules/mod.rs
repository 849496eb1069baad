pub mod service;
pub mod store;

pub use service::RuleService;
pub use store::{RuleStore, SharedRuleStore};
