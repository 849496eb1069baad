//! Persistence module for security rules
//!
//! The simulator itself only keeps rules in memory. This module defines
//! the storage collaborator that rules are loaded from at session start
//! and written through on add/delete.

pub mod sqlite_store;

pub use sqlite_store::SqliteRuleRepository;

use crate::models::{NewRule, Rule, RuleId};
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),
}

/// Trait for rule storage backends
///
/// Implementations hand out rule identifiers; the engine treats them as
/// opaque.
pub trait RuleRepository: Send + Sync {
    /// Active rules owned by `user_id`, in insertion order
    fn list_active_rules_for_user(&self, user_id: &str) -> Result<Vec<Rule>, PersistenceError>;

    /// Store a rule for `user_id` and return it with its assigned identifier
    fn insert_rule(&self, user_id: &str, rule: &NewRule) -> Result<Rule, PersistenceError>;

    /// Delete a rule. Returns `false` when no rule had that identifier.
    fn delete_rule(&self, id: RuleId) -> Result<bool, PersistenceError>;
}
