//! Rule management for one user session
//!
//! Every change goes to the repository first and is mirrored into the
//! in-memory store only once the repository accepted it.

use std::sync::{Arc, PoisonError, RwLockReadGuard, RwLockWriteGuard};

use super::store::{RuleStore, SharedRuleStore};
use crate::models::{NewRule, Rule, RuleError, RuleId};
use crate::persistence::RuleRepository;

pub struct RuleService {
    repository: Arc<dyn RuleRepository>,
    store: SharedRuleStore,
    user_id: String,
}

impl RuleService {
    pub fn new(
        repository: Arc<dyn RuleRepository>,
        store: SharedRuleStore,
        user_id: impl Into<String>,
    ) -> Self {
        RuleService {
            repository,
            store,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn store(&self) -> &SharedRuleStore {
        &self.store
    }

    /// Reload the user's active rules from the repository
    pub fn refresh(&self) -> Result<usize, RuleError> {
        let rules = self.repository.list_active_rules_for_user(&self.user_id)?;
        let count = rules.len();
        self.write().load(rules);
        log::info!("Loaded {} active rule(s) for user {}", count, self.user_id);
        Ok(count)
    }

    /// Persist a new rule, then append it to the local store
    pub fn add_rule(&self, rule: NewRule) -> Result<Rule, RuleError> {
        let stored = self.repository.insert_rule(&self.user_id, &rule)?;
        log::info!(
            "Added rule {} '{}' ({}: {}) -> {}",
            stored.id,
            stored.name,
            stored.kind(),
            stored.condition,
            stored.action
        );
        Ok(self.write().add(stored))
    }

    /// Delete a rule remotely, then drop it locally.
    ///
    /// Returns `false` when neither side knew the identifier.
    pub fn delete_rule(&self, id: RuleId) -> Result<bool, RuleError> {
        let deleted_remotely = self.repository.delete_rule(id)?;
        let removed_locally = self.write().remove(id).is_some();
        if deleted_remotely || removed_locally {
            log::info!("Deleted rule {}", id);
        } else {
            log::debug!("Delete of unknown rule {} ignored", id);
        }
        Ok(deleted_remotely || removed_locally)
    }

    /// Current rules in evaluation order
    pub fn rules(&self) -> Vec<Rule> {
        self.read().snapshot().as_ref().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, RuleStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RuleStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}
