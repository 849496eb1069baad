use std::sync::{Arc, RwLock};

use crate::models::{Rule, RuleId};

/// Rule store shared between rule management and the simulator
pub type SharedRuleStore = Arc<RwLock<RuleStore>>;

/// Ordered in-memory rule collection. List order is evaluation priority.
///
/// Snapshots are reference-counted copies of the list: a snapshot taken
/// before an edit keeps seeing the rules it was taken from.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: Arc<Vec<Rule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRuleStore {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Replace the contents wholesale
    pub fn load(&mut self, rules: Vec<Rule>) {
        self.rules = Arc::new(rules);
    }

    /// Append a rule at the lowest priority
    pub fn add(&mut self, rule: Rule) -> Rule {
        Arc::make_mut(&mut self.rules).push(rule.clone());
        rule
    }

    /// Remove the rule with `id`. Returns the removed rule, if present.
    pub fn remove(&mut self, id: RuleId) -> Option<Rule> {
        let index = self.rules.iter().position(|r| r.id == id)?;
        Some(Arc::make_mut(&mut self.rules).remove(index))
    }

    /// Read-only view of the current rule order
    pub fn snapshot(&self) -> Arc<Vec<Rule>> {
        Arc::clone(&self.rules)
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
