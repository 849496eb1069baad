//! SQLite implementation of the RuleRepository trait

use super::{PersistenceError, RuleRepository};
use crate::models::{NewRule, Rule, RuleId};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite-based rule storage
pub struct SqliteRuleRepository {
    conn: Mutex<Connection>,
}

impl SqliteRuleRepository {
    /// Open (or create) the database at the specified path
    ///
    /// Initializes the schema if it doesn't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteRuleRepository {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteRuleRepository {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.lock();
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change a rule's status; rules that are not `Active` are not listed
    pub fn set_rule_status(&self, id: RuleId, status: &str) -> Result<bool, PersistenceError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE security_rules SET status = ? WHERE id = ?",
            params![status, id],
        )?;
        Ok(updated > 0)
    }
}

impl RuleRepository for SqliteRuleRepository {
    fn list_active_rules_for_user(&self, user_id: &str) -> Result<Vec<Rule>, PersistenceError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, type, condition, action FROM security_rules
             WHERE user_id = ? AND status = 'Active'
             ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, kind, condition, action)| {
                if name.trim().is_empty() {
                    return Err(PersistenceError::InvalidData(format!(
                        "Rule {} has an empty name",
                        id
                    )));
                }
                Ok(Rule::from_stored(id, &name, &kind, &condition, &action))
            })
            .collect()
    }

    fn insert_rule(&self, user_id: &str, rule: &NewRule) -> Result<Rule, PersistenceError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO security_rules (user_id, name, type, condition, action)
             VALUES (?, ?, ?, ?, ?)",
            params![
                user_id,
                rule.name(),
                rule.condition().kind().as_str(),
                rule.condition().to_stored(),
                rule.action().as_str()
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(rule.clone().into_rule(id))
    }

    fn delete_rule(&self, id: RuleId) -> Result<bool, PersistenceError> {
        let conn = self.lock();
        let deleted = conn.execute("DELETE FROM security_rules WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }
}
