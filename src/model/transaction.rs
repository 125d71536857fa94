//! Transaction handle enforcing the lock-usage contract.
//!
//! Every attempt of [`Model::with_transaction`](crate::Model::with_transaction)
//! is handed a [`Transaction`] scoped to the locks the attempt declared.
//! Operations that depend on a lock call
//! [`ensure_has_access_exclusive_lock`](Transaction::ensure_has_access_exclusive_lock)
//! or [`ensure_has_advisory_lock`](Transaction::ensure_has_advisory_lock),
//! which fails if the lock was not declared and otherwise marks it as
//! justified. Right before commit the executor calls
//! [`terminate`](Transaction::terminate), which fails if any declared lock
//! was never justified. Both violation directions are fatal and never
//! retried.

use std::collections::HashSet;

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, Postgres};

use crate::error::{Error, Result};

/// Lock declarations for one transaction attempt, with justification
/// tracking. Budgets are kept sorted so the executor acquires locks in a
/// canonical order.
#[derive(Debug, Default)]
pub(crate) struct LockBudget {
    tables: Vec<String>,
    keys: Vec<i64>,
    justified_tables: HashSet<String>,
    justified_keys: HashSet<i64>,
}

impl LockBudget {
    pub(crate) fn new(mut tables: Vec<String>, mut keys: Vec<i64>) -> Self {
        tables.sort();
        tables.dedup();
        keys.sort_unstable();
        keys.dedup();
        Self {
            tables,
            keys,
            justified_tables: HashSet::new(),
            justified_keys: HashSet::new(),
        }
    }

    /// Declared exclusive-lock tables, in canonical order.
    pub(crate) fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Declared advisory-lock keys, in canonical order.
    pub(crate) fn keys(&self) -> &[i64] {
        &self.keys
    }

    pub(crate) fn justify_table(&mut self, table: &str) -> Result<()> {
        if !self.tables.iter().any(|t| t == table) {
            return Err(Error::LockNotDeclared {
                table: table.to_owned(),
            });
        }
        self.justified_tables.insert(table.to_owned());
        Ok(())
    }

    pub(crate) fn justify_key(&mut self, key: i64) -> Result<()> {
        if !self.keys.contains(&key) {
            return Err(Error::AdvisoryLockNotDeclared { key });
        }
        self.justified_keys.insert(key);
        Ok(())
    }

    /// Fails if any declared lock was never justified. A stale declaration
    /// is a smell that the caller's lock requirements changed without its
    /// declarations following.
    pub(crate) fn assert_all_justified(&self) -> Result<()> {
        let tables: Vec<String> = self
            .tables
            .iter()
            .filter(|t| !self.justified_tables.contains(*t))
            .cloned()
            .collect();
        let keys: Vec<i64> = self
            .keys
            .iter()
            .filter(|k| !self.justified_keys.contains(k))
            .copied()
            .collect();
        if tables.is_empty() && keys.is_empty() {
            Ok(())
        } else {
            Err(Error::UnusedLocks { tables, keys })
        }
    }

    /// Clears justification state for a fresh attempt.
    pub(crate) fn reset(&mut self) {
        self.justified_tables.clear();
        self.justified_keys.clear();
    }
}

/// Stateful wrapper around one live database connection for the duration of
/// one transaction attempt.
pub struct Transaction {
    conn: PoolConnection<Postgres>,
    budget: LockBudget,
    terminated: bool,
}

impl Transaction {
    pub(crate) fn new(conn: PoolConnection<Postgres>, budget: LockBudget) -> Self {
        Self {
            conn,
            budget,
            terminated: false,
        }
    }

    /// The attempt's connection, for issuing queries.
    ///
    /// Fails with [`Error::TransactionTerminated`] once the handle has been
    /// terminated.
    pub fn conn(&mut self) -> Result<&mut PgConnection> {
        if self.terminated {
            return Err(Error::TransactionTerminated);
        }
        Ok(&mut *self.conn)
    }

    /// Asserts that this attempt holds an ACCESS EXCLUSIVE lock on `table`
    /// and marks the declaration as justified.
    pub fn ensure_has_access_exclusive_lock(&mut self, table: &str) -> Result<()> {
        self.budget.justify_table(table)
    }

    /// Asserts that this attempt holds the advisory lock `key` and marks
    /// the declaration as justified.
    pub fn ensure_has_advisory_lock(&mut self, key: i64) -> Result<()> {
        self.budget.justify_key(key)
    }

    /// Validates the lock contract and seals the handle. Called by the
    /// executor right before commit; all later queries fail.
    pub(crate) fn terminate(&mut self) -> Result<()> {
        if self.terminated {
            return Err(Error::TransactionTerminated);
        }
        self.budget.assert_all_justified()?;
        self.terminated = true;
        Ok(())
    }

    /// Prepares the handle for a fresh attempt after a rollback.
    pub(crate) fn reset_for_attempt(&mut self) {
        self.budget.reset();
        self.terminated = false;
    }

    pub(crate) fn lock_tables(&self) -> &[String] {
        self.budget.tables()
    }

    pub(crate) fn advisory_keys(&self) -> &[i64] {
        self.budget.keys()
    }

    /// Connection access for the executor's own BEGIN/COMMIT/ROLLBACK
    /// statements, which must work on a terminated handle.
    pub(crate) fn raw(&mut self) -> &mut PgConnection {
        &mut *self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn justified_budget_passes() {
        let mut budget = LockBudget::new(
            vec!["group_reachable_cache".into(), "users".into()],
            vec![42],
        );
        budget.justify_table("users").unwrap();
        budget.justify_table("group_reachable_cache").unwrap();
        budget.justify_key(42).unwrap();
        budget.assert_all_justified().unwrap();
    }

    #[test]
    fn undeclared_table_use_fails() {
        let mut budget = LockBudget::new(vec!["users".into()], vec![]);
        let err = budget.justify_table("groups").unwrap_err();
        assert!(matches!(err, Error::LockNotDeclared { table } if table == "groups"));
    }

    #[test]
    fn undeclared_key_use_fails() {
        let mut budget = LockBudget::new(vec![], vec![1]);
        let err = budget.justify_key(2).unwrap_err();
        assert!(matches!(err, Error::AdvisoryLockNotDeclared { key: 2 }));
    }

    #[test]
    fn unused_declaration_fails() {
        let mut budget = LockBudget::new(vec!["users".into(), "groups".into()], vec![7]);
        budget.justify_table("users").unwrap();
        let err = budget.assert_all_justified().unwrap_err();
        match err {
            Error::UnusedLocks { tables, keys } => {
                assert_eq!(tables, vec!["groups".to_owned()]);
                assert_eq!(keys, vec![7]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn budgets_are_sorted_and_deduplicated() {
        let budget = LockBudget::new(
            vec!["users".into(), "groups".into(), "users".into()],
            vec![9, 3, 9],
        );
        assert_eq!(budget.tables(), ["groups", "users"]);
        assert_eq!(budget.keys(), [3, 9]);
    }

    #[test]
    fn reset_requires_justification_again() {
        let mut budget = LockBudget::new(vec!["users".into()], vec![]);
        budget.justify_table("users").unwrap();
        budget.assert_all_justified().unwrap();

        budget.reset();
        assert!(budget.assert_all_justified().is_err());
    }
}
