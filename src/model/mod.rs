//! Transactional execution engine.
//!
//! [`Model`] owns the connection pool and is the only seam through which
//! the rest of the crate touches the database. Retry policy and lock
//! acquisition live here and nowhere else: callers declare the locks an
//! attempt needs, and [`Model::with_transaction`] acquires them in
//! canonical order, runs the body, validates the lock contract, and
//! commits. Conflict-class failures (serialization failure, deadlock
//! detected) retry the whole attempt up to a fixed bound.

pub mod groups;
pub mod hosts;
pub mod permissions;
mod reachability;
pub mod transaction;
pub mod users;

use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use transaction::{LockBudget, Transaction};

/// Maximum number of attempts for one transactional body.
const MAX_TRANSACTION_RETRY: u32 = 10;

/// Registry model over a PostgreSQL connection pool.
#[derive(Clone)]
pub struct Model {
    pool: PgPool,
}

impl Model {
    /// Connects a pool using the provided configuration.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.database_url)
            .await?;

        info!("connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Executes `body` in a new transaction, retrying on conflict.
    ///
    /// `access_exclusive_lock_tables` and `advisory_lock_keys` form the
    /// attempt's lock budget: advisory locks are taken first, then table
    /// locks, each set in sorted order. Sorting prevents attempts that
    /// declare the same budget from deadlocking against each other; it does
    /// not protect ad hoc `LOCK TABLE` statements issued inside `body`,
    /// which instead resolve through the deadlock-detected retry path.
    ///
    /// The body may run several times; each attempt sees a freshly begun
    /// transaction with all locks re-acquired. On success the handle is
    /// terminated (validating that every declared lock was justified)
    /// before the commit is issued.
    pub async fn with_transaction<T, F>(
        &self,
        access_exclusive_lock_tables: &[&str],
        advisory_lock_keys: &[i64],
        body: F,
    ) -> Result<T>
    where
        F: for<'t> Fn(&'t mut Transaction) -> BoxFuture<'t, Result<T>>,
    {
        let conn = self.pool.acquire().await?;
        let budget = LockBudget::new(
            access_exclusive_lock_tables
                .iter()
                .map(|t| (*t).to_owned())
                .collect(),
            advisory_lock_keys.to_vec(),
        );
        let mut tr = Transaction::new(conn, budget);

        for attempt in 1..=MAX_TRANSACTION_RETRY {
            tr.reset_for_attempt();

            let outcome: Result<T> = async {
                begin_attempt(&mut tr).await?;
                let value = body(&mut tr).await?;
                tr.terminate()?;
                sqlx::query("COMMIT").execute(tr.raw()).await?;
                Ok(value)
            }
            .await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    sqlx::query("ROLLBACK").execute(tr.raw()).await?;

                    if e.is_retryable() && attempt < MAX_TRANSACTION_RETRY {
                        warn!(attempt, error = %e, "transaction conflict, retrying");
                        continue;
                    }
                    if !e.is_controllable() {
                        // Controllable errors are handled by API front-ends.
                        error!(error = %e, "transaction failed");
                    }
                    return Err(e);
                }
            }
        }

        unreachable!("retry loop returns on its final attempt")
    }
}

/// Begins a transaction and acquires the attempt's declared locks in
/// canonical order: advisory locks first, then table locks.
async fn begin_attempt(tr: &mut Transaction) -> Result<()> {
    sqlx::query("BEGIN").execute(tr.raw()).await?;

    let keys = tr.advisory_keys().to_vec();
    for key in keys {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(tr.raw())
            .await?;
    }

    let tables = tr.lock_tables().to_vec();
    for table in tables {
        sqlx::query(&format!("LOCK TABLE {table} IN ACCESS EXCLUSIVE MODE"))
            .execute(tr.raw())
            .await?;
    }

    Ok(())
}
