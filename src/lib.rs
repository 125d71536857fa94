//! # idhub
//!
//! Identity and membership registry core: users, hierarchical groups,
//! permissions, and trusted hosts over PostgreSQL.
//!
//! ## Features
//!
//! - **Retryable transactional executor** — every database access runs
//!   through [`Model::with_transaction`], which acquires declared locks in
//!   canonical order and retries on serialization failures and deadlocks
//! - **Lock-usage contract** — each attempt carries a lock budget; unused
//!   declarations and undeclared uses both fail before commit
//! - **Group reachability cache** — the transitive-reflexive closure of the
//!   group hierarchy, materialized for O(1) membership resolution
//! - **Conjunctive permission checks** — a permission is granted only when
//!   the user's memberships reach every one of its requirement groups
//!
//! Front-ends (REST handlers, the LDAP server, the signed host channel)
//! consume this crate and own all request validation and response shaping.
//!
//! ## Example
//!
//! ```no_run
//! use idhub::model::groups;
//! use idhub::{Config, Model};
//!
//! #[tokio::main]
//! async fn main() -> idhub::Result<()> {
//!     let model = Model::connect(&Config::from_env()).await?;
//!
//!     let reachable = model
//!         .with_transaction(&[groups::REACHABLE_CACHE_TABLE], &[], |tr| {
//!             Box::pin(async move {
//!                 let doge = groups::Translation {
//!                     ko: "도지".into(),
//!                     en: "doge".into(),
//!                 };
//!                 let idx = groups::create(tr, &doge, &doge, "doge").await?;
//!                 groups::get_group_reachable_array(tr, idx).await
//!             })
//!         })
//!         .await?;
//!
//!     println!("reachable: {reachable:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod model;

pub use config::Config;
pub use error::{Error, Result};
pub use model::transaction::Transaction;
pub use model::Model;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
