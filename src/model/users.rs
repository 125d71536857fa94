//! Users and group memberships.
//!
//! Direct memberships are stored verbatim in `user_memberships`; pending
//! rows in `pending_user_memberships` represent unapproved join requests
//! and are disjoint from approved memberships. Membership mutations never
//! rebuild the reachable cache — the cache depends only on group relations.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::transaction::Transaction;

/// A registered user.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub idx: i32,
    pub username: String,
    pub name: String,
}

/// Page selector for member listings.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub start: i64,
    pub count: i64,
}

pub async fn create(tr: &mut Transaction, username: &str, name: &str) -> Result<i32> {
    let result: std::result::Result<i32, sqlx::Error> =
        sqlx::query_scalar("INSERT INTO users(username, name) VALUES ($1, $2) RETURNING idx")
            .bind(username)
            .bind(name)
            .fetch_one(tr.conn()?)
            .await;

    match result {
        Ok(idx) => Ok(idx),
        Err(e) if Error::is_unique_violation(&e) => Err(Error::UserExists),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_by_idx(tr: &mut Transaction, user_idx: i32) -> Result<User> {
    let user: Option<User> =
        sqlx::query_as("SELECT idx, username, name FROM users WHERE idx = $1")
            .bind(user_idx)
            .fetch_optional(tr.conn()?)
            .await?;
    user.ok_or(Error::NoSuchEntry)
}

/// Records a direct membership.
pub async fn add_user_membership(
    tr: &mut Transaction,
    user_idx: i32,
    group_idx: i32,
) -> Result<i32> {
    let idx: i32 = sqlx::query_scalar(
        "INSERT INTO user_memberships(user_idx, group_idx) VALUES ($1, $2) RETURNING idx",
    )
    .bind(user_idx)
    .bind(group_idx)
    .fetch_one(tr.conn()?)
    .await?;
    Ok(idx)
}

pub async fn has_user_membership(
    tr: &mut Transaction,
    user_idx: i32,
    group_idx: i32,
) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM user_memberships WHERE user_idx = $1 AND group_idx = $2)",
    )
    .bind(user_idx)
    .bind(group_idx)
    .fetch_one(tr.conn()?)
    .await?;
    Ok(exists)
}

/// Records an unapproved join request.
pub async fn add_pending_user_membership(
    tr: &mut Transaction,
    user_idx: i32,
    group_idx: i32,
) -> Result<i32> {
    let idx: i32 = sqlx::query_scalar(
        "INSERT INTO pending_user_memberships(user_idx, group_idx) VALUES ($1, $2) RETURNING idx",
    )
    .bind(user_idx)
    .bind(group_idx)
    .fetch_one(tr.conn()?)
    .await?;
    Ok(idx)
}

pub async fn has_pending_user_membership(
    tr: &mut Transaction,
    user_idx: i32,
    group_idx: i32,
) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pending_user_memberships \
         WHERE user_idx = $1 AND group_idx = $2)",
    )
    .bind(user_idx)
    .bind(group_idx)
    .fetch_one(tr.conn()?)
    .await?;
    Ok(exists)
}

/// Approves join requests: moves matching pending rows into memberships.
/// Returns the number of users moved; callers compare it with the request
/// size to detect users that had no pending row.
pub async fn accept_user_memberships(
    tr: &mut Transaction,
    group_idx: i32,
    user_idxs: &[i32],
) -> Result<u64> {
    let moved = sqlx::query(
        "WITH approved AS (\
           DELETE FROM pending_user_memberships \
           WHERE group_idx = $1 AND user_idx = ANY($2) \
           RETURNING user_idx, group_idx\
         ) \
         INSERT INTO user_memberships(user_idx, group_idx) \
         SELECT user_idx, group_idx FROM approved",
    )
    .bind(group_idx)
    .bind(user_idxs)
    .execute(tr.conn()?)
    .await?;
    Ok(moved.rows_affected())
}

/// Rejects join requests and removes approved memberships for the given
/// users. Pending and approved rows are disjoint, so the returned count is
/// the number of users affected. Also backs "leave group".
pub async fn reject_user_memberships(
    tr: &mut Transaction,
    group_idx: i32,
    user_idxs: &[i32],
) -> Result<u64> {
    let pending = sqlx::query(
        "DELETE FROM pending_user_memberships WHERE group_idx = $1 AND user_idx = ANY($2)",
    )
    .bind(group_idx)
    .bind(user_idxs)
    .execute(tr.conn()?)
    .await?;

    let approved =
        sqlx::query("DELETE FROM user_memberships WHERE group_idx = $1 AND user_idx = ANY($2)")
            .bind(group_idx)
            .bind(user_idxs)
            .execute(tr.conn()?)
            .await?;

    Ok(pending.rows_affected() + approved.rows_affected())
}

/// Direct members of a group, ordered by user idx.
pub async fn get_all_membership_users(
    tr: &mut Transaction,
    group_idx: i32,
    pagination: Option<Pagination>,
) -> Result<Vec<User>> {
    let users: Vec<User> = match pagination {
        Some(page) => {
            sqlx::query_as(
                "SELECT u.idx, u.username, u.name FROM users u \
                 INNER JOIN user_memberships m ON m.user_idx = u.idx \
                 WHERE m.group_idx = $1 ORDER BY u.idx OFFSET $2 LIMIT $3",
            )
            .bind(group_idx)
            .bind(page.start)
            .bind(page.count)
            .fetch_all(tr.conn()?)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT u.idx, u.username, u.name FROM users u \
                 INNER JOIN user_memberships m ON m.user_idx = u.idx \
                 WHERE m.group_idx = $1 ORDER BY u.idx",
            )
            .bind(group_idx)
            .fetch_all(tr.conn()?)
            .await?
        }
    };
    Ok(users)
}

/// Users with an unapproved join request for a group.
pub async fn get_all_pending_membership_users(
    tr: &mut Transaction,
    group_idx: i32,
) -> Result<Vec<User>> {
    let users: Vec<User> = sqlx::query_as(
        "SELECT u.idx, u.username, u.name FROM users u \
         INNER JOIN pending_user_memberships m ON m.user_idx = u.idx \
         WHERE m.group_idx = $1 ORDER BY u.idx",
    )
    .bind(group_idx)
    .fetch_all(tr.conn()?)
    .await?;
    Ok(users)
}

/// Every group reachable from any group the user directly belongs to,
/// resolved through the reachable cache.
pub async fn get_user_reachable_groups(
    tr: &mut Transaction,
    user_idx: i32,
) -> Result<HashSet<i32>> {
    let groups: Vec<i32> = sqlx::query_scalar(
        "SELECT DISTINCT gr.subgroup_idx FROM user_memberships m \
         INNER JOIN group_reachable_cache gr ON gr.supergroup_idx = m.group_idx \
         WHERE m.user_idx = $1",
    )
    .bind(user_idx)
    .fetch_all(tr.conn()?)
    .await?;
    Ok(groups.into_iter().collect())
}
