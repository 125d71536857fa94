//! Group hierarchy store and the reachable cache.
//!
//! Groups form a directed graph through `group_relations` edges; a
//! supergroup contains every group reachable from it. The
//! `group_reachable_cache` table materializes the reflexive-transitive
//! closure of that graph and is fully rebuilt, under an ACCESS EXCLUSIVE
//! lock, inside the same transaction as every hierarchy mutation. It is
//! derived state: safe to truncate and regenerate at any time.

use serde::{Deserialize, Serialize};

use super::reachability;
use crate::error::{Error, Result};
use crate::model::transaction::Transaction;

/// Table protected by the exclusive lock during cache rebuilds. Callers of
/// any hierarchy-mutating operation must declare it in their lock budget.
pub const REACHABLE_CACHE_TABLE: &str = "group_reachable_cache";

/// Bilingual user-facing text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub ko: String,
    pub en: String,
}

/// A group of users. Members of the group referenced by `owner_group_idx`
/// administer this group.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub idx: i32,
    pub owner_group_idx: Option<i32>,
    pub name: Translation,
    pub description: Translation,
    pub identifier: String,
}

/// A joinable group annotated with one user's standing in it.
#[derive(Debug, Clone, Serialize)]
pub struct GroupUserInfo {
    pub idx: i32,
    pub name: Translation,
    pub description: Translation,
    pub identifier: String,
    /// Some directly-joined group reaches this group.
    pub is_member: bool,
    /// A membership row for this exact group exists.
    pub is_direct_member: bool,
    /// An unapproved join request exists.
    pub is_pending: bool,
    /// Direct member of this group's owner group.
    pub is_owner: bool,
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    idx: i32,
    owner_group_idx: Option<i32>,
    name_ko: String,
    name_en: String,
    description_ko: String,
    description_en: String,
    identifier: String,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            idx: row.idx,
            owner_group_idx: row.owner_group_idx,
            name: Translation {
                ko: row.name_ko,
                en: row.name_en,
            },
            description: Translation {
                ko: row.description_ko,
                en: row.description_en,
            },
            identifier: row.identifier,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupUserInfoRow {
    idx: i32,
    name_ko: String,
    name_en: String,
    description_ko: String,
    description_en: String,
    identifier: String,
    is_member: bool,
    is_direct_member: bool,
    is_pending: bool,
    is_owner: bool,
}

impl From<GroupUserInfoRow> for GroupUserInfo {
    fn from(row: GroupUserInfoRow) -> Self {
        GroupUserInfo {
            idx: row.idx,
            name: Translation {
                ko: row.name_ko,
                en: row.name_en,
            },
            description: Translation {
                ko: row.description_ko,
                en: row.description_en,
            },
            identifier: row.identifier,
            is_member: row.is_member,
            is_direct_member: row.is_direct_member,
            is_pending: row.is_pending,
            is_owner: row.is_owner,
        }
    }
}

/// Inserts a group and rebuilds the reachable cache in the same attempt.
pub async fn create(
    tr: &mut Transaction,
    name: &Translation,
    description: &Translation,
    identifier: &str,
) -> Result<i32> {
    let idx: i32 = sqlx::query_scalar(
        "INSERT INTO groups(name_ko, name_en, description_ko, description_en, identifier) \
         VALUES ($1, $2, $3, $4, $5) RETURNING idx",
    )
    .bind(&name.ko)
    .bind(&name.en)
    .bind(&description.ko)
    .bind(&description.en)
    .bind(identifier)
    .fetch_one(tr.conn()?)
    .await?;

    rebuild_reachable_cache(tr).await?;
    Ok(idx)
}

/// Deletes a group and rebuilds the reachable cache in the same attempt.
pub async fn delete(tr: &mut Transaction, group_idx: i32) -> Result<i32> {
    let deleted: Option<i32> = sqlx::query_scalar("DELETE FROM groups WHERE idx = $1 RETURNING idx")
        .bind(group_idx)
        .fetch_optional(tr.conn()?)
        .await?;
    let idx = deleted.ok_or(Error::NoSuchEntry)?;

    rebuild_reachable_cache(tr).await?;
    Ok(idx)
}

pub async fn get_by_idx(tr: &mut Transaction, idx: i32) -> Result<Group> {
    let row: Option<GroupRow> = sqlx::query_as(
        "SELECT idx, owner_group_idx, name_ko, name_en, description_ko, description_en, \
         identifier FROM groups WHERE idx = $1",
    )
    .bind(idx)
    .fetch_optional(tr.conn()?)
    .await?;
    row.map(Group::from).ok_or(Error::NoSuchEntry)
}

/// Sets or clears the group whose direct members administer `group_idx`.
pub async fn set_owner_group(
    tr: &mut Transaction,
    group_idx: i32,
    owner_group_idx: Option<i32>,
) -> Result<()> {
    let updated: Option<i32> =
        sqlx::query_scalar("UPDATE groups SET owner_group_idx = $1 WHERE idx = $2 RETURNING idx")
            .bind(owner_group_idx)
            .bind(group_idx)
            .fetch_optional(tr.conn()?)
            .await?;
    updated.map(|_| ()).ok_or(Error::NoSuchEntry)
}

/// Adds a supergroup -> subgroup edge and rebuilds the reachable cache.
///
/// An edge that would close a cycle fails the rebuild, rolling back the
/// insert with it.
pub async fn add_group_relation(
    tr: &mut Transaction,
    supergroup_idx: i32,
    subgroup_idx: i32,
) -> Result<i32> {
    let idx: i32 = sqlx::query_scalar(
        "INSERT INTO group_relations(supergroup_idx, subgroup_idx) VALUES ($1, $2) RETURNING idx",
    )
    .bind(supergroup_idx)
    .bind(subgroup_idx)
    .fetch_one(tr.conn()?)
    .await?;

    rebuild_reachable_cache(tr).await?;
    Ok(idx)
}

/// Removes a relation edge and rebuilds the reachable cache.
pub async fn delete_group_relation(tr: &mut Transaction, relation_idx: i32) -> Result<i32> {
    let deleted: Option<i32> =
        sqlx::query_scalar("DELETE FROM group_relations WHERE idx = $1 RETURNING idx")
            .bind(relation_idx)
            .fetch_optional(tr.conn()?)
            .await?;
    let idx = deleted.ok_or(Error::NoSuchEntry)?;

    rebuild_reachable_cache(tr).await?;
    Ok(idx)
}

/// All groups reachable from `group_idx`, including itself.
pub async fn get_group_reachable_array(tr: &mut Transaction, group_idx: i32) -> Result<Vec<i32>> {
    let subgroups: Vec<i32> =
        sqlx::query_scalar("SELECT subgroup_idx FROM group_reachable_cache WHERE supergroup_idx = $1")
            .bind(group_idx)
            .fetch_all(tr.conn()?)
            .await?;
    Ok(subgroups)
}

/// True iff the user is a direct (non-transitive) member of the group's
/// owner group. Ownership deliberately does not propagate through the
/// hierarchy.
pub async fn check_owner(tr: &mut Transaction, group_idx: i32, user_idx: i32) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM user_memberships mem INNER JOIN groups g \
         ON g.owner_group_idx = mem.group_idx WHERE mem.user_idx = $1 AND g.idx = $2)",
    )
    .bind(user_idx)
    .bind(group_idx)
    .fetch_one(tr.conn()?)
    .await?;
    Ok(exists)
}

/// Every joinable group (non-null owner group), annotated with the user's
/// membership, pending, direct-membership, and ownership standing.
pub async fn get_user_group_list(
    tr: &mut Transaction,
    user_idx: i32,
) -> Result<Vec<GroupUserInfo>> {
    let rows: Vec<GroupUserInfoRow> = sqlx::query_as(
        r#"
        WITH
          umem AS (SELECT user_idx, group_idx FROM user_memberships WHERE user_idx = $1),
          pend_umem AS (SELECT user_idx, group_idx FROM pending_user_memberships WHERE user_idx = $1)
        SELECT DISTINCT ON (g.idx)
          g.idx,
          g.name_ko,
          g.name_en,
          g.description_ko,
          g.description_en,
          g.identifier,
          (umem.user_idx IS NOT NULL) AS is_member,
          (dir.user_idx IS NOT NULL) AS is_direct_member,
          (pend_umem.user_idx IS NOT NULL) AS is_pending,
          (EXISTS (SELECT 1 FROM umem WHERE umem.group_idx = g.owner_group_idx)) AS is_owner
        FROM umem
        RIGHT JOIN group_reachable_cache gr ON umem.group_idx = gr.supergroup_idx
        RIGHT JOIN groups g ON g.idx = gr.subgroup_idx
        LEFT JOIN umem dir ON dir.group_idx = g.idx
        LEFT JOIN pend_umem ON pend_umem.group_idx = g.idx
        WHERE g.owner_group_idx IS NOT NULL
        ORDER BY g.idx, umem.user_idx
        "#,
    )
    .bind(user_idx)
    .fetch_all(tr.conn()?)
    .await?;

    Ok(rows.into_iter().map(GroupUserInfo::from).collect())
}

/// Rebuilds the reachable cache from the current groups and relations.
///
/// The enclosing attempt must declare [`REACHABLE_CACHE_TABLE`] as an
/// exclusive-lock table. The group-id and edge snapshots are read strictly
/// after the lock is held, so the recomputation observes a consistent
/// state; readers without the lock see the pre- or post-rebuild cache
/// atomically once this transaction commits.
pub async fn rebuild_reachable_cache(tr: &mut Transaction) -> Result<()> {
    tr.ensure_has_access_exclusive_lock(REACHABLE_CACHE_TABLE)?;

    sqlx::query("TRUNCATE group_reachable_cache")
        .execute(tr.conn()?)
        .await?;

    let group_idxs: Vec<i32> = sqlx::query_scalar("SELECT idx FROM groups")
        .fetch_all(tr.conn()?)
        .await?;
    let edges: Vec<(i32, i32)> =
        sqlx::query_as("SELECT supergroup_idx, subgroup_idx FROM group_relations")
            .fetch_all(tr.conn()?)
            .await?;

    let closure = reachability::reflexive_transitive_closure(&group_idxs, &edges)?;

    for (supergroup_idx, reachable) in &closure {
        for subgroup_idx in reachable {
            sqlx::query(
                "INSERT INTO group_reachable_cache(supergroup_idx, subgroup_idx) VALUES ($1, $2)",
            )
            .bind(supergroup_idx)
            .bind(subgroup_idx)
            .execute(tr.conn()?)
            .await?;
        }
    }

    Ok(())
}
