//! Permissions and their requirement groups.
//!
//! A permission may require several groups; the rows in
//! `permission_requirements` sharing one permission idx form a conjunctive
//! precondition. Adding a requirement row tightens the predicate.

use crate::error::{Error, Result};
use crate::model::transaction::Transaction;
use crate::model::users;

use super::groups::Translation;

pub async fn create(
    tr: &mut Transaction,
    name: &Translation,
    description: &Translation,
) -> Result<i32> {
    let idx: i32 = sqlx::query_scalar(
        "INSERT INTO permissions(name_ko, name_en, description_ko, description_en) \
         VALUES ($1, $2, $3, $4) RETURNING idx",
    )
    .bind(&name.ko)
    .bind(&name.en)
    .bind(&description.ko)
    .bind(&description.en)
    .fetch_one(tr.conn()?)
    .await?;
    Ok(idx)
}

pub async fn delete(tr: &mut Transaction, permission_idx: i32) -> Result<i32> {
    let deleted: Option<i32> =
        sqlx::query_scalar("DELETE FROM permissions WHERE idx = $1 RETURNING idx")
            .bind(permission_idx)
            .fetch_optional(tr.conn()?)
            .await?;
    deleted.ok_or(Error::NoSuchEntry)
}

/// Requires `group_idx` to be reached for `permission_idx` to be granted.
/// Requirements reference the hierarchy but do not alter it, so no cache
/// rebuild is involved.
pub async fn add_permission_requirement(
    tr: &mut Transaction,
    group_idx: i32,
    permission_idx: i32,
) -> Result<i32> {
    let idx: i32 = sqlx::query_scalar(
        "INSERT INTO permission_requirements(group_idx, permission_idx) \
         VALUES ($1, $2) RETURNING idx",
    )
    .bind(group_idx)
    .bind(permission_idx)
    .fetch_one(tr.conn()?)
    .await?;
    Ok(idx)
}

pub async fn delete_permission_requirement(tr: &mut Transaction, idx: i32) -> Result<i32> {
    let deleted: Option<i32> =
        sqlx::query_scalar("DELETE FROM permission_requirements WHERE idx = $1 RETURNING idx")
            .bind(idx)
            .fetch_optional(tr.conn()?)
            .await?;
    deleted.ok_or(Error::NoSuchEntry)
}

/// Requirement groups for a permission. May be empty.
pub async fn get_all_permission_requirements(
    tr: &mut Transaction,
    permission_idx: i32,
) -> Result<Vec<i32>> {
    let groups: Vec<i32> =
        sqlx::query_scalar("SELECT group_idx FROM permission_requirements WHERE permission_idx = $1")
            .bind(permission_idx)
            .fetch_all(tr.conn()?)
            .await?;
    Ok(groups)
}

/// True iff the user's direct memberships reach every requirement group of
/// the permission. An empty requirement set grants trivially; reaching only
/// some requirement groups denies.
pub async fn check_user_have_permission(
    tr: &mut Transaction,
    user_idx: i32,
    permission_idx: i32,
) -> Result<bool> {
    let reachable = users::get_user_reachable_groups(tr, user_idx).await?;
    let requirements = get_all_permission_requirements(tr, permission_idx).await?;

    Ok(requirements.iter().all(|group| reachable.contains(group)))
}
