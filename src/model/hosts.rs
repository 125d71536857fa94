//! Trusted hosts and host groups.
//!
//! A host belongs to at most one host group; a host group optionally names
//! a single required permission. Host authorization resolves through the
//! conjunctive permission check.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::permissions;
use crate::model::transaction::Transaction;

/// A trusted host, identified by its address or registered public key.
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub idx: i32,
    pub name: String,
    pub host: String,
    pub host_group_idx: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_pubkey: Option<Vec<u8>>,
}

/// A set of hosts sharing one authorization requirement.
#[derive(Debug, Clone, Serialize)]
pub struct HostGroup {
    pub idx: i32,
    pub name: String,
    pub required_permission_idx: Option<i32>,
}

#[derive(sqlx::FromRow)]
struct HostRow {
    idx: i32,
    name: String,
    host: String,
    host_group: Option<i32>,
    host_pubkey: Option<Vec<u8>>,
}

impl From<HostRow> for Host {
    fn from(row: HostRow) -> Self {
        Host {
            idx: row.idx,
            name: row.name,
            host: row.host,
            host_group_idx: row.host_group,
            host_pubkey: row.host_pubkey,
        }
    }
}

pub async fn add_host(
    tr: &mut Transaction,
    name: &str,
    host: &str,
    pubkey: Option<&[u8]>,
) -> Result<i32> {
    let idx: i32 = sqlx::query_scalar(
        "INSERT INTO hosts(name, host, host_pubkey) VALUES ($1, $2::inet, $3) RETURNING idx",
    )
    .bind(name)
    .bind(host)
    .bind(pubkey)
    .fetch_one(tr.conn()?)
    .await?;
    Ok(idx)
}

pub async fn delete_host(tr: &mut Transaction, idx: i32) -> Result<()> {
    let deleted: Option<i32> = sqlx::query_scalar("DELETE FROM hosts WHERE idx = $1 RETURNING idx")
        .bind(idx)
        .fetch_optional(tr.conn()?)
        .await?;
    deleted.map(|_| ()).ok_or(Error::NoSuchEntry)
}

pub async fn add_host_group(tr: &mut Transaction, name: &str) -> Result<i32> {
    let idx: i32 = sqlx::query_scalar("INSERT INTO host_groups(name) VALUES ($1) RETURNING idx")
        .bind(name)
        .fetch_one(tr.conn()?)
        .await?;
    Ok(idx)
}

pub async fn set_host_group_permission(
    tr: &mut Transaction,
    host_group_idx: i32,
    permission_idx: i32,
) -> Result<()> {
    let updated: Option<i32> = sqlx::query_scalar(
        "UPDATE host_groups SET required_permission = $1 WHERE idx = $2 RETURNING idx",
    )
    .bind(permission_idx)
    .bind(host_group_idx)
    .fetch_optional(tr.conn()?)
    .await?;
    updated.map(|_| ()).ok_or(Error::NoSuchEntry)
}

pub async fn add_host_to_group(
    tr: &mut Transaction,
    host_idx: i32,
    host_group_idx: i32,
) -> Result<()> {
    let updated: Option<i32> =
        sqlx::query_scalar("UPDATE hosts SET host_group = $1 WHERE idx = $2 RETURNING idx")
            .bind(host_group_idx)
            .bind(host_idx)
            .fetch_optional(tr.conn()?)
            .await?;
    updated.map(|_| ()).ok_or(Error::NoSuchEntry)
}

/// Looks up a host by its address.
///
/// Hosts with a registered public key must authenticate through the signed
/// channel; address lookup refuses them unless explicitly bypassed.
pub async fn get_host_by_inet(
    tr: &mut Transaction,
    inet: &str,
    unsafe_bypass_pubkey: bool,
) -> Result<Host> {
    // Strip an occasional IPv6-mapped IPv4 prefix (::ffff:1.2.3.4)
    let inet = match inet.rfind(':') {
        Some(pos) => &inet[pos + 1..],
        None => inet,
    };

    let query = if unsafe_bypass_pubkey {
        "SELECT idx, name, host(host) AS host, host_group, host_pubkey FROM hosts \
         WHERE host(host) = $1"
    } else {
        "SELECT idx, name, host(host) AS host, host_group, host_pubkey FROM hosts \
         WHERE host(host) = $1 AND host_pubkey IS NULL"
    };

    let row: Option<HostRow> = sqlx::query_as(query)
        .bind(inet)
        .fetch_optional(tr.conn()?)
        .await?;
    row.map(Host::from).ok_or(Error::NoSuchEntry)
}

pub async fn get_host_by_pubkey(tr: &mut Transaction, pubkey: &[u8]) -> Result<Host> {
    let row: Option<HostRow> = sqlx::query_as(
        "SELECT idx, name, host(host) AS host, host_group, host_pubkey FROM hosts \
         WHERE host_pubkey = $1",
    )
    .bind(pubkey)
    .fetch_optional(tr.conn()?)
    .await?;
    row.map(Host::from).ok_or(Error::NoSuchEntry)
}

pub async fn get_host_group_by_idx(tr: &mut Transaction, host_group_idx: i32) -> Result<HostGroup> {
    let row: Option<(i32, String, Option<i32>)> =
        sqlx::query_as("SELECT idx, name, required_permission FROM host_groups WHERE idx = $1")
            .bind(host_group_idx)
            .fetch_optional(tr.conn()?)
            .await?;
    row.map(|(idx, name, required_permission_idx)| HostGroup {
        idx,
        name,
        required_permission_idx,
    })
    .ok_or(Error::NoSuchEntry)
}

/// Checks whether a user may log in through a host.
///
/// A host outside any host group is unrecognized and always denied. A host
/// group without a required permission authorizes trivially; otherwise the
/// user must satisfy the group's required permission.
pub async fn authorize_user_by_host(
    tr: &mut Transaction,
    user_idx: i32,
    host: &Host,
) -> Result<()> {
    let Some(host_group_idx) = host.host_group_idx else {
        return Err(Error::Authorization);
    };

    let host_group = get_host_group_by_idx(tr, host_group_idx).await?;
    let Some(required) = host_group.required_permission_idx else {
        return Ok(());
    };

    if permissions::check_user_have_permission(tr, user_idx, required).await? {
        Ok(())
    } else {
        Err(Error::Authorization)
    }
}
