//! Host and host-group authorization integration tests.

mod common;

use idhub::model::{groups, hosts, permissions, users};
use idhub::Error;
use uuid::Uuid;

// Integration tests require a running PostgreSQL instance
// Run with: docker run -d -p 5432:5432 -e POSTGRES_PASSWORD=test postgres:15

fn host_name() -> String {
    format!("host-{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn host_without_group_is_denied() {
    let model = common::test_model().await;

    model
        .with_transaction(&[], &[], |tr| {
            Box::pin(async move {
                let host_idx = hosts::add_host(tr, &host_name(), "10.89.0.1", None).await?;
                let host = hosts::get_host_by_inet(tr, "10.89.0.1", false).await?;
                assert_eq!(host.idx, host_idx);

                let user_idx = common::create_user(tr).await?;
                match hosts::authorize_user_by_host(tr, user_idx, &host).await {
                    Err(Error::Authorization) => {}
                    other => panic!("expected Authorization error, got {other:?}"),
                }

                hosts::delete_host(tr, host_idx).await?;
                Ok(())
            })
        })
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn host_group_without_permission_authorizes_trivially() {
    let model = common::test_model().await;

    model
        .with_transaction(&[], &[], |tr| {
            Box::pin(async move {
                let host_idx = hosts::add_host(tr, &host_name(), "10.89.0.2", None).await?;
                let host_group_idx = hosts::add_host_group(tr, &host_name()).await?;
                hosts::add_host_to_group(tr, host_idx, host_group_idx).await?;

                let host = hosts::get_host_by_inet(tr, "10.89.0.2", false).await?;
                let user_idx = common::create_user(tr).await?;
                hosts::authorize_user_by_host(tr, user_idx, &host).await?;

                hosts::delete_host(tr, host_idx).await?;
                Ok(())
            })
        })
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn host_group_permission_gates_login() {
    let model = common::test_model().await;

    model
        .with_transaction(&[groups::REACHABLE_CACHE_TABLE], &[], |tr| {
            Box::pin(async move {
                let host_idx = hosts::add_host(tr, &host_name(), "10.89.0.3", None).await?;
                let host_group_idx = hosts::add_host_group(tr, &host_name()).await?;
                hosts::add_host_to_group(tr, host_idx, host_group_idx).await?;

                let group_idx = common::create_group(tr).await?;
                let permission_idx = common::create_permission(tr).await?;
                permissions::add_permission_requirement(tr, group_idx, permission_idx).await?;
                hosts::set_host_group_permission(tr, host_group_idx, permission_idx).await?;

                let host = hosts::get_host_by_inet(tr, "10.89.0.3", false).await?;

                let member = common::create_user(tr).await?;
                users::add_user_membership(tr, member, group_idx).await?;
                hosts::authorize_user_by_host(tr, member, &host).await?;

                let outsider = common::create_user(tr).await?;
                match hosts::authorize_user_by_host(tr, outsider, &host).await {
                    Err(Error::Authorization) => {}
                    other => panic!("expected Authorization error, got {other:?}"),
                }

                hosts::delete_host(tr, host_idx).await?;
                Ok(())
            })
        })
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn inet_lookup_strips_mapped_prefix_and_respects_pubkeys() {
    let model = common::test_model().await;

    model
        .with_transaction(&[], &[], |tr| {
            Box::pin(async move {
                let plain_idx = hosts::add_host(tr, &host_name(), "10.89.0.4", None).await?;
                let keyed_idx =
                    hosts::add_host(tr, &host_name(), "10.89.0.5", Some(&[1, 2, 3, 4])).await?;

                // IPv6-mapped IPv4 addresses resolve to the plain form
                let host = hosts::get_host_by_inet(tr, "::ffff:10.89.0.4", false).await?;
                assert_eq!(host.idx, plain_idx);
                assert_eq!(host.host, "10.89.0.4");

                // pubkey-registered hosts must use the signed channel
                match hosts::get_host_by_inet(tr, "10.89.0.5", false).await {
                    Err(Error::NoSuchEntry) => {}
                    other => panic!("expected NoSuchEntry, got {other:?}"),
                }
                let bypassed = hosts::get_host_by_inet(tr, "10.89.0.5", true).await?;
                assert_eq!(bypassed.idx, keyed_idx);

                let by_key = hosts::get_host_by_pubkey(tr, &[1, 2, 3, 4]).await?;
                assert_eq!(by_key.idx, keyed_idx);

                hosts::delete_host(tr, plain_idx).await?;
                hosts::delete_host(tr, keyed_idx).await?;
                Ok(())
            })
        })
        .await
        .unwrap();
}
