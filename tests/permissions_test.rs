//! Permission requirement and conjunctive check integration tests.

mod common;

use idhub::model::{groups, permissions, users};

// Integration tests require a running PostgreSQL instance
// Run with: docker run -d -p 5432:5432 -e POSTGRES_PASSWORD=test postgres:15

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn create_and_delete_permission_requirements() {
    let model = common::test_model().await;

    model
        .with_transaction(&[groups::REACHABLE_CACHE_TABLE], &[], |tr| {
            Box::pin(async move {
                let group_idx = common::create_group(tr).await?;
                let permission_idx = common::create_permission(tr).await?;

                let idx =
                    permissions::add_permission_requirement(tr, group_idx, permission_idx).await?;
                assert_eq!(
                    permissions::get_all_permission_requirements(tr, permission_idx).await?,
                    vec![group_idx]
                );

                permissions::delete_permission_requirement(tr, idx).await?;
                assert!(permissions::get_all_permission_requirements(tr, permission_idx)
                    .await?
                    .is_empty());

                permissions::delete(tr, permission_idx).await?;
                Ok(())
            })
        })
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn conjunctive_permission_check() {
    let model = common::test_model().await;

    model
        .with_transaction(&[groups::REACHABLE_CACHE_TABLE], &[], |tr| {
            Box::pin(async move {
                // g0 -> g1, g0 -> g2, g1 -> g3, g1 -> g4
                let mut g = Vec::new();
                for _ in 0..5 {
                    g.push(common::create_group(tr).await?);
                }
                common::create_group_relation(tr, g[0], g[1]).await?;
                common::create_group_relation(tr, g[0], g[2]).await?;
                common::create_group_relation(tr, g[1], g[3]).await?;
                common::create_group_relation(tr, g[1], g[4]).await?;

                // requirement groups g2 AND g4
                let permission_idx = common::create_permission(tr).await?;
                permissions::add_permission_requirement(tr, g[2], permission_idx).await?;
                permissions::add_permission_requirement(tr, g[4], permission_idx).await?;

                // g0 reaches both requirement groups
                let user1 = common::create_user(tr).await?;
                users::add_user_membership(tr, user1, g[0]).await?;
                assert!(permissions::check_user_have_permission(tr, user1, permission_idx).await?);

                // g1 reaches g4 but not g2: partial satisfaction denies
                let user2 = common::create_user(tr).await?;
                users::add_user_membership(tr, user2, g[1]).await?;
                assert!(!permissions::check_user_have_permission(tr, user2, permission_idx).await?);

                // g1 + g2 together cover both requirements
                let user3 = common::create_user(tr).await?;
                users::add_user_membership(tr, user3, g[1]).await?;
                users::add_user_membership(tr, user3, g[2]).await?;
                assert!(permissions::check_user_have_permission(tr, user3, permission_idx).await?);

                Ok(())
            })
        })
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn adding_a_requirement_only_tightens() {
    let model = common::test_model().await;

    model
        .with_transaction(&[groups::REACHABLE_CACHE_TABLE], &[], |tr| {
            Box::pin(async move {
                let member_group = common::create_group(tr).await?;
                let other_group = common::create_group(tr).await?;
                let permission_idx = common::create_permission(tr).await?;

                let user = common::create_user(tr).await?;
                users::add_user_membership(tr, user, member_group).await?;

                // empty requirement set grants trivially
                assert!(permissions::check_user_have_permission(tr, user, permission_idx).await?);

                permissions::add_permission_requirement(tr, member_group, permission_idx).await?;
                assert!(permissions::check_user_have_permission(tr, user, permission_idx).await?);

                // a second requirement row for the same permission tightens
                permissions::add_permission_requirement(tr, other_group, permission_idx).await?;
                assert!(!permissions::check_user_have_permission(tr, user, permission_idx).await?);

                Ok(())
            })
        })
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn membership_workflow_updates_pending_and_approved_rows() {
    let model = common::test_model().await;

    model
        .with_transaction(&[groups::REACHABLE_CACHE_TABLE], &[], |tr| {
            Box::pin(async move {
                let group_idx = common::create_group(tr).await?;
                let applicant = common::create_user(tr).await?;
                let rejected = common::create_user(tr).await?;

                users::add_pending_user_membership(tr, applicant, group_idx).await?;
                users::add_pending_user_membership(tr, rejected, group_idx).await?;
                assert!(users::has_pending_user_membership(tr, applicant, group_idx).await?);

                let accepted =
                    users::accept_user_memberships(tr, group_idx, &[applicant]).await?;
                assert_eq!(accepted, 1);
                assert!(users::has_user_membership(tr, applicant, group_idx).await?);
                assert!(!users::has_pending_user_membership(tr, applicant, group_idx).await?);

                let removed = users::reject_user_memberships(tr, group_idx, &[rejected]).await?;
                assert_eq!(removed, 1);
                assert!(!users::has_pending_user_membership(tr, rejected, group_idx).await?);
                assert!(!users::has_user_membership(tr, rejected, group_idx).await?);

                // accepting a user with no pending row moves nothing
                let stranger = common::create_user(tr).await?;
                assert_eq!(users::accept_user_memberships(tr, group_idx, &[stranger]).await?, 0);

                let members = users::get_all_membership_users(tr, group_idx, None).await?;
                assert_eq!(members.len(), 1);
                assert_eq!(members[0].idx, applicant);

                Ok(())
            })
        })
        .await
        .unwrap();
}
