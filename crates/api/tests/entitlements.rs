//! Schema-level tests for the entitlement snapshot endpoint
//!
//! These tests run the snapshot queries against a migrated database so the
//! SQL stays in agreement with the schema.
//!
//! ## Running Tests
//! ```bash
//! export DATABASE_URL="postgres://localhost/tradeyard_test"
//! cargo test --test entitlements
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use tradeyard_api::routes::billing::load_entitlements;
use tradeyard_api::ApiError;
use tradeyard_shared::types::{AddonType, SubscriptionStatus, TrackKind};

async fn setup_pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    let pool = tradeyard_shared::db::create_pool(&database_url)
        .await
        .expect("Failed to connect to test database");

    tradeyard_shared::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

async fn create_test_user(pool: &PgPool, is_seller: bool, is_contractor: bool) -> Uuid {
    let user_id = Uuid::new_v4();

    sqlx::query("INSERT INTO users (id, email, is_seller, is_contractor) VALUES ($1, $2, $3, $4)")
        .bind(user_id)
        .bind(format!("test-user-{}@example.com", user_id))
        .bind(is_seller)
        .bind(is_contractor)
        .execute(pool)
        .await
        .expect("Failed to create test user");

    user_id
}

async fn cleanup_test_user(pool: &PgPool, user_id: Uuid) {
    // Delete in order to respect foreign key constraints

    sqlx::query("DELETE FROM addon_purchases WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .ok();

    sqlx::query("DELETE FROM subscription_tracks WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .ok();

    sqlx::query("DELETE FROM contractor_profiles WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .ok();

    sqlx::query("DELETE FROM seller_verifications WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .ok();

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .ok();
}

#[tokio::test]
async fn test_snapshot_includes_tracks_profile_and_addons() {
    let pool = setup_pool().await;
    let user_id = create_test_user(&pool, true, true).await;

    sqlx::query(
        r#"
        INSERT INTO subscription_tracks (user_id, kind, tier, status, external_id)
        VALUES ($1, 'seller', 'pro', 'active', $2)
        "#,
    )
    .bind(user_id)
    .bind(format!("sub_test_{}", user_id))
    .execute(&pool)
    .await
    .expect("Failed to create test track");

    sqlx::query(
        r#"
        INSERT INTO contractor_profiles (user_id, verification_status, visibility_tier)
        VALUES ($1, 'verified', 'featured')
        "#,
    )
    .bind(user_id)
    .execute(&pool)
    .await
    .expect("Failed to create test contractor profile");

    sqlx::query(
        r#"
        INSERT INTO addon_purchases
            (user_id, addon_type, status, amount_cents, started_at, expires_at)
        VALUES ($1, 'featured', 'active', 1999, NOW(), $2)
        "#,
    )
    .bind(user_id)
    .bind(OffsetDateTime::now_utc() + Duration::days(10))
    .execute(&pool)
    .await
    .expect("Failed to create test purchase");

    let snapshot = load_entitlements(&pool, user_id)
        .await
        .expect("Snapshot queries should succeed against the migrated schema");

    assert!(snapshot.is_seller);
    assert!(snapshot.is_contractor);

    assert_eq!(snapshot.tracks.len(), 1);
    assert_eq!(snapshot.tracks[0].kind, TrackKind::Seller);
    assert_eq!(snapshot.tracks[0].tier, "pro");
    assert_eq!(snapshot.tracks[0].status, SubscriptionStatus::Active);
    assert!(snapshot.tracks[0].grants_access);

    assert_eq!(snapshot.contractor_tier.as_deref(), Some("featured"));

    assert_eq!(snapshot.active_addons.len(), 1);
    assert_eq!(snapshot.active_addons[0].addon_type, AddonType::Featured);
    assert!(snapshot.active_addons[0].expires_at.is_some());

    cleanup_test_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_snapshot_excludes_expired_addons() {
    let pool = setup_pool().await;
    let user_id = create_test_user(&pool, true, false).await;

    // Expired listing boost
    sqlx::query(
        r#"
        INSERT INTO addon_purchases
            (user_id, addon_type, status, amount_cents, started_at, expires_at)
        VALUES ($1, 'featured', 'active', 1999, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(OffsetDateTime::now_utc() - Duration::days(31))
    .bind(OffsetDateTime::now_utc() - Duration::days(1))
    .execute(&pool)
    .await
    .expect("Failed to create expired purchase");

    // Non-expiring one-time flag
    sqlx::query(
        r#"
        INSERT INTO addon_purchases (user_id, addon_type, status, amount_cents, started_at)
        VALUES ($1, 'ai_enhancement', 'active', 999, NOW())
        "#,
    )
    .bind(user_id)
    .execute(&pool)
    .await
    .expect("Failed to create one-time purchase");

    let snapshot = load_entitlements(&pool, user_id)
        .await
        .expect("Snapshot queries should succeed");

    assert_eq!(snapshot.active_addons.len(), 1);
    assert_eq!(
        snapshot.active_addons[0].addon_type,
        AddonType::AiEnhancement
    );
    assert!(snapshot.active_addons[0].expires_at.is_none());

    cleanup_test_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_snapshot_unknown_user_is_not_found() {
    let pool = setup_pool().await;

    let result = load_entitlements(&pool, Uuid::new_v4()).await;

    assert!(matches!(result, Err(ApiError::NotFound)));
}
