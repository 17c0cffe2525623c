//! Schema-level tests for webhook subject resolution
//!
//! ## Running Tests
//! ```bash
//! export DATABASE_URL="postgres://localhost/tradeyard_test"
//! cargo test --test subject_lookup
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use sqlx::PgPool;
use uuid::Uuid;

use tradeyard_billing::SubjectResolver;
use tradeyard_shared::types::TrackKind;

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

async fn create_test_user(pool: &PgPool, stripe_customer_id: Option<&str>) -> Uuid {
    let user_id = Uuid::new_v4();

    sqlx::query("INSERT INTO users (id, email, stripe_customer_id) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(format!("test-user-{}@example.com", user_id))
        .bind(stripe_customer_id)
        .execute(pool)
        .await
        .expect("Failed to create test user");

    user_id
}

async fn cleanup_test_user(pool: &PgPool, user_id: Uuid) {
    sqlx::query("DELETE FROM subscription_tracks WHERE user_id = $1")
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
async fn test_resolves_by_stored_customer_id() {
    let pool = setup_pool().await;
    let customer_id = format!("cus_test_{}", Uuid::new_v4().simple());
    let user_id = create_test_user(&pool, Some(&customer_id)).await;

    let resolver = SubjectResolver::new(pool.clone());

    // No metadata, no stored track for the subscription id
    let subject = resolver
        .resolve_subject(None, Some("sub_nonexistent"), Some(&customer_id))
        .await
        .expect("Resolution query failed")
        .expect("Customer id should resolve the subject");

    assert_eq!(subject.user_id, user_id);
    assert_eq!(subject.track_kind, None);

    cleanup_test_user(&pool, user_id).await;
}

#[tokio::test]
async fn test_stored_track_wins_over_customer_id() {
    let pool = setup_pool().await;
    let customer_id = format!("cus_test_{}", Uuid::new_v4().simple());
    let customer_user = create_test_user(&pool, Some(&customer_id)).await;
    let track_user = create_test_user(&pool, None).await;
    let subscription_id = format!("sub_test_{}", Uuid::new_v4().simple());

    sqlx::query(
        r#"
        INSERT INTO subscription_tracks (user_id, kind, tier, status, external_id)
        VALUES ($1, 'contractor', 'verified', 'active', $2)
        "#,
    )
    .bind(track_user)
    .bind(&subscription_id)
    .execute(&pool)
    .await
    .expect("Failed to create test track");

    let resolver = SubjectResolver::new(pool.clone());

    let subject = resolver
        .resolve_subject(None, Some(&subscription_id), Some(&customer_id))
        .await
        .expect("Resolution query failed")
        .expect("Subscription id should resolve the subject");

    assert_eq!(subject.user_id, track_user);
    assert_eq!(subject.track_kind, Some(TrackKind::Contractor));

    cleanup_test_user(&pool, customer_user).await;
    cleanup_test_user(&pool, track_user).await;
}

#[tokio::test]
async fn test_metadata_user_id_wins_over_references() {
    let pool = setup_pool().await;
    let customer_id = format!("cus_test_{}", Uuid::new_v4().simple());
    let customer_user = create_test_user(&pool, Some(&customer_id)).await;
    let metadata_user = Uuid::new_v4();

    let resolver = SubjectResolver::new(pool.clone());

    let subject = resolver
        .resolve_subject(
            Some(&metadata_user.to_string()),
            None,
            Some(&customer_id),
        )
        .await
        .expect("Resolution query failed")
        .expect("Metadata user id should resolve the subject");

    assert_eq!(subject.user_id, metadata_user);

    cleanup_test_user(&pool, customer_user).await;
}
