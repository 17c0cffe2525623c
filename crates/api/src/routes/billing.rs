//! Billing endpoints: portal sessions and entitlement snapshots

use axum::{extract::State, Extension, Json};
use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use tradeyard_billing::PortalResponse;
use tradeyard_shared::types::{
    AddonPurchaseStatus, AddonType, SubscriptionStatus, TrackKind, VerificationStatus,
};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

/// Create a Stripe billing portal session for the current user
pub async fn create_portal_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<PortalResponse>> {
    let customer_id = state
        .billing
        .customer
        .get_customer_id(auth_user.user_id)
        .await?;

    let session = state
        .billing
        .portal
        .create_portal_session(auth_user.user_id, customer_id.as_str())
        .await?;

    Ok(Json(session.into()))
}

#[derive(Debug, Serialize)]
pub struct TrackSummary {
    pub kind: TrackKind,
    pub tier: String,
    pub status: SubscriptionStatus,
    pub grants_access: bool,
}

#[derive(Debug, Serialize)]
pub struct AddonSummary {
    pub id: Uuid,
    pub addon_type: AddonType,
    pub listing_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct EntitlementsResponse {
    pub is_seller: bool,
    pub is_contractor: bool,
    pub tracks: Vec<TrackSummary>,
    pub contractor_tier: Option<String>,
    pub verification_status: Option<VerificationStatus>,
    pub active_addons: Vec<AddonSummary>,
}

/// Current entitlement snapshot for the authenticated user
pub async fn get_entitlements(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<EntitlementsResponse>> {
    let snapshot = load_entitlements(&state.pool, auth_user.user_id).await?;
    Ok(Json(snapshot))
}

/// Load the entitlement snapshot for a user
pub async fn load_entitlements(pool: &PgPool, user_id: Uuid) -> ApiResult<EntitlementsResponse> {
    let flags: Option<(bool, bool)> =
        sqlx::query_as("SELECT is_seller, is_contractor FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    let (is_seller, is_contractor) = flags.ok_or(crate::error::ApiError::NotFound)?;

    let track_rows: Vec<(TrackKind, String, SubscriptionStatus)> = sqlx::query_as(
        "SELECT kind, tier, status FROM subscription_tracks WHERE user_id = $1 ORDER BY kind",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let tracks = track_rows
        .into_iter()
        .map(|(kind, tier, status)| TrackSummary {
            kind,
            tier,
            status,
            grants_access: status.grants_access(),
        })
        .collect();

    let contractor_tier: Option<(String,)> =
        sqlx::query_as("SELECT visibility_tier FROM contractor_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    let verification_status: Option<(VerificationStatus,)> =
        sqlx::query_as("SELECT status FROM seller_verifications WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    let addon_rows: Vec<(Uuid, AddonType, Option<Uuid>, Option<OffsetDateTime>)> = sqlx::query_as(
        r#"
        SELECT id, addon_type, listing_id, expires_at
        FROM addon_purchases
        WHERE user_id = $1
          AND status = $2
          AND (expires_at IS NULL OR expires_at > NOW())
        ORDER BY started_at DESC
        "#,
    )
    .bind(user_id)
    .bind(AddonPurchaseStatus::Active)
    .fetch_all(pool)
    .await?;

    let active_addons = addon_rows
        .into_iter()
        .map(|(id, addon_type, listing_id, expires_at)| AddonSummary {
            id,
            addon_type,
            listing_id,
            expires_at,
        })
        .collect();

    Ok(EntitlementsResponse {
        is_seller,
        is_contractor,
        tracks,
        contractor_tier: contractor_tier.map(|(t,)| t),
        verification_status: verification_status.map(|(s,)| s),
        active_addons,
    })
}
