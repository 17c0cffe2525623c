//! Purchase endpoints for subscription tracks and listing add-ons

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use tradeyard_billing::{BillingInterval, CheckoutOutcome};
use tradeyard_shared::types::{AddonType, TrackKind};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionPurchaseRequest {
    pub kind: TrackKind,
    pub tier: String,
    pub billing_interval: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAddonPurchaseRequest {
    pub addon_type: AddonType,
    pub listing_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
}

/// Start a subscription track purchase.
///
/// Returns either a checkout session to redirect the user to, or an
/// immediate activation when no price is configured.
pub async fn create_subscription_purchase(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<CreateSubscriptionPurchaseRequest>,
) -> ApiResult<Json<CheckoutOutcome>> {
    let interval = match request.billing_interval.as_deref() {
        Some(raw) => BillingInterval::from_str(raw).ok_or_else(|| {
            ApiError::BadRequest(format!("Invalid billing interval: {}", raw))
        })?,
        None => BillingInterval::default(),
    };

    let customer = state
        .billing
        .customer
        .get_or_create_customer(auth_user.user_id, &auth_user.email, &auth_user.email)
        .await?;

    let outcome = state
        .billing
        .checkout
        .create_subscription_checkout(
            auth_user.user_id,
            customer.id.as_str(),
            request.kind,
            &request.tier,
            interval,
        )
        .await?;

    Ok(Json(outcome))
}

/// Start a one-time add-on purchase for a listing or profile.
pub async fn create_addon_purchase(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<CreateAddonPurchaseRequest>,
) -> ApiResult<Json<CheckoutOutcome>> {
    let customer = state
        .billing
        .customer
        .get_or_create_customer(auth_user.user_id, &auth_user.email, &auth_user.email)
        .await?;

    let outcome = state
        .billing
        .checkout
        .create_addon_checkout(
            auth_user.user_id,
            customer.id.as_str(),
            request.addon_type,
            request.listing_id,
            request.contractor_id,
        )
        .await?;

    Ok(Json(outcome))
}
