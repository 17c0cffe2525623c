//! Stripe webhook endpoint

use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Handle incoming Stripe webhook events.
///
/// Signature verification failures return 400 so Stripe retries with a
/// correct signature. Processing failures still return 200; the event is
/// recorded with its error in `stripe_webhook_events`, and the claim row
/// suppresses redelivery of the same event id.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Value>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing stripe-signature header".to_string()))?;

    let event = state
        .billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!("Webhook signature verification failed: {}", e);
            ApiError::BadRequest("Invalid webhook signature".to_string())
        })?;

    if let Err(e) = state.billing.webhooks.handle_event(event).await {
        // Already audited in stripe_webhook_events, do not trigger a retry storm
        tracing::error!("Webhook event processing failed: {}", e);
    }

    Ok(Json(json!({ "received": true })))
}
