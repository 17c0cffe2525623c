//! API routes

pub mod billing;
pub mod health;
pub mod purchases;
pub mod webhooks;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::require_auth;
use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (no auth required) - under /api/v1
    // Stripe webhook is public, signature verification happens in the handler
    let public_api_routes =
        Router::new().route("/webhooks/stripe", post(webhooks::stripe_webhook));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        // Purchase routes
        .route(
            "/purchases/subscription",
            post(purchases::create_subscription_purchase),
        )
        .route("/purchases/addon", post(purchases::create_addon_purchase))
        // Billing routes
        .route("/billing/portal", post(billing::create_portal_session))
        .route("/billing/entitlements", get(billing::get_entitlements))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Combine API routes under /api/v1 prefix
    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        // Global request body size limit to prevent DoS via large payloads
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB limit
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
