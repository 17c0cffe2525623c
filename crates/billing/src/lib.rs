// Billing crate clippy configuration
#![allow(clippy::too_many_arguments)] // Some Stripe operations require many parameters
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Tradeyard Billing Module
//!
//! Handles Stripe integration for marketplace entitlements.
//!
//! ## Features
//!
//! - **Subscription Tracks**: Seller plans, contractor visibility, verified-seller program
//! - **Listing Add-ons**: Featured/premium/elite boosts plus one-time flags
//! - **Entitlement Mapping**: Pure purchase-to-assignment rules
//! - **Reconciliation**: Transactional application of entitlement updates
//! - **Webhooks**: Verified, exactly-once Stripe event handling
//! - **Audit Trail**: Append-only entitlement event log

pub mod catalog;
pub mod checkout;
pub mod client;
pub mod customer;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod expiration;
pub mod lookup;
pub mod portal;
pub mod reconcile;
pub mod webhooks;

// Catalog
pub use catalog::{addon_entry, contractor_entry, seller_entry, seller_features, verified_seller_entry, CatalogEntry, SellerFeatures};

// Checkout
pub use checkout::{BillingInterval, CheckoutOutcome, CheckoutResponse, CheckoutService};

// Client
pub use client::{PriceIds, StripeClient, StripeConfig};

// Customer
pub use customer::CustomerService;

// Entitlement
pub use entitlement::{
    cascade_set, ContractorProfileAssignments, EntitlementUpdate, ListingFlagSet, PurchaseKind,
    TrackAssignment, UserAssignments, VerificationAssignments,
};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{
    ActorType, EntitlementEvent, EntitlementEventBuilder, EntitlementEventLogger,
    EntitlementEventType,
};

// Expiration
pub use expiration::{expiration_for, ExpiringGrant};

// Lookup
pub use lookup::{AddonPurchaseRow, SubjectRef, SubjectResolver, TrackRow};

// Portal
pub use portal::{PortalResponse, PortalService};

// Reconcile
pub use reconcile::{CheckoutCompleted, CheckoutKind, ReconcileService};

// Webhooks
pub use webhooks::WebhookHandler;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub customer: CustomerService,
    pub portal: PortalService,
    pub reconcile: ReconcileService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::with_client(stripe, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self::with_client(StripeClient::new(config), pool)
    }

    fn with_client(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            checkout: CheckoutService::new(stripe.clone(), pool.clone()),
            customer: CustomerService::new(stripe.clone(), pool.clone()),
            portal: PortalService::new(stripe.clone()),
            reconcile: ReconcileService::new(pool.clone()),
            webhooks: WebhookHandler::new(stripe, pool),
        }
    }
}
