//! Stripe Checkout sessions

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CustomerId,
};
use uuid::Uuid;

use tradeyard_shared::types::{AddonPurchaseStatus, AddonType, SubscriptionStatus, TrackKind};

use crate::catalog;
use crate::client::StripeClient;
use crate::entitlement::PurchaseKind;
use crate::error::{BillingError, BillingResult};
use crate::reconcile::ReconcileService;

/// Billing interval for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    #[default]
    Monthly,
    Annual,
}

impl BillingInterval {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "monthly" | "month" => Some(Self::Monthly),
            "annual" | "yearly" | "year" => Some(Self::Annual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Annual => "annual",
        }
    }
}

/// Parse a track kind and tier string into a purchase
pub fn purchase_kind_for(kind: TrackKind, tier: &str) -> BillingResult<PurchaseKind> {
    match kind {
        TrackKind::Seller => tier
            .parse()
            .map(PurchaseKind::Seller)
            .map_err(|_| BillingError::InvalidTier(tier.to_string())),
        TrackKind::Contractor => tier
            .parse()
            .map(PurchaseKind::Contractor)
            .map_err(|_| BillingError::InvalidTier(tier.to_string())),
        TrackKind::VerifiedSeller => tier
            .parse()
            .map(PurchaseKind::VerifiedSeller)
            .map_err(|_| BillingError::InvalidTier(tier.to_string())),
    }
}

/// Result of a purchase request: either a checkout session to redirect to,
/// or an immediate activation when no price is configured (test mode).
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Session(CheckoutResponse),
    Activated,
}

/// Checkout service for creating Stripe checkout sessions
pub struct CheckoutService {
    stripe: StripeClient,
    pool: PgPool,
    reconcile: ReconcileService,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let reconcile = ReconcileService::new(pool.clone());
        Self {
            stripe,
            pool,
            reconcile,
        }
    }

    /// Verify that a Stripe customer ID belongs to the given user
    async fn verify_customer_ownership(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> BillingResult<()> {
        let verified: Option<(String,)> = sqlx::query_as(
            "SELECT stripe_customer_id FROM users WHERE id = $1 AND stripe_customer_id = $2",
        )
        .bind(user_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        if verified.is_none() {
            tracing::warn!(
                user_id = %user_id,
                customer_id = %customer_id,
                "Customer ID ownership verification failed"
            );
            return Err(BillingError::Unauthorized(
                "Customer ID does not belong to this user".to_string(),
            ));
        }
        Ok(())
    }

    /// Verify that a listing belongs to the purchasing user
    async fn verify_listing_ownership(&self, user_id: Uuid, listing_id: Uuid) -> BillingResult<()> {
        let verified: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM listings WHERE id = $1 AND seller_id = $2")
                .bind(listing_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        if verified.is_none() {
            tracing::warn!(
                user_id = %user_id,
                listing_id = %listing_id,
                "Listing ownership verification failed"
            );
            return Err(BillingError::Unauthorized(
                "Listing does not belong to this user".to_string(),
            ));
        }
        Ok(())
    }

    /// Verify that a contractor profile belongs to the purchasing user
    async fn verify_contractor_ownership(
        &self,
        user_id: Uuid,
        contractor_id: Uuid,
    ) -> BillingResult<()> {
        let verified: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM contractor_profiles WHERE id = $1 AND user_id = $2")
                .bind(contractor_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        if verified.is_none() {
            tracing::warn!(
                user_id = %user_id,
                contractor_id = %contractor_id,
                "Contractor profile ownership verification failed"
            );
            return Err(BillingError::Unauthorized(
                "Contractor profile does not belong to this user".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a checkout session for a subscription track purchase.
    ///
    /// When the tier has no configured price, the purchase activates
    /// immediately instead (test mode).
    pub async fn create_subscription_checkout(
        &self,
        user_id: Uuid,
        customer_id: &str,
        kind: TrackKind,
        tier: &str,
        interval: BillingInterval,
    ) -> BillingResult<CheckoutOutcome> {
        self.verify_customer_ownership(user_id, customer_id).await?;

        let purchase_kind = purchase_kind_for(kind, tier)?;
        let price_id = self
            .stripe
            .config()
            .subscription_price_id(kind, tier, interval)?
            .map(str::to_owned);

        let Some(price_id) = price_id else {
            tracing::info!(
                user_id = %user_id,
                kind = %kind,
                tier = %tier,
                "No price configured, activating subscription directly"
            );
            self.reconcile
                .activate(user_id, purchase_kind, None, SubscriptionStatus::Active, None)
                .await?;
            return Ok(CheckoutOutcome::Activated);
        };

        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!(
            "{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}",
            base_url
        );
        let cancel_url = format!("{}/billing/cancel", base_url);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("kind".to_string(), kind.to_string());
        metadata.insert("tier".to_string(), tier.to_string());
        metadata.insert("billing_interval".to_string(), interval.as_str().to_string());
        if kind == TrackKind::VerifiedSeller {
            metadata.insert("verified_seller_tier".to_string(), tier.to_string());
        }

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            allow_promotion_codes: Some(true),
            billing_address_collection: Some(stripe::CheckoutSessionBillingAddressCollection::Auto),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            kind = %kind,
            tier = %tier,
            billing_interval = ?interval,
            "Created subscription checkout session"
        );

        Ok(CheckoutOutcome::Session(session.into()))
    }

    /// Create a checkout session for a one-time add-on purchase.
    ///
    /// A pending purchase row is created up front and tied to the session so
    /// the webhook can find it; with no price configured it activates
    /// immediately instead.
    pub async fn create_addon_checkout(
        &self,
        user_id: Uuid,
        customer_id: &str,
        addon: AddonType,
        listing_id: Option<Uuid>,
        contractor_id: Option<Uuid>,
    ) -> BillingResult<CheckoutOutcome> {
        self.verify_customer_ownership(user_id, customer_id).await?;
        if let Some(listing_id) = listing_id {
            self.verify_listing_ownership(user_id, listing_id).await?;
        }
        if let Some(contractor_id) = contractor_id {
            self.verify_contractor_ownership(user_id, contractor_id).await?;
        }

        let entry = catalog::addon_entry(addon);
        let purchase_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO addon_purchases
                (id, user_id, addon_type, status, amount_cents, listing_id, contractor_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(purchase_id)
        .bind(user_id)
        .bind(addon)
        .bind(AddonPurchaseStatus::Pending)
        .bind(entry.price_cents)
        .bind(listing_id)
        .bind(contractor_id)
        .execute(&self.pool)
        .await?;

        let price_id = self.stripe.config().addon_price_id(addon).map(str::to_owned);

        let Some(price_id) = price_id else {
            tracing::info!(
                user_id = %user_id,
                addon_type = %addon,
                "No price configured, activating add-on directly"
            );
            let Some(purchase) = self.reconcile.resolver().purchase_by_id(purchase_id).await?
            else {
                return Err(BillingError::Internal(
                    "Pending purchase row vanished before activation".to_string(),
                ));
            };
            let marker = format!("direct_{}", purchase_id);
            self.reconcile
                .activate_addon_purchase(&purchase, None, &marker)
                .await?;
            return Ok(CheckoutOutcome::Activated);
        };

        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!(
            "{}/billing/success?addon_type={}&session_id={{CHECKOUT_SESSION_ID}}",
            base_url, addon
        );
        let cancel_url = format!("{}/billing/cancel", base_url);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("addon_type".to_string(), addon.to_string());
        metadata.insert("purchase_id".to_string(), purchase_id.to_string());
        if let Some(listing_id) = listing_id {
            metadata.insert("listing_id".to_string(), listing_id.to_string());
        }

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Payment),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        sqlx::query(
            "UPDATE addon_purchases SET stripe_checkout_session_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(purchase_id)
        .bind(session.id.as_str())
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            purchase_id = %purchase_id,
            addon_type = %addon,
            "Created add-on checkout session"
        );

        Ok(CheckoutOutcome::Session(session.into()))
    }

    /// Retrieve a checkout session by ID
    pub async fn get_session(&self, session_id: &str) -> BillingResult<CheckoutSession> {
        let session_id = session_id
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid session ID: {}", e)))?;

        let session = CheckoutSession::retrieve(self.stripe.inner(), &session_id, &[]).await?;
        Ok(session)
    }
}

/// Response for creating a checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            session_id: session.id.to_string(),
            url: session.url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeyard_shared::types::{ContractorTier, SellerTier, VerifiedSellerTier};

    #[test]
    fn test_billing_interval_parsing() {
        assert_eq!(BillingInterval::from_str("monthly"), Some(BillingInterval::Monthly));
        assert_eq!(BillingInterval::from_str("YEARLY"), Some(BillingInterval::Annual));
        assert_eq!(BillingInterval::from_str("weekly"), None);
    }

    #[test]
    fn test_purchase_kind_parsing() {
        assert_eq!(
            purchase_kind_for(TrackKind::Seller, "pro").ok(),
            Some(PurchaseKind::Seller(SellerTier::Pro))
        );
        assert_eq!(
            purchase_kind_for(TrackKind::Contractor, "featured").ok(),
            Some(PurchaseKind::Contractor(ContractorTier::Featured))
        );
        assert_eq!(
            purchase_kind_for(TrackKind::VerifiedSeller, "priority").ok(),
            Some(PurchaseKind::VerifiedSeller(VerifiedSellerTier::Priority))
        );
    }

    #[test]
    fn test_purchase_kind_rejects_cross_track_tier() {
        let err = purchase_kind_for(TrackKind::Seller, "featured").unwrap_err();
        assert!(matches!(err, BillingError::InvalidTier(_)));
    }
}
