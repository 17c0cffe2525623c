//! Stripe client configuration

use stripe::Client;
use tradeyard_shared::types::{AddonType, ContractorTier, SellerTier, TrackKind, VerifiedSellerTier};

use crate::checkout::BillingInterval;
use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Price IDs for subscription tiers and add-ons
    pub price_ids: PriceIds,
    /// Base URL for success/cancel redirects
    pub app_base_url: String,
}

/// Stripe price IDs for subscription tiers and add-ons.
///
/// Every price is optional: a tier or add-on with no configured price
/// activates immediately in test mode instead of going through checkout.
#[derive(Debug, Clone, Default)]
pub struct PriceIds {
    // Seller tiers (monthly)
    pub seller_basic: Option<String>,
    pub seller_plus: Option<String>,
    pub seller_pro: Option<String>,

    // Seller tiers (annual)
    pub seller_plus_annual: Option<String>,
    pub seller_pro_annual: Option<String>,

    // Contractor visibility tiers
    pub contractor_verified: Option<String>,
    pub contractor_featured: Option<String>,
    pub contractor_priority: Option<String>,

    // Verified-seller program
    pub verified_seller_standard: Option<String>,
    pub verified_seller_priority: Option<String>,

    // Listing add-ons
    pub addon_featured: Option<String>,
    pub addon_premium: Option<String>,
    pub addon_elite: Option<String>,
    pub addon_ai_enhancement: Option<String>,
    pub addon_spec_sheet: Option<String>,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
            price_ids: PriceIds {
                seller_basic: std::env::var("STRIPE_PRICE_SELLER_BASIC").ok(),
                seller_plus: std::env::var("STRIPE_PRICE_SELLER_PLUS").ok(),
                seller_pro: std::env::var("STRIPE_PRICE_SELLER_PRO").ok(),

                seller_plus_annual: std::env::var("STRIPE_PRICE_SELLER_PLUS_ANNUAL").ok(),
                seller_pro_annual: std::env::var("STRIPE_PRICE_SELLER_PRO_ANNUAL").ok(),

                contractor_verified: std::env::var("STRIPE_PRICE_CONTRACTOR_VERIFIED").ok(),
                contractor_featured: std::env::var("STRIPE_PRICE_CONTRACTOR_FEATURED").ok(),
                contractor_priority: std::env::var("STRIPE_PRICE_CONTRACTOR_PRIORITY").ok(),

                verified_seller_standard: std::env::var("STRIPE_PRICE_VERIFIED_SELLER_STANDARD")
                    .ok(),
                verified_seller_priority: std::env::var("STRIPE_PRICE_VERIFIED_SELLER_PRIORITY")
                    .ok(),

                addon_featured: std::env::var("STRIPE_PRICE_ADDON_FEATURED").ok(),
                addon_premium: std::env::var("STRIPE_PRICE_ADDON_PREMIUM").ok(),
                addon_elite: std::env::var("STRIPE_PRICE_ADDON_ELITE").ok(),
                addon_ai_enhancement: std::env::var("STRIPE_PRICE_ADDON_AI_ENHANCEMENT").ok(),
                addon_spec_sheet: std::env::var("STRIPE_PRICE_ADDON_SPEC_SHEET").ok(),
            },
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Price ID for a seller tier
    pub fn seller_price_id(&self, tier: SellerTier, interval: BillingInterval) -> Option<&str> {
        match (tier, interval) {
            (SellerTier::Basic, BillingInterval::Monthly) => self.price_ids.seller_basic.as_deref(),
            (SellerTier::Plus, BillingInterval::Monthly) => self.price_ids.seller_plus.as_deref(),
            (SellerTier::Pro, BillingInterval::Monthly) => self.price_ids.seller_pro.as_deref(),
            (SellerTier::Plus, BillingInterval::Annual) => {
                self.price_ids.seller_plus_annual.as_deref()
            }
            (SellerTier::Pro, BillingInterval::Annual) => {
                self.price_ids.seller_pro_annual.as_deref()
            }
            // Buyer is free; Basic has no annual option
            _ => None,
        }
    }

    /// Price ID for a contractor visibility tier
    pub fn contractor_price_id(&self, tier: ContractorTier) -> Option<&str> {
        match tier {
            ContractorTier::Verified => self.price_ids.contractor_verified.as_deref(),
            ContractorTier::Featured => self.price_ids.contractor_featured.as_deref(),
            ContractorTier::Priority => self.price_ids.contractor_priority.as_deref(),
            ContractorTier::None => None,
        }
    }

    /// Price ID for a verified-seller tier
    pub fn verified_seller_price_id(&self, tier: VerifiedSellerTier) -> Option<&str> {
        match tier {
            VerifiedSellerTier::Standard => self.price_ids.verified_seller_standard.as_deref(),
            VerifiedSellerTier::Priority => self.price_ids.verified_seller_priority.as_deref(),
        }
    }

    /// Price ID for an add-on type
    pub fn addon_price_id(&self, addon: AddonType) -> Option<&str> {
        match addon {
            AddonType::Featured => self.price_ids.addon_featured.as_deref(),
            AddonType::Premium => self.price_ids.addon_premium.as_deref(),
            AddonType::Elite => self.price_ids.addon_elite.as_deref(),
            AddonType::AiEnhancement => self.price_ids.addon_ai_enhancement.as_deref(),
            AddonType::SpecSheet => self.price_ids.addon_spec_sheet.as_deref(),
        }
    }

    /// Resolve a subscription price ID from a track kind and tier string
    pub fn subscription_price_id(
        &self,
        kind: TrackKind,
        tier: &str,
        interval: BillingInterval,
    ) -> BillingResult<Option<&str>> {
        match kind {
            TrackKind::Seller => {
                let tier: SellerTier = tier
                    .parse()
                    .map_err(|_| BillingError::InvalidTier(tier.to_string()))?;
                Ok(self.seller_price_id(tier, interval))
            }
            TrackKind::Contractor => {
                let tier: ContractorTier = tier
                    .parse()
                    .map_err(|_| BillingError::InvalidTier(tier.to_string()))?;
                Ok(self.contractor_price_id(tier))
            }
            TrackKind::VerifiedSeller => {
                let tier: VerifiedSellerTier = tier
                    .parse()
                    .map_err(|_| BillingError::InvalidTier(tier.to_string()))?;
                Ok(self.verified_seller_price_id(tier))
            }
        }
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_prices() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_x".to_string(),
            webhook_secret: "whsec_x".to_string(),
            price_ids: PriceIds {
                seller_plus: Some("price_plus".to_string()),
                seller_pro_annual: Some("price_pro_a".to_string()),
                contractor_verified: Some("price_cv".to_string()),
                addon_elite: Some("price_elite".to_string()),
                ..Default::default()
            },
            app_base_url: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn test_seller_price_lookup() {
        let config = config_with_prices();
        assert_eq!(
            config.seller_price_id(SellerTier::Plus, BillingInterval::Monthly),
            Some("price_plus")
        );
        assert_eq!(
            config.seller_price_id(SellerTier::Pro, BillingInterval::Annual),
            Some("price_pro_a")
        );
        // Unconfigured prices mean test-mode activation, not an error
        assert_eq!(
            config.seller_price_id(SellerTier::Basic, BillingInterval::Monthly),
            None
        );
    }

    #[test]
    fn test_subscription_price_rejects_unknown_tier() {
        let config = config_with_prices();
        let err = config
            .subscription_price_id(TrackKind::Seller, "platinum", BillingInterval::Monthly)
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidTier(_)));
    }

    #[test]
    fn test_contractor_none_has_no_price() {
        let config = config_with_prices();
        assert_eq!(config.contractor_price_id(ContractorTier::None), None);
    }
}
