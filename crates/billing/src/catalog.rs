//! Pricing and tier catalog
//!
//! Static lookup tables for tier pricing, listing limits, and feature flags.
//! Pure data, no I/O; the checkout and reconciliation paths read from here.

use tradeyard_shared::types::{AddonType, ContractorTier, SellerTier, VerifiedSellerTier};

/// Catalog entry for a purchasable tier or add-on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Display name for checkout line items
    pub display_name: &'static str,
    /// Monthly price in cents (0 = free / included)
    pub price_cents: i64,
    /// Entitlement window in days (None = does not expire on its own)
    pub duration_days: Option<i64>,
}

/// Feature flags granted by a seller tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellerFeatures {
    pub max_active_listings: u32,
    pub listing_analytics: bool,
    pub bulk_upload: bool,
}

/// Catalog entry for a seller tier
pub fn seller_entry(tier: SellerTier) -> CatalogEntry {
    match tier {
        SellerTier::Buyer => CatalogEntry {
            display_name: "Buyer",
            price_cents: 0,
            duration_days: None,
        },
        SellerTier::Basic => CatalogEntry {
            display_name: "Basic Seller",
            price_cents: 9_99,
            duration_days: None,
        },
        SellerTier::Plus => CatalogEntry {
            display_name: "Plus Seller",
            price_cents: 24_99,
            duration_days: None,
        },
        SellerTier::Pro => CatalogEntry {
            display_name: "Pro Seller",
            price_cents: 49_99,
            duration_days: None,
        },
    }
}

/// Feature flags for a seller tier
pub fn seller_features(tier: SellerTier) -> SellerFeatures {
    match tier {
        SellerTier::Buyer => SellerFeatures {
            max_active_listings: 0,
            listing_analytics: false,
            bulk_upload: false,
        },
        SellerTier::Basic => SellerFeatures {
            max_active_listings: 5,
            listing_analytics: false,
            bulk_upload: false,
        },
        SellerTier::Plus => SellerFeatures {
            max_active_listings: 25,
            listing_analytics: true,
            bulk_upload: false,
        },
        SellerTier::Pro => SellerFeatures {
            max_active_listings: u32::MAX,
            listing_analytics: true,
            bulk_upload: true,
        },
    }
}

/// Catalog entry for a contractor visibility tier.
/// The badge that comes with any paid contractor tier runs for one year.
pub fn contractor_entry(tier: ContractorTier) -> CatalogEntry {
    match tier {
        ContractorTier::None => CatalogEntry {
            display_name: "Unlisted",
            price_cents: 0,
            duration_days: None,
        },
        ContractorTier::Verified => CatalogEntry {
            display_name: "Verified Contractor",
            price_cents: 29_99,
            duration_days: Some(365),
        },
        ContractorTier::Featured => CatalogEntry {
            display_name: "Featured Contractor",
            price_cents: 59_99,
            duration_days: Some(365),
        },
        ContractorTier::Priority => CatalogEntry {
            display_name: "Priority Contractor",
            price_cents: 99_99,
            duration_days: Some(365),
        },
    }
}

/// Catalog entry for a verified-seller tier
pub fn verified_seller_entry(tier: VerifiedSellerTier) -> CatalogEntry {
    match tier {
        VerifiedSellerTier::Standard => CatalogEntry {
            display_name: "Seller Verification",
            price_cents: 19_99,
            duration_days: Some(365),
        },
        VerifiedSellerTier::Priority => CatalogEntry {
            display_name: "Priority Seller Verification",
            price_cents: 39_99,
            duration_days: Some(365),
        },
    }
}

/// Catalog entry for a listing add-on
pub fn addon_entry(addon: AddonType) -> CatalogEntry {
    match addon {
        AddonType::Featured => CatalogEntry {
            display_name: "Featured Listing",
            price_cents: 9_99,
            duration_days: Some(30),
        },
        AddonType::Premium => CatalogEntry {
            display_name: "Premium Listing",
            price_cents: 19_99,
            duration_days: Some(30),
        },
        AddonType::Elite => CatalogEntry {
            display_name: "Elite Listing",
            price_cents: 34_99,
            duration_days: Some(30),
        },
        AddonType::AiEnhancement => CatalogEntry {
            display_name: "AI Listing Enhancement",
            price_cents: 4_99,
            duration_days: None,
        },
        AddonType::SpecSheet => CatalogEntry {
            display_name: "Spec Sheet",
            price_cents: 2_99,
            duration_days: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_boxed_addons_have_durations() {
        assert_eq!(addon_entry(AddonType::Featured).duration_days, Some(30));
        assert_eq!(addon_entry(AddonType::Elite).duration_days, Some(30));
        assert_eq!(addon_entry(AddonType::AiEnhancement).duration_days, None);
        assert_eq!(addon_entry(AddonType::SpecSheet).duration_days, None);
    }

    #[test]
    fn test_addon_prices_follow_hierarchy() {
        assert!(
            addon_entry(AddonType::Elite).price_cents > addon_entry(AddonType::Premium).price_cents
        );
        assert!(
            addon_entry(AddonType::Premium).price_cents
                > addon_entry(AddonType::Featured).price_cents
        );
    }

    #[test]
    fn test_buyer_tier_is_free_with_no_listings() {
        assert_eq!(seller_entry(SellerTier::Buyer).price_cents, 0);
        assert_eq!(seller_features(SellerTier::Buyer).max_active_listings, 0);
    }

    #[test]
    fn test_contractor_badges_run_one_year() {
        for tier in [
            ContractorTier::Verified,
            ContractorTier::Featured,
            ContractorTier::Priority,
        ] {
            assert_eq!(contractor_entry(tier).duration_days, Some(365));
        }
    }
}
