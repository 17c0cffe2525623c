//! Entitlement mapping
//!
//! Pure translation from a purchase or lifecycle event to the field
//! assignments it implies across the affected records. Persistence lives in
//! the reconciliation orchestrator; keeping the mapping side-effect free is
//! what makes these rules independently testable.

use serde::Serialize;
use time::OffsetDateTime;
use tradeyard_shared::types::{
    AddonType, ContractorTier, SellerTier, SubscriptionStatus, TrackKind, VerificationStatus,
    VerifiedSellerTier,
};

use crate::expiration::{expiration_for, ExpiringGrant};

/// What was purchased
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseKind {
    Seller(SellerTier),
    Contractor(ContractorTier),
    VerifiedSeller(VerifiedSellerTier),
    Addon(AddonType),
}

impl PurchaseKind {
    /// The subscription track this purchase belongs to (add-ons have none)
    pub fn track_kind(&self) -> Option<TrackKind> {
        match self {
            PurchaseKind::Seller(_) => Some(TrackKind::Seller),
            PurchaseKind::Contractor(_) => Some(TrackKind::Contractor),
            PurchaseKind::VerifiedSeller(_) => Some(TrackKind::VerifiedSeller),
            PurchaseKind::Addon(_) => None,
        }
    }
}

/// Capability flags to grant on the user record.
///
/// There are deliberately no revoke fields: capabilities are monotonic, so no
/// mapping output can ever clear one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserAssignments {
    pub grant_seller: bool,
    pub grant_contractor: bool,
}

/// Assignment to the subject's subscription track row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackAssignment {
    pub kind: TrackKind,
    /// Tier serialized per track kind (seller/contractor/verified-seller vocabulary)
    pub tier: String,
    pub status: SubscriptionStatus,
    pub external_id: Option<String>,
}

/// Fan-out onto the contractor profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractorProfileAssignments {
    pub verification_status: VerificationStatus,
    pub verified_badge_purchased: bool,
    pub verified_at: Option<OffsetDateTime>,
    pub verified_badge_expires_at: Option<OffsetDateTime>,
    pub visibility_tier: ContractorTier,
    pub visibility_subscription_status: SubscriptionStatus,
}

/// Assignment to the seller verification record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationAssignments {
    pub status: VerificationStatus,
    pub tier: VerifiedSellerTier,
    pub badge_active: bool,
    pub badge_expires_at: Option<OffsetDateTime>,
    pub ranking_boost_expires_at: Option<OffsetDateTime>,
}

/// Add-on flags to set on a listing's premium_addons map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingFlagSet {
    /// Full cascade set for the purchased add-on
    pub flags: Vec<AddonType>,
    pub expires_at: Option<OffsetDateTime>,
}

/// Complete set of field assignments implied by one event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntitlementUpdate {
    pub user: UserAssignments,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackAssignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contractor_profile: Option<ContractorProfileAssignments>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationAssignments>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_flags: Option<ListingFlagSet>,
}

/// Flags implied by an add-on purchase: a higher visibility tier is a strict
/// superset of the tiers below it; one-time flags stand alone.
pub fn cascade_set(addon: AddonType) -> &'static [AddonType] {
    match addon {
        AddonType::Featured => &[AddonType::Featured],
        AddonType::Premium => &[AddonType::Premium, AddonType::Featured],
        AddonType::Elite => &[AddonType::Elite, AddonType::Premium, AddonType::Featured],
        AddonType::AiEnhancement => &[AddonType::AiEnhancement],
        AddonType::SpecSheet => &[AddonType::SpecSheet],
    }
}

/// Map a completed purchase to its activation assignments.
///
/// `status` is the subscription status discovered at activation time
/// (normally `Active`, but a trialing or incomplete checkout carries through).
pub fn activation(
    kind: PurchaseKind,
    external_id: Option<&str>,
    status: SubscriptionStatus,
    now: OffsetDateTime,
) -> EntitlementUpdate {
    let external_id = external_id.map(str::to_owned);
    match kind {
        PurchaseKind::Seller(tier) => EntitlementUpdate {
            user: UserAssignments {
                grant_seller: true,
                ..Default::default()
            },
            track: Some(TrackAssignment {
                kind: TrackKind::Seller,
                tier: tier.to_string(),
                status,
                external_id,
            }),
            ..Default::default()
        },
        PurchaseKind::Contractor(tier) => {
            // Contractor verification is a superset of seller access: one
            // purchase fans out across the user and the contractor profile.
            let badge_expires_at = expiration_for(ExpiringGrant::Badge, now);
            EntitlementUpdate {
                user: UserAssignments {
                    grant_seller: true,
                    grant_contractor: true,
                },
                track: Some(TrackAssignment {
                    kind: TrackKind::Contractor,
                    tier: tier.to_string(),
                    status,
                    external_id,
                }),
                contractor_profile: Some(ContractorProfileAssignments {
                    verification_status: VerificationStatus::Verified,
                    verified_badge_purchased: true,
                    verified_at: Some(now),
                    verified_badge_expires_at: badge_expires_at,
                    visibility_tier: tier,
                    visibility_subscription_status: status,
                }),
                ..Default::default()
            }
        }
        PurchaseKind::VerifiedSeller(tier) => {
            let badge_expires_at = expiration_for(ExpiringGrant::Badge, now);
            let verification = match tier {
                // Standard waits on asynchronous AI review; no badge yet
                VerifiedSellerTier::Standard => VerificationAssignments {
                    status: VerificationStatus::PendingAi,
                    tier,
                    badge_active: false,
                    badge_expires_at,
                    ranking_boost_expires_at: None,
                },
                // Priority activates immediately with a short ranking boost
                VerifiedSellerTier::Priority => VerificationAssignments {
                    status: VerificationStatus::Verified,
                    tier,
                    badge_active: true,
                    badge_expires_at,
                    ranking_boost_expires_at: expiration_for(ExpiringGrant::RankingBoost, now),
                },
            };
            EntitlementUpdate {
                track: Some(TrackAssignment {
                    kind: TrackKind::VerifiedSeller,
                    tier: tier.to_string(),
                    status,
                    external_id,
                }),
                verification: Some(verification),
                ..Default::default()
            }
        }
        PurchaseKind::Addon(addon) => EntitlementUpdate {
            listing_flags: Some(ListingFlagSet {
                flags: cascade_set(addon).to_vec(),
                expires_at: expiration_for(ExpiringGrant::ListingAddon(addon), now),
            }),
            ..Default::default()
        },
    }
}

/// Map a terminal subscription deletion to its assignments.
///
/// Seller: degrade to the buyer floor, capability untouched. Contractor:
/// hard-gate to invisible and clear the badge. Verified-seller: badge off
/// immediately, no grace period.
pub fn cancellation(kind: TrackKind) -> EntitlementUpdate {
    match kind {
        TrackKind::Seller => EntitlementUpdate {
            track: Some(TrackAssignment {
                kind: TrackKind::Seller,
                tier: SellerTier::Buyer.to_string(),
                status: SubscriptionStatus::Canceled,
                external_id: None,
            }),
            ..Default::default()
        },
        TrackKind::Contractor => EntitlementUpdate {
            track: Some(TrackAssignment {
                kind: TrackKind::Contractor,
                tier: ContractorTier::None.to_string(),
                status: SubscriptionStatus::Canceled,
                external_id: None,
            }),
            contractor_profile: Some(ContractorProfileAssignments {
                verification_status: VerificationStatus::Revoked,
                verified_badge_purchased: false,
                verified_at: None,
                verified_badge_expires_at: None,
                visibility_tier: ContractorTier::None,
                visibility_subscription_status: SubscriptionStatus::Canceled,
            }),
            ..Default::default()
        },
        TrackKind::VerifiedSeller => EntitlementUpdate {
            track: Some(TrackAssignment {
                kind: TrackKind::VerifiedSeller,
                tier: VerifiedSellerTier::Standard.to_string(),
                status: SubscriptionStatus::Canceled,
                external_id: None,
            }),
            verification: Some(VerificationAssignments {
                status: VerificationStatus::Revoked,
                tier: VerifiedSellerTier::Standard,
                badge_active: false,
                badge_expires_at: None,
                ranking_boost_expires_at: None,
            }),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-05-10 09:00 UTC);

    #[test]
    fn test_seller_activation_sets_tier_and_capability() {
        let update = activation(
            PurchaseKind::Seller(SellerTier::Plus),
            Some("sub_123"),
            SubscriptionStatus::Active,
            NOW,
        );
        assert!(update.user.grant_seller);
        assert!(!update.user.grant_contractor);
        let track = update.track.unwrap();
        assert_eq!(track.kind, TrackKind::Seller);
        assert_eq!(track.tier, "plus");
        assert_eq!(track.status, SubscriptionStatus::Active);
        assert_eq!(track.external_id.as_deref(), Some("sub_123"));
        assert!(update.contractor_profile.is_none());
    }

    #[test]
    fn test_contractor_activation_fans_out_to_profile() {
        let update = activation(
            PurchaseKind::Contractor(ContractorTier::Verified),
            Some("sub_c1"),
            SubscriptionStatus::Active,
            NOW,
        );
        assert!(update.user.grant_contractor);
        let profile = update.contractor_profile.unwrap();
        assert_eq!(profile.verification_status, VerificationStatus::Verified);
        assert!(profile.verified_badge_purchased);
        assert_eq!(profile.verified_at, Some(NOW));
        // Badge runs exactly one year from activation
        assert_eq!(
            profile.verified_badge_expires_at,
            Some(datetime!(2026-05-10 09:00 UTC))
        );
        assert_eq!(profile.visibility_tier, ContractorTier::Verified);
    }

    #[test]
    fn test_addon_cascade_is_strict_superset() {
        assert_eq!(cascade_set(AddonType::Featured), &[AddonType::Featured]);
        assert_eq!(
            cascade_set(AddonType::Premium),
            &[AddonType::Premium, AddonType::Featured]
        );
        assert_eq!(
            cascade_set(AddonType::Elite),
            &[AddonType::Elite, AddonType::Premium, AddonType::Featured]
        );
    }

    #[test]
    fn test_one_time_addons_do_not_cascade_or_expire() {
        for addon in [AddonType::AiEnhancement, AddonType::SpecSheet] {
            assert_eq!(cascade_set(addon), &[addon]);
            let update = activation(
                PurchaseKind::Addon(addon),
                None,
                SubscriptionStatus::Active,
                NOW,
            );
            assert_eq!(update.listing_flags.unwrap().expires_at, None);
        }
    }

    #[test]
    fn test_addon_flags_share_one_expiration() {
        let update = activation(
            PurchaseKind::Addon(AddonType::Elite),
            None,
            SubscriptionStatus::Active,
            NOW,
        );
        let flags = update.listing_flags.unwrap();
        assert_eq!(flags.flags.len(), 3);
        assert_eq!(flags.expires_at, Some(datetime!(2025-06-09 09:00 UTC)));
    }

    #[test]
    fn test_standard_verification_waits_on_ai_review() {
        let update = activation(
            PurchaseKind::VerifiedSeller(VerifiedSellerTier::Standard),
            Some("sub_v1"),
            SubscriptionStatus::Active,
            NOW,
        );
        let v = update.verification.unwrap();
        assert_eq!(v.status, VerificationStatus::PendingAi);
        assert!(!v.badge_active);
        assert_eq!(v.ranking_boost_expires_at, None);
        assert_eq!(v.badge_expires_at, Some(datetime!(2026-05-10 09:00 UTC)));
    }

    #[test]
    fn test_priority_verification_activates_immediately_with_boost() {
        let update = activation(
            PurchaseKind::VerifiedSeller(VerifiedSellerTier::Priority),
            Some("sub_v2"),
            SubscriptionStatus::Active,
            NOW,
        );
        let v = update.verification.unwrap();
        assert_eq!(v.status, VerificationStatus::Verified);
        assert!(v.badge_active);
        // Ranking boost is exactly three days out
        assert_eq!(
            v.ranking_boost_expires_at,
            Some(datetime!(2025-05-13 09:00 UTC))
        );
    }

    #[test]
    fn test_seller_cancellation_degrades_to_buyer() {
        let update = cancellation(TrackKind::Seller);
        let track = update.track.unwrap();
        assert_eq!(track.tier, "buyer");
        assert_eq!(track.status, SubscriptionStatus::Canceled);
        // Capability flags stay untouched
        assert_eq!(update.user, UserAssignments::default());
    }

    #[test]
    fn test_contractor_cancellation_hard_gates_to_invisible() {
        let update = cancellation(TrackKind::Contractor);
        let track = update.track.unwrap();
        assert_eq!(track.tier, "none");
        let profile = update.contractor_profile.unwrap();
        assert_eq!(profile.visibility_tier, ContractorTier::None);
        assert!(!profile.verified_badge_purchased);
        assert_eq!(profile.verified_badge_expires_at, None);
        // Canceled means invisible, but the capability flag is never revoked
        assert!(!update.user.grant_contractor);
        assert_eq!(update.user, UserAssignments::default());
    }

    #[test]
    fn test_verified_seller_cancellation_disables_badge_immediately() {
        let update = cancellation(TrackKind::VerifiedSeller);
        let v = update.verification.unwrap();
        assert!(!v.badge_active);
        assert_eq!(v.status, VerificationStatus::Revoked);
        assert_eq!(v.badge_expires_at, None);
    }

    #[test]
    fn test_no_mapping_output_can_revoke_a_capability() {
        // UserAssignments only carries grant flags; every cancellation path
        // leaves them at their defaults.
        for kind in [
            TrackKind::Seller,
            TrackKind::Contractor,
            TrackKind::VerifiedSeller,
        ] {
            assert_eq!(cancellation(kind).user, UserAssignments::default());
        }
    }

    #[test]
    fn test_activation_carries_discovered_status() {
        let update = activation(
            PurchaseKind::Seller(SellerTier::Pro),
            Some("sub_t"),
            SubscriptionStatus::Trialing,
            NOW,
        );
        assert_eq!(update.track.unwrap().status, SubscriptionStatus::Trialing);
    }
}
