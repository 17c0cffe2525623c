//! Expiration calculation for time-boxed entitlements
//!
//! Every activation computes a fresh window from `now`. Repurchasing before
//! expiry resets the window rather than extending it.

use time::{Duration, OffsetDateTime};
use tradeyard_shared::types::AddonType;

/// Days a listing visibility add-on stays active
pub const LISTING_ADDON_DAYS: i64 = 30;
/// Days a verification badge stays valid
pub const BADGE_DAYS: i64 = 365;
/// Days a priority-verification ranking boost lasts
pub const RANKING_BOOST_DAYS: i64 = 3;

/// A grant with a fixed entitlement window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiringGrant {
    /// Listing add-on; one-time flags (ai_enhancement, spec_sheet) never expire
    ListingAddon(AddonType),
    /// Verified-seller or contractor badge
    Badge,
    /// Search ranking boost granted with priority verification
    RankingBoost,
}

/// Compute the expiration timestamp for a grant activated at `now`.
/// Pure function of its inputs.
pub fn expiration_for(grant: ExpiringGrant, now: OffsetDateTime) -> Option<OffsetDateTime> {
    match grant {
        ExpiringGrant::ListingAddon(addon) if addon.is_time_boxed() => {
            Some(now + Duration::days(LISTING_ADDON_DAYS))
        }
        ExpiringGrant::ListingAddon(_) => None,
        ExpiringGrant::Badge => Some(now + Duration::days(BADGE_DAYS)),
        ExpiringGrant::RankingBoost => Some(now + Duration::days(RANKING_BOOST_DAYS)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_visibility_addons_expire_in_30_days() {
        let now = datetime!(2025-03-01 12:00 UTC);
        for addon in [AddonType::Featured, AddonType::Premium, AddonType::Elite] {
            assert_eq!(
                expiration_for(ExpiringGrant::ListingAddon(addon), now),
                Some(datetime!(2025-03-31 12:00 UTC))
            );
        }
    }

    #[test]
    fn test_one_time_flags_never_expire() {
        let now = datetime!(2025-03-01 12:00 UTC);
        assert_eq!(
            expiration_for(ExpiringGrant::ListingAddon(AddonType::AiEnhancement), now),
            None
        );
        assert_eq!(
            expiration_for(ExpiringGrant::ListingAddon(AddonType::SpecSheet), now),
            None
        );
    }

    #[test]
    fn test_badge_runs_one_year() {
        let now = datetime!(2025-03-01 12:00 UTC);
        assert_eq!(
            expiration_for(ExpiringGrant::Badge, now),
            Some(datetime!(2026-03-01 12:00 UTC))
        );
    }

    #[test]
    fn test_ranking_boost_is_three_days() {
        let now = datetime!(2025-03-01 12:00 UTC);
        assert_eq!(
            expiration_for(ExpiringGrant::RankingBoost, now),
            Some(datetime!(2025-03-04 12:00 UTC))
        );
    }

    #[test]
    fn test_deterministic() {
        let now = datetime!(2025-06-15 08:30 UTC);
        let a = expiration_for(ExpiringGrant::ListingAddon(AddonType::Elite), now);
        let b = expiration_for(ExpiringGrant::ListingAddon(AddonType::Elite), now);
        assert_eq!(a, b);
    }
}
