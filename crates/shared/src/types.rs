//! Common types used across Tradeyard

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Listing ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub Uuid);

impl ListingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListingId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ListingId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Add-on purchase ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddonPurchaseId(pub Uuid);

impl AddonPurchaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AddonPurchaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AddonPurchaseId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AddonPurchaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Entitlement tracks
// =============================================================================

/// Which entitlement track a subscription belongs to.
///
/// Each user carries at most one subscription per track; the track kind plus
/// the external subscription id fully identify "which subscription is this"
/// during webhook lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Seller,
    Contractor,
    VerifiedSeller,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Seller => write!(f, "seller"),
            TrackKind::Contractor => write!(f, "contractor"),
            TrackKind::VerifiedSeller => write!(f, "verified_seller"),
        }
    }
}

impl std::str::FromStr for TrackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seller" => Ok(Self::Seller),
            "contractor" => Ok(Self::Contractor),
            "verified_seller" | "verified-seller" => Ok(Self::VerifiedSeller),
            other => Err(format!("unknown track kind: {}", other)),
        }
    }
}

/// Seller subscription tier.
///
/// `Buyer` is the floor every cancelled seller lands on; it still keeps the
/// seller capability flag that was set when the subscription first activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SellerTier {
    Buyer,
    Basic,
    Plus,
    Pro,
}

impl Default for SellerTier {
    fn default() -> Self {
        Self::Buyer
    }
}

impl std::fmt::Display for SellerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SellerTier::Buyer => write!(f, "buyer"),
            SellerTier::Basic => write!(f, "basic"),
            SellerTier::Plus => write!(f, "plus"),
            SellerTier::Pro => write!(f, "pro"),
        }
    }
}

impl std::str::FromStr for SellerTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Self::Buyer),
            "basic" => Ok(Self::Basic),
            "plus" => Ok(Self::Plus),
            "pro" => Ok(Self::Pro),
            other => Err(format!("unknown seller tier: {}", other)),
        }
    }
}

/// Contractor visibility tier.
///
/// `None` means the contractor is invisible in search: cancellation
/// hard-gates to it (stronger than the seller downgrade-to-buyer path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContractorTier {
    None,
    Verified,
    Featured,
    Priority,
}

impl Default for ContractorTier {
    fn default() -> Self {
        Self::None
    }
}

impl std::fmt::Display for ContractorTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractorTier::None => write!(f, "none"),
            ContractorTier::Verified => write!(f, "verified"),
            ContractorTier::Featured => write!(f, "featured"),
            ContractorTier::Priority => write!(f, "priority"),
        }
    }
}

impl std::str::FromStr for ContractorTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "verified" => Ok(Self::Verified),
            "featured" => Ok(Self::Featured),
            "priority" => Ok(Self::Priority),
            other => Err(format!("unknown contractor tier: {}", other)),
        }
    }
}

/// Verified-seller program tier.
///
/// `Standard` submissions wait for asynchronous AI review before the badge
/// activates; `Priority` activates immediately and adds a short ranking boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VerifiedSellerTier {
    Standard,
    Priority,
}

impl std::fmt::Display for VerifiedSellerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifiedSellerTier::Standard => write!(f, "standard"),
            VerifiedSellerTier::Priority => write!(f, "priority"),
        }
    }
}

impl std::str::FromStr for VerifiedSellerTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "priority" => Ok(Self::Priority),
            other => Err(format!("unknown verified-seller tier: {}", other)),
        }
    }
}

// =============================================================================
// Add-ons
// =============================================================================

/// Listing and contractor add-on types.
///
/// `Featured`/`Premium`/`Elite` form a strict visibility hierarchy and are
/// time-boxed. `AiEnhancement` and `SpecSheet` are one-time boolean flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AddonType {
    Featured,
    Premium,
    Elite,
    AiEnhancement,
    SpecSheet,
}

impl AddonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddonType::Featured => "featured",
            AddonType::Premium => "premium",
            AddonType::Elite => "elite",
            AddonType::AiEnhancement => "ai_enhancement",
            AddonType::SpecSheet => "spec_sheet",
        }
    }

    /// Whether this add-on expires (visibility tiers do, one-time flags don't)
    pub fn is_time_boxed(&self) -> bool {
        matches!(self, Self::Featured | Self::Premium | Self::Elite)
    }
}

impl std::fmt::Display for AddonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AddonType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "featured" => Ok(Self::Featured),
            "premium" => Ok(Self::Premium),
            "elite" => Ok(Self::Elite),
            "ai_enhancement" | "ai-enhancement" => Ok(Self::AiEnhancement),
            "spec_sheet" | "spec-sheet" => Ok(Self::SpecSheet),
            other => Err(format!("unknown add-on type: {}", other)),
        }
    }
}

/// Lifecycle of an add-on purchase record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AddonPurchaseStatus {
    Pending,
    Active,
    Cancelled,
    Expired,
}

impl std::fmt::Display for AddonPurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddonPurchaseStatus::Pending => write!(f, "pending"),
            AddonPurchaseStatus::Active => write!(f, "active"),
            AddonPurchaseStatus::Cancelled => write!(f, "cancelled"),
            AddonPurchaseStatus::Expired => write!(f, "expired"),
        }
    }
}

// =============================================================================
// Subscription status
// =============================================================================

/// Closed internal subscription status vocabulary.
///
/// Provider statuses map into this enum; anything unrecognized becomes
/// `Unknown` and is surfaced for manual review rather than treated as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
    Unknown,
}

impl SubscriptionStatus {
    /// Map the payment provider's status vocabulary into the internal enum
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "unpaid" => Self::Unpaid,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "paused" => Self::Paused,
            _ => Self::Unknown,
        }
    }

    /// Whether the subscription currently grants its entitlements
    pub fn grants_access(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing | Self::PastDue)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Trialing => write!(f, "trialing"),
            SubscriptionStatus::PastDue => write!(f, "past_due"),
            SubscriptionStatus::Canceled => write!(f, "canceled"),
            SubscriptionStatus::Unpaid => write!(f, "unpaid"),
            SubscriptionStatus::Incomplete => write!(f, "incomplete"),
            SubscriptionStatus::IncompleteExpired => write!(f, "incomplete_expired"),
            SubscriptionStatus::Paused => write!(f, "paused"),
            SubscriptionStatus::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Seller verification
// =============================================================================

/// Status of a seller verification submission.
///
/// pending → pending_ai → verified | rejected; verified badges can expire
/// or be revoked when the backing subscription ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    PendingAi,
    Verified,
    Rejected,
    Expired,
    Revoked,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Pending => write!(f, "pending"),
            VerificationStatus::PendingAi => write!(f, "pending_ai"),
            VerificationStatus::Verified => write!(f, "verified"),
            VerificationStatus::Rejected => write!(f, "rejected"),
            VerificationStatus::Expired => write!(f, "expired"),
            VerificationStatus::Revoked => write!(f, "revoked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(
            SubscriptionStatus::from_provider("active"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_provider("past_due"),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            SubscriptionStatus::from_provider("incomplete_expired"),
            SubscriptionStatus::IncompleteExpired
        );
    }

    #[test]
    fn test_unrecognized_provider_status_is_unknown_not_active() {
        let status = SubscriptionStatus::from_provider("some_future_status");
        assert_eq!(status, SubscriptionStatus::Unknown);
        assert!(!status.grants_access());
    }

    #[test]
    fn test_past_due_still_grants_access() {
        assert!(SubscriptionStatus::PastDue.grants_access());
        assert!(!SubscriptionStatus::Canceled.grants_access());
        assert!(!SubscriptionStatus::Unpaid.grants_access());
    }

    #[test]
    fn test_tier_round_trips() {
        for tier in [
            SellerTier::Buyer,
            SellerTier::Basic,
            SellerTier::Plus,
            SellerTier::Pro,
        ] {
            assert_eq!(SellerTier::from_str(&tier.to_string()).unwrap(), tier);
        }
        for tier in [
            ContractorTier::None,
            ContractorTier::Verified,
            ContractorTier::Featured,
            ContractorTier::Priority,
        ] {
            assert_eq!(ContractorTier::from_str(&tier.to_string()).unwrap(), tier);
        }
    }

    #[test]
    fn test_addon_type_accepts_hyphenated_input() {
        assert_eq!(
            AddonType::from_str("ai-enhancement").unwrap(),
            AddonType::AiEnhancement
        );
        assert_eq!(
            AddonType::from_str("spec-sheet").unwrap(),
            AddonType::SpecSheet
        );
    }

    #[test]
    fn test_time_boxed_addons() {
        assert!(AddonType::Featured.is_time_boxed());
        assert!(AddonType::Elite.is_time_boxed());
        assert!(!AddonType::AiEnhancement.is_time_boxed());
        assert!(!AddonType::SpecSheet.is_time_boxed());
    }

    #[test]
    fn test_contractor_tier_ordering() {
        assert!(ContractorTier::Priority > ContractorTier::Featured);
        assert!(ContractorTier::Featured > ContractorTier::Verified);
        assert!(ContractorTier::Verified > ContractorTier::None);
    }
}
