//! Subject resolution for inbound events
//!
//! Webhook payloads identify their subject either by an embedded user id in
//! metadata or by the external subscription/payment/customer references they
//! carry. Metadata wins; the reverse lookup on
//! `subscription_tracks.external_id` is a single indexed match, with the
//! stored Stripe customer id as a last resort.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use tradeyard_shared::types::{AddonPurchaseStatus, AddonType, SubscriptionStatus, TrackKind};

use crate::error::BillingResult;

/// A resolved subject: the user plus, when known, which track the event
/// refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectRef {
    pub user_id: Uuid,
    pub track_kind: Option<TrackKind>,
}

/// A subscription track row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackRow {
    pub user_id: Uuid,
    pub kind: TrackKind,
    pub tier: String,
    pub status: SubscriptionStatus,
    pub external_id: Option<String>,
}

/// An add-on purchase row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AddonPurchaseRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub addon_type: AddonType,
    pub status: AddonPurchaseStatus,
    pub amount_cents: i64,
    pub started_at: Option<OffsetDateTime>,
    pub expires_at: Option<OffsetDateTime>,
    pub listing_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    pub stripe_checkout_session_id: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
}

/// Resolver for mapping inbound events onto subjects and purchases
#[derive(Clone)]
pub struct SubjectResolver {
    pool: PgPool,
}

impl SubjectResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the subject of a subscription event.
    ///
    /// Precedence: embedded metadata user id first, then reverse lookup by
    /// the external subscription id, then by the stored Stripe customer id.
    pub async fn resolve_subject(
        &self,
        metadata_user_id: Option<&str>,
        subscription_id: Option<&str>,
        customer_id: Option<&str>,
    ) -> BillingResult<Option<SubjectRef>> {
        if let Some(raw) = metadata_user_id {
            if let Ok(user_id) = raw.parse::<Uuid>() {
                // The track kind may still come from the stored row
                let kind = match subscription_id {
                    Some(sub_id) => self
                        .track_by_external_id(sub_id)
                        .await?
                        .map(|track| track.kind),
                    None => None,
                };
                return Ok(Some(SubjectRef {
                    user_id,
                    track_kind: kind,
                }));
            }
            tracing::warn!(
                metadata_user_id = %raw,
                "Event metadata carried an unparseable user id, falling back to reverse lookup"
            );
        }

        if let Some(sub_id) = subscription_id {
            if let Some(track) = self.track_by_external_id(sub_id).await? {
                return Ok(Some(SubjectRef {
                    user_id: track.user_id,
                    track_kind: Some(track.kind),
                }));
            }
        }

        let Some(customer_id) = customer_id else {
            return Ok(None);
        };

        Ok(self
            .user_by_customer_id(customer_id)
            .await?
            .map(|user_id| SubjectRef {
                user_id,
                track_kind: None,
            }))
    }

    /// Look up a user by their stored Stripe customer id
    pub async fn user_by_customer_id(&self, customer_id: &str) -> BillingResult<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id,)| id))
    }

    /// Look up a subscription track by its external subscription id
    pub async fn track_by_external_id(
        &self,
        external_id: &str,
    ) -> BillingResult<Option<TrackRow>> {
        let track: Option<TrackRow> = sqlx::query_as(
            r#"
            SELECT user_id, kind, tier, status, external_id
            FROM subscription_tracks
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(track)
    }

    /// Look up a user's track of a given kind
    pub async fn track_for_user(
        &self,
        user_id: Uuid,
        kind: TrackKind,
    ) -> BillingResult<Option<TrackRow>> {
        let track: Option<TrackRow> = sqlx::query_as(
            r#"
            SELECT user_id, kind, tier, status, external_id
            FROM subscription_tracks
            WHERE user_id = $1 AND kind = $2
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(track)
    }

    /// Locate an add-on purchase for a refund event.
    ///
    /// Precedence: embedded purchase id from charge metadata, then reverse
    /// lookup by the stored payment-intent id.
    pub async fn resolve_purchase(
        &self,
        metadata_purchase_id: Option<&str>,
        payment_intent_id: Option<&str>,
    ) -> BillingResult<Option<AddonPurchaseRow>> {
        if let Some(raw) = metadata_purchase_id {
            if let Ok(id) = raw.parse::<Uuid>() {
                if let Some(purchase) = self.purchase_by_id(id).await? {
                    return Ok(Some(purchase));
                }
            }
        }

        let Some(intent_id) = payment_intent_id else {
            return Ok(None);
        };

        let purchase: Option<AddonPurchaseRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, addon_type, status, amount_cents, started_at, expires_at,
                   listing_id, contractor_id, stripe_checkout_session_id, stripe_payment_intent_id
            FROM addon_purchases
            WHERE stripe_payment_intent_id = $1
            "#,
        )
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(purchase)
    }

    /// Look up an add-on purchase by id
    pub async fn purchase_by_id(&self, id: Uuid) -> BillingResult<Option<AddonPurchaseRow>> {
        let purchase: Option<AddonPurchaseRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, addon_type, status, amount_cents, started_at, expires_at,
                   listing_id, contractor_id, stripe_checkout_session_id, stripe_payment_intent_id
            FROM addon_purchases
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(purchase)
    }

    /// Look up an add-on purchase by the checkout session that created it
    pub async fn purchase_by_checkout_session(
        &self,
        session_id: &str,
    ) -> BillingResult<Option<AddonPurchaseRow>> {
        let purchase: Option<AddonPurchaseRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, addon_type, status, amount_cents, started_at, expires_at,
                   listing_id, contractor_id, stripe_checkout_session_id, stripe_payment_intent_id
            FROM addon_purchases
            WHERE stripe_checkout_session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(purchase)
    }
}
