//! Reconciliation orchestrator
//!
//! Single entry point for applying billing events to entitlement state.
//! Webhook handling resolves the subject and the live subscription status,
//! then calls in here; the pure mapping in `entitlement` decides what to
//! assign and this module persists it transactionally.

use std::collections::HashMap;

use sqlx::PgPool;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use tradeyard_shared::types::{
    AddonPurchaseStatus, AddonType, ContractorTier, SellerTier, SubscriptionStatus, TrackKind,
    VerifiedSellerTier,
};

use crate::entitlement::{self, EntitlementUpdate, ListingFlagSet, PurchaseKind};
use crate::error::BillingResult;
use crate::events::{ActorType, EntitlementEventBuilder, EntitlementEventLogger, EntitlementEventType};
use crate::expiration::{expiration_for, ExpiringGrant};
use crate::lookup::{AddonPurchaseRow, SubjectResolver};

/// What a completed checkout session was for, recovered from its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutKind {
    Subscription(PurchaseKind),
    Addon(AddonType),
}

/// Context extracted from a `checkout.session.completed` event
#[derive(Debug, Clone)]
pub struct CheckoutCompleted {
    pub session_id: String,
    pub metadata: HashMap<String, String>,
    pub subscription_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub customer_id: Option<String>,
    /// Live status retrieved from the provider, when the session created a
    /// subscription
    pub live_status: Option<SubscriptionStatus>,
    pub stripe_event_id: String,
}

/// Classify a checkout session from its metadata.
///
/// Precedence: an explicit verified-seller tier wins, then an add-on type,
/// then the generic kind/tier pair. Unrecognized metadata yields `None` and
/// the event is logged and skipped rather than guessed at.
pub fn classify_checkout(metadata: &HashMap<String, String>) -> Option<CheckoutKind> {
    if let Some(raw) = metadata.get("verified_seller_tier") {
        let tier: VerifiedSellerTier = raw.parse().ok()?;
        return Some(CheckoutKind::Subscription(PurchaseKind::VerifiedSeller(
            tier,
        )));
    }

    if let Some(raw) = metadata.get("addon_type") {
        let addon: AddonType = raw.parse().ok()?;
        return Some(CheckoutKind::Addon(addon));
    }

    let kind: TrackKind = metadata.get("kind")?.parse().ok()?;
    let tier = metadata.get("tier")?;
    match kind {
        TrackKind::Seller => {
            let tier: SellerTier = tier.parse().ok()?;
            Some(CheckoutKind::Subscription(PurchaseKind::Seller(tier)))
        }
        TrackKind::Contractor => {
            let tier: ContractorTier = tier.parse().ok()?;
            Some(CheckoutKind::Subscription(PurchaseKind::Contractor(tier)))
        }
        TrackKind::VerifiedSeller => {
            let tier: VerifiedSellerTier = tier.parse().ok()?;
            Some(CheckoutKind::Subscription(PurchaseKind::VerifiedSeller(
                tier,
            )))
        }
    }
}

fn json_ts(ts: Option<OffsetDateTime>) -> serde_json::Value {
    match ts.and_then(|t| t.format(&Rfc3339).ok()) {
        Some(s) => serde_json::Value::String(s),
        None => serde_json::Value::Null,
    }
}

/// Merge an add-on flag set into a listing's premium_addons map.
///
/// Set-only: keys outside the cascade are never touched, so activating a
/// lower tier can never downgrade a higher one that is already present.
pub fn merge_listing_flags(
    map: &mut serde_json::Map<String, serde_json::Value>,
    flags: &[AddonType],
    activated_at: OffsetDateTime,
    expires_at: Option<OffsetDateTime>,
) {
    for flag in flags {
        map.insert(
            flag.as_str().to_string(),
            serde_json::json!({
                "active": true,
                "activated_at": json_ts(Some(activated_at)),
                "expires_at": json_ts(expires_at),
            }),
        );
    }
}

/// Clear exactly one add-on flag after a refund. Cascade siblings granted by
/// the same purchase stay untouched; a later sweep reconciles them.
pub fn clear_listing_flag(
    map: &mut serde_json::Map<String, serde_json::Value>,
    addon: AddonType,
) {
    map.insert(
        addon.as_str().to_string(),
        serde_json::json!({ "active": false }),
    );
}

/// Orchestrator that persists entitlement updates and keeps the audit trail
#[derive(Clone)]
pub struct ReconcileService {
    pool: PgPool,
    events: EntitlementEventLogger,
    resolver: SubjectResolver,
}

impl ReconcileService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: EntitlementEventLogger::new(pool.clone()),
            resolver: SubjectResolver::new(pool.clone()),
            pool,
        }
    }

    pub fn resolver(&self) -> &SubjectResolver {
        &self.resolver
    }

    pub fn events(&self) -> &EntitlementEventLogger {
        &self.events
    }

    /// Persist one entitlement update atomically.
    ///
    /// All affected records commit together; a missing record is logged and
    /// skipped rather than failing the whole update.
    pub async fn apply_update(
        &self,
        user_id: Uuid,
        update: &EntitlementUpdate,
        listing_id: Option<Uuid>,
        stripe_event_id: Option<&str>,
    ) -> BillingResult<()> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        if update.user.grant_seller || update.user.grant_contractor {
            let result = sqlx::query(
                r#"
                UPDATE users
                SET is_seller = is_seller OR $2,
                    is_contractor = is_contractor OR $3,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .bind(update.user.grant_seller)
            .bind(update.user.grant_contractor)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tracing::warn!(user_id = %user_id, "Capability grant targeted a missing user");
            }
        }

        if let Some(track) = &update.track {
            sqlx::query(
                r#"
                INSERT INTO subscription_tracks (user_id, kind, tier, status, external_id)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id, kind) DO UPDATE SET
                    tier = EXCLUDED.tier,
                    status = EXCLUDED.status,
                    external_id = COALESCE(EXCLUDED.external_id, subscription_tracks.external_id),
                    updated_at = NOW()
                "#,
            )
            .bind(user_id)
            .bind(track.kind)
            .bind(&track.tier)
            .bind(track.status)
            .bind(&track.external_id)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(profile) = &update.contractor_profile {
            sqlx::query(
                r#"
                INSERT INTO contractor_profiles (
                    user_id,
                    verification_status,
                    verified_badge_purchased,
                    verified_at,
                    verified_badge_expires_at,
                    visibility_tier,
                    visibility_subscription_status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (user_id) DO UPDATE SET
                    verification_status = EXCLUDED.verification_status,
                    verified_badge_purchased = EXCLUDED.verified_badge_purchased,
                    verified_at = EXCLUDED.verified_at,
                    verified_badge_expires_at = EXCLUDED.verified_badge_expires_at,
                    visibility_tier = EXCLUDED.visibility_tier,
                    visibility_subscription_status = EXCLUDED.visibility_subscription_status,
                    updated_at = NOW()
                "#,
            )
            .bind(user_id)
            .bind(profile.verification_status)
            .bind(profile.verified_badge_purchased)
            .bind(profile.verified_at)
            .bind(profile.verified_badge_expires_at)
            .bind(profile.visibility_tier)
            .bind(profile.visibility_subscription_status)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(verification) = &update.verification {
            let history_entry = serde_json::json!({
                "status": verification.status.to_string(),
                "at": json_ts(Some(now)),
                "stripe_event_id": stripe_event_id,
            });

            sqlx::query(
                r#"
                INSERT INTO seller_verifications (
                    user_id,
                    status,
                    tier,
                    badge_active,
                    badge_expires_at,
                    ranking_boost_expires_at,
                    status_history
                )
                VALUES ($1, $2, $3, $4, $5, $6, jsonb_build_array($7::jsonb))
                ON CONFLICT (user_id) DO UPDATE SET
                    status = EXCLUDED.status,
                    tier = EXCLUDED.tier,
                    badge_active = EXCLUDED.badge_active,
                    badge_expires_at = EXCLUDED.badge_expires_at,
                    ranking_boost_expires_at = EXCLUDED.ranking_boost_expires_at,
                    status_history = seller_verifications.status_history || $7::jsonb,
                    updated_at = NOW()
                "#,
            )
            .bind(user_id)
            .bind(verification.status)
            .bind(verification.tier)
            .bind(verification.badge_active)
            .bind(verification.badge_expires_at)
            .bind(verification.ranking_boost_expires_at)
            .bind(&history_entry)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(flag_set) = &update.listing_flags {
            match listing_id {
                Some(listing_id) => {
                    self.merge_flags_tx(&mut tx, listing_id, flag_set, now).await?;
                }
                None => {
                    tracing::warn!(
                        user_id = %user_id,
                        "Listing flag update had no target listing, skipping"
                    );
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn merge_flags_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        listing_id: Uuid,
        flag_set: &ListingFlagSet,
        now: OffsetDateTime,
    ) -> BillingResult<()> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT premium_addons FROM listings WHERE id = $1 FOR UPDATE")
                .bind(listing_id)
                .fetch_optional(&mut **tx)
                .await?;

        let Some((addons,)) = row else {
            tracing::warn!(listing_id = %listing_id, "Add-on flags targeted a missing listing");
            return Ok(());
        };

        let mut map = addons.as_object().cloned().unwrap_or_default();
        merge_listing_flags(&mut map, &flag_set.flags, now, flag_set.expires_at);

        sqlx::query("UPDATE listings SET premium_addons = $2, updated_at = NOW() WHERE id = $1")
            .bind(listing_id)
            .bind(serde_json::Value::Object(map))
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Activate a subscription purchase for a user
    pub async fn activate(
        &self,
        user_id: Uuid,
        kind: PurchaseKind,
        external_id: Option<&str>,
        status: SubscriptionStatus,
        stripe_event_id: Option<&str>,
    ) -> BillingResult<EntitlementUpdate> {
        let now = OffsetDateTime::now_utc();
        let update = entitlement::activation(kind, external_id, status, now);
        self.apply_update(user_id, &update, None, stripe_event_id).await?;

        tracing::info!(
            user_id = %user_id,
            kind = ?kind,
            status = %status,
            "Activated subscription entitlements"
        );

        let mut builder = EntitlementEventBuilder::new(user_id, EntitlementEventType::SubscriptionActivated)
            .data(serde_json::to_value(&update).unwrap_or(serde_json::Value::Null))
            .actor_type(ActorType::Stripe);
        if let Some(event_id) = stripe_event_id {
            builder = builder.stripe_event(event_id);
        }
        if let Some(sub_id) = external_id {
            builder = builder.stripe_subscription(sub_id);
        }
        if let Err(err) = self.events.log_event(builder).await {
            tracing::warn!(error = %err, "Failed to record activation event");
        }

        let badge_granted = update
            .verification
            .as_ref()
            .map(|v| v.badge_active)
            .unwrap_or(false)
            || update.contractor_profile.is_some();
        if badge_granted {
            let badge = EntitlementEventBuilder::new(user_id, EntitlementEventType::BadgeActivated)
                .actor_type(ActorType::Stripe);
            if let Err(err) = self.events.log_event(badge).await {
                tracing::warn!(error = %err, "Failed to record badge event");
            }
        }

        Ok(update)
    }

    /// Activate a paid add-on purchase: mark the row active, compute its
    /// window, and apply listing flags if the purchase targets a listing.
    pub async fn activate_addon_purchase(
        &self,
        purchase: &AddonPurchaseRow,
        payment_intent_id: Option<&str>,
        stripe_event_id: &str,
    ) -> BillingResult<()> {
        let now = OffsetDateTime::now_utc();
        let expires_at = expiration_for(ExpiringGrant::ListingAddon(purchase.addon_type), now);

        // Repurchase resets the window from now rather than extending it
        sqlx::query(
            r#"
            UPDATE addon_purchases
            SET status = $2,
                started_at = $3,
                expires_at = $4,
                stripe_payment_intent_id = COALESCE($5, stripe_payment_intent_id),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(purchase.id)
        .bind(AddonPurchaseStatus::Active)
        .bind(now)
        .bind(expires_at)
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await?;

        if let Some(listing_id) = purchase.listing_id {
            let update = EntitlementUpdate {
                listing_flags: Some(ListingFlagSet {
                    flags: entitlement::cascade_set(purchase.addon_type).to_vec(),
                    expires_at,
                }),
                ..Default::default()
            };
            self.apply_update(purchase.user_id, &update, Some(listing_id), Some(stripe_event_id))
                .await?;
        }

        tracing::info!(
            purchase_id = %purchase.id,
            addon_type = %purchase.addon_type,
            listing_id = ?purchase.listing_id,
            "Activated add-on purchase"
        );

        let builder = EntitlementEventBuilder::new(purchase.user_id, EntitlementEventType::AddonActivated)
            .data(serde_json::json!({
                "purchase_id": purchase.id,
                "addon_type": purchase.addon_type.to_string(),
                "listing_id": purchase.listing_id,
                "expires_at": json_ts(expires_at),
            }))
            .stripe_event(stripe_event_id)
            .actor_type(ActorType::Stripe);
        if let Err(err) = self.events.log_event(builder).await {
            tracing::warn!(error = %err, "Failed to record add-on event");
        }

        Ok(())
    }

    /// Handle a completed checkout session
    pub async fn handle_checkout_completed(&self, ctx: &CheckoutCompleted) -> BillingResult<()> {
        let Some(kind) = classify_checkout(&ctx.metadata) else {
            tracing::warn!(
                session_id = %ctx.session_id,
                "Checkout session metadata did not classify, skipping"
            );
            return Ok(());
        };

        match kind {
            CheckoutKind::Addon(addon) => {
                let purchase = match self
                    .resolver
                    .purchase_by_checkout_session(&ctx.session_id)
                    .await?
                {
                    Some(purchase) => Some(purchase),
                    None => {
                        self.resolver
                            .resolve_purchase(
                                ctx.metadata.get("purchase_id").map(String::as_str),
                                ctx.payment_intent_id.as_deref(),
                            )
                            .await?
                    }
                };

                let Some(purchase) = purchase else {
                    tracing::warn!(
                        session_id = %ctx.session_id,
                        addon_type = %addon,
                        "No pending purchase found for completed add-on checkout"
                    );
                    return Ok(());
                };

                self.activate_addon_purchase(
                    &purchase,
                    ctx.payment_intent_id.as_deref(),
                    &ctx.stripe_event_id,
                )
                .await
            }
            CheckoutKind::Subscription(purchase_kind) => {
                let subject = self
                    .resolver
                    .resolve_subject(
                        ctx.metadata.get("user_id").map(String::as_str),
                        ctx.subscription_id.as_deref(),
                        ctx.customer_id.as_deref(),
                    )
                    .await?;

                let Some(subject) = subject else {
                    tracing::warn!(
                        session_id = %ctx.session_id,
                        "Completed subscription checkout resolved no subject"
                    );
                    return Ok(());
                };

                let status = ctx.live_status.unwrap_or(SubscriptionStatus::Active);
                self.activate(
                    subject.user_id,
                    purchase_kind,
                    ctx.subscription_id.as_deref(),
                    status,
                    Some(&ctx.stripe_event_id),
                )
                .await?;
                Ok(())
            }
        }
    }

    /// Handle a subscription status change
    pub async fn handle_subscription_updated(
        &self,
        subscription_id: &str,
        provider_status: &str,
        metadata_user_id: Option<&str>,
        customer_id: Option<&str>,
        stripe_event_id: &str,
    ) -> BillingResult<()> {
        let status = SubscriptionStatus::from_provider(provider_status);

        let updated: Option<(Uuid, TrackKind)> = sqlx::query_as(
            r#"
            UPDATE subscription_tracks
            SET status = $2, updated_at = NOW()
            WHERE external_id = $1
            RETURNING user_id, kind
            "#,
        )
        .bind(subscription_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        let Some((user_id, kind)) = updated else {
            // A subject resolved only through metadata has no stored track to
            // update yet; record that we saw the event
            if let Some(subject) = self
                .resolver
                .resolve_subject(metadata_user_id, Some(subscription_id), customer_id)
                .await?
            {
                tracing::warn!(
                    user_id = %subject.user_id,
                    subscription_id = %subscription_id,
                    "Subscription update for a subject with no stored track"
                );
            } else {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    "Subscription update resolved no subject, skipping"
                );
            }
            return Ok(());
        };

        if kind == TrackKind::Contractor {
            self.cascade_contractor_status(user_id, status).await?;
        }

        if status == SubscriptionStatus::Unknown {
            tracing::warn!(
                user_id = %user_id,
                subscription_id = %subscription_id,
                provider_status = %provider_status,
                "Unrecognized provider status, queued for review"
            );
            let review = EntitlementEventBuilder::new(user_id, EntitlementEventType::StatusReviewNeeded)
                .data(serde_json::json!({ "provider_status": provider_status }))
                .stripe_event(stripe_event_id)
                .stripe_subscription(subscription_id)
                .actor_type(ActorType::Stripe);
            if let Err(err) = self.events.log_event(review).await {
                tracing::warn!(error = %err, "Failed to record review event");
            }
            return Ok(());
        }

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription_id,
            status = %status,
            "Updated subscription status"
        );

        let builder = EntitlementEventBuilder::new(user_id, EntitlementEventType::SubscriptionUpdated)
            .data(serde_json::json!({ "status": status.to_string(), "kind": kind.to_string() }))
            .stripe_event(stripe_event_id)
            .stripe_subscription(subscription_id)
            .actor_type(ActorType::Stripe);
        if let Err(err) = self.events.log_event(builder).await {
            tracing::warn!(error = %err, "Failed to record update event");
        }

        Ok(())
    }

    /// Handle a terminal subscription deletion
    pub async fn handle_subscription_deleted(
        &self,
        subscription_id: &str,
        stripe_event_id: &str,
    ) -> BillingResult<()> {
        let Some(track) = self.resolver.track_by_external_id(subscription_id).await? else {
            tracing::warn!(
                subscription_id = %subscription_id,
                "Subscription deletion matched no stored track, skipping"
            );
            return Ok(());
        };

        let update = entitlement::cancellation(track.kind);
        self.apply_update(track.user_id, &update, None, Some(stripe_event_id))
            .await?;

        tracing::info!(
            user_id = %track.user_id,
            kind = %track.kind,
            subscription_id = %subscription_id,
            "Cancelled subscription entitlements"
        );

        let builder = EntitlementEventBuilder::new(track.user_id, EntitlementEventType::SubscriptionCanceled)
            .data(serde_json::to_value(&update).unwrap_or(serde_json::Value::Null))
            .stripe_event(stripe_event_id)
            .stripe_subscription(subscription_id)
            .actor_type(ActorType::Stripe);
        if let Err(err) = self.events.log_event(builder).await {
            tracing::warn!(error = %err, "Failed to record cancellation event");
        }

        if track.kind != TrackKind::Seller {
            let revoked = EntitlementEventBuilder::new(track.user_id, EntitlementEventType::BadgeRevoked)
                .stripe_event(stripe_event_id)
                .actor_type(ActorType::Stripe);
            if let Err(err) = self.events.log_event(revoked).await {
                tracing::warn!(error = %err, "Failed to record badge revocation event");
            }
        }

        Ok(())
    }

    /// Handle a failed invoice payment: entitlements stay live, status flips
    /// to past_due
    pub async fn handle_payment_failed(
        &self,
        subscription_id: &str,
        stripe_event_id: &str,
    ) -> BillingResult<()> {
        let updated: Option<(Uuid, TrackKind)> = sqlx::query_as(
            r#"
            UPDATE subscription_tracks
            SET status = $2, updated_at = NOW()
            WHERE external_id = $1
            RETURNING user_id, kind
            "#,
        )
        .bind(subscription_id)
        .bind(SubscriptionStatus::PastDue)
        .fetch_optional(&self.pool)
        .await?;

        let Some((user_id, kind)) = updated else {
            tracing::warn!(
                subscription_id = %subscription_id,
                "Payment failure matched no stored track, skipping"
            );
            return Ok(());
        };

        if kind == TrackKind::Contractor {
            self.cascade_contractor_status(user_id, SubscriptionStatus::PastDue)
                .await?;
        }

        tracing::warn!(
            user_id = %user_id,
            subscription_id = %subscription_id,
            "Subscription payment failed, marked past_due"
        );

        let builder = EntitlementEventBuilder::new(user_id, EntitlementEventType::PaymentFailed)
            .stripe_event(stripe_event_id)
            .stripe_subscription(subscription_id)
            .actor_type(ActorType::Stripe);
        if let Err(err) = self.events.log_event(builder).await {
            tracing::warn!(error = %err, "Failed to record payment failure event");
        }

        Ok(())
    }

    /// Handle a successful invoice payment.
    ///
    /// Only a past_due track moves back to active here; renewal invoices on
    /// already-active subscriptions are a no-op, which makes the handler
    /// idempotent under redelivery.
    pub async fn handle_payment_succeeded(
        &self,
        subscription_id: &str,
        stripe_event_id: &str,
    ) -> BillingResult<()> {
        let recovered: Option<(Uuid, TrackKind)> = sqlx::query_as(
            r#"
            UPDATE subscription_tracks
            SET status = $2, updated_at = NOW()
            WHERE external_id = $1 AND status = $3
            RETURNING user_id, kind
            "#,
        )
        .bind(subscription_id)
        .bind(SubscriptionStatus::Active)
        .bind(SubscriptionStatus::PastDue)
        .fetch_optional(&self.pool)
        .await?;

        let Some((user_id, kind)) = recovered else {
            return Ok(());
        };

        if kind == TrackKind::Contractor {
            self.cascade_contractor_status(user_id, SubscriptionStatus::Active)
                .await?;
        }

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription_id,
            "Subscription recovered from past_due"
        );

        let builder = EntitlementEventBuilder::new(user_id, EntitlementEventType::PaymentRecovered)
            .stripe_event(stripe_event_id)
            .stripe_subscription(subscription_id)
            .actor_type(ActorType::Stripe);
        if let Err(err) = self.events.log_event(builder).await {
            tracing::warn!(error = %err, "Failed to record payment recovery event");
        }

        Ok(())
    }

    /// Handle a refunded add-on charge.
    ///
    /// Cancels the purchase row and clears only the refunded add-on's flag;
    /// an already-cancelled purchase is a no-op under redelivery.
    pub async fn handle_charge_refunded(
        &self,
        metadata_purchase_id: Option<&str>,
        payment_intent_id: Option<&str>,
        stripe_event_id: &str,
    ) -> BillingResult<()> {
        let Some(purchase) = self
            .resolver
            .resolve_purchase(metadata_purchase_id, payment_intent_id)
            .await?
        else {
            tracing::warn!(
                payment_intent_id = ?payment_intent_id,
                "Refund matched no add-on purchase, skipping"
            );
            return Ok(());
        };

        if purchase.status == AddonPurchaseStatus::Cancelled {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE addon_purchases
            SET status = $2,
                cancelled_at = NOW(),
                cancel_reason = 'refunded',
                updated_at = NOW()
            WHERE id = $1 AND status <> $2
            "#,
        )
        .bind(purchase.id)
        .bind(AddonPurchaseStatus::Cancelled)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(());
        }

        // Clear only the refunded add-on's flag. A purchase that never went
        // active has nothing to clear.
        if purchase.status == AddonPurchaseStatus::Active {
            if let Some(listing_id) = purchase.listing_id {
                let row: Option<(serde_json::Value,)> =
                    sqlx::query_as("SELECT premium_addons FROM listings WHERE id = $1 FOR UPDATE")
                        .bind(listing_id)
                        .fetch_optional(&mut *tx)
                        .await?;

                if let Some((addons,)) = row {
                    let mut map = addons.as_object().cloned().unwrap_or_default();
                    clear_listing_flag(&mut map, purchase.addon_type);
                    sqlx::query(
                        "UPDATE listings SET premium_addons = $2, updated_at = NOW() WHERE id = $1",
                    )
                    .bind(listing_id)
                    .bind(serde_json::Value::Object(map))
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            purchase_id = %purchase.id,
            addon_type = %purchase.addon_type,
            "Refunded add-on purchase cancelled"
        );

        let builder = EntitlementEventBuilder::new(purchase.user_id, EntitlementEventType::AddonRefunded)
            .data(serde_json::json!({
                "purchase_id": purchase.id,
                "addon_type": purchase.addon_type.to_string(),
                "listing_id": purchase.listing_id,
            }))
            .stripe_event(stripe_event_id)
            .actor_type(ActorType::Stripe);
        if let Err(err) = self.events.log_event(builder).await {
            tracing::warn!(error = %err, "Failed to record refund event");
        }

        Ok(())
    }

    /// Rederive the contractor profile's visibility from its track.
    ///
    /// Read-side repair: if a crash left the profile ahead of the track, this
    /// snaps visibility back to what the track actually grants.
    pub async fn rederive_contractor_profile(&self, user_id: Uuid) -> BillingResult<()> {
        let track = self.resolver.track_for_user(user_id, TrackKind::Contractor).await?;

        let (tier, status) = match track {
            Some(track) => {
                let tier: ContractorTier = track.tier.parse().unwrap_or(ContractorTier::None);
                if track.status.grants_access() {
                    (tier, track.status)
                } else {
                    (ContractorTier::None, track.status)
                }
            }
            None => (ContractorTier::None, SubscriptionStatus::Canceled),
        };

        sqlx::query(
            r#"
            UPDATE contractor_profiles
            SET visibility_tier = $2,
                visibility_subscription_status = $3,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(tier)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cascade_contractor_status(
        &self,
        user_id: Uuid,
        status: SubscriptionStatus,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE contractor_profiles
            SET visibility_subscription_status = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn meta(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_classify_seller_subscription() {
        let kind = classify_checkout(&meta(&[("kind", "seller"), ("tier", "plus")]));
        assert_eq!(
            kind,
            Some(CheckoutKind::Subscription(PurchaseKind::Seller(
                SellerTier::Plus
            )))
        );
    }

    #[test]
    fn test_classify_verified_seller_tier_takes_precedence() {
        let kind = classify_checkout(&meta(&[
            ("verified_seller_tier", "priority"),
            ("kind", "seller"),
            ("tier", "basic"),
        ]));
        assert_eq!(
            kind,
            Some(CheckoutKind::Subscription(PurchaseKind::VerifiedSeller(
                VerifiedSellerTier::Priority
            )))
        );
    }

    #[test]
    fn test_classify_addon_beats_generic_kind() {
        let kind = classify_checkout(&meta(&[
            ("addon_type", "elite"),
            ("kind", "seller"),
            ("tier", "pro"),
        ]));
        assert_eq!(kind, Some(CheckoutKind::Addon(AddonType::Elite)));
    }

    #[test]
    fn test_classify_rejects_unknown_metadata() {
        assert_eq!(classify_checkout(&meta(&[("kind", "wizard")])), None);
        assert_eq!(classify_checkout(&meta(&[("addon_type", "sparkle")])), None);
        assert_eq!(classify_checkout(&HashMap::new()), None);
    }

    #[test]
    fn test_merge_flags_sets_full_cascade() {
        let now = datetime!(2025-04-01 00:00 UTC);
        let expires = Some(datetime!(2025-05-01 00:00 UTC));
        let mut map = serde_json::Map::new();
        merge_listing_flags(
            &mut map,
            entitlement::cascade_set(AddonType::Elite),
            now,
            expires,
        );

        for key in ["elite", "premium", "featured"] {
            assert_eq!(map[key]["active"], serde_json::json!(true));
            assert_eq!(
                map[key]["expires_at"],
                serde_json::json!("2025-05-01T00:00:00Z")
            );
        }
        assert!(!map.contains_key("ai_enhancement"));
    }

    #[test]
    fn test_merge_is_set_only_lower_tier_never_downgrades() {
        let now = datetime!(2025-04-01 00:00 UTC);
        let mut map = serde_json::Map::new();
        merge_listing_flags(
            &mut map,
            entitlement::cascade_set(AddonType::Elite),
            now,
            Some(datetime!(2025-05-01 00:00 UTC)),
        );
        // A later featured purchase rewrites only its own key
        merge_listing_flags(
            &mut map,
            entitlement::cascade_set(AddonType::Featured),
            datetime!(2025-04-15 00:00 UTC),
            Some(datetime!(2025-05-15 00:00 UTC)),
        );

        assert_eq!(map["elite"]["active"], serde_json::json!(true));
        assert_eq!(
            map["elite"]["expires_at"],
            serde_json::json!("2025-05-01T00:00:00Z")
        );
        assert_eq!(
            map["featured"]["expires_at"],
            serde_json::json!("2025-05-15T00:00:00Z")
        );
    }

    #[test]
    fn test_clear_flag_leaves_cascade_siblings() {
        let now = datetime!(2025-04-01 00:00 UTC);
        let mut map = serde_json::Map::new();
        merge_listing_flags(
            &mut map,
            entitlement::cascade_set(AddonType::Premium),
            now,
            Some(datetime!(2025-05-01 00:00 UTC)),
        );
        clear_listing_flag(&mut map, AddonType::Premium);

        assert_eq!(map["premium"]["active"], serde_json::json!(false));
        assert!(map["premium"].get("expires_at").is_none());
        assert_eq!(map["featured"]["active"], serde_json::json!(true));
    }

    #[test]
    fn test_one_time_flags_carry_null_expiry() {
        let now = datetime!(2025-04-01 00:00 UTC);
        let mut map = serde_json::Map::new();
        merge_listing_flags(
            &mut map,
            entitlement::cascade_set(AddonType::SpecSheet),
            now,
            None,
        );
        assert_eq!(map["spec_sheet"]["expires_at"], serde_json::Value::Null);
    }
}
