//! Entitlement event logging
//!
//! Append-only audit trail for every entitlement mutation. Events answer
//! "why is this user on this tier?" and make webhook-driven changes
//! reconstructable after the fact.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Types of entitlement events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntitlementEventType {
    // Subscription lifecycle
    SubscriptionActivated,
    SubscriptionUpdated,
    SubscriptionCanceled,

    // Payment lifecycle
    PaymentFailed,
    PaymentRecovered,

    // Add-ons
    AddonActivated,
    AddonRefunded,

    // Verification badges
    BadgeActivated,
    BadgeRevoked,

    // Manual-review queue
    StatusReviewNeeded,

    // Customer lifecycle
    CustomerCreated,
    CheckoutCreated,
}

impl std::fmt::Display for EntitlementEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntitlementEventType::SubscriptionActivated => "SUBSCRIPTION_ACTIVATED",
            EntitlementEventType::SubscriptionUpdated => "SUBSCRIPTION_UPDATED",
            EntitlementEventType::SubscriptionCanceled => "SUBSCRIPTION_CANCELED",
            EntitlementEventType::PaymentFailed => "PAYMENT_FAILED",
            EntitlementEventType::PaymentRecovered => "PAYMENT_RECOVERED",
            EntitlementEventType::AddonActivated => "ADDON_ACTIVATED",
            EntitlementEventType::AddonRefunded => "ADDON_REFUNDED",
            EntitlementEventType::BadgeActivated => "BADGE_ACTIVATED",
            EntitlementEventType::BadgeRevoked => "BADGE_REVOKED",
            EntitlementEventType::StatusReviewNeeded => "STATUS_REVIEW_NEEDED",
            EntitlementEventType::CustomerCreated => "CUSTOMER_CREATED",
            EntitlementEventType::CheckoutCreated => "CHECKOUT_CREATED",
        };
        write!(f, "{}", s)
    }
}

/// Who triggered the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    /// End user through the app
    User,
    /// Admin user
    Admin,
    /// System automation
    System,
    /// Stripe webhook
    Stripe,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::User => write!(f, "user"),
            ActorType::Admin => write!(f, "admin"),
            ActorType::System => write!(f, "system"),
            ActorType::Stripe => write!(f, "stripe"),
        }
    }
}

/// A stored entitlement event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub stripe_event_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub actor_type: String,
    pub created_at: OffsetDateTime,
}

/// Builder for creating entitlement events
pub struct EntitlementEventBuilder {
    user_id: Uuid,
    event_type: EntitlementEventType,
    event_data: serde_json::Value,
    stripe_event_id: Option<String>,
    stripe_subscription_id: Option<String>,
    stripe_customer_id: Option<String>,
    actor_type: ActorType,
}

impl EntitlementEventBuilder {
    pub fn new(user_id: Uuid, event_type: EntitlementEventType) -> Self {
        Self {
            user_id,
            event_type,
            event_data: serde_json::json!({}),
            stripe_event_id: None,
            stripe_subscription_id: None,
            stripe_customer_id: None,
            actor_type: ActorType::System,
        }
    }

    /// Set the event data
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }

    /// Set the Stripe event ID
    pub fn stripe_event(mut self, event_id: impl Into<String>) -> Self {
        self.stripe_event_id = Some(event_id.into());
        self
    }

    /// Set the Stripe subscription ID
    pub fn stripe_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.stripe_subscription_id = Some(subscription_id.into());
        self
    }

    /// Set the Stripe customer ID
    pub fn stripe_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.stripe_customer_id = Some(customer_id.into());
        self
    }

    /// Set the actor type
    pub fn actor_type(mut self, actor_type: ActorType) -> Self {
        self.actor_type = actor_type;
        self
    }
}

/// Service for logging and querying entitlement events
#[derive(Clone)]
pub struct EntitlementEventLogger {
    pool: PgPool,
}

impl EntitlementEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Log an entitlement event
    pub async fn log_event(&self, builder: EntitlementEventBuilder) -> BillingResult<Uuid> {
        let event_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO entitlement_events (
                user_id,
                event_type,
                event_data,
                stripe_event_id,
                stripe_subscription_id,
                stripe_customer_id,
                actor_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(builder.user_id)
        .bind(builder.event_type.to_string())
        .bind(&builder.event_data)
        .bind(&builder.stripe_event_id)
        .bind(&builder.stripe_subscription_id)
        .bind(&builder.stripe_customer_id)
        .bind(builder.actor_type.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(event_id.0)
    }

    /// Get recent events for a user
    pub async fn get_events_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<EntitlementEvent>> {
        let events: Vec<EntitlementEvent> = sqlx::query_as(
            r#"
            SELECT
                id,
                user_id,
                event_type,
                event_data,
                stripe_event_id,
                stripe_subscription_id,
                stripe_customer_id,
                actor_type,
                created_at
            FROM entitlement_events
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Events queued for manual review (unknown provider statuses)
    pub async fn get_review_queue(&self, limit: i64) -> BillingResult<Vec<EntitlementEvent>> {
        let events: Vec<EntitlementEvent> = sqlx::query_as(
            r#"
            SELECT
                id,
                user_id,
                event_type,
                event_data,
                stripe_event_id,
                stripe_subscription_id,
                stripe_customer_id,
                actor_type,
                created_at
            FROM entitlement_events
            WHERE event_type = 'STATUS_REVIEW_NEEDED'
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for EntitlementEvent {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            event_type: row.try_get("event_type")?,
            event_data: row.try_get("event_data")?,
            stripe_event_id: row.try_get("stripe_event_id")?,
            stripe_subscription_id: row.try_get("stripe_subscription_id")?,
            stripe_customer_id: row.try_get("stripe_customer_id")?,
            actor_type: row.try_get("actor_type")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_display() {
        assert_eq!(
            EntitlementEventType::SubscriptionActivated.to_string(),
            "SUBSCRIPTION_ACTIVATED"
        );
        assert_eq!(
            EntitlementEventType::StatusReviewNeeded.to_string(),
            "STATUS_REVIEW_NEEDED"
        );
    }

    #[test]
    fn test_actor_type_display() {
        assert_eq!(ActorType::User.to_string(), "user");
        assert_eq!(ActorType::Stripe.to_string(), "stripe");
    }

    #[test]
    fn test_event_builder() {
        let user_id = Uuid::new_v4();
        let builder =
            EntitlementEventBuilder::new(user_id, EntitlementEventType::AddonActivated)
                .data(serde_json::json!({"addon_type": "elite"}))
                .stripe_subscription("sub_123")
                .actor_type(ActorType::Stripe);

        assert_eq!(builder.user_id, user_id);
        assert_eq!(builder.event_type, EntitlementEventType::AddonActivated);
        assert_eq!(builder.stripe_subscription_id, Some("sub_123".to_string()));
        assert_eq!(builder.actor_type, ActorType::Stripe);
    }
}
