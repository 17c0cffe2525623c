//! Stripe webhook handling
//!
//! Verifies inbound events, claims them atomically for exactly-once
//! processing, and routes them into the reconciliation orchestrator.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType, Invoice, Subscription, Webhook};
use time::OffsetDateTime;
use uuid::Uuid;

use tradeyard_shared::types::SubscriptionStatus;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::reconcile::{CheckoutCompleted, ReconcileService};

type HmacSha256 = Hmac<Sha256>;

/// Timestamp tolerance for manual signature verification
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Parse a Stripe signature header into its timestamp and v1 signature.
/// Header shape: `t=<unix>,v1=<hex>[,v0=<hex>]`
fn parse_signature_header(signature: &str) -> Option<(i64, String)> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    Some((timestamp?, v1_signature?))
}

fn compute_signature(secret: &str, timestamp: i64, payload: &str) -> BillingResult<String> {
    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Manually verify a webhook signature against the signing secret.
/// Fallback for payloads the stripe crate's verifier rejects on API
/// version grounds.
fn verify_signature(
    payload: &str,
    signature: &str,
    secret: &str,
    now_unix: i64,
) -> BillingResult<()> {
    let Some((timestamp, v1_signature)) = parse_signature_header(signature) else {
        tracing::error!("Signature header missing timestamp or v1 signature");
        return Err(BillingError::WebhookSignatureInvalid);
    };

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::error!(
            timestamp = timestamp,
            now = now_unix,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let computed = compute_signature(secret, timestamp, payload)?;
    if computed != v1_signature {
        tracing::error!("Webhook signature mismatch");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
    reconcile: ReconcileService,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let reconcile = ReconcileService::new(pool.clone());
        Self {
            stripe,
            pool,
            reconcile,
        }
    }

    /// Verify and parse a Stripe webhook event.
    ///
    /// Tries the stripe crate's verifier first; newer Stripe API versions can
    /// fail its parsing, so a manual HMAC check with lenient JSON parsing
    /// backs it up.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| BillingError::WebhookSignatureInvalid)?
            .as_secs() as i64;

        verify_signature(payload, signature, webhook_secret, now)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Manual webhook verification succeeded"
        );

        Ok(event)
    }

    /// Handle a verified Stripe event.
    ///
    /// The INSERT...ON CONFLICT...RETURNING claim makes processing
    /// exactly-once: only one concurrent delivery wins the row. Events stuck
    /// in `processing` past the timeout can be re-claimed.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let event_type_str = event.type_.to_string();

        let event_timestamp = OffsetDateTime::from_unix_timestamp(event.created)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO stripe_webhook_events
                (stripe_event_id, event_type, event_timestamp, processing_result, processing_started_at)
            VALUES ($1, $2, $3, 'processing', NOW())
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW()
            WHERE stripe_webhook_events.processing_result = 'processing'
              AND stripe_webhook_events.processing_started_at < NOW() - make_interval(mins => $4)
            RETURNING id
            "#,
        )
        .bind(&event_id)
        .bind(&event_type_str)
        .bind(event_timestamp)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type_str,
                "Duplicate webhook event, skipping"
            );
            return Ok(());
        }

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Processing Stripe webhook event"
        );

        let result = self.process_event_internal(&event).await;

        let (processing_result, error_message) = match &result {
            Ok(()) => ("success".to_string(), None),
            Err(e) => ("error".to_string(), Some(e.to_string())),
        };

        if let Err(e) = sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET processing_result = $1, error_message = $2
            WHERE stripe_event_id = $3
            "#,
        )
        .bind(&processing_result)
        .bind(&error_message)
        .bind(&event_id)
        .execute(&self.pool)
        .await
        {
            tracing::error!(
                event_id = %event_id,
                error = %e,
                "Failed to update webhook audit record; event may look stuck in processing"
            );
        }

        result
    }

    async fn process_event_internal(&self, event: &Event) -> BillingResult<()> {
        let event_owned = event.clone();

        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                self.handle_checkout_completed(event_owned).await?;
            }

            EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated => {
                self.handle_subscription_changed(event_owned).await?;
            }
            EventType::CustomerSubscriptionDeleted => {
                self.handle_subscription_deleted(event_owned).await?;
            }

            EventType::InvoicePaid => {
                self.handle_invoice_paid(event_owned).await?;
            }
            EventType::InvoicePaymentFailed => {
                self.handle_invoice_payment_failed(event_owned).await?;
            }

            EventType::ChargeRefunded => {
                self.handle_charge_refunded(event_owned).await?;
            }

            _ => {
                tracing::info!(
                    event_type = %event.type_,
                    event_id = %event.id,
                    "Received unhandled Stripe event type"
                );
            }
        }

        Ok(())
    }

    async fn handle_checkout_completed(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let session = match event.data.object {
            EventObject::CheckoutSession(session) => session,
            _ => {
                return Err(BillingError::WebhookEventNotSupported(
                    "Expected CheckoutSession".to_string(),
                ))
            }
        };

        let subscription_id = session.subscription.as_ref().map(|s| s.id().to_string());

        // Checkout completion does not carry the subscription status; fetch
        // the live object so activation records what the provider holds now
        let live_status = match &subscription_id {
            Some(sub_id) => {
                let parsed = sub_id.parse().map_err(|_| {
                    BillingError::Internal(format!("Invalid subscription id: {}", sub_id))
                })?;
                let subscription =
                    Subscription::retrieve(self.stripe.inner(), &parsed, &[]).await?;
                Some(SubscriptionStatus::from_provider(
                    subscription.status.as_str(),
                ))
            }
            None => None,
        };

        let ctx = CheckoutCompleted {
            session_id: session.id.to_string(),
            metadata: session.metadata.clone().unwrap_or_default(),
            subscription_id,
            payment_intent_id: session.payment_intent.as_ref().map(|p| p.id().to_string()),
            customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
            live_status,
            stripe_event_id: event_id,
        };

        self.reconcile.handle_checkout_completed(&ctx).await
    }

    async fn handle_subscription_changed(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let subscription = self.extract_subscription(event)?;
        let customer_id = subscription.customer.id();

        self.reconcile
            .handle_subscription_updated(
                subscription.id.as_str(),
                subscription.status.as_str(),
                subscription.metadata.get("user_id").map(String::as_str),
                Some(customer_id.as_str()),
                &event_id,
            )
            .await
    }

    async fn handle_subscription_deleted(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let subscription = self.extract_subscription(event)?;

        self.reconcile
            .handle_subscription_deleted(subscription.id.as_str(), &event_id)
            .await
    }

    async fn handle_invoice_paid(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let invoice = self.extract_invoice(event)?;

        let Some(subscription_id) = invoice.subscription.as_ref().map(|s| s.id().to_string())
        else {
            // One-off invoices have no subscription to recover
            return Ok(());
        };

        self.reconcile
            .handle_payment_succeeded(&subscription_id, &event_id)
            .await
    }

    async fn handle_invoice_payment_failed(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let invoice = self.extract_invoice(event)?;

        let Some(subscription_id) = invoice.subscription.as_ref().map(|s| s.id().to_string())
        else {
            tracing::warn!(
                invoice_id = %invoice.id,
                "Payment failure on an invoice with no subscription, skipping"
            );
            return Ok(());
        };

        self.reconcile
            .handle_payment_failed(&subscription_id, &event_id)
            .await
    }

    async fn handle_charge_refunded(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let charge = match event.data.object {
            EventObject::Charge(charge) => charge,
            _ => {
                return Err(BillingError::WebhookEventNotSupported(
                    "Expected Charge".to_string(),
                ))
            }
        };

        if !charge.refunded {
            // Partial refunds keep the entitlement; only a full refund clears it
            tracing::info!(charge_id = %charge.id, "Partial refund, entitlement retained");
            return Ok(());
        }

        let payment_intent_id = charge.payment_intent.as_ref().map(|p| p.id().to_string());

        self.reconcile
            .handle_charge_refunded(
                charge.metadata.get("purchase_id").map(String::as_str),
                payment_intent_id.as_deref(),
                &event_id,
            )
            .await
    }

    fn extract_subscription(&self, event: Event) -> BillingResult<Subscription> {
        match event.data.object {
            EventObject::Subscription(subscription) => Ok(subscription),
            _ => Err(BillingError::WebhookEventNotSupported(
                "Expected Subscription".to_string(),
            )),
        }
    }

    fn extract_invoice(&self, event: Event) -> BillingResult<Invoice> {
        match event.data.object {
            EventObject::Invoice(invoice) => Ok(invoice),
            _ => Err(BillingError::WebhookEventNotSupported(
                "Expected Invoice".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &str = r#"{"id":"evt_1","type":"invoice.paid"}"#;

    fn signed_header(timestamp: i64, payload: &str) -> String {
        let sig = compute_signature(SECRET, timestamp, payload).unwrap();
        format!("t={},v1={}", timestamp, sig)
    }

    #[test]
    fn test_parse_signature_header() {
        let (t, v1) = parse_signature_header("t=1700000000,v1=abc123,v0=ignored").unwrap();
        assert_eq!(t, 1_700_000_000);
        assert_eq!(v1, "abc123");
    }

    #[test]
    fn test_parse_signature_header_rejects_incomplete() {
        assert!(parse_signature_header("t=1700000000").is_none());
        assert!(parse_signature_header("v1=abc123").is_none());
        assert!(parse_signature_header("garbage").is_none());
    }

    #[test]
    fn test_verify_signature_round_trip() {
        let now = 1_700_000_000;
        let header = signed_header(now, PAYLOAD);
        assert!(verify_signature(PAYLOAD, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_verify_signature_rejects_tampered_payload() {
        let now = 1_700_000_000;
        let header = signed_header(now, PAYLOAD);
        let result = verify_signature(r#"{"id":"evt_2"}"#, &header, SECRET, now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_verify_signature_rejects_stale_timestamp() {
        let signed_at = 1_700_000_000;
        let header = signed_header(signed_at, PAYLOAD);
        let result = verify_signature(
            PAYLOAD,
            &header,
            SECRET,
            signed_at + SIGNATURE_TOLERANCE_SECS + 1,
        );
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_verify_signature_rejects_wrong_secret() {
        let now = 1_700_000_000;
        let header = signed_header(now, PAYLOAD);
        let result = verify_signature(PAYLOAD, &header, "whsec_other", now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }
}
