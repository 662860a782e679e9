//! Bulk SMS dispatch.
//!
//! Every recipient gets exactly one send attempt, in input order. A failure is
//! recorded against that recipient and the batch carries on. Spacing between
//! sends comes from a [`SendGate`] so it can be shared across requests and
//! replaced in tests.

use crate::errors::AppError;
use crate::notification_models::{BulkDispatchReport, SmsOutcome};
use crate::sms::{SentMessage, SmsTransport};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Normalizes a phone number to E.164 assuming North-American numbering.
///
/// Strips every non-digit, then prefixes `+` when the digits already start
/// with the country code `1`, and `+1` otherwise. Numbers from other regions
/// come out wrong; callers are expected to send NANP numbers only.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.starts_with('1') {
        format!("+{}", digits)
    } else {
        format!("+1{}", digits)
    }
}

/// Admission control in front of the SMS provider.
#[async_trait]
pub trait SendGate: Send + Sync {
    /// Resolves when the next send may start.
    async fn acquire(&self);
}

/// Keeps consecutive send starts at least `interval` apart.
///
/// One instance is shared by the whole process so that concurrent bulk
/// requests together stay under the provider's rate limit.
pub struct FixedIntervalGate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl FixedIntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SendGate for FixedIntervalGate {
    async fn acquire(&self) {
        // Holding the lock while waiting queues callers in arrival order
        let mut next_slot = self.next_slot.lock().await;
        if let Some(at) = *next_slot {
            tokio::time::sleep_until(at).await;
        }
        *next_slot = Some(Instant::now() + self.interval);
    }
}

/// A gate that never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnpacedGate;

#[async_trait]
impl SendGate for UnpacedGate {
    async fn acquire(&self) {}
}

/// Sends one message to many recipients through a paced transport.
#[derive(Clone)]
pub struct BulkDispatcher {
    transport: Arc<dyn SmsTransport>,
    gate: Arc<dyn SendGate>,
    max_in_flight: usize,
}

impl BulkDispatcher {
    /// `max_in_flight` bounds concurrent sends; 1 means strictly sequential.
    pub fn new(
        transport: Arc<dyn SmsTransport>,
        gate: Arc<dyn SendGate>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            transport,
            gate,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Sends a single message through the shared gate.
    ///
    /// `to` must already be normalized. Single sends wait their turn behind
    /// any bulk batch in flight.
    pub async fn send_paced(&self, to: &str, body: &str) -> Result<SentMessage, AppError> {
        self.gate.acquire().await;
        self.transport.send(to, body).await
    }

    /// Sends `message` to every recipient and reports one outcome per recipient.
    ///
    /// Runs to completion: there is no cancellation and no retry.
    pub async fn dispatch(
        &self,
        business_id: &str,
        message: &str,
        recipients: &[String],
    ) -> BulkDispatchReport {
        tracing::info!(
            "Bulk SMS for business {}: {} recipient(s)",
            business_id,
            recipients.len()
        );

        let results: Vec<SmsOutcome> = stream::iter(recipients.to_vec())
            .map(|phone: String| self.send_one(phone, message))
            .buffered(self.max_in_flight)
            .collect()
            .await;

        let report = BulkDispatchReport::from_outcomes(results);
        tracing::info!(
            "Bulk SMS for business {} complete: {} sent, {} failed",
            business_id,
            report.successful,
            report.failed
        );
        report
    }

    async fn send_one(&self, phone: String, message: &str) -> SmsOutcome {
        let to = normalize_phone(&phone);

        match self.send_paced(&to, message).await {
            Ok(sent) => SmsOutcome::sent(&phone, sent.sid),
            Err(e) => {
                tracing::warn!("SMS to {} failed: {}", to, e);
                SmsOutcome::failed(&phone, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Records destinations and fails for numbers listed in `reject`.
    #[derive(Default)]
    struct RecordingTransport {
        sent_to: StdMutex<Vec<String>>,
        reject: Vec<String>,
    }

    #[async_trait]
    impl SmsTransport for RecordingTransport {
        async fn send(&self, to: &str, _body: &str) -> Result<SentMessage, AppError> {
            let n = {
                let mut sent = self.sent_to.lock().unwrap();
                sent.push(to.to_string());
                sent.len()
            };
            if self.reject.iter().any(|r| r == to) {
                return Err(AppError::ExternalApiError("invalid number".into()));
            }
            Ok(SentMessage {
                sid: format!("SM{}", n),
                status: "queued".into(),
            })
        }
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("(555) 123-4567"), "+15551234567");
        assert_eq!(normalize_phone("1-555-123-4567"), "+15551234567");
        assert_eq!(normalize_phone("+1 555 123 4567"), "+15551234567");
        assert_eq!(normalize_phone("5551234567"), "+15551234567");
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let transport = Arc::new(RecordingTransport {
            reject: vec!["+15550000002".into()],
            ..Default::default()
        });
        let dispatcher = BulkDispatcher::new(transport.clone(), Arc::new(UnpacedGate), 1);

        let recipients = vec![
            "555-000-0001".to_string(),
            "555-000-0002".to_string(),
            "555-000-0003".to_string(),
        ];
        let report = dispatcher.dispatch("biz-1", "hello", &recipients).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(transport.sent_to.lock().unwrap().len(), 3);

        let phones: Vec<&str> = report.results.iter().map(|r| r.phone.as_str()).collect();
        assert_eq!(phones, vec!["555-000-0001", "555-000-0002", "555-000-0003"]);
        assert!(!report.results[1].success);
        assert!(report.results[1].error.as_deref().unwrap().contains("invalid number"));
        assert_eq!(report.results[2].message_id.as_deref(), Some("SM3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_gate_spaces_sends() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Arc::new(FixedIntervalGate::new(Duration::from_millis(100)));
        let dispatcher = BulkDispatcher::new(transport, gate, 1);

        let recipients: Vec<String> = (0..5).map(|i| format!("555000000{}", i)).collect();
        let started = Instant::now();
        let report = dispatcher.dispatch("biz-1", "hello", &recipients).await;

        assert_eq!(report.successful, 5);
        // Four gaps between five sends
        assert!(started.elapsed() >= Duration::from_millis(400));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_is_shared_across_batches() {
        let gate: Arc<dyn SendGate> = Arc::new(FixedIntervalGate::new(Duration::from_millis(100)));
        let first = BulkDispatcher::new(Arc::new(RecordingTransport::default()), gate.clone(), 1);
        let second = BulkDispatcher::new(Arc::new(RecordingTransport::default()), gate, 1);

        let recipients: Vec<String> = (0..3).map(|i| format!("555000000{}", i)).collect();
        let started = Instant::now();
        tokio::join!(
            first.dispatch("a", "hi", &recipients),
            second.dispatch("b", "hi", &recipients)
        );

        // Six sends through one gate need five intervals
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_sends_share_the_bulk_gate() {
        let gate: Arc<dyn SendGate> = Arc::new(FixedIntervalGate::new(Duration::from_millis(100)));
        let dispatcher = BulkDispatcher::new(Arc::new(RecordingTransport::default()), gate, 1);

        let recipients: Vec<String> = (0..2).map(|i| format!("555000000{}", i)).collect();
        let started = Instant::now();
        let (report, single) = tokio::join!(
            dispatcher.dispatch("biz-1", "hello", &recipients),
            dispatcher.send_paced("+15559990000", "reminder")
        );

        assert_eq!(report.successful, 2);
        assert!(single.is_ok());
        // Three sends through one gate need two intervals
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_bounded_concurrency_keeps_input_order() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = BulkDispatcher::new(transport, Arc::new(UnpacedGate), 4);

        let recipients: Vec<String> = (0..10).map(|i| format!("55500000{:02}", i)).collect();
        let report = dispatcher.dispatch("biz-1", "hello", &recipients).await;

        let phones: Vec<String> = report.results.iter().map(|r| r.phone.clone()).collect();
        assert_eq!(phones, recipients);
    }
}
