// Each test binary compiles its own copy; not every binary uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use taskhold::domain::ports::{CaptureOutcome, CreateHoldRequest, PaymentGateway};
use taskhold::domain::task::{PaymentRef, TaskId};
use taskhold::error::GatewayError;

/// In-process gateway double. Hands out sequential payment references,
/// remembers holds by correlation key for lookup, and counts capture calls
/// so tests can assert the at-most-once property.
#[derive(Default)]
pub struct MockGateway {
    next_ref: AtomicUsize,
    pub capture_calls: AtomicUsize,
    holds: Mutex<HashMap<TaskId, PaymentRef>>,
    captured: Mutex<HashSet<PaymentRef>>,
    canceled: Mutex<HashSet<PaymentRef>>,
    capture_delay: Option<Duration>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Widens the race window between the status check and the capture
    /// completing, for the concurrency tests.
    pub fn with_capture_delay(delay: Duration) -> Self {
        Self {
            capture_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn capture_count(&self) -> usize {
        self.capture_calls.load(Ordering::SeqCst)
    }

    /// Settles the hold gateway-side, as a card decline or expiry would.
    /// Subsequent captures report `AlreadyFinal`.
    pub fn cancel(&self, payment_ref: &PaymentRef) {
        self.canceled.lock().unwrap().insert(payment_ref.clone());
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_hold(
        &self,
        request: CreateHoldRequest,
    ) -> Result<PaymentRef, GatewayError> {
        let n = self.next_ref.fetch_add(1, Ordering::SeqCst);
        let payment_ref = PaymentRef::new(format!("pi_mock_{n}"));
        self.holds
            .lock()
            .unwrap()
            .insert(request.correlation_key, payment_ref.clone());
        Ok(payment_ref)
    }

    async fn capture(
        &self,
        payment_ref: &PaymentRef,
    ) -> Result<CaptureOutcome, GatewayError> {
        if let Some(delay) = self.capture_delay {
            tokio::time::sleep(delay).await;
        }
        if self.canceled.lock().unwrap().contains(payment_ref) {
            return Ok(CaptureOutcome::AlreadyFinal);
        }
        let mut captured = self.captured.lock().unwrap();
        if captured.contains(payment_ref) {
            return Ok(CaptureOutcome::AlreadyFinal);
        }
        captured.insert(payment_ref.clone());
        drop(captured);
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CaptureOutcome::Captured)
    }

    async fn lookup(
        &self,
        correlation_key: &TaskId,
    ) -> Result<Option<PaymentRef>, GatewayError> {
        Ok(self.holds.lock().unwrap().get(correlation_key).cloned())
    }
}

/// Builds a `t=..,v1=..` signature header the way the gateway signs
/// notifications.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    type HmacSha256 = Hmac<Sha256>;

    let signed = [timestamp.to_string().as_bytes(), b".", payload].concat();
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(&signed);
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={sig}")
}

/// A notification body in the gateway's wire shape.
pub fn notification_body(event_id: &str, event_type: &str, payment_ref: &str) -> String {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "created": unix_now(),
        "data": {
            "object": {
                "id": payment_ref,
                "status": "unspecified"
            }
        }
    })
    .to_string()
}

pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
