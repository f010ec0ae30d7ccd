use crate::domain::event::{EventKind, GatewayEvent};
use crate::domain::task::PaymentRef;
use crate::error::{EscrowError, Result};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Default acceptance window for notification timestamps, in seconds.
const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Authenticates inbound gateway notifications against the shared secret.
///
/// Verification is stateless and side-effect-free; a verifier never touches
/// the task store. The secret is held in a [`SecretString`] so it cannot
/// leak through debug output.
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<SecretString>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Overrides the staleness window (replay-risk bound).
    #[must_use]
    pub fn with_tolerance_secs(self, tolerance_secs: i64) -> Self {
        Self {
            tolerance_secs,
            ..self
        }
    }

    /// Verifies the signature header against the raw body and parses the
    /// payload into a typed event.
    ///
    /// Rejects payloads whose signature does not match, whose timestamp is
    /// outside the tolerance window, or whose body is not the expected JSON
    /// shape.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<GatewayEvent> {
        let parts = parse_signature_header(signature_header)?;

        let now = unix_now();
        if (now - parts.timestamp).abs() > self.tolerance_secs {
            return Err(EscrowError::Signature(
                "notification timestamp outside tolerance window".to_string(),
            ));
        }

        let signed_payload = [parts.timestamp.to_string().as_bytes(), b".", payload].concat();
        let expected = compute_signature(self.secret.expose_secret(), &signed_payload)?;
        let provided = hex::decode(&parts.signature).map_err(|_| {
            EscrowError::Signature("signature is not valid hex".to_string())
        })?;

        if expected.ct_eq(&provided).unwrap_u8() != 1 {
            return Err(EscrowError::Signature(
                "signature does not match payload".to_string(),
            ));
        }

        parse_event(payload)
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Parsed signature header parts.
struct SignatureParts {
    timestamp: i64,
    signature: String,
}

/// Parses the `t=<unix>,v1=<hex>` signature header. Unknown scheme versions
/// are ignored.
fn parse_signature_header(header: &str) -> Result<SignatureParts> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            return Err(EscrowError::Signature(
                "invalid signature header format".to_string(),
            ));
        };
        match key.trim() {
            "t" => timestamp = value.parse().ok(),
            "v1" => signature = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(SignatureParts {
        timestamp: timestamp.ok_or_else(|| {
            EscrowError::Signature("missing timestamp in signature header".to_string())
        })?,
        signature: signature.ok_or_else(|| {
            EscrowError::Signature("missing v1 signature in header".to_string())
        })?,
    })
}

/// HMAC-SHA256 over the signed payload.
fn compute_signature(secret: &str, signed_payload: &[u8]) -> Result<Vec<u8>> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| EscrowError::Signature("unusable webhook secret".to_string()))?;
    mac.update(signed_payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[derive(Deserialize)]
struct WirePayload {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: i64,
    data: WireData,
}

#[derive(Deserialize)]
struct WireData {
    object: serde_json::Value,
}

/// Parses a verified body into the typed event the dispatcher consumes.
fn parse_event(payload: &[u8]) -> Result<GatewayEvent> {
    let wire: WirePayload = serde_json::from_slice(payload).map_err(|e| {
        tracing::warn!(
            target: "taskhold::webhook",
            error = %e,
            "Failed to parse notification payload"
        );
        EscrowError::MalformedPayload("notification body is not valid JSON".to_string())
    })?;

    let payment_ref = wire
        .data
        .object
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            EscrowError::MalformedPayload("notification object has no id".to_string())
        })?;
    let reported_status = wire
        .data
        .object
        .get("status")
        .and_then(|v| v.as_str())
        .map(String::from);

    Ok(GatewayEvent {
        id: wire.id,
        kind: EventKind::from_wire(&wire.event_type),
        payment_ref: PaymentRef::new(payment_ref),
        reported_status,
        created: wire.created,
    })
}
