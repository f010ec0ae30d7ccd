//! Live gateway adapter for the Stripe PaymentIntents API.
//!
//! Holds are PaymentIntents created with `capture_method=manual`; release is
//! a capture call; fallback lookups use the search API over the correlation
//! key stored in metadata. Transient failures (429, 5xx, timeouts) are
//! retried with exponential backoff before surfacing.

use crate::domain::ports::{CaptureOutcome, CreateHoldRequest, PaymentGateway};
use crate::domain::task::{PaymentRef, TaskId};
use crate::error::GatewayError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

/// Metadata key carrying the internal correlation key on the gateway object.
const META_TASK_ID: &str = "task_id";

/// Error code Stripe returns when a capture hits an already-final intent.
const CODE_UNEXPECTED_STATE: &str = "payment_intent_unexpected_state";

/// Configuration for the live gateway adapter.
#[derive(Debug, Clone)]
pub struct StripeGatewayConfig {
    /// API base URL; overridable for tests against a local stub.
    pub api_base: String,
    /// Maximum number of retry attempts for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Per-attempt request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for StripeGatewayConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.stripe.com".to_string(),
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_seconds: 30,
        }
    }
}

impl StripeGatewayConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Error returned when API key validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidApiKeyError {
    /// Description of why the key is invalid.
    pub reason: String,
}

impl std::fmt::Display for InvalidApiKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid Stripe API key: {}", self.reason)
    }
}

impl std::error::Error for InvalidApiKeyError {}

/// Validate a Stripe secret key format (`sk_test_`, `sk_live_`, `rk_test_`,
/// `rk_live_`).
fn validate_api_key(key: &str) -> Result<(), InvalidApiKeyError> {
    const MIN_KEY_LENGTH: usize = 20;

    if key.is_empty() {
        return Err(InvalidApiKeyError {
            reason: "API key cannot be empty".to_string(),
        });
    }
    if key.len() < MIN_KEY_LENGTH {
        return Err(InvalidApiKeyError {
            reason: format!("API key too short (minimum {MIN_KEY_LENGTH} characters)"),
        });
    }
    let valid_prefixes = ["sk_test_", "sk_live_", "rk_test_", "rk_live_"];
    if !valid_prefixes.iter().any(|prefix| key.starts_with(prefix)) {
        return Err(InvalidApiKeyError {
            reason: "API key must start with sk_test_, sk_live_, rk_test_, or rk_live_"
                .to_string(),
        });
    }
    Ok(())
}

/// Gateway adapter backed by Stripe's REST API.
///
/// The secret key is held in a [`SecretString`] and never appears in debug
/// output. Mutating calls carry a fresh idempotency key per logical
/// operation, reused across retry attempts.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    api_key: SecretString,
    config: StripeGatewayConfig,
}

impl StripeGateway {
    /// Creates a new adapter after validating the key format.
    pub fn new(
        api_key: impl Into<SecretString>,
        config: StripeGatewayConfig,
    ) -> Result<Self, InvalidApiKeyError> {
        let api_key: SecretString = api_key.into();
        validate_api_key(api_key.expose_secret())?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            config,
        })
    }

    /// Creates an adapter with default configuration.
    pub fn with_default_config(
        api_key: impl Into<SecretString>,
    ) -> Result<Self, InvalidApiKeyError> {
        Self::new(api_key, StripeGatewayConfig::default())
    }

    /// Reads the secret key from the `STRIPE_SECRET` environment variable,
    /// as the deployment convention has it.
    pub fn from_env() -> Result<Self, InvalidApiKeyError> {
        let key = std::env::var("STRIPE_SECRET").map_err(|_| InvalidApiKeyError {
            reason: "environment variable STRIPE_SECRET is not set".to_string(),
        })?;
        Self::with_default_config(key)
    }

    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        let key = self.api_key.expose_secret();
        key.starts_with("sk_test_") || key.starts_with("rk_test_")
    }

    #[inline]
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    #[inline]
    fn generate_idempotency_key(operation: &str) -> String {
        format!("{}_{}", operation, uuid::Uuid::new_v4())
    }

    /// POST a form-encoded request, retrying transient failures, and parse
    /// the JSON body on success.
    async fn post_form(
        &self,
        operation: &'static str,
        url: String,
        form: Vec<(String, String)>,
    ) -> Result<serde_json::Value, GatewayError> {
        let idempotency_key = Self::generate_idempotency_key(operation);
        self.with_retry(operation, || {
            let request = self
                .http
                .post(&url)
                .bearer_auth(self.api_key.expose_secret())
                .header("Idempotency-Key", &idempotency_key)
                .form(&form);
            async move { Self::execute(operation, request).await }
        })
        .await
    }

    /// GET with query parameters, retrying transient failures.
    async fn get_query(
        &self,
        operation: &'static str,
        url: String,
        query: Vec<(String, String)>,
    ) -> Result<serde_json::Value, GatewayError> {
        self.with_retry(operation, || {
            let request = self
                .http
                .get(&url)
                .bearer_auth(self.api_key.expose_secret())
                .query(&query);
            async move { Self::execute(operation, request).await }
        })
        .await
    }

    /// Sends one attempt and classifies the outcome.
    async fn execute(
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, GatewayError> {
        let response = request.send().await.map_err(|e| GatewayError::Transport {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| GatewayError::Transport {
                    operation: operation.to_string(),
                    message: format!("malformed response body: {e}"),
                });
        }

        let body: ApiErrorBody = response.json().await.unwrap_or_default();
        Err(GatewayError::Api {
            operation: operation.to_string(),
            message: body
                .error
                .message
                .unwrap_or_else(|| format!("HTTP {status}")),
            code: body.error.code,
            http_status: Some(status.as_u16()),
        })
    }

    /// Runs an attempt factory under the configured timeout, retrying
    /// retryable failures with capped exponential backoff.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        attempt: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, GatewayError>>,
    {
        let timeout = self.timeout();
        let mut attempts = 0;

        loop {
            let outcome = match tokio::time::timeout(timeout, attempt()).await {
                Ok(result) => result,
                Err(_elapsed) => Err(GatewayError::Timeout {
                    operation: operation.to_string(),
                    timeout,
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_retryable() || attempts >= self.config.max_retries {
                        return Err(err);
                    }
                    let delay = backoff_delay(
                        attempts,
                        self.config.base_delay_ms,
                        self.config.max_delay_ms,
                    );
                    tracing::warn!(
                        target: "taskhold::gateway",
                        operation,
                        attempt = attempts + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying gateway call after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                }
            }
        }
    }
}

// Debug implementation that doesn't expose the API key.
impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("config", &self.config)
            .field("is_test_mode", &self.is_test_mode())
            .finish_non_exhaustive()
    }
}

/// Exponential backoff capped at `max_ms`.
#[inline]
fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(max_ms))
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Vec<PaymentIntentObject>,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_hold(
        &self,
        request: CreateHoldRequest,
    ) -> Result<PaymentRef, GatewayError> {
        let url = format!("{}/v1/payment_intents", self.config.api_base);
        let form = vec![
            ("amount".to_string(), request.amount.minor_units().to_string()),
            ("currency".to_string(), request.currency.as_str().to_string()),
            ("capture_method".to_string(), "manual".to_string()),
            ("payment_method_types[]".to_string(), "card".to_string()),
            ("description".to_string(), request.description.clone()),
            (
                format!("metadata[{META_TASK_ID}]"),
                request.correlation_key.to_string(),
            ),
        ];

        let value = self.post_form("create_hold", url, form).await?;
        let intent: PaymentIntentObject =
            serde_json::from_value(value).map_err(|e| GatewayError::Transport {
                operation: "create_hold".to_string(),
                message: format!("malformed payment intent: {e}"),
            })?;
        Ok(PaymentRef::new(intent.id))
    }

    async fn capture(
        &self,
        payment_ref: &PaymentRef,
    ) -> Result<CaptureOutcome, GatewayError> {
        let url = format!(
            "{}/v1/payment_intents/{}/capture",
            self.config.api_base, payment_ref
        );

        match self.post_form("capture", url, Vec::new()).await {
            Ok(_) => Ok(CaptureOutcome::Captured),
            // The intent reached a final state before this call; report that
            // recognizably instead of failing.
            Err(GatewayError::Api { code: Some(ref code), .. })
                if code.as_str() == CODE_UNEXPECTED_STATE =>
            {
                Ok(CaptureOutcome::AlreadyFinal)
            }
            Err(err) => Err(err),
        }
    }

    async fn lookup(
        &self,
        correlation_key: &TaskId,
    ) -> Result<Option<PaymentRef>, GatewayError> {
        let url = format!("{}/v1/payment_intents/search", self.config.api_base);
        let query = vec![
            (
                "query".to_string(),
                format!("metadata['{META_TASK_ID}']:'{correlation_key}'"),
            ),
            ("limit".to_string(), "1".to_string()),
        ];

        let value = self.get_query("lookup", url, query).await?;
        let page: SearchPage =
            serde_json::from_value(value).map_err(|e| GatewayError::Transport {
                operation: "lookup".to_string(),
                message: format!("malformed search page: {e}"),
            })?;
        Ok(page.data.into_iter().next().map(|pi| PaymentRef::new(pi.id)))
    }
}
