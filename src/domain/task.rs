use crate::error::EscrowError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque caller-facing task identifier.
///
/// Generated once at creation, immutable and unique for the lifetime of the
/// process. Doubles as the correlation key embedded in the gateway object's
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh short identifier (first 8 hex chars of a v4 UUID).
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(hex[..8].to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the hold object at the external payment gateway.
///
/// Assigned exactly once when the hold is created; immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentRef(String);

impl PaymentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A positive monetary amount within the gateway's accepted range.
///
/// Wraps `rust_decimal::Decimal` to enforce the validation rules once, at the
/// boundary, instead of scattering checks across handlers.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    /// Largest amount the gateway accepts (8 digits in minor units).
    pub const MAX: Decimal = Decimal::from_parts(99_999_999, 0, 0, false, 2);

    pub fn new(value: Decimal) -> Result<Self, EscrowError> {
        if value <= Decimal::ZERO {
            return Err(EscrowError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        if value.normalize().scale() > 2 {
            return Err(EscrowError::Validation(
                "amount precision is limited to 2 decimal places".to_string(),
            ));
        }
        if value > Self::MAX {
            return Err(EscrowError::Validation(format!(
                "amount exceeds the gateway limit of {}",
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The amount in the gateway's minor units (cents for usd).
    pub fn minor_units(&self) -> i64 {
        // Validation in `new` guarantees this fits and is integral.
        (self.0 * Decimal::ONE_HUNDRED).to_i64().unwrap_or(0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EscrowError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code, lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    pub fn usd() -> Self {
        Self("usd".to_string())
    }

    pub fn new(code: &str) -> Result<Self, EscrowError> {
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_lowercase()))
        } else {
            Err(EscrowError::Validation(format!(
                "invalid currency code: {code:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escrow task status.
///
/// The happy path is `New -> Authorized -> Captured`; `Failed` absorbs any
/// non-terminal state. `Captured` and `Failed` are terminal. All transition
/// legality is decided here, in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    New,
    Authorized,
    Captured,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Captured | TaskStatus::Failed)
    }

    /// Position along the happy path. `Failed` sits outside it.
    fn rank(self) -> u8 {
        match self {
            TaskStatus::New => 0,
            TaskStatus::Authorized => 1,
            TaskStatus::Captured => 2,
            TaskStatus::Failed => 3,
        }
    }

    /// Whether moving to `target` is legal from this status.
    ///
    /// Skipping ahead is allowed (`New -> Captured` is valid, a successful
    /// capture implies authorization). Transitions to an already-reached or
    /// passed status are not, which is what makes duplicate notifications
    /// no-ops.
    pub fn can_transition_to(self, target: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match target {
            TaskStatus::Failed => true,
            _ => target.rank() > self.rank(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::New => "new",
            TaskStatus::Authorized => "authorized",
            TaskStatus::Captured => "captured",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The unit of escrow: an internal task correlated with one gateway hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub payment_ref: PaymentRef,
    pub amount: Amount,
    pub currency: Currency,
    pub description: String,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(
        task_id: TaskId,
        payment_ref: PaymentRef,
        amount: Amount,
        currency: Currency,
        description: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            payment_ref,
            amount,
            currency,
            description: description.into(),
            status: TaskStatus::New,
        }
    }
}

/// Read-only task summary returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub payment_ref: PaymentRef,
    pub amount: Amount,
    pub currency: Currency,
    pub description: String,
    pub status: TaskStatus,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            payment_ref: task.payment_ref.clone(),
            amount: task.amount,
            currency: task.currency.clone(),
            description: task.description.clone(),
            status: task.status,
        }
    }
}
