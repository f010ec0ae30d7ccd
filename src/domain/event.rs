use super::task::{PaymentRef, TaskStatus};

/// Classification of gateway notification types.
///
/// The wire names are the gateway's own; everything the dispatcher does not
/// react to collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Funds were authorized and are now capturable.
    HoldAuthorized,
    /// A capture completed and the funds were transferred.
    CaptureSucceeded,
    /// The payment failed or the hold was canceled/expired.
    PaymentFailed,
    /// Any other event type; verified fine, ignored downstream.
    Other,
}

impl EventKind {
    pub fn from_wire(event_type: &str) -> Self {
        match event_type {
            "payment_intent.amount_capturable_updated" => EventKind::HoldAuthorized,
            "payment_intent.succeeded" => EventKind::CaptureSucceeded,
            "payment_intent.payment_failed" | "payment_intent.canceled" => {
                EventKind::PaymentFailed
            }
            _ => EventKind::Other,
        }
    }

    /// The fixed event-type to task-status table.
    pub fn target_status(self) -> Option<TaskStatus> {
        match self {
            EventKind::HoldAuthorized => Some(TaskStatus::Authorized),
            EventKind::CaptureSucceeded => Some(TaskStatus::Captured),
            EventKind::PaymentFailed => Some(TaskStatus::Failed),
            EventKind::Other => None,
        }
    }
}

/// A verified notification from the gateway, ready for dispatch.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    /// The gateway's event id, unique per delivery attempt family.
    pub id: String,
    pub kind: EventKind,
    /// The hold object the event refers to.
    pub payment_ref: PaymentRef,
    /// Status string the gateway reported on the object, if any.
    pub reported_status: Option<String>,
    /// Unix timestamp the gateway created the event at.
    pub created: i64,
}
