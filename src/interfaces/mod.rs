//! Inbound boundary adapters.
//!
//! The webhook verifier turns a raw signed notification body into a typed
//! [`GatewayEvent`](crate::domain::event::GatewayEvent) or rejects it; it is
//! the only code that sees unauthenticated input.

pub mod webhook;
