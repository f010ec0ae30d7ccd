//! Application layer orchestrating the escrow state machine.
//!
//! The [`dispatcher::EventDispatcher`] consumes verified gateway
//! notifications; the [`facade::EscrowFacade`] is the surface the external
//! messaging frontend calls. Both mutate state exclusively through the
//! task store's compare-and-transition primitive.

pub mod dispatcher;
pub mod facade;
