//! Wire-level contracts for the Hypha actor runtime.
//!
//! Everything two Hosts need to agree on lives here:
//! - [`Reference`]: URL-keyed identity for hosts and processes, with the
//!   parent/child hierarchy encoded in the URL path
//! - [`Packet`]: the closed taxonomy of inter-host traffic
//! - [`SupervisionRequest`] / [`SupervisionResponse`]: the failure-escalation
//!   round-trip, correlated by [`RequestId`]
//! - [`Stance`] / [`Behavior`] / [`ProcessContext`]: the contract user code
//!   implements and the surface it sees while handling a message
//!
//! The runtime crate consumes these types; transports move them between
//! Hosts. Payloads, states and failure reasons are opaque
//! [`serde_json::Value`]s, so a concrete transport can serialize them
//! without knowing anything about the user's domain.

pub mod packet;
pub mod payload;
pub mod reference;
pub mod stance;
pub mod supervision;

pub use packet::{Message, Packet};
pub use payload::{Fault, Payload};
pub use reference::{Reference, ReferenceError, ReferenceKind};
pub use stance::{Behavior, Effect, ProcessContext, Stance};
pub use supervision::{RequestId, SupervisionEffect, SupervisionRequest, SupervisionResponse};
