//! The closed taxonomy of inter-host traffic.
//!
//! Every interaction between hosts is one of five packet kinds, which is what
//! makes local and remote delivery interchangeable: an executor never knows
//! whether its packets loop back or cross the cluster.
//!
//! Wire encoding is the transport's concern. The in-memory transport moves
//! these values directly; a network transport would serialize payloads and
//! references and substitute a behavior registry for the `Arc<dyn Behavior>`
//! inside a scheduled stance.

use crate::payload::{Fault, Payload};
use crate::reference::{Reference, ReferenceError};
use crate::stance::Stance;
use crate::supervision::{SupervisionRequest, SupervisionResponse};

/// An ordinary actor-to-actor message.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: Reference,
    pub receiver: Reference,
    pub payload: Payload,
}

/// One unit of inter-host traffic.
#[derive(Debug, Clone)]
pub enum Packet {
    Message(Message),
    SupervisionRequest(SupervisionRequest),
    SupervisionResponse(SupervisionResponse),
    SchedulingCreate { child: Reference, stance: Stance },
    SchedulingTerminate { target: Reference, reason: Fault },
}

impl Packet {
    /// The reference this packet must be routed to: the host owning that
    /// path delivers it. Fails only for a supervision request whose child is
    /// a root, which has no parent to escalate to.
    pub fn target(&self) -> Result<Reference, ReferenceError> {
        match self {
            Packet::Message(m) => Ok(m.receiver.clone()),
            Packet::SupervisionRequest(r) => r.child.parent(),
            Packet::SupervisionResponse(r) => Ok(r.child.clone()),
            Packet::SchedulingCreate { child, .. } => Ok(child.clone()),
            Packet::SchedulingTerminate { target, .. } => Ok(target.clone()),
        }
    }

    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Message(_) => "message",
            Packet::SupervisionRequest(_) => "supervision-request",
            Packet::SupervisionResponse(_) => "supervision-response",
            Packet::SchedulingCreate { .. } => "scheduling-create",
            Packet::SchedulingTerminate { .. } => "scheduling-terminate",
        }
    }
}
