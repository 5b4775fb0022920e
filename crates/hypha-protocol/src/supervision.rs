//! The failure-escalation round-trip.
//!
//! When a process fails, its executor builds a [`SupervisionRequest`] and the
//! runtime routes it to the host owning the failed process's parent. The
//! parent's strategy answers with a [`SupervisionResponse`] carrying the same
//! [`RequestId`], which is how the waiting side correlates the two.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::Payload;
use crate::reference::Reference;

/// Correlation id for one supervision round-trip. Fresh UUID v4 per request;
/// unique for at least the lifetime of the pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// The parent's verdict on a child failure.
///
/// Closed on purpose: `restart` and `escalate` have no runtime semantics yet
/// and are rejected rather than silently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisionEffect {
    /// Keep the child running with its current stance. The message that
    /// caused the failure is already consumed.
    Resume,
    /// Terminate the child.
    Stop,
}

impl std::fmt::Display for SupervisionEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resume => f.write_str("resume"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

/// A child's escalation of its own failure to its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionRequest {
    pub id: RequestId,
    pub child: Reference,
    pub reason: Payload,
}

impl SupervisionRequest {
    pub fn new(child: Reference, reason: impl Into<Payload>) -> Self {
        Self {
            id: RequestId::fresh(),
            child,
            reason: reason.into(),
        }
    }

    /// Build the response correlated to this request.
    pub fn response(&self, effect: SupervisionEffect) -> SupervisionResponse {
        SupervisionResponse {
            id: self.id,
            child: self.child.clone(),
            effect,
        }
    }
}

/// The parent's answer, routed back to the failed child's host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionResponse {
    pub id: RequestId,
    pub child: Reference,
    pub effect: SupervisionEffect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_unique() {
        assert_ne!(RequestId::fresh(), RequestId::fresh());
    }

    #[test]
    fn test_id_is_canonical_uuid_v4() {
        let text = RequestId::fresh().to_string();
        assert_eq!(text.len(), 36);
        let dashes: Vec<usize> = text
            .char_indices()
            .filter(|(_, c)| *c == '-')
            .map(|(i, _)| i)
            .collect();
        assert_eq!(dashes, vec![8, 13, 18, 23]);
        // version nibble
        assert_eq!(text.as_bytes()[14], b'4');
        // variant nibble
        assert!(matches!(
            text.as_bytes()[19],
            b'8' | b'9' | b'a' | b'b'
        ));
    }

    #[test]
    fn test_response_correlates_to_request() {
        let child = Reference::process("proc://a/c").unwrap();
        let request = SupervisionRequest::new(child.clone(), "boom");
        let response = request.response(SupervisionEffect::Resume);
        assert_eq!(response.id, request.id);
        assert_eq!(response.child, child);
        assert_eq!(response.effect, SupervisionEffect::Resume);
    }

    #[test]
    fn test_effect_serde_closed() {
        assert_eq!(
            serde_json::from_str::<SupervisionEffect>("\"resume\"").unwrap(),
            SupervisionEffect::Resume
        );
        assert_eq!(
            serde_json::from_str::<SupervisionEffect>("\"stop\"").unwrap(),
            SupervisionEffect::Stop
        );
        assert!(serde_json::from_str::<SupervisionEffect>("\"restart\"").is_err());
        assert!(serde_json::from_str::<SupervisionEffect>("\"escalate\"").is_err());
    }
}
