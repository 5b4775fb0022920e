//! Failure taxonomy of the runtime.
//!
//! Two worlds that never mix: user failures travel as
//! [`Fault`](hypha_protocol::Fault)s through the supervision protocol, while
//! [`InvariantError`]s mark runtime bugs and crash loudly.

use std::time::Duration;

use thiserror::Error;

use hypha_protocol::{Reference, ReferenceError};

/// A broken runtime invariant: illegal state transitions, double inserts,
/// unknown references. These are bugs in the runtime or its caller, not
/// recoverable conditions, and they abort the executor or host path that
/// hit them.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("fsm invariant: {0}")]
    Fsm(String),

    #[error("executor invariant: {0}")]
    Executor(String),

    #[error("host invariant: {0}")]
    Host(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("unreachable: {0}")]
    Unreachable(String),
}

impl InvariantError {
    pub fn fsm(message: impl Into<String>) -> Self {
        Self::Fsm(message.into())
    }

    pub fn executor(message: impl Into<String>) -> Self {
        Self::Executor(message.into())
    }

    pub fn host(message: impl Into<String>) -> Self {
        Self::Host(message.into())
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }
}

/// Failures produced by a transport realization of
/// [`TransportContext`](crate::TransportContext).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no route for packet targeting {0}")]
    Unroutable(String),

    #[error("transport closed")]
    Closed,

    #[error("host {0} already claimed")]
    DuplicateClaim(String),

    #[error("unknown host {0}")]
    UnknownHost(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures crossing the executor/host boundary: what
/// [`ExecutorContext`](crate::ExecutorContext) methods raise.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Invariant(#[from] InvariantError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("supervision request {0} orphaned before a response arrived")]
    OrphanedSupervision(String),

    #[error("supervision request {0} rejected: {1}")]
    RejectedSupervision(String, hypha_protocol::Fault),

    #[error("supervision request {0} timed out after {1:?}")]
    SuperviseTimeout(String, Duration),
}

/// Failures surfaced by [`Host`](crate::Host) entry points.
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Invariant(#[from] InvariantError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("shutdown grace {grace:?} exceeded; still running: {stuck:?}")]
    GraceExceeded {
        grace: Duration,
        stuck: Vec<Reference>,
    },
}

/// Failures loading or validating a [`HostConfig`](crate::HostConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
