//! The two trait seams of the runtime.
//!
//! [`TransportContext`] is what a cluster transport provides to a Host;
//! [`ExecutorContext`] is what a Host provides to its executors. Executors
//! only ever hold the trait object, never the Host itself, which is what
//! keeps the ownership graph acyclic: executors live in the pool, the pool
//! lives in the host, and the host reaches executors only through the pool.

use async_trait::async_trait;

use hypha_protocol::{
    Fault, Message, Packet, Reference, Stance, SupervisionEffect, SupervisionRequest,
    SupervisionResponse,
};

use crate::error::{ContextError, TransportError};

/// A wall-clock sample, returned from resume steps that found nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Milliseconds since the Unix epoch, as reported by the transport.
    pub at: u64,
}

impl Tick {
    pub fn new(at: u64) -> Self {
        Self { at }
    }
}

/// Cluster-facing surface consumed by a [`Host`](crate::Host).
///
/// `publish` is fire-and-forget: the transport routes each packet to the
/// host currently owning the packet's target path, looping back locally
/// when that host is the publisher itself.
#[async_trait]
pub trait TransportContext: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn wallclock(&self) -> u64;

    async fn publish(&self, packet: Packet) -> Result<(), TransportError>;

    /// Claim a host identity in the cluster.
    async fn acquire(&self, host: &Reference) -> Result<(), TransportError>;

    /// Withdraw a host identity from the cluster.
    async fn release(&self, host: &Reference) -> Result<(), TransportError>;
}

/// Host-provided surface consumed by an [`Executor`](crate::Executor).
#[async_trait]
pub trait ExecutorContext: Send + Sync {
    /// Derive `parent/name` and request its scheduling. The executor is
    /// constructed wherever the create packet lands, which may be another
    /// host entirely.
    async fn create_process(
        &self,
        parent: &Reference,
        stance: Stance,
        name: &str,
    ) -> Result<Reference, ContextError>;

    /// Remove an ended process from the local pool. Must not fail for a
    /// live local process; a failure here is escalated as an invariant.
    async fn release_process(&self, process: &Reference) -> Result<(), ContextError>;

    /// Publish an ordinary message. Same-host targets take the same route
    /// as remote ones, which is what keeps delivery order uniform.
    async fn dispatch_message(&self, message: Message) -> Result<(), ContextError>;

    /// Publish a supervision response on behalf of a supervising parent.
    async fn dispatch_supervision_response(
        &self,
        response: SupervisionResponse,
    ) -> Result<(), ContextError>;

    /// Escalate a failure to the parent of `request.child` and block until
    /// the parent's verdict returns. The only cross-host suspension point.
    async fn supervise(
        &self,
        request: SupervisionRequest,
    ) -> Result<SupervisionEffect, ContextError>;

    /// Request termination of a (possibly remote) process.
    async fn terminate_process(&self, target: &Reference, reason: Fault)
        -> Result<(), ContextError>;

    /// Sample the transport's wall clock.
    fn tick(&self) -> Tick;
}
