//! The boundary between a local runtime and the cluster.
//!
//! A [`Host`] turns transport-delivered packets into executor events and
//! executor-requested effects into outbound packets. It owns the
//! [`ExecutorPool`] and implements [`ExecutorContext`] on its core, so each
//! executor sees a flat trait object rather than the host itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hypha_protocol::{
    Fault, Message, Packet, Payload, Reference, ReferenceKind, Stance, SupervisionEffect,
    SupervisionRequest, SupervisionResponse,
};

use crate::config::HostConfig;
use crate::context::{ExecutorContext, Tick, TransportContext};
use crate::error::{ContextError, HostError, InvariantError};
use crate::executor::Executor;
use crate::pool::ExecutorPool;

/// A local runtime: one pool of executors bound to one transport context.
/// Cheap to clone; all clones share the same core.
#[derive(Clone)]
pub struct Host {
    core: Arc<HostCore>,
}

struct HostCore {
    reference: Reference,
    config: HostConfig,
    transport: Arc<dyn TransportContext>,
    pool: ExecutorPool,
}

impl Host {
    pub fn new(
        reference: Reference,
        config: HostConfig,
        transport: Arc<dyn TransportContext>,
    ) -> Result<Self, HostError> {
        if reference.kind() != ReferenceKind::Host {
            return Err(InvariantError::host(format!(
                "{reference} is not a host reference"
            ))
            .into());
        }
        Ok(Self {
            core: Arc::new(HostCore {
                reference,
                config,
                transport,
                pool: ExecutorPool::new(),
            }),
        })
    }

    pub fn reference(&self) -> &Reference {
        &self.core.reference
    }

    pub fn has_process(&self, process: &Reference) -> bool {
        self.core.pool.has_process(process)
    }

    pub fn process_count(&self) -> usize {
        self.core.pool.len()
    }

    /// Claim this host's identity in the cluster. Must complete before the
    /// transport starts delivering packets here.
    pub async fn start(&self) -> Result<(), HostError> {
        self.core.transport.acquire(&self.core.reference).await?;
        tracing::info!(host = %self.core.reference, "host acquired");
        Ok(())
    }

    /// Kill every local executor, wait up to the configured grace for the
    /// pool to drain, then release the host identity. An executor stuck in
    /// user code cannot be preempted; such stragglers are reported in
    /// [`HostError::GraceExceeded`].
    pub async fn shutdown(&self, reason: impl Into<Fault>) -> Result<(), HostError> {
        let reason = reason.into();
        for executor in self.core.pool.executors() {
            executor.kill(reason.clone());
        }

        let grace = self.core.config.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while !self.core.pool.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        self.core.transport.release(&self.core.reference).await?;
        match drained {
            Ok(()) => {
                tracing::info!(host = %self.core.reference, "host released");
                Ok(())
            }
            Err(_) => {
                let stuck = self.core.pool.references();
                tracing::warn!(host = %self.core.reference, stuck = ?stuck, "shutdown grace exceeded");
                Err(HostError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Inbound dispatch: the transport hands every packet routed to this
    /// host here.
    pub async fn receive(&self, packet: Packet) -> Result<(), HostError> {
        tracing::trace!(host = %self.core.reference, kind = packet.kind(), "inbound packet");
        match packet {
            Packet::Message(message) => {
                let executor = self.core.pool.executor(&message.receiver)?;
                executor.push_message(message)?;
                executor.wake();
                Ok(())
            }
            Packet::SupervisionRequest(request) => {
                let parent = request.child.parent()?;
                if !self.core.pool.has_process(&parent) {
                    // Answer the safe default so the failed child does not
                    // hang, then surface the mis-route as the bug it is.
                    let fallback = request.response(SupervisionEffect::Stop);
                    self.core
                        .transport
                        .publish(Packet::SupervisionResponse(fallback))
                        .await?;
                    return Err(InvariantError::host(format!(
                        "supervision request {} routed here, but parent {parent} is not local",
                        request.id
                    ))
                    .into());
                }
                let executor = self.core.pool.executor(&parent)?;
                executor.push_supervision_request(request)?;
                executor.wake();
                Ok(())
            }
            Packet::SupervisionResponse(response) => {
                Ok(self.core.pool.resolve_deferred(&response)?)
            }
            Packet::SchedulingCreate { child, stance } => {
                let context: Arc<dyn ExecutorContext> = self.core.clone();
                let executor = Arc::new(Executor::new(context, child.clone(), stance));
                executor.start()?;
                self.core.pool.insert_process(&child, executor.clone())?;
                let task = tokio::spawn(executor.clone().run());
                self.core.pool.attach_task(&child, task)?;
                executor.wake();
                tracing::debug!(host = %self.core.reference, process = %child, "process scheduled");
                Ok(())
            }
            Packet::SchedulingTerminate { target, reason } => {
                let executor = self.core.pool.executor(&target)?;
                executor.kill(reason);
                Ok(())
            }
        }
    }

    /// Request creation of a process. Routed through the transport like any
    /// other scheduling, even when the target path is local.
    pub async fn create(&self, process: Reference, stance: Stance) -> Result<(), HostError> {
        self.core
            .transport
            .publish(Packet::SchedulingCreate {
                child: process,
                stance,
            })
            .await?;
        Ok(())
    }

    /// Inject a message into the cluster on behalf of `sender`.
    pub async fn send(
        &self,
        sender: Reference,
        receiver: Reference,
        payload: impl Into<Payload>,
    ) -> Result<(), HostError> {
        self.core
            .dispatch_message(Message {
                sender,
                receiver,
                payload: payload.into(),
            })
            .await?;
        Ok(())
    }

    /// Request termination of a (possibly remote) process.
    pub async fn terminate(
        &self,
        target: Reference,
        reason: impl Into<Fault>,
    ) -> Result<(), HostError> {
        self.core.terminate_process(&target, reason.into()).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("reference", &self.core.reference)
            .field("processes", &self.core.pool.len())
            .finish()
    }
}

#[async_trait]
impl ExecutorContext for HostCore {
    async fn create_process(
        &self,
        parent: &Reference,
        stance: Stance,
        name: &str,
    ) -> Result<Reference, ContextError> {
        let child = parent.child(name)?;
        self.transport
            .publish(Packet::SchedulingCreate {
                child: child.clone(),
                stance,
            })
            .await?;
        Ok(child)
    }

    async fn release_process(&self, process: &Reference) -> Result<(), ContextError> {
        Ok(self.pool.delete_process(process)?)
    }

    async fn dispatch_message(&self, message: Message) -> Result<(), ContextError> {
        Ok(self.transport.publish(Packet::Message(message)).await?)
    }

    async fn dispatch_supervision_response(
        &self,
        response: SupervisionResponse,
    ) -> Result<(), ContextError> {
        Ok(self
            .transport
            .publish(Packet::SupervisionResponse(response))
            .await?)
    }

    async fn supervise(
        &self,
        request: SupervisionRequest,
    ) -> Result<SupervisionEffect, ContextError> {
        let id = request.id;
        let join = self.pool.insert_deferred(&request)?;
        self.transport
            .publish(Packet::SupervisionRequest(request))
            .await?;

        let outcome = match self.config.supervise_timeout() {
            Some(limit) => tokio::time::timeout(limit, join.join())
                .await
                .map_err(|_| ContextError::SuperviseTimeout(id.to_string(), limit))?,
            None => join.join().await,
        };
        let response = outcome
            .map_err(|_| ContextError::OrphanedSupervision(id.to_string()))?
            .map_err(|fault| ContextError::RejectedSupervision(id.to_string(), fault))?;
        Ok(response.effect)
    }

    async fn terminate_process(
        &self,
        target: &Reference,
        reason: Fault,
    ) -> Result<(), ContextError> {
        Ok(self
            .transport
            .publish(Packet::SchedulingTerminate {
                target: target.clone(),
                reason,
            })
            .await?)
    }

    fn tick(&self) -> Tick {
        Tick::new(self.transport.wallclock())
    }
}
