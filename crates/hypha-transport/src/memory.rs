//! In-process cluster of hosts.
//!
//! Every published packet goes through one unbounded queue consumed by a
//! single router task, so global delivery order equals publish order; that
//! is what upholds the same-sender FIFO guarantee without per-pair
//! bookkeeping. Routing is by reference ownership: the claimed host with
//! the longest path owning the packet's target receives it, which is also
//! how a child subtree ends up on a different host than its parent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::mpsc;

use hypha_protocol::{Packet, Reference};
use hypha_runtime::{Host, HostConfig, HostError, TransportContext, TransportError};

struct HostSlot {
    reference: Reference,
    host: Host,
    claimed: bool,
}

struct ClusterInner {
    tx: mpsc::UnboundedSender<Packet>,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl ClusterInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, HostSlot>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An in-memory cluster. Hosts join it, claim a URL subtree, and from then
/// on receive every packet whose target falls inside their claim.
#[derive(Clone)]
pub struct MemoryCluster {
    inner: Arc<ClusterInner>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ClusterInner {
            tx,
            hosts: Mutex::new(HashMap::new()),
        });
        tokio::spawn(route_loop(inner.clone(), rx));
        Self { inner }
    }

    /// The transport context hosts of this cluster are bound to.
    pub fn context(&self) -> Arc<dyn TransportContext> {
        Arc::new(MemoryContext {
            inner: self.inner.clone(),
        })
    }

    /// Construct a host bound to this cluster, register it under its
    /// reference, and start it.
    pub async fn join(&self, reference: Reference, config: HostConfig) -> Result<Host, HostError> {
        let host = Host::new(reference.clone(), config, self.context())?;
        {
            let mut hosts = self.inner.lock();
            if hosts.contains_key(reference.canonical()) {
                return Err(HostError::Transport(TransportError::DuplicateClaim(
                    reference.canonical().to_string(),
                )));
            }
            hosts.insert(
                reference.canonical().to_string(),
                HostSlot {
                    reference: reference.clone(),
                    host: host.clone(),
                    claimed: false,
                },
            );
        }
        host.start().await?;
        Ok(host)
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential delivery loop. Failed deliveries are logged and dropped;
/// publish is fire-and-forget by contract.
async fn route_loop(inner: Arc<ClusterInner>, mut rx: mpsc::UnboundedReceiver<Packet>) {
    while let Some(packet) = rx.recv().await {
        let target = match packet.target() {
            Ok(target) => target,
            Err(err) => {
                tracing::error!(kind = packet.kind(), error = %err, "dropping unroutable packet");
                continue;
            }
        };

        let host = {
            let hosts = inner.lock();
            hosts
                .values()
                .filter(|slot| slot.claimed && slot.reference.owns(&target))
                .max_by_key(|slot| slot.reference.segments().count())
                .map(|slot| slot.host.clone())
        };

        match host {
            Some(host) => {
                if let Err(err) = host.receive(packet).await {
                    tracing::error!(
                        host = %host.reference(),
                        error = %err,
                        "inbound packet rejected"
                    );
                }
            }
            None => {
                tracing::error!(
                    target = %target,
                    kind = packet.kind(),
                    "no host claims path; packet dropped"
                );
            }
        }
    }
}

struct MemoryContext {
    inner: Arc<ClusterInner>,
}

#[async_trait]
impl TransportContext for MemoryContext {
    fn wallclock(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn publish(&self, packet: Packet) -> Result<(), TransportError> {
        self.inner
            .tx
            .send(packet)
            .map_err(|_| TransportError::Closed)
    }

    async fn acquire(&self, host: &Reference) -> Result<(), TransportError> {
        let mut hosts = self.inner.lock();
        match hosts.get_mut(host.canonical()) {
            Some(slot) if slot.claimed => Err(TransportError::DuplicateClaim(
                host.canonical().to_string(),
            )),
            Some(slot) => {
                slot.claimed = true;
                Ok(())
            }
            None => Err(TransportError::UnknownHost(host.canonical().to_string())),
        }
    }

    async fn release(&self, host: &Reference) -> Result<(), TransportError> {
        let mut hosts = self.inner.lock();
        match hosts.get_mut(host.canonical()) {
            Some(slot) => {
                slot.claimed = false;
                Ok(())
            }
            None => Err(TransportError::UnknownHost(host.canonical().to_string())),
        }
    }
}
