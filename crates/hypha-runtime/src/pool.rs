//! Host-local index of executors.
//!
//! The pool is the canonical source of truth for which processes are local,
//! and the only place where supervision responses are correlated back to
//! their waiters. Executors never touch it; only the host mutates it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use hypha_protocol::{Reference, RequestId, SupervisionRequest, SupervisionResponse};

use crate::deferred::{Deferred, Join};
use crate::error::InvariantError;
use crate::executor::Executor;

struct PoolEntry {
    executor: Arc<Executor>,
    /// Outstanding supervision requests raised by this process, keyed by
    /// request id. Dropped wholesale when the process is deleted: the
    /// waiters fail fast instead of receiving a synthetic response.
    pending: HashMap<RequestId, Deferred<SupervisionResponse>>,
    task: Option<JoinHandle<()>>,
}

/// Index of local processes, keyed by canonical reference URL.
pub struct ExecutorPool {
    entries: Mutex<HashMap<String, PoolEntry>>,
}

impl ExecutorPool {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn has_process(&self, process: &Reference) -> bool {
        self.lock().contains_key(process.canonical())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Look up the executor for a local process.
    pub fn executor(&self, process: &Reference) -> Result<Arc<Executor>, InvariantError> {
        self.lock()
            .get(process.canonical())
            .map(|entry| entry.executor.clone())
            .ok_or_else(|| InvariantError::host(format!("no executor for {process}")))
    }

    /// Register a newly constructed executor. At most one executor may
    /// exist per process.
    pub fn insert_process(
        &self,
        process: &Reference,
        executor: Arc<Executor>,
    ) -> Result<(), InvariantError> {
        let mut entries = self.lock();
        if entries.contains_key(process.canonical()) {
            return Err(InvariantError::host(format!(
                "{process} already has an executor"
            )));
        }
        entries.insert(
            process.canonical().to_string(),
            PoolEntry {
                executor,
                pending: HashMap::new(),
                task: None,
            },
        );
        Ok(())
    }

    /// Attach the resume-loop task handle to an inserted process.
    pub fn attach_task(
        &self,
        process: &Reference,
        task: JoinHandle<()>,
    ) -> Result<(), InvariantError> {
        let mut entries = self.lock();
        let entry = entries.get_mut(process.canonical()).ok_or_else(|| {
            InvariantError::host(format!("cannot attach task: {process} is not pooled"))
        })?;
        entry.task = Some(task);
        Ok(())
    }

    /// Remove an ended process. Pending supervision deferrals are dropped,
    /// which fails their waiters fast; the task handle is detached.
    pub fn delete_process(&self, process: &Reference) -> Result<(), InvariantError> {
        let entry = self
            .lock()
            .remove(process.canonical())
            .ok_or_else(|| InvariantError::host(format!("cannot delete unknown {process}")))?;
        if !entry.pending.is_empty() {
            tracing::warn!(
                process = %process,
                orphaned = entry.pending.len(),
                "deleting process with pending supervision requests"
            );
        }
        Ok(())
    }

    /// Register a deferred waiter for an outbound supervision request.
    /// The raising child must be pooled and the id must be fresh among its
    /// pending requests.
    pub fn insert_deferred(
        &self,
        request: &SupervisionRequest,
    ) -> Result<Join<SupervisionResponse>, InvariantError> {
        let mut entries = self.lock();
        let entry = entries.get_mut(request.child.canonical()).ok_or_else(|| {
            InvariantError::host(format!(
                "supervision request {} raised by unpooled {}",
                request.id, request.child
            ))
        })?;
        if entry.pending.contains_key(&request.id) {
            return Err(InvariantError::host(format!(
                "supervision request {} already registered for {}",
                request.id, request.child
            )));
        }
        let (deferred, join) = Deferred::new();
        entry.pending.insert(request.id, deferred);
        Ok(join)
    }

    /// Resolve the waiter matching an inbound supervision response.
    pub fn resolve_deferred(&self, response: &SupervisionResponse) -> Result<(), InvariantError> {
        let mut entries = self.lock();
        let entry = entries.get_mut(response.child.canonical()).ok_or_else(|| {
            InvariantError::host(format!(
                "supervision response {} for unpooled {}",
                response.id, response.child
            ))
        })?;
        let mut deferred = entry.pending.remove(&response.id).ok_or_else(|| {
            InvariantError::host(format!(
                "supervision response {} has no pending request on {}",
                response.id, response.child
            ))
        })?;
        deferred.resolve(response.clone())
    }

    /// References of every pooled process.
    pub fn references(&self) -> Vec<Reference> {
        self.lock()
            .values()
            .map(|entry| entry.executor.reference().clone())
            .collect()
    }

    /// Every pooled executor.
    pub fn executors(&self) -> Vec<Arc<Executor>> {
        self.lock()
            .values()
            .map(|entry| entry.executor.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PoolEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ExecutorPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutorContext, Tick};
    use crate::error::ContextError;
    use async_trait::async_trait;
    use hypha_protocol::{
        Fault, Message, Payload, ProcessContext, Stance, SupervisionEffect,
    };
    use hypha_protocol::Behavior;
    use serde_json::json;
    use std::sync::Arc;

    struct NullContext;

    #[async_trait]
    impl ExecutorContext for NullContext {
        async fn create_process(
            &self,
            parent: &Reference,
            _stance: Stance,
            name: &str,
        ) -> Result<Reference, ContextError> {
            Ok(parent.child(name)?)
        }

        async fn release_process(&self, _process: &Reference) -> Result<(), ContextError> {
            Ok(())
        }

        async fn dispatch_message(&self, _message: Message) -> Result<(), ContextError> {
            Ok(())
        }

        async fn dispatch_supervision_response(
            &self,
            _response: SupervisionResponse,
        ) -> Result<(), ContextError> {
            Ok(())
        }

        async fn supervise(
            &self,
            _request: SupervisionRequest,
        ) -> Result<SupervisionEffect, ContextError> {
            Ok(SupervisionEffect::Stop)
        }

        async fn terminate_process(
            &self,
            _target: &Reference,
            _reason: Fault,
        ) -> Result<(), ContextError> {
            Ok(())
        }

        fn tick(&self) -> Tick {
            Tick::new(0)
        }
    }

    #[derive(Clone)]
    struct Inert;

    #[async_trait]
    impl Behavior for Inert {
        async fn handle(
            &self,
            ctx: &mut ProcessContext,
            _payload: Payload,
        ) -> Result<Stance, Fault> {
            Ok(Stance::new(ctx.state().clone(), Arc::new(self.clone())))
        }
    }

    fn proc(url: &str) -> Reference {
        Reference::process(url).unwrap()
    }

    fn pooled_executor(url: &str) -> Arc<Executor> {
        Arc::new(Executor::new(
            Arc::new(NullContext),
            proc(url),
            Stance::new(json!(null), Arc::new(Inert)),
        ))
    }

    #[test]
    fn test_insert_then_lookup() {
        let pool = ExecutorPool::new();
        let reference = proc("proc://a/x");
        pool.insert_process(&reference, pooled_executor("proc://a/x"))
            .unwrap();
        assert!(pool.has_process(&reference));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.executor(&reference).unwrap().reference(), &reference);
    }

    #[test]
    fn test_double_insert_is_invariant_error() {
        let pool = ExecutorPool::new();
        let reference = proc("proc://a/x");
        pool.insert_process(&reference, pooled_executor("proc://a/x"))
            .unwrap();
        assert!(pool
            .insert_process(&reference, pooled_executor("proc://a/x"))
            .is_err());
    }

    #[test]
    fn test_lookup_unknown_is_invariant_error() {
        let pool = ExecutorPool::new();
        assert!(pool.executor(&proc("proc://a/ghost")).is_err());
    }

    #[test]
    fn test_delete_unknown_is_invariant_error() {
        let pool = ExecutorPool::new();
        assert!(pool.delete_process(&proc("proc://a/ghost")).is_err());
    }

    #[tokio::test]
    async fn test_deferred_round_trip() {
        let pool = ExecutorPool::new();
        let child = proc("proc://a/c");
        pool.insert_process(&child, pooled_executor("proc://a/c"))
            .unwrap();

        let request = SupervisionRequest::new(child.clone(), "boom");
        let join = pool.insert_deferred(&request).unwrap();
        pool.resolve_deferred(&request.response(SupervisionEffect::Resume))
            .unwrap();

        let response = join.join().await.unwrap().unwrap();
        assert_eq!(response.effect, SupervisionEffect::Resume);
        assert_eq!(response.id, request.id);
    }

    #[test]
    fn test_duplicate_deferred_id_is_invariant_error() {
        let pool = ExecutorPool::new();
        let child = proc("proc://a/c");
        pool.insert_process(&child, pooled_executor("proc://a/c"))
            .unwrap();

        let request = SupervisionRequest::new(child, "boom");
        let _join = pool.insert_deferred(&request).unwrap();
        assert!(pool.insert_deferred(&request).is_err());
    }

    #[test]
    fn test_deferred_for_unpooled_child_is_invariant_error() {
        let pool = ExecutorPool::new();
        let request = SupervisionRequest::new(proc("proc://a/ghost"), "boom");
        assert!(pool.insert_deferred(&request).is_err());
    }

    #[test]
    fn test_resolve_without_registration_is_invariant_error() {
        let pool = ExecutorPool::new();
        let child = proc("proc://a/c");
        pool.insert_process(&child, pooled_executor("proc://a/c"))
            .unwrap();

        let request = SupervisionRequest::new(child, "boom");
        assert!(pool
            .resolve_deferred(&request.response(SupervisionEffect::Stop))
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_orphans_pending_deferrals() {
        let pool = ExecutorPool::new();
        let child = proc("proc://a/c");
        pool.insert_process(&child, pooled_executor("proc://a/c"))
            .unwrap();

        let request = SupervisionRequest::new(child.clone(), "boom");
        let join = pool.insert_deferred(&request).unwrap();
        pool.delete_process(&child).unwrap();

        assert!(join.join().await.is_err());
        assert!(!pool.has_process(&child));
    }
}
