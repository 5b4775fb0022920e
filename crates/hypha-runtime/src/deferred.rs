//! Single-shot promise guarded by a state machine.
//!
//! A [`Deferred`] rendezvouses an outbound supervision request with its
//! eventual response: the resolving half sits in the executor pool while a
//! [`Join`] is awaited by the raising executor. Resolving twice is an
//! invariant error; dropping the deferred unresolved fails the waiter
//! fast instead of synthesizing a response.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::oneshot;

use hypha_protocol::Fault;

use crate::error::InvariantError;
use crate::fsm::Fsm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredState {
    Pending,
    Resolved,
    Rejected,
}

#[derive(Debug, Error)]
#[error("deferred dropped before resolution")]
pub struct DeferredDropped;

/// The resolving half.
#[derive(Debug)]
pub struct Deferred<T> {
    fsm: Fsm<DeferredState>,
    tx: Option<oneshot::Sender<Result<T, Fault>>>,
}

/// The awaiting half.
#[derive(Debug)]
pub struct Join<T> {
    rx: oneshot::Receiver<Result<T, Fault>>,
}

fn transitions() -> HashMap<DeferredState, HashSet<DeferredState>> {
    [
        (
            DeferredState::Pending,
            vec![DeferredState::Resolved, DeferredState::Rejected],
        ),
        (DeferredState::Resolved, vec![]),
        (DeferredState::Rejected, vec![]),
    ]
    .into_iter()
    .map(|(from, to)| (from, to.into_iter().collect()))
    .collect()
}

impl<T> Deferred<T> {
    pub fn new() -> (Self, Join<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                fsm: Fsm::new("deferred", DeferredState::Pending, transitions()),
                tx: Some(tx),
            },
            Join { rx },
        )
    }

    pub fn state(&self) -> DeferredState {
        self.fsm.state()
    }

    /// Complete the waiter with `value`. Single-shot.
    pub fn resolve(&mut self, value: T) -> Result<(), InvariantError> {
        self.fsm.transition_to(DeferredState::Resolved)?;
        self.complete(Ok(value))
    }

    /// Fail the waiter with `fault`. Single-shot.
    pub fn reject(&mut self, fault: Fault) -> Result<(), InvariantError> {
        self.fsm.transition_to(DeferredState::Rejected)?;
        self.complete(Err(fault))
    }

    fn complete(&mut self, outcome: Result<T, Fault>) -> Result<(), InvariantError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| InvariantError::unreachable("deferred sender consumed while pending"))?;
        // the waiter may already be gone; orphaning is its problem, not ours
        let _ = tx.send(outcome);
        Ok(())
    }
}

impl<T> Join<T> {
    /// Await the outcome. Errs when the deferred was dropped unresolved.
    pub async fn join(self) -> Result<Result<T, Fault>, DeferredDropped> {
        self.rx.await.map_err(|_| DeferredDropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_reaches_waiter() {
        let (mut deferred, join) = Deferred::new();
        deferred.resolve(42).unwrap();
        assert_eq!(deferred.state(), DeferredState::Resolved);
        assert_eq!(join.join().await.unwrap().unwrap(), 42);
    }

    #[tokio::test]
    async fn test_reject_reaches_waiter() {
        let (mut deferred, join) = Deferred::<u32>::new();
        deferred.reject(Fault::from("nope")).unwrap();
        let fault = join.join().await.unwrap().unwrap_err();
        assert_eq!(fault.to_string(), "nope");
    }

    #[test]
    fn test_second_resolution_is_invariant_error() {
        let (mut deferred, _join) = Deferred::new();
        deferred.resolve(1).unwrap();
        assert!(deferred.resolve(2).is_err());
        assert!(deferred.reject(Fault::from("late")).is_err());
    }

    #[tokio::test]
    async fn test_drop_orphans_waiter() {
        let (deferred, join) = Deferred::<u32>::new();
        drop(deferred);
        assert!(join.join().await.is_err());
    }
}
