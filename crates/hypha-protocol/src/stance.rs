//! The contract user code implements, and the surface it sees.
//!
//! An actor is described by its [`Stance`]: opaque state plus a [`Behavior`].
//! Each message handling produces the next stance wholesale; there is no
//! in-place mutation. While a handler runs it talks to the runtime through a
//! [`ProcessContext`], which buffers the requested sends and spawns so the
//! runtime can apply them atomically with stance adoption.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::packet::Message;
use crate::payload::{Fault, Payload};
use crate::reference::{Reference, ReferenceKind};
use crate::supervision::{SupervisionEffect, SupervisionRequest};

/// User-supplied process logic.
///
/// `handle` consumes one message and yields the process's next stance.
/// `supervise` is the strategy applied when one of this process's children
/// fails; the default stops the child, which is the safe answer when no
/// strategy is supplied.
#[async_trait]
pub trait Behavior: Send + Sync {
    async fn handle(
        &self,
        ctx: &mut ProcessContext,
        payload: Payload,
    ) -> Result<Stance, Fault>;

    async fn supervise(
        &self,
        _ctx: &mut ProcessContext,
        _request: &SupervisionRequest,
    ) -> Result<SupervisionEffect, Fault> {
        Ok(SupervisionEffect::Stop)
    }
}

/// The `{state, behavior}` pair describing an actor. Replaced atomically
/// between messages.
#[derive(Clone)]
pub struct Stance {
    pub state: Payload,
    pub behavior: Arc<dyn Behavior>,
}

impl Stance {
    pub fn new(state: impl Into<Payload>, behavior: Arc<dyn Behavior>) -> Self {
        Self {
            state: state.into(),
            behavior,
        }
    }
}

impl fmt::Debug for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stance")
            .field("state", &self.state)
            .field("behavior", &"<behavior>")
            .finish()
    }
}

/// A protocol effect requested by user code during a dispatch, applied by
/// the runtime after the handler returns successfully.
#[derive(Debug, Clone)]
pub enum Effect {
    Send(Message),
    Spawn { name: String, stance: Stance },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Receiving,
    Supervising,
}

/// What user code sees during one dispatch: its own reference, a read-only
/// state snapshot, and the ability to send and spawn.
///
/// `send` and `spawn` are only valid while receiving a message; a
/// supervision strategy gets a context too, but one that rejects both.
pub struct ProcessContext {
    self_ref: Reference,
    state: Payload,
    phase: Phase,
    effects: Vec<Effect>,
}

impl ProcessContext {
    /// Context for a message dispatch. Constructed by the runtime.
    pub fn receiving(self_ref: Reference, state: Payload) -> Self {
        Self {
            self_ref,
            state,
            phase: Phase::Receiving,
            effects: Vec::new(),
        }
    }

    /// Context for a supervision dispatch. Constructed by the runtime.
    pub fn supervising(self_ref: Reference, state: Payload) -> Self {
        Self {
            self_ref,
            state,
            phase: Phase::Supervising,
            effects: Vec::new(),
        }
    }

    pub fn self_ref(&self) -> &Reference {
        &self.self_ref
    }

    /// State snapshot for this dispatch.
    pub fn state(&self) -> &Payload {
        &self.state
    }

    /// Queue a message to `target`. Published by the runtime, in call order,
    /// once the handler completes successfully.
    pub fn send(&mut self, target: &Reference, payload: impl Into<Payload>) -> Result<(), Fault> {
        self.ensure_receiving("send")?;
        if target.kind() != ReferenceKind::Process {
            return Err(Fault::from(format!("send target {target} is not a process")));
        }
        self.effects.push(Effect::Send(Message {
            sender: self.self_ref.clone(),
            receiver: target.clone(),
            payload: payload.into(),
        }));
        Ok(())
    }

    /// Queue the creation of a child process and return its reference.
    pub fn spawn(&mut self, stance: Stance, name: &str) -> Result<Reference, Fault> {
        self.ensure_receiving("spawn")?;
        let child = self
            .self_ref
            .child(name)
            .map_err(|err| Fault::from(err.to_string()))?;
        self.effects.push(Effect::Spawn {
            name: name.to_string(),
            stance,
        });
        Ok(child)
    }

    /// Drain the buffered effects. Runtime-internal.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn ensure_receiving(&self, op: &str) -> Result<(), Fault> {
        if self.phase == Phase::Receiving {
            Ok(())
        } else {
            Err(Fault::from(format!("{op} is only valid while receiving")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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

    #[test]
    fn test_send_buffers_in_call_order() {
        let mut ctx = ProcessContext::receiving(proc("proc://a/x"), json!(null));
        ctx.send(&proc("proc://a/p"), json!(1)).unwrap();
        ctx.send(&proc("proc://a/q"), json!(2)).unwrap();

        let effects = ctx.take_effects();
        assert_eq!(effects.len(), 2);
        match &effects[0] {
            Effect::Send(m) => {
                assert_eq!(m.sender, proc("proc://a/x"));
                assert_eq!(m.receiver, proc("proc://a/p"));
                assert_eq!(m.payload, json!(1));
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn test_send_rejects_host_target() {
        let mut ctx = ProcessContext::receiving(proc("proc://a/x"), json!(null));
        let host = Reference::host("proc://a").unwrap();
        assert!(ctx.send(&host, json!(1)).is_err());
    }

    #[test]
    fn test_spawn_returns_child_reference() {
        let mut ctx = ProcessContext::receiving(proc("proc://a/x"), json!(null));
        let child = ctx
            .spawn(Stance::new(json!(0), Arc::new(Inert)), "worker")
            .unwrap();
        assert_eq!(child, proc("proc://a/x/worker"));
        assert_eq!(ctx.take_effects().len(), 1);
    }

    #[test]
    fn test_supervising_context_rejects_effects() {
        let mut ctx = ProcessContext::supervising(proc("proc://a/x"), json!(null));
        assert!(ctx.send(&proc("proc://a/p"), json!(1)).is_err());
        assert!(ctx
            .spawn(Stance::new(json!(0), Arc::new(Inert)), "worker")
            .is_err());
        assert!(ctx.take_effects().is_empty());
    }

    #[tokio::test]
    async fn test_default_supervise_stops() {
        let behavior = Inert;
        let mut ctx = ProcessContext::supervising(proc("proc://a"), json!(null));
        let request = SupervisionRequest::new(proc("proc://a/c"), "boom");
        let effect = behavior.supervise(&mut ctx, &request).await.unwrap();
        assert_eq!(effect, SupervisionEffect::Stop);
    }
}
