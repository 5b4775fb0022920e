//! The per-process execution engine.
//!
//! One executor drives one process through its lifecycle: it queues inbound
//! messages and supervision requests, arbitrates between them, runs user
//! behavior in isolation, and escalates failures to the parent through the
//! supervision protocol. All of it is gated by a declared-transition state
//! machine so that an illegal re-entry is an immediate invariant error.
//!
//! Concurrency model: pushes and kills come from the host on arbitrary
//! tasks and only touch the queues under a short-lived lock; the resume
//! loop runs on the executor's own tokio task and is the only place user
//! behavior executes. Wakes coalesce through a [`Notify`], so any number of
//! concurrent wakes schedule at most one pending resume.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::Notify;

use hypha_protocol::{
    Effect, Fault, Message, ProcessContext, Reference, Stance, SupervisionEffect,
    SupervisionRequest,
};

use crate::context::{ExecutorContext, Tick};
use crate::error::{ContextError, InvariantError};
use crate::fifo::Fifo;
use crate::fsm::Fsm;

/// Total set of executor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorState {
    Start,
    Sleeping,
    Receiving,
    Supervising,
    Raising,
    Terminating,
    End,
}

/// The declared transition table. Everything else is an invariant error.
pub fn allowed_executor_transitions() -> HashMap<ExecutorState, HashSet<ExecutorState>> {
    use ExecutorState::*;
    [
        (Start, vec![Sleeping]),
        (Sleeping, vec![Terminating, Supervising, Receiving, Raising]),
        (Receiving, vec![Raising, Sleeping]),
        (Supervising, vec![Raising, Sleeping]),
        (Raising, vec![Terminating, Sleeping]),
        (Terminating, vec![End]),
        (End, vec![]),
    ]
    .into_iter()
    .map(|(from, to)| (from, to.into_iter().collect()))
    .collect()
}

/// Outcome of one resume step.
enum Step {
    /// Nothing pending; the executor stays asleep.
    Idle(Tick),
    /// One event consumed; re-enter the resume loop.
    Progress,
    /// The executor reached `end`.
    Ended,
}

/// The event selected by arbitration.
enum Selected {
    Terminate(Fault),
    Supervise(SupervisionRequest),
    Receive(Message),
}

struct Inner {
    fsm: Fsm<ExecutorState>,
    stance: Stance,
    children: HashSet<Reference>,
    messages: Fifo<Message>,
    requests: Fifo<SupervisionRequest>,
    termination: Option<Fault>,
}

/// Runtime engine for one process.
pub struct Executor {
    self_ref: Reference,
    context: Arc<dyn ExecutorContext>,
    wake: Notify,
    inner: Mutex<Inner>,
}

impl Executor {
    pub fn new(context: Arc<dyn ExecutorContext>, self_ref: Reference, stance: Stance) -> Self {
        Self {
            self_ref,
            context,
            wake: Notify::new(),
            inner: Mutex::new(Inner {
                fsm: Fsm::new(
                    "executor",
                    ExecutorState::Start,
                    allowed_executor_transitions(),
                ),
                stance,
                children: HashSet::new(),
                messages: Fifo::new(),
                requests: Fifo::new(),
                termination: None,
            }),
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.self_ref
    }

    pub fn state(&self) -> ExecutorState {
        self.lock().fsm.state()
    }

    /// The children spawned through this executor and not yet stopped by
    /// its own strategy.
    pub fn children(&self) -> HashSet<Reference> {
        self.lock().children.clone()
    }

    /// `start -> sleeping`. Called once by the host before the first wake.
    pub fn start(&self) -> Result<(), InvariantError> {
        self.lock().fsm.transition_to(ExecutorState::Sleeping)
    }

    /// Schedule a resume step. Idempotent: concurrent wakes collapse into
    /// at most one pending resume.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Request termination. The flag is observed at the next `sleeping`
    /// entry; an in-flight dispatch always runs to completion first. Only
    /// the first reason is kept.
    pub fn kill(&self, reason: Fault) {
        {
            let mut inner = self.lock();
            if inner.termination.is_none() {
                inner.termination = Some(reason);
            }
        }
        self.wake();
    }

    /// Enqueue an inbound message. The receiver must be this process and
    /// the executor must not have ended.
    pub fn push_message(&self, message: Message) -> Result<(), InvariantError> {
        let mut inner = self.lock();
        inner
            .fsm
            .assert(|s| s != ExecutorState::End, "a live executor for push_message")?;
        if message.receiver != self.self_ref {
            return Err(InvariantError::executor(format!(
                "message for {} pushed onto executor of {}",
                message.receiver, self.self_ref
            )));
        }
        inner.messages.push(message);
        Ok(())
    }

    /// Enqueue an inbound supervision request from a failed child.
    pub fn push_supervision_request(
        &self,
        request: SupervisionRequest,
    ) -> Result<(), InvariantError> {
        let mut inner = self.lock();
        inner.fsm.assert(
            |s| s != ExecutorState::End,
            "a live executor for push_supervision_request",
        )?;
        inner.requests.push(request);
        Ok(())
    }

    /// Resume loop, driven on the executor's own task. Runs until the
    /// executor ends or an invariant error aborts it.
    pub(crate) async fn run(self: Arc<Self>) {
        loop {
            self.wake.notified().await;
            loop {
                match self.step().await {
                    Ok(Step::Progress) => continue,
                    Ok(Step::Idle(_)) => break,
                    Ok(Step::Ended) => return,
                    Err(invariant) => {
                        tracing::error!(
                            process = %self.self_ref,
                            error = %invariant,
                            "executor invariant violated; aborting"
                        );
                        return;
                    }
                }
            }
        }
    }

    /// One resume step. Arbitration order: termination, then supervision,
    /// then messages. Supervision requests signal child failures and must
    /// not wait behind a backlog of ordinary messages.
    async fn step(&self) -> Result<Step, InvariantError> {
        let selected = {
            let mut inner = self.lock();
            inner.fsm.assert_state(ExecutorState::Sleeping)?;
            if let Some(reason) = inner.termination.clone() {
                inner.fsm.transition_to(ExecutorState::Terminating)?;
                Selected::Terminate(reason)
            } else if let Some(request) = inner.requests.pop() {
                inner.fsm.transition_to(ExecutorState::Supervising)?;
                Selected::Supervise(request)
            } else if let Some(message) = inner.messages.pop() {
                inner.fsm.transition_to(ExecutorState::Receiving)?;
                Selected::Receive(message)
            } else {
                return Ok(Step::Idle(self.context.tick()));
            }
        };

        match selected {
            Selected::Terminate(reason) => {
                self.terminate(reason).await?;
                Ok(Step::Ended)
            }
            Selected::Supervise(request) => self.supervise(request).await,
            Selected::Receive(message) => self.receive(message).await,
        }
    }

    /// Dispatch one message to user behavior. The message counts as
    /// consumed whether or not the behavior succeeds.
    async fn receive(&self, message: Message) -> Result<Step, InvariantError> {
        let stance = self.lock().stance.clone();
        let mut ctx = ProcessContext::receiving(self.self_ref.clone(), stance.state.clone());
        let outcome = AssertUnwindSafe(stance.behavior.handle(&mut ctx, message.payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Fault::from_panic(panic)));

        match outcome {
            Ok(next) => {
                if let Err(err) = self.apply_effects(ctx.take_effects()).await {
                    tracing::warn!(
                        process = %self.self_ref,
                        error = %err,
                        "failed to apply dispatch effects; raising"
                    );
                    self.transition(ExecutorState::Raising)?;
                    return self.raise(Fault::from(err.to_string())).await;
                }
                self.adopt(next)?;
                self.transition(ExecutorState::Sleeping)?;
                Ok(Step::Progress)
            }
            Err(fault) => {
                tracing::warn!(
                    process = %self.self_ref,
                    fault = %fault,
                    "behavior failed; raising"
                );
                self.transition(ExecutorState::Raising)?;
                self.raise(fault).await
            }
        }
    }

    /// Apply the effects a handler buffered, in call order.
    async fn apply_effects(&self, effects: Vec<Effect>) -> Result<(), ContextError> {
        for effect in effects {
            match effect {
                Effect::Send(message) => self.context.dispatch_message(message).await?,
                Effect::Spawn { name, stance } => {
                    let child = self
                        .context
                        .create_process(&self.self_ref, stance, &name)
                        .await?;
                    self.lock().children.insert(child);
                }
            }
        }
        Ok(())
    }

    /// Run the supervision strategy for a failed child. A failing strategy
    /// answers `stop` on the child's behalf before escalating its own
    /// failure, so a broken strategy cannot silently eat child failures.
    async fn supervise(&self, request: SupervisionRequest) -> Result<Step, InvariantError> {
        let stance = self.lock().stance.clone();
        let mut ctx = ProcessContext::supervising(self.self_ref.clone(), stance.state.clone());
        let outcome = AssertUnwindSafe(stance.behavior.supervise(&mut ctx, &request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Fault::from_panic(panic)));

        match outcome {
            Ok(effect) => {
                if let Err(err) = self
                    .context
                    .dispatch_supervision_response(request.response(effect))
                    .await
                {
                    self.transition(ExecutorState::Raising)?;
                    return self.raise(Fault::from(err.to_string())).await;
                }
                if effect == SupervisionEffect::Stop {
                    self.lock().children.remove(&request.child);
                }
                self.transition(ExecutorState::Sleeping)?;
                Ok(Step::Progress)
            }
            Err(fault) => {
                let fallback = request.response(SupervisionEffect::Stop);
                if let Err(err) = self.context.dispatch_supervision_response(fallback).await {
                    tracing::error!(
                        process = %self.self_ref,
                        error = %err,
                        "failed to dispatch safe-default stop response"
                    );
                }
                tracing::warn!(
                    process = %self.self_ref,
                    fault = %fault,
                    "supervision strategy failed; raising"
                );
                self.transition(ExecutorState::Raising)?;
                self.raise(fault).await
            }
        }
    }

    /// Escalate this process's own failure and act on the parent's verdict.
    async fn raise(&self, fault: Fault) -> Result<Step, InvariantError> {
        let request = SupervisionRequest::new(self.self_ref.clone(), fault.clone().into_reason());
        match self.context.supervise(request).await {
            Ok(SupervisionEffect::Resume) => {
                self.transition(ExecutorState::Sleeping)?;
                Ok(Step::Progress)
            }
            Ok(SupervisionEffect::Stop) => {
                self.transition(ExecutorState::Terminating)?;
                self.terminate(fault).await?;
                Ok(Step::Ended)
            }
            Err(err) => {
                tracing::warn!(
                    process = %self.self_ref,
                    error = %err,
                    "supervision escalation failed; terminating"
                );
                self.transition(ExecutorState::Terminating)?;
                self.terminate(Fault::from(err.to_string())).await?;
                Ok(Step::Ended)
            }
        }
    }

    /// Release this process and reach `end`. Release must not fail; when it
    /// does the failure is promoted to an invariant error.
    async fn terminate(&self, reason: Fault) -> Result<Tick, InvariantError> {
        self.context
            .release_process(&self.self_ref)
            .await
            .map_err(|err| {
                InvariantError::executor(format!("release of {} failed: {err}", self.self_ref))
            })?;
        self.transition(ExecutorState::End)?;
        tracing::debug!(process = %self.self_ref, reason = %reason, "executor ended");
        Ok(self.context.tick())
    }

    /// Replace the stance. Valid only mid-receive; the swap is atomic from
    /// the user's perspective.
    fn adopt(&self, next: Stance) -> Result<(), InvariantError> {
        let mut inner = self.lock();
        inner.fsm.assert_state(ExecutorState::Receiving)?;
        inner.stance = next;
        Ok(())
    }

    fn transition(&self, next: ExecutorState) -> Result<(), InvariantError> {
        self.lock().fsm.transition_to(next)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("self_ref", &self.self_ref)
            .field("state", &self.state())
            .finish()
    }
}
