//! Declared-transition finite state machine.
//!
//! Every executor branch starts with an assertion on this machine, so an
//! illegal re-entry surfaces immediately instead of corrupting downstream
//! state. No history, no timing; a pure gate on the current state.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::InvariantError;

/// Bounds shared by every state enum driven through an [`Fsm`].
pub trait State: Copy + Eq + Hash + Debug + Send + 'static {}

impl<T: Copy + Eq + Hash + Debug + Send + 'static> State for T {}

/// A state machine with an explicit table of allowed transitions.
#[derive(Debug)]
pub struct Fsm<S: State> {
    label: &'static str,
    state: S,
    transitions: HashMap<S, HashSet<S>>,
}

impl<S: State> Fsm<S> {
    pub fn new(label: &'static str, initial: S, transitions: HashMap<S, HashSet<S>>) -> Self {
        Self {
            label,
            state: initial,
            transitions,
        }
    }

    pub fn state(&self) -> S {
        self.state
    }

    /// Probe the current state without failing.
    pub fn test(&self, pred: impl FnOnce(S) -> bool) -> bool {
        pred(self.state)
    }

    /// Fail with an invariant error unless the predicate accepts the
    /// current state. `what` describes the expectation for the error text.
    pub fn assert(&self, pred: impl FnOnce(S) -> bool, what: &str) -> Result<(), InvariantError> {
        if pred(self.state) {
            Ok(())
        } else {
            Err(InvariantError::fsm(format!(
                "{}: expected {what}, but state is {:?}",
                self.label, self.state
            )))
        }
    }

    pub fn assert_state(&self, expected: S) -> Result<(), InvariantError> {
        self.assert(|s| s == expected, &format!("{expected:?}"))
    }

    /// Move to `next`, failing if the transition is not declared.
    pub fn transition_to(&mut self, next: S) -> Result<(), InvariantError> {
        let allowed = self
            .transitions
            .get(&self.state)
            .is_some_and(|successors| successors.contains(&next));
        if !allowed {
            return Err(InvariantError::fsm(format!(
                "{}: illegal transition {:?} -> {next:?}",
                self.label, self.state
            )));
        }
        self.state = next;
        Ok(())
    }
}
