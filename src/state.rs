//! Runtime lifecycle state machine.
//!
//! The coarse lifecycle is `uninitialized -> initializing -> loading_plugins
//! -> ready <-> running -> shutdown`, with an error excursion reachable from
//! every active state. [`StateMachine::transition_to`] enforces the table;
//! [`StateMachine::force_state`] exists for recovery tooling and bypasses it.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;

/// Maximum number of transition records kept for diagnostics.
const HISTORY_CAPACITY: usize = 100;

/// Coarse runtime lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Uninitialized,
    Initializing,
    LoadingPlugins,
    Ready,
    Running,
    Error,
    Shutdown,
}

impl RuntimeState {
    /// Legal target states reachable from this state.
    pub fn legal_targets(&self) -> &'static [RuntimeState] {
        use RuntimeState::*;
        match self {
            Uninitialized => &[Initializing],
            Initializing => &[LoadingPlugins, Error],
            LoadingPlugins => &[Ready, Error],
            Ready => &[Running, Shutdown, Error],
            Running => &[Ready, Shutdown, Error],
            Error => &[Shutdown, Initializing],
            Shutdown => &[Uninitialized],
        }
    }

    pub fn can_transition_to(&self, target: RuntimeState) -> bool {
        self.legal_targets().contains(&target)
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeState::Uninitialized => "uninitialized",
            RuntimeState::Initializing => "initializing",
            RuntimeState::LoadingPlugins => "loading_plugins",
            RuntimeState::Ready => "ready",
            RuntimeState::Running => "running",
            RuntimeState::Error => "error",
            RuntimeState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// One recorded state transition.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub from: RuntimeState,
    pub to: RuntimeState,
    pub at: DateTime<Utc>,
    /// True when the transition was applied via [`StateMachine::force_state`].
    pub forced: bool,
}

/// Listener invoked after every applied transition. An `Err` is logged and
/// isolated; it neither reverts the transition nor stops later listeners.
pub type TransitionListener = Box<dyn Fn(&Transition) -> Result<(), CoreError> + Send + Sync>;

/// Lifecycle state machine with a bounded transition history.
pub struct StateMachine {
    state: RuntimeState,
    history: VecDeque<Transition>,
    listeners: Vec<TransitionListener>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: RuntimeState::Uninitialized,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// Snapshot of the retained transition history, oldest first.
    pub fn history(&self) -> Vec<Transition> {
        self.history.iter().cloned().collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.state == RuntimeState::Shutdown
    }

    /// Register a listener invoked after each applied transition, in
    /// registration order.
    pub fn on_transition(&mut self, listener: TransitionListener) {
        self.listeners.push(listener);
    }

    /// Move to `target`, failing with [`CoreError::InvalidTransition`] when
    /// the transition table does not allow it.
    pub fn transition_to(&mut self, target: RuntimeState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(target) {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to: target,
                allowed: self.state.legal_targets().to_vec(),
            });
        }
        tracing::debug!(from = %self.state, to = %target, "state transition");
        self.apply(target, false);
        Ok(())
    }

    /// Apply `target` without validation. Recovery tooling only; the record
    /// is marked `forced` and logged at warn level.
    pub fn force_state(&mut self, target: RuntimeState) {
        tracing::warn!(from = %self.state, to = %target, "forced state transition");
        self.apply(target, true);
    }

    /// Return to `uninitialized`, dropping history and listeners.
    pub fn reset(&mut self) {
        self.state = RuntimeState::Uninitialized;
        self.history.clear();
        self.listeners.clear();
    }

    fn apply(&mut self, target: RuntimeState, forced: bool) {
        let record = Transition {
            from: self.state,
            to: target,
            at: Utc::now(),
            forced,
        };
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());
        self.state = target;

        for listener in &self.listeners {
            if let Err(err) = listener(&record) {
                tracing::warn!(error = %err, "state transition listener failed");
            }
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
