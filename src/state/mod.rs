//! Per-query router state
//!
//! Received → Classifying → Dispatching → Awaiting → Evaluating
//!   → {Synthesizing | Clarifying} → Completed
//!
//! Failed is reachable from every non-terminal state.

use crate::error::OrchestrationError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouterState {
    Received,
    Classifying,
    Dispatching,
    Awaiting,
    Evaluating,
    Synthesizing,
    Clarifying,
    Completed,
    Failed,
}

impl RouterState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RouterState::Completed | RouterState::Failed)
    }

    pub fn can_transition_to(self, next: RouterState) -> bool {
        use RouterState::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Received, Classifying)
                | (Classifying, Dispatching)
                | (Dispatching, Awaiting)
                | (Awaiting, Evaluating)
                | (Evaluating, Synthesizing)
                | (Evaluating, Clarifying)
                // narration failure downgrades to a clarification
                | (Synthesizing, Clarifying)
                | (Synthesizing, Completed)
                | (Clarifying, Completed)
        )
    }
}

impl fmt::Display for RouterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouterState::Received => "RECEIVED",
            RouterState::Classifying => "CLASSIFY",
            RouterState::Dispatching => "DISPATCH",
            RouterState::Awaiting => "AWAIT",
            RouterState::Evaluating => "EVALUATE",
            RouterState::Synthesizing => "SYNTHESIZE",
            RouterState::Clarifying => "CLARIFY",
            RouterState::Completed => "COMPLETE",
            RouterState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Tracks one query through the state machine and keeps its reasoning trace.
#[derive(Debug)]
pub struct QueryRun {
    query_id: Uuid,
    state: RouterState,
    history: Vec<RouterState>,
    trace: Vec<String>,
    started: Instant,
}

impl QueryRun {
    pub fn new(query_id: Uuid) -> Self {
        Self {
            query_id,
            state: RouterState::Received,
            history: vec![RouterState::Received],
            trace: vec!["RECEIVED: Query accepted".to_string()],
            started: Instant::now(),
        }
    }

    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    pub fn history(&self) -> &[RouterState] {
        &self.history
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Move to `next`, recording `note` in the trace.
    pub fn advance(&mut self, next: RouterState, note: impl Into<String>) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestrationError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        let note = note.into();
        debug!(
            query_id = %self.query_id,
            from = %self.state,
            to = %next,
            elapsed_ms = self.elapsed_ms(),
            "{}",
            note
        );

        self.trace.push(format!("{}: {}", next, note));
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Append a note under the current state without transitioning.
    pub fn note(&mut self, note: impl Into<String>) {
        self.trace.push(format!("{}: {}", self.state, note.into()));
    }

    /// Enter Failed unless already terminal.
    pub fn fail(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        let _ = self.advance(RouterState::Failed, reason.to_string());
    }

    pub fn into_trace(self) -> Vec<String> {
        self.trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut run = QueryRun::new(Uuid::new_v4());
        for next in [
            RouterState::Classifying,
            RouterState::Dispatching,
            RouterState::Awaiting,
            RouterState::Evaluating,
            RouterState::Synthesizing,
            RouterState::Completed,
        ] {
            run.advance(next, "step").unwrap();
        }
        assert_eq!(run.state(), RouterState::Completed);
        assert_eq!(run.history().len(), 7);
        assert_eq!(run.trace().last().unwrap(), "COMPLETE: step");
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let mut run = QueryRun::new(Uuid::new_v4());
        let err = run.advance(RouterState::Evaluating, "skip").unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidTransition { .. }));
        assert_eq!(run.state(), RouterState::Received);
    }

    #[test]
    fn test_failed_reachable_from_any_non_terminal_state() {
        use RouterState::*;
        for state in [
            Received,
            Classifying,
            Dispatching,
            Awaiting,
            Evaluating,
            Synthesizing,
            Clarifying,
        ] {
            assert!(state.can_transition_to(Failed), "{}", state);
        }
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_fail_is_idempotent_once_terminal() {
        let mut run = QueryRun::new(Uuid::new_v4());
        run.fail("first");
        run.fail("second");
        assert_eq!(run.state(), RouterState::Failed);
        assert_eq!(run.trace().iter().filter(|t| t.starts_with("FAILED")).count(), 1);
    }
}
