//! State-level execution tracing
//!
//! Records which node ran and what the business fields looked like around it.
//! Only the tracing fields are ever written here.

use super::{ConversationState, StateHistoryEntry};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracePhase {
    Before,
    After,
}

impl TracePhase {
    pub fn suffix(&self) -> &'static str {
        match self {
            TracePhase::Before => "before",
            TracePhase::After => "after",
        }
    }
}

impl fmt::Display for TracePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Tracer {
    enabled: bool,
}

impl Tracer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record `<node>_<phase>` as the current node, append it to the
    /// execution path and push a snapshot of the business fields.
    pub fn track(&self, state: &mut ConversationState, node: &str, phase: TracePhase) {
        if !self.enabled {
            return;
        }

        let label = format!("{}_{}", node, phase.suffix());

        state.current_node = Some(label.clone());
        state.execution_path.push(label.clone());

        let snapshot = state.snapshot();
        state.state_history.push(StateHistoryEntry {
            node: label,
            state: snapshot,
        });
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(true)
    }
}
