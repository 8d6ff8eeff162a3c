//! Explicit execution context threaded through every call.
//!
//! Callers create one context per logical unit of work (a test step, a batch
//! of commands) and pass it into [`crate::Executor::execute`] and the health
//! monitor. Nothing in the crate consults process-wide state for logging or
//! configuration lookup, so concurrent callers never observe each other.

use uuid::Uuid;

/// Identifies the caller-side unit of work an execution belongs to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionContext {
    run_id: Uuid,
    label: String,
}

impl ExecutionContext {
    /// Creates a context with a fresh run identifier.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_run_id(Uuid::new_v4(), label)
    }

    /// Creates a context for an existing run identifier.
    #[must_use]
    pub fn with_run_id(run_id: Uuid, label: impl Into<String>) -> Self {
        Self {
            run_id,
            label: label.into(),
        }
    }

    /// Returns the run identifier shared by this context and its children.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the human readable label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Derives a context for a sub-step of this unit of work.
    ///
    /// The run identifier is preserved; the label gains a `/step` suffix.
    #[must_use]
    pub fn child(&self, step: &str) -> Self {
        Self {
            run_id: self.run_id,
            label: format!("{}/{step}", self.label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_keeps_run_id_and_extends_label() {
        let parent = ExecutionContext::new("suite");
        let child = parent.child("install");

        assert_eq!(child.run_id(), parent.run_id());
        assert_eq!(child.label(), "suite/install");
    }

    #[test]
    fn new_contexts_receive_distinct_run_ids() {
        let first = ExecutionContext::new("a");
        let second = ExecutionContext::new("a");
        assert_ne!(first.run_id(), second.run_id());
    }
}
