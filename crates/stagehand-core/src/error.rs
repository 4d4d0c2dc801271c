//! Error taxonomy for automation failures.
//!
//! Query and resolution failures are hard: without a coordinate there is
//! nothing to act on. Backend failures are hard at initialization and
//! wrapped uniformly per call. Synchronization timeouts are soft; the
//! synchronizer reports them as [`SyncOutcome`](crate::sync::SyncOutcome)
//! values and only produces [`AutomationError::SynthesisTimeout`] when a
//! caller asks for a hard failure explicitly.

use thiserror::Error;

use crate::backend::BackendError;
use crate::input::InputId;

/// Errors surfaced by the automation engine.
#[derive(Error, Debug)]
pub enum AutomationError {
    /// The criterion matched nothing at all.
    #[error("no element matches {criterion}")]
    NotFound {
        /// The original criterion.
        criterion: String,
    },

    /// The criterion matched elements, but none of them are visible.
    #[error("{matched} element(s) match {criterion} but none are visible")]
    NotVisible {
        /// The original criterion.
        criterion: String,
        /// How many elements matched before visibility filtering.
        matched: usize,
    },

    /// The target cannot be projected to a screen region.
    #[error("cannot resolve {target}: {reason}")]
    UnresolvableTarget {
        /// Description of the target.
        target: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The requested input backend cannot run in this environment.
    #[error("input backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A backend call failed.
    #[error("{backend} backend: {source}")]
    Backend {
        /// Name of the backend that failed.
        backend: &'static str,
        /// The underlying failure.
        #[source]
        source: BackendError,
    },

    /// The UI thread did not acknowledge an action in time.
    #[error("timed out after {waited_ms}ms waiting for {waiting_for}")]
    SynthesisTimeout {
        /// What the synchronizer was waiting for.
        waiting_for: String,
        /// How long it waited.
        waited_ms: u64,
    },

    /// A release was requested for an input that is not held.
    ///
    /// Press bookkeeping treats this as a no-op; the variant exists so the
    /// condition can be named in logs.
    #[error("{input} is not held")]
    InconsistentPressState {
        /// The input that was not held.
        input: InputId,
    },
}

impl AutomationError {
    /// The criterion or target description that caused a query or
    /// resolution failure, for failure reports.
    pub fn criterion(&self) -> Option<&str> {
        match self {
            Self::NotFound { criterion } | Self::NotVisible { criterion, .. } => Some(criterion),
            Self::UnresolvableTarget { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Whether this is a lookup/resolution failure, the kind worth a
    /// screen capture when reporting.
    pub fn is_query_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::NotVisible { .. } | Self::UnresolvableTarget { .. }
        )
    }

    pub(crate) fn backend(backend: &'static str) -> impl FnOnce(BackendError) -> Self {
        move |source| match source {
            BackendError::Unavailable(reason) => Self::BackendUnavailable(reason),
            source => Self::Backend { backend, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MouseButton;

    #[test]
    fn messages_carry_the_criterion() {
        let err = AutomationError::NotFound {
            criterion: "#submitBtn".to_string(),
        };
        assert!(err.to_string().contains("#submitBtn"));
        assert_eq!(err.criterion(), Some("#submitBtn"));

        let err = AutomationError::NotVisible {
            criterion: "\"Save\"".to_string(),
            matched: 2,
        };
        assert!(err.to_string().contains("none are visible"));
        assert_eq!(err.criterion(), Some("\"Save\""));
        assert!(err.is_query_failure());
    }

    #[test]
    fn backend_errors_are_wrapped_uniformly() {
        let err = AutomationError::backend("toolkit")(BackendError::CommandFailed("boom".into()));
        assert!(matches!(err, AutomationError::Backend { backend: "toolkit", .. }));
        assert!(err.to_string().contains("boom"));
        assert!(err.criterion().is_none());

        let err = AutomationError::backend("native")(BackendError::Unavailable("headless".into()));
        assert!(matches!(err, AutomationError::BackendUnavailable(_)));
    }

    #[test]
    fn press_state_message_names_the_input() {
        let err = AutomationError::InconsistentPressState {
            input: MouseButton::Primary.into(),
        };
        assert!(err.to_string().contains("Primary"));
        assert!(!err.is_query_failure());
    }
}
