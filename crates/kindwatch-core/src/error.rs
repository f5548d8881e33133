//! Error types raised by the controller core.
//!
//! - [`ControllerError`] is returned to the caller of a lifecycle or
//!   registration operation.
//! - [`DispatchError`] is a contract violation detected while routing an event.
//! - [`WatchError`] is a fault reported by a watch source.
//!
//! Handler faults use [`HandlerError`](crate::events::HandlerError) and never
//! leave the dispatcher.

use thiserror::Error;

use crate::events::WatchEventType;
use crate::resource::ResourceKind;

/// Errors returned by [`ResourceController`](crate::ResourceController) and
/// [`HandlerRegistry`](crate::events::HandlerRegistry) operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ControllerError {
    /// `start` was called while the controller is running.
    #[error("controller is already running")]
    AlreadyRunning,

    /// `stop` was called while the controller is not running.
    #[error("controller is not running")]
    NotRunning,

    /// The controller was built without a required collaborator.
    #[error("missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// The watch source provider declared no sources.
    #[error("no watch sources declared")]
    NoWatchSources,

    /// A handler was registered under an empty kind.
    #[error("resource kind must not be empty")]
    EmptyKind,

    /// A handler for one schema was registered under another schema's kind.
    #[error("handler for {schema} (kind {schema_kind}) cannot be bound to kind {kind}")]
    KindMismatch {
        kind: ResourceKind,
        schema: &'static str,
        schema_kind: &'static str,
    },

    /// The watch source provider failed to declare its sources.
    #[error("failed to declare watch sources: {0}")]
    Sources(#[source] WatchError),

    /// Opening a subscription on one of the declared sources failed.
    #[error("failed to subscribe to {kind}: {source}")]
    Subscribe {
        kind: ResourceKind,
        #[source]
        source: WatchError,
    },
}

impl ControllerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::AlreadyRunning => "controller_already_running",
            ControllerError::NotRunning => "controller_not_running",
            ControllerError::MissingCollaborator(_) => "controller_missing_collaborator",
            ControllerError::NoWatchSources => "controller_no_watch_sources",
            ControllerError::EmptyKind => "handler_empty_kind",
            ControllerError::KindMismatch { .. } => "handler_kind_mismatch",
            ControllerError::Sources(_) => "watch_sources_failed",
            ControllerError::Subscribe { .. } => "watch_subscribe_failed",
        }
    }

    /// Whether the error reports a call made in the wrong lifecycle state.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            ControllerError::AlreadyRunning
                | ControllerError::NotRunning
                | ControllerError::MissingCollaborator(_)
        )
    }
}

/// Contract violations detected while routing an event.
///
/// These are not handler faults: they mean the watch source delivered
/// something the registry cannot have been built for.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{event_type} event arrived without a resource")]
    MissingResource { event_type: WatchEventType },

    #[error("{kind} payload is {actual}, handler expects {expected}")]
    TypeMismatch {
        kind: ResourceKind,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Faults reported by a watch source, either when opening the stream or on
/// its fault channel.
///
/// A source that has nothing more to deliver ends its stream instead of
/// reporting a fault.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch connection failed: {0}")]
    Connection(String),

    #[error("watch stream lagged, {0} events skipped")]
    Lagged(u64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WatchError {
    pub fn connection(msg: impl Into<String>) -> Self {
        WatchError::Connection(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_errors_are_classified() {
        assert!(ControllerError::AlreadyRunning.is_invalid_state());
        assert!(ControllerError::NotRunning.is_invalid_state());
        assert!(ControllerError::MissingCollaborator("watch source provider").is_invalid_state());
        assert!(!ControllerError::EmptyKind.is_invalid_state());
    }

    #[test]
    fn subscribe_error_names_kind_and_cause() {
        let err = ControllerError::Subscribe {
            kind: ResourceKind::from_static("Widget"),
            source: WatchError::connection("refused"),
        };
        assert_eq!(
            err.to_string(),
            "failed to subscribe to Widget: watch connection failed: refused"
        );
        assert_eq!(err.as_label(), "watch_subscribe_failed");
    }
}
