use thiserror::Error;

use crate::persist::PersistTarget;

/// Why feedback generation failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedbackError {
    #[error("no transcriptions found")]
    NoTranscript,

    #[error("feedback request failed: {0}")]
    Transport(String),

    #[error("feedback endpoint returned status {0}")]
    Status(u16),

    #[error("malformed feedback stream record: {0}")]
    Protocol(String),

    #[error("feedback generator reported an error: {0}")]
    Upstream(String),

    #[error("no feedback produced")]
    Empty,
}

impl FeedbackError {
    /// Network-level failures that are worth one automatic retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedbackError::Transport(_) => true,
            FeedbackError::Status(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Why a commit did not land everywhere.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistError {
    #[error("partial persistence: {failed:?} failed after retry, {succeeded:?} written")]
    Partial {
        failed: Vec<PersistTarget>,
        succeeded: Vec<PersistTarget>,
    },

    #[error("persistence failed for every target: {failed:?}")]
    Failed { failed: Vec<PersistTarget> },
}

impl PersistError {
    pub fn failed_targets(&self) -> &[PersistTarget] {
        match self {
            PersistError::Partial { failed, .. } | PersistError::Failed { failed } => failed,
        }
    }
}

/// Misuse of the session controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    #[error("invalid session settings: {0}")]
    InvalidSettings(String),

    #[error("session event channel closed before the session ended")]
    EventsClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_transient() {
        assert!(FeedbackError::Transport("reset".into()).is_transient());
        assert!(FeedbackError::Status(503).is_transient());
        assert!(FeedbackError::Status(429).is_transient());
        assert!(!FeedbackError::Status(400).is_transient());
        assert!(!FeedbackError::Protocol("bad".into()).is_transient());
        assert!(!FeedbackError::Upstream("x".into()).is_transient());
        assert!(!FeedbackError::Empty.is_transient());
    }
}
