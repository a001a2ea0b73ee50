use serde::Serialize;

use crate::error::FeedbackError;
use crate::models::{FeedbackResult, Utterance};
use crate::persist::PersistTarget;
use crate::proctoring::FullscreenChange;

/// Everything the controller reacts to, processed one at a time in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    Fullscreen(FullscreenChange),
    Tick,
    Utterance(Utterance),
    /// Result of the feedback task started by the controller.
    FeedbackReady(Result<FeedbackResult, FeedbackError>),
    /// The candidate's manual retry after a recoverable failure.
    RetryFeedback,
}

impl SessionEvent {
    /// Variant name for logs. Payloads carry transcript and feedback text.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Fullscreen(_) => "fullscreen",
            SessionEvent::Tick => "tick",
            SessionEvent::Utterance(_) => "utterance",
            SessionEvent::FeedbackReady(_) => "feedback-ready",
            SessionEvent::RetryFeedback => "retry-feedback",
        }
    }
}

/// Terminal state of a session. The first one reached is latched.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SessionOutcome {
    /// Feedback generated and committed. `durable` is false when some
    /// target could not be written.
    Completed { durable: bool },
    /// Time ran out without persisted feedback.
    Expired,
    /// Ended by a proctoring violation. Feedback is forfeit.
    Terminated,
}

/// Human-readable state changes surfaced to the candidate.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "notice", rename_all = "camelCase")]
pub enum Notice {
    FullscreenWarning,
    FeedbackGenerating,
    FeedbackFailed { message: String, retryable: bool },
    PartialPersistence { failed: Vec<PersistTarget> },
    InterviewComplete,
    FeedbackUnavailable,
    SessionTerminated,
    MediaConnectionFailed { message: String },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::FullscreenWarning => {
                "You exited fullscreen mode. Return to fullscreen to continue; exiting again will end the interview.".to_string()
            }
            Notice::FeedbackGenerating => "Generating your interview feedback...".to_string(),
            Notice::FeedbackFailed { message, retryable } => {
                if *retryable {
                    format!("Feedback could not be generated: {message}. You can try again.")
                } else {
                    format!("Feedback could not be generated: {message}.")
                }
            }
            Notice::PartialPersistence { failed } => {
                let targets: Vec<String> = failed.iter().map(ToString::to_string).collect();
                format!(
                    "Your feedback was generated but could not be saved to: {}.",
                    targets.join(", ")
                )
            }
            Notice::InterviewComplete => "Interview complete.".to_string(),
            Notice::FeedbackUnavailable => {
                "Time is up. Feedback is unavailable for this session.".to_string()
            }
            Notice::SessionTerminated => {
                "Session terminated: you left fullscreen mode twice.".to_string()
            }
            Notice::MediaConnectionFailed { message } => {
                format!("Could not connect to the interview room: {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Speaker;

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(SessionOutcome::Completed { durable: true }).unwrap();
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["durable"], true);
        let json = serde_json::to_value(SessionOutcome::Terminated).unwrap();
        assert_eq!(json["outcome"], "terminated");
    }

    #[test]
    fn event_kind_omits_payload() {
        let event = SessionEvent::Utterance(Utterance::new(
            Speaker::Candidate,
            "my home address is 12 Elm Street",
            1,
        ));
        assert_eq!(event.kind(), "utterance");
        assert!(!format!("ignoring {}", event.kind()).contains("Elm"));
        assert_eq!(SessionEvent::RetryFeedback.kind(), "retry-feedback");
    }

    #[test]
    fn partial_notice_names_targets() {
        let notice = Notice::PartialPersistence {
            failed: vec![PersistTarget::TranscriptArchive],
        };
        assert!(notice.message().contains("transcript archive"));
    }
}
