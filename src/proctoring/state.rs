use serde::{Deserialize, Serialize};

/// Fullscreen change as reported by the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FullscreenChange {
    Entered,
    Exited,
}

impl FullscreenChange {
    pub fn from_entered(entered: bool) -> Self {
        if entered {
            FullscreenChange::Entered
        } else {
            FullscreenChange::Exited
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FullscreenChange::Entered => "Entered",
            FullscreenChange::Exited => "Exited",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProctoringState {
    AwaitingFullscreen,
    Active,
    WarnedOnce,
    Terminated,
}

impl Default for ProctoringState {
    fn default() -> Self {
        ProctoringState::AwaitingFullscreen
    }
}

/// What a fullscreen change means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProctoringVerdict {
    /// First entry into fullscreen; the session can start.
    Started,
    /// First exit; the candidate is warned and the session keeps running.
    Warned,
    /// Back in fullscreen after a warning.
    Resumed,
    /// Second exit; the session is forfeit.
    Violation,
    /// No effect in the current state.
    Ignored,
}

impl ProctoringState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, ProctoringState::Terminated)
    }

    /// Applies one fullscreen change. `prior_exits` counts exits already
    /// reported in this session; it is owned by the caller.
    pub fn apply(self, change: FullscreenChange, prior_exits: u32) -> (Self, ProctoringVerdict) {
        use FullscreenChange::*;
        use ProctoringState::*;

        match (self, change) {
            (Terminated, _) => (Terminated, ProctoringVerdict::Ignored),
            (AwaitingFullscreen, Entered) => (Active, ProctoringVerdict::Started),
            (AwaitingFullscreen, Exited) => (AwaitingFullscreen, ProctoringVerdict::Ignored),
            (Active, Exited) if prior_exits == 0 => (WarnedOnce, ProctoringVerdict::Warned),
            (Active, Exited) => (Terminated, ProctoringVerdict::Violation),
            (Active, Entered) => (Active, ProctoringVerdict::Ignored),
            (WarnedOnce, Entered) => (Active, ProctoringVerdict::Resumed),
            (WarnedOnce, Exited) => (Terminated, ProctoringVerdict::Violation),
        }
    }
}
