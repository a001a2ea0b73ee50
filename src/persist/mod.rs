//! Durable storage of the finished feedback.
//!
//! Two independent stores, both keyed by session id: a keyed document store
//! holding the feedback document under two paths, and the transcript
//! archive behind `/save-transcript`.

pub mod persister;
pub mod remote;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{FeedbackDocument, SessionId, TranscriptRecord};

pub use persister::{CommitReport, ResultPersister};
pub use remote::{HttpTranscriptArchive, RestKeyedStore};

/// Low-latency keyed store. `put` overwrites whatever lives at `path`.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    async fn put(&self, path: &str, document: &FeedbackDocument) -> Result<()>;
}

/// Document store for the full transcript. Saving the same session twice
/// replaces the earlier record.
#[async_trait]
pub trait TranscriptArchive: Send + Sync {
    async fn save(&self, record: &TranscriptRecord) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PersistTarget {
    SessionFeedback,
    CandidateFeedback,
    TranscriptArchive,
}

impl PersistTarget {
    pub const ALL: [PersistTarget; 3] = [
        PersistTarget::SessionFeedback,
        PersistTarget::CandidateFeedback,
        PersistTarget::TranscriptArchive,
    ];

    /// Keyed-store path for this target, if it lives in the keyed store.
    pub fn keyed_path(&self, session_id: &SessionId) -> Option<String> {
        match self {
            PersistTarget::SessionFeedback => Some(format!("sessionsfeedback/{session_id}")),
            PersistTarget::CandidateFeedback => {
                Some(format!("interview_feedback/candidates/{session_id}"))
            }
            PersistTarget::TranscriptArchive => None,
        }
    }
}

impl fmt::Display for PersistTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PersistTarget::SessionFeedback => "session feedback",
            PersistTarget::CandidateFeedback => "candidate feedback",
            PersistTarget::TranscriptArchive => "transcript archive",
        };
        f.write_str(name)
    }
}
