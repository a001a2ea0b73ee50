use std::sync::Arc;

use anyhow::{anyhow, Result};
use futures_util::future::join_all;
use log::{info, warn};

use crate::error::PersistError;
use crate::models::{
    CandidateInfo, FeedbackDocument, FeedbackResult, SessionId, TranscriptRecord, Utterance,
};

use super::{KeyedStore, PersistTarget, TranscriptArchive};

/// Which targets landed, and which needed the second attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub written: Vec<PersistTarget>,
    pub retried: Vec<PersistTarget>,
}

/// Writes a session's feedback to every durable target.
///
/// All bodies are derived from the immutable result, so calling `commit`
/// again for the same session overwrites each record with identical data.
pub struct ResultPersister {
    keyed: Arc<dyn KeyedStore>,
    archive: Arc<dyn TranscriptArchive>,
    candidate: Option<CandidateInfo>,
}

impl ResultPersister {
    pub fn new(
        keyed: Arc<dyn KeyedStore>,
        archive: Arc<dyn TranscriptArchive>,
        candidate: Option<CandidateInfo>,
    ) -> Self {
        Self {
            keyed,
            archive,
            candidate,
        }
    }

    /// Writes all targets concurrently, then retries only the ones that
    /// failed, once.
    pub async fn commit(
        &self,
        session_id: &SessionId,
        result: &FeedbackResult,
        transcript: &[Utterance],
    ) -> Result<CommitReport, PersistError> {
        let document = FeedbackDocument::new(session_id, result, self.candidate.as_ref());
        let record = TranscriptRecord {
            session_id: session_id.clone(),
            candidate_info: self.candidate.clone(),
            transcriptions: transcript.to_vec(),
            feedback: document.clone(),
            performance_metrics: result.metrics(),
        };

        let failed = self
            .write_targets(&PersistTarget::ALL, session_id, &document, &record)
            .await;
        if failed.is_empty() {
            info!("Feedback for session {session_id} persisted to all targets");
            return Ok(CommitReport {
                written: PersistTarget::ALL.to_vec(),
                retried: Vec::new(),
            });
        }

        warn!("Retrying {failed:?} for session {session_id}");
        let still_failed = self
            .write_targets(&failed, session_id, &document, &record)
            .await;

        let succeeded: Vec<PersistTarget> = PersistTarget::ALL
            .into_iter()
            .filter(|target| !still_failed.contains(target))
            .collect();

        if still_failed.is_empty() {
            info!("Feedback for session {session_id} persisted after retrying {failed:?}");
            return Ok(CommitReport {
                written: succeeded,
                retried: failed,
            });
        }

        if succeeded.is_empty() {
            Err(PersistError::Failed {
                failed: still_failed,
            })
        } else {
            Err(PersistError::Partial {
                failed: still_failed,
                succeeded,
            })
        }
    }

    /// Returns the targets whose write failed.
    async fn write_targets(
        &self,
        targets: &[PersistTarget],
        session_id: &SessionId,
        document: &FeedbackDocument,
        record: &TranscriptRecord,
    ) -> Vec<PersistTarget> {
        let writes = targets
            .iter()
            .map(|target| self.write(*target, session_id, document, record));
        let outcomes = join_all(writes).await;

        targets
            .iter()
            .zip(outcomes)
            .filter_map(|(target, outcome)| match outcome {
                Ok(()) => None,
                Err(err) => {
                    warn!("Failed to write {target} for session {session_id}: {err:#}");
                    Some(*target)
                }
            })
            .collect()
    }

    async fn write(
        &self,
        target: PersistTarget,
        session_id: &SessionId,
        document: &FeedbackDocument,
        record: &TranscriptRecord,
    ) -> Result<()> {
        match target.keyed_path(session_id) {
            Some(path) => self.keyed.put(&path, document).await,
            None if target == PersistTarget::TranscriptArchive => self.archive.save(record).await,
            None => Err(anyhow!("no store configured for {target}")),
        }
    }
}
