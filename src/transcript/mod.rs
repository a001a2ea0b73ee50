//! Append-only record of what was said during the interview.
//!
//! Every append is written through to the local cache as the full ordered
//! list, so a reload before feedback runs picks up the same history.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::db::LocalCache;
use crate::models::{SessionId, Utterance};

pub const TRANSCRIPT_NAMESPACE: &str = "transcript";

pub struct TranscriptStore {
    session_id: SessionId,
    cache: Arc<dyn LocalCache>,
    utterances: Vec<Utterance>,
}

impl TranscriptStore {
    /// Loads any mirrored history for `session_id`. An unreadable mirror is
    /// logged and the store starts empty.
    pub async fn open(session_id: SessionId, cache: Arc<dyn LocalCache>) -> Self {
        let key = session_id.cache_key(TRANSCRIPT_NAMESPACE);
        let utterances = match cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Utterance>>(&raw) {
                Ok(utterances) => {
                    info!(
                        "Restored {} utterances for session {}",
                        utterances.len(),
                        session_id
                    );
                    utterances
                }
                Err(err) => {
                    warn!("Discarding corrupt transcript mirror for session {session_id}: {err}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("Failed to read transcript mirror for session {session_id}: {err:#}");
                Vec::new()
            }
        };

        Self {
            session_id,
            cache,
            utterances,
        }
    }

    fn cache_key(&self) -> String {
        self.session_id.cache_key(TRANSCRIPT_NAMESPACE)
    }

    /// The only mutator. The utterance is kept in memory even if the mirror
    /// write fails; the error is returned so the caller can log it.
    pub async fn append(&mut self, utterance: Utterance) -> Result<()> {
        self.utterances.push(utterance);
        let serialized = serde_json::to_string(&self.utterances)?;
        self.cache
            .set(&self.cache_key(), &serialized)
            .await
            .with_context(|| format!("failed to mirror transcript for session {}", self.session_id))
    }

    pub fn snapshot(&self) -> Arc<[Utterance]> {
        Arc::from(self.utterances.as_slice())
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn total_word_count(&self) -> usize {
        self.utterances.iter().map(Utterance::word_count).sum()
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.cache
            .remove(&self.cache_key())
            .await
            .with_context(|| format!("failed to clear transcript for session {}", self.session_id))
    }
}
