use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one interview attempt. Used as the key in every store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which a per-session value lives in the local cache.
    pub fn cache_key(&self, namespace: &str) -> String {
        format!("{namespace}:{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Speaker {
    Candidate,
    Interviewer,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp_ms: i64,
}

impl Utterance {
    pub fn new(speaker: Speaker, text: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp_ms,
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Candidate details carried into the saved feedback; all optional for guest sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateInfo {
    pub mockello_id: Option<String>,
    pub candidate_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hr_id: Option<String>,
}

/// Where the media room lives and how to join it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCredentials {
    pub url: String,
    pub token: String,
}
