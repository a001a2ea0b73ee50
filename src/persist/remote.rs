use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;

use crate::models::{FeedbackDocument, TranscriptRecord};

use super::{KeyedStore, TranscriptArchive};

/// REST front of the keyed store: `PUT {base}/{path}.json`.
#[derive(Clone)]
pub struct RestKeyedStore {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RestKeyedStore {
    pub fn new(http: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }
}

#[async_trait]
impl KeyedStore for RestKeyedStore {
    async fn put(&self, path: &str, document: &FeedbackDocument) -> Result<()> {
        let url = self.url_for(path);
        debug!("PUT {url}");
        self.http
            .put(&url)
            .timeout(self.timeout)
            .json(document)
            .send()
            .await
            .with_context(|| format!("failed to reach keyed store at {url}"))?
            .error_for_status()
            .with_context(|| format!("keyed store rejected write to {path}"))?;
        Ok(())
    }
}

/// `POST {api_base}/save-transcript`.
#[derive(Clone)]
pub struct HttpTranscriptArchive {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTranscriptArchive {
    pub fn new(http: reqwest::Client, api_base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            url: format!("{}/save-transcript", api_base_url.trim_end_matches('/')),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TranscriptArchive for HttpTranscriptArchive {
    async fn save(&self, record: &TranscriptRecord) -> Result<()> {
        debug!(
            "Saving transcript for session {} ({} utterances)",
            record.session_id,
            record.transcriptions.len()
        );
        self.http
            .post(&self.url)
            .timeout(self.timeout)
            .json(record)
            .send()
            .await
            .with_context(|| format!("failed to reach transcript archive at {}", self.url))?
            .error_for_status()
            .context("transcript archive rejected the record")?;
        Ok(())
    }
}
