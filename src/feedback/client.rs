use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;

use crate::error::FeedbackError;
use crate::models::{SessionId, Utterance};

use super::{stream::read_summary, Summarizer};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummarizeRequest<'a> {
    transcriptions: &'a [Utterance],
    #[serde(rename = "isHREvaluation")]
    is_hr_evaluation: bool,
    session_id: &'a SessionId,
}

/// Calls `POST {api_base}/summarize` and reads its NDJSON body as it streams.
#[derive(Clone)]
pub struct FeedbackClient {
    http: reqwest::Client,
    summarize_url: String,
    timeout: Duration,
}

impl FeedbackClient {
    pub fn new(http: reqwest::Client, api_base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            summarize_url: format!("{}/summarize", api_base_url.trim_end_matches('/')),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.summarize_url
    }
}

#[async_trait]
impl Summarizer for FeedbackClient {
    async fn summarize(
        &self,
        session_id: &SessionId,
        transcript: &[Utterance],
    ) -> Result<String, FeedbackError> {
        let request = SummarizeRequest {
            transcriptions: transcript,
            is_hr_evaluation: true,
            session_id,
        };

        debug!(
            "Requesting feedback for session {} ({} utterances) from {}",
            session_id,
            transcript.len(),
            self.summarize_url
        );

        let response = self
            .http
            .post(&self.summarize_url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/x-ndjson")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| FeedbackError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedbackError::Status(status.as_u16()));
        }

        let summary = read_summary(response.bytes_stream()).await?;
        info!(
            "Feedback stream finished for session {} ({} chars)",
            session_id,
            summary.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_url_tolerates_trailing_slash() {
        let client = FeedbackClient::new(
            reqwest::Client::new(),
            "http://localhost:3000/api/",
            Duration::from_secs(5),
        );
        assert_eq!(client.url(), "http://localhost:3000/api/summarize");
    }

    #[test]
    fn request_body_matches_endpoint_contract() {
        let session_id = SessionId::new("s-9");
        let transcript = vec![Utterance::new(crate::models::Speaker::Candidate, "hi", 1)];
        let body = serde_json::to_value(SummarizeRequest {
            transcriptions: &transcript,
            is_hr_evaluation: true,
            session_id: &session_id,
        })
        .unwrap();
        assert_eq!(body["sessionId"], "s-9");
        assert_eq!(body["isHREvaluation"], true);
        assert_eq!(body["transcriptions"][0]["text"], "hi");
    }
}
