//! Feedback produced at the end of a session and the records persisted from it.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::feedback::StarRating;

use super::session::{CandidateInfo, SessionId, Utterance};

const GUEST_REGISTER_NUMBER: &str = "candidate";
const GUEST_NAME: &str = "Guest User";

/// Created exactly once per session; never modified after hand-off to the persister.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResult {
    pub summary_text: String,
    /// 0..=5 in half steps.
    pub star_rating: f32,
    /// 0..=95.
    pub performance_percentage: u8,
    pub utterance_count: usize,
    pub total_word_count: usize,
    pub generated_at_epoch_ms: i64,
}

impl FeedbackResult {
    pub fn generated_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.generated_at_epoch_ms)
            .single()
            .unwrap_or_default()
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            total_messages: self.utterance_count,
            total_words: self.total_word_count,
            performance_percentage: self.performance_percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_messages: usize,
    pub total_words: usize,
    pub performance_percentage: u8,
}

/// Document written to both keyed-store paths.
///
/// Built only from the immutable [`FeedbackResult`], so two builds for the
/// same session are identical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDocument {
    pub session_id: SessionId,
    pub register_number: String,
    pub name: String,
    pub feedback: String,
    pub timestamp: String,
    /// Legacy field: glyph length of the matched star run, half marker included.
    pub stars: u8,
    pub star_rating: f32,
    pub performance_percentage: u8,
    pub interview_date: String,
    pub interview_time: String,
    pub transcription_count: usize,
    pub total_words: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hr_id: Option<String>,
}

impl FeedbackDocument {
    pub fn new(
        session_id: &SessionId,
        result: &FeedbackResult,
        candidate: Option<&CandidateInfo>,
    ) -> Self {
        let generated_at = result.generated_at();
        let register_number = candidate
            .and_then(|info| info.mockello_id.clone())
            .unwrap_or_else(|| GUEST_REGISTER_NUMBER.to_string());
        let name = candidate
            .and_then(|info| info.candidate_name.clone())
            .unwrap_or_else(|| GUEST_NAME.to_string());

        Self {
            session_id: session_id.clone(),
            register_number,
            name,
            feedback: result.summary_text.clone(),
            timestamp: generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            stars: StarRating::parse(&result.summary_text).glyph_len(),
            star_rating: result.star_rating,
            performance_percentage: result.performance_percentage,
            interview_date: generated_at.format("%Y-%m-%d").to_string(),
            interview_time: generated_at.format("%H:%M:%S").to_string(),
            transcription_count: result.utterance_count,
            total_words: result.total_word_count,
            hr_id: candidate.and_then(|info| info.hr_id.clone()),
        }
    }
}

/// Body sent to the transcript archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRecord {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_info: Option<CandidateInfo>,
    pub transcriptions: Vec<Utterance>,
    pub feedback: FeedbackDocument,
    pub performance_metrics: PerformanceMetrics,
}
