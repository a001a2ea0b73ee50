pub mod client;
pub mod stars;
pub mod stream;

use async_trait::async_trait;
use log::{info, warn};

use crate::error::FeedbackError;
use crate::models::{FeedbackResult, SessionId, Utterance};
use crate::scoring::performance_percentage;
use crate::timer::WallClock;

pub use client::FeedbackClient;
pub use stars::StarRating;

/// Turns a transcript into summary text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        session_id: &SessionId,
        transcript: &[Utterance],
    ) -> Result<String, FeedbackError>;
}

/// Produces the session's [`FeedbackResult`].
///
/// A transient failure is retried once; protocol and upstream errors are
/// returned immediately and never yield a partial summary.
pub async fn generate_feedback(
    summarizer: &dyn Summarizer,
    session_id: &SessionId,
    transcript: &[Utterance],
    clock: &dyn WallClock,
) -> Result<FeedbackResult, FeedbackError> {
    if transcript.is_empty() {
        return Err(FeedbackError::NoTranscript);
    }

    let summary = match summarizer.summarize(session_id, transcript).await {
        Err(err) if err.is_transient() => {
            warn!("Feedback generation for session {session_id} failed ({err}); retrying once");
            summarizer.summarize(session_id, transcript).await?
        }
        other => other?,
    };

    let utterance_count = transcript.len();
    let total_word_count = transcript.iter().map(Utterance::word_count).sum();
    let result = FeedbackResult {
        star_rating: StarRating::parse(&summary).value(),
        performance_percentage: performance_percentage(&summary, utterance_count, total_word_count),
        summary_text: summary,
        utterance_count,
        total_word_count,
        generated_at_epoch_ms: clock.now_ms(),
    };

    info!(
        "Feedback generated for session {}: {} stars, {}%",
        session_id, result.star_rating, result.performance_percentage
    );
    Ok(result)
}
