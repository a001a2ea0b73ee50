pub mod feedback;
pub mod session;

pub use feedback::{FeedbackDocument, FeedbackResult, PerformanceMetrics, TranscriptRecord};
pub use session::{CandidateInfo, RoomCredentials, SessionId, Speaker, Utterance};
