pub mod proctoring_event;
pub mod session;

pub use proctoring_event::{ProctoringEvent, ProctoringEventKind};
pub use session::{SessionRecord, SessionStatus};
