pub mod monitor;
pub mod state;

pub use monitor::ProctoringMonitor;
pub use state::{FullscreenChange, ProctoringState, ProctoringVerdict};
