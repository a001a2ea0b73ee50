pub mod clock;
pub mod controller;
pub mod state;

pub use clock::{ManualClock, SystemClock, WallClock};
pub use controller::{SessionTimer, TickDriver};
pub use state::{format_remaining, SessionClock, TickReport, TimerEvent, TimerPhase};
