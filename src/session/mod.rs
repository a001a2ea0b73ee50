pub mod controller;
pub mod events;
pub mod ports;

pub use controller::{SessionController, SessionPorts, SessionSettings, SessionSnapshot};
pub use events::{Notice, SessionEvent, SessionOutcome};
pub use ports::{MediaHandle, MediaRoom, SessionHost, SessionJournal, UtteranceSink};
