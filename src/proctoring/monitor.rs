use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::session::SessionEvent;

use super::state::FullscreenChange;

/// Forwards the host's fullscreen notifications to the session controller.
///
/// Every change is delivered in order and none are coalesced: an exit
/// followed by an enter within one tick still reaches the controller as two
/// events. The monitor keeps no proctoring state of its own.
#[derive(Clone)]
pub struct ProctoringMonitor {
    events: UnboundedSender<SessionEvent>,
    enabled: Arc<AtomicBool>,
}

impl ProctoringMonitor {
    pub fn new(events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            events,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A monitor whose `stop` is shared with `enabled`.
    pub(crate) fn sharing(events: UnboundedSender<SessionEvent>, enabled: Arc<AtomicBool>) -> Self {
        Self { events, enabled }
    }

    /// Returns false once the monitor is stopped or the controller is gone.
    pub fn report(&self, change: FullscreenChange) -> bool {
        if !self.enabled.load(Ordering::SeqCst) {
            return false;
        }
        self.events.send(SessionEvent::Fullscreen(change)).is_ok()
    }

    pub fn report_fullscreen(&self, entered: bool) -> bool {
        self.report(FullscreenChange::from_entered(entered))
    }

    pub fn stop(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.enabled.load(Ordering::SeqCst) && !self.events.is_closed()
    }
}
