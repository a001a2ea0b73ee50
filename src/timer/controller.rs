use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::LocalCache;
use crate::models::SessionId;
use crate::session::SessionEvent;

use super::state::{SessionClock, TickReport, TimerEvent, CLOCK_NAMESPACE};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Countdown for one session, anchored to a persisted start time.
///
/// `tick` may be called late, early or repeatedly: remaining time is
/// recomputed from the anchor each time and never increases, and each event
/// fires at most once.
pub struct SessionTimer {
    session_id: SessionId,
    cache: Arc<dyn LocalCache>,
    watch_seconds: u32,
    clock: Option<SessionClock>,
    last_remaining: u32,
    threshold_fired: bool,
    expired_fired: bool,
}

impl SessionTimer {
    pub fn new(session_id: SessionId, cache: Arc<dyn LocalCache>, watch_seconds: u32) -> Self {
        Self {
            session_id,
            cache,
            watch_seconds,
            clock: None,
            last_remaining: 0,
            threshold_fired: false,
            expired_fired: false,
        }
    }

    fn cache_key(&self) -> String {
        self.session_id.cache_key(CLOCK_NAMESPACE)
    }

    /// Anchors a fresh countdown at `now_ms` and persists it.
    pub async fn start(&mut self, duration_seconds: u32, now_ms: i64) -> Result<SessionClock> {
        let clock = SessionClock::new(duration_seconds, now_ms);
        let serialized = serde_json::to_string(&clock)?;
        self.arm(clock);
        self.cache
            .set(&self.cache_key(), &serialized)
            .await
            .with_context(|| format!("failed to persist clock for session {}", self.session_id))?;
        log_info!(
            "Timer started for session {} ({}s)",
            self.session_id,
            duration_seconds
        );
        Ok(clock)
    }

    /// Picks up a persisted anchor after a reload. Missing or corrupt state
    /// starts a fresh full-duration countdown instead of ending the session.
    pub async fn resume(&mut self, duration_seconds: u32, now_ms: i64) -> Result<SessionClock> {
        let stored = match self.cache.get(&self.cache_key()).await {
            Ok(value) => value,
            Err(err) => {
                log_warn!("Failed to read clock for session {}: {err:#}", self.session_id);
                None
            }
        };

        let restored = stored.and_then(|raw| match serde_json::from_str::<SessionClock>(&raw) {
            Ok(clock) if clock.is_valid_at(now_ms) => Some(clock),
            Ok(clock) => {
                log_warn!(
                    "Discarding implausible clock for session {}: {:?}",
                    self.session_id,
                    clock
                );
                None
            }
            Err(err) => {
                log_warn!("Discarding corrupt clock for session {}: {err}", self.session_id);
                None
            }
        });

        match restored {
            Some(clock) => {
                self.arm(clock);
                log_info!(
                    "Timer resumed for session {} with {}s remaining",
                    self.session_id,
                    clock.remaining_seconds(now_ms)
                );
                Ok(clock)
            }
            None => self.start(duration_seconds, now_ms).await,
        }
    }

    fn arm(&mut self, clock: SessionClock) {
        self.clock = Some(clock);
        // The first tick compares against the full duration, so a resume that
        // lands below the watch value still crosses it once.
        self.last_remaining = clock.duration_seconds;
        self.threshold_fired = false;
        self.expired_fired = false;
    }

    pub fn is_started(&self) -> bool {
        self.clock.is_some()
    }

    pub fn remaining_seconds(&self) -> u32 {
        if self.clock.is_some() {
            self.last_remaining
        } else {
            0
        }
    }

    /// Remaining time at `now_ms` without consuming any pending event.
    pub fn remaining_at(&self, now_ms: i64) -> u32 {
        match self.clock {
            Some(clock) => clock.remaining_seconds(now_ms).min(self.last_remaining),
            None => 0,
        }
    }

    pub fn tick(&mut self, now_ms: i64) -> TickReport {
        let Some(clock) = self.clock else {
            return TickReport {
                remaining_seconds: 0,
                events: Vec::new(),
            };
        };

        let previous = self.last_remaining;
        let remaining = clock.remaining_seconds(now_ms).min(previous);
        self.last_remaining = remaining;

        let mut events = Vec::new();
        if !self.threshold_fired && remaining <= self.watch_seconds && previous > self.watch_seconds {
            self.threshold_fired = true;
            events.push(TimerEvent::ThresholdCrossed(self.watch_seconds));
        }
        if !self.expired_fired && remaining == 0 {
            self.expired_fired = true;
            events.push(TimerEvent::Expired);
        }

        if !events.is_empty() {
            log_debug!(
                "Session {} tick at {}s remaining: {:?}",
                self.session_id,
                remaining,
                events
            );
        }

        TickReport {
            remaining_seconds: remaining,
            events,
        }
    }

    /// Drops the persisted anchor; called on every terminal transition.
    pub async fn clear(&mut self) -> Result<()> {
        self.cache
            .remove(&self.cache_key())
            .await
            .with_context(|| format!("failed to clear clock for session {}", self.session_id))
    }
}

/// Emits `SessionEvent::Tick` on a fixed interval until stopped.
#[derive(Default)]
pub struct TickDriver {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl TickDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, interval: Duration, events: UnboundedSender<SessionEvent>) {
        self.stop();

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of `interval` completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if events.send(SessionEvent::Tick).is_err() {
                            log_debug!("tick receiver dropped; stopping tick driver");
                            break;
                        }
                    }
                    _ = token.cancelled() => {
                        log_debug!("tick driver shutting down");
                        break;
                    }
                }
            }
        });

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
    }

    pub fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.handle.take();
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryCache;

    const START: i64 = 1_700_000_000_000;

    fn timer(cache: Arc<MemoryCache>) -> SessionTimer {
        SessionTimer::new(SessionId::new("s1"), cache, 120)
    }

    #[tokio::test]
    async fn remaining_never_increases_or_goes_negative() {
        let cache = Arc::new(MemoryCache::new());
        let mut timer = timer(cache);
        timer.start(840, START).await.unwrap();

        let mut previous = 840;
        for now in [START + 5_000, START + 3_000, START + 400_000, START + 10_000, START + 5_000_000] {
            let report = timer.tick(now);
            assert!(report.remaining_seconds <= previous);
            previous = report.remaining_seconds;
        }
        assert_eq!(previous, 0);
    }

    #[tokio::test]
    async fn threshold_fires_once_across_a_jump() {
        let cache = Arc::new(MemoryCache::new());
        let mut timer = timer(cache);
        timer.start(840, START).await.unwrap();

        // 130s remaining, then a single delayed tick lands at 90s.
        assert!(timer.tick(START + 710_000).events.is_empty());
        let report = timer.tick(START + 750_000);
        assert_eq!(report.remaining_seconds, 90);
        assert_eq!(report.events, vec![TimerEvent::ThresholdCrossed(120)]);

        assert!(timer.tick(START + 750_000).events.is_empty());
        assert!(timer.tick(START + 760_000).events.is_empty());
    }

    #[tokio::test]
    async fn threshold_fires_once_with_one_second_steps() {
        let cache = Arc::new(MemoryCache::new());
        let mut timer = timer(cache);
        timer.start(840, START).await.unwrap();

        let fired: usize = (0..=840)
            .map(|secs| timer.tick(START + secs * 1000).events)
            .filter(|events| events.contains(&TimerEvent::ThresholdCrossed(120)))
            .count();
        assert_eq!(fired, 1);
    }

    #[tokio::test]
    async fn expiry_fires_once() {
        let cache = Arc::new(MemoryCache::new());
        let mut timer = timer(cache);
        timer.start(10, START).await.unwrap();

        // Never above the watch value, so only expiry is reported.
        let report = timer.tick(START + 60_000);
        assert_eq!(report.events, vec![TimerEvent::Expired]);
        assert!(timer.tick(START + 61_000).events.is_empty());
    }

    #[tokio::test]
    async fn resume_uses_persisted_anchor() {
        let cache = Arc::new(MemoryCache::new());
        timer(cache.clone()).start(840, START).await.unwrap();

        let mut resumed = timer(cache);
        let clock = resumed.resume(840, START + 300_000).await.unwrap();
        assert_eq!(clock.started_at_epoch_ms, START);
        assert_eq!(resumed.tick(START + 300_000).remaining_seconds, 540);
    }

    #[tokio::test]
    async fn corrupt_or_missing_state_starts_fresh() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("clock:s1", "{not json").await.unwrap();

        let mut timer = timer(cache.clone());
        let clock = timer.resume(840, START).await.unwrap();
        assert_eq!(clock, SessionClock::new(840, START));
        assert_eq!(timer.tick(START).remaining_seconds, 840);

        let stored = cache.get("clock:s1").await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<SessionClock>(&stored).unwrap(), clock);

        let mut fresh = SessionTimer::new(SessionId::new("other"), cache, 120);
        assert_eq!(fresh.resume(600, START).await.unwrap().duration_seconds, 600);
    }

    #[tokio::test]
    async fn clear_removes_persisted_clock() {
        let cache = Arc::new(MemoryCache::new());
        let mut timer = timer(cache.clone());
        timer.start(840, START).await.unwrap();
        timer.clear().await.unwrap();
        assert!(cache.get("clock:s1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_driver_emits_until_stopped() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut driver = TickDriver::new();
        driver.start(Duration::from_secs(1), tx);

        time::sleep(Duration::from_millis(3_500)).await;
        driver.stop();
        tokio::task::yield_now().await;

        let mut ticks = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, SessionEvent::Tick));
            ticks += 1;
        }
        assert_eq!(ticks, 3);
    }
}
