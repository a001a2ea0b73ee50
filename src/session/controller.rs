use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};

use crate::config::ProctorConfig;
use crate::db::models::{ProctoringEventKind, SessionStatus};
use crate::db::LocalCache;
use crate::error::{ControllerError, FeedbackError, PersistError};
use crate::feedback::{generate_feedback, Summarizer};
use crate::models::{FeedbackResult, RoomCredentials, SessionId, Utterance};
use crate::persist::ResultPersister;
use crate::proctoring::{FullscreenChange, ProctoringMonitor, ProctoringState, ProctoringVerdict};
use crate::timer::{SessionTimer, TickDriver, TimerEvent, TimerPhase, WallClock};
use crate::transcript::TranscriptStore;

use super::events::{Notice, SessionEvent, SessionOutcome};
use super::ports::{MediaHandle, MediaRoom, SessionHost, SessionJournal, UtteranceSink};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub duration_seconds: u32,
    pub feedback_threshold_seconds: u32,
    /// `None` leaves ticking to the caller.
    pub tick_interval: Option<Duration>,
    pub violation_path: String,
    pub completion_path: String,
    pub abandon_path: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ProctorConfig::default())
    }
}

impl From<&ProctorConfig> for SessionSettings {
    fn from(config: &ProctorConfig) -> Self {
        Self {
            duration_seconds: config.session_duration_secs,
            feedback_threshold_seconds: config.feedback_threshold_secs,
            tick_interval: Some(Duration::from_millis(config.tick_interval_ms)),
            violation_path: config.violation_path.clone(),
            completion_path: config.completion_path.clone(),
            abandon_path: config.abandon_path.clone(),
        }
    }
}

impl SessionSettings {
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.duration_seconds == 0 {
            return Err(ControllerError::InvalidSettings(
                "session duration must be positive".into(),
            ));
        }
        if self.feedback_threshold_seconds >= self.duration_seconds {
            return Err(ControllerError::InvalidSettings(format!(
                "feedback threshold ({}s) must be below the session duration ({}s)",
                self.feedback_threshold_seconds, self.duration_seconds
            )));
        }
        if self.tick_interval == Some(Duration::ZERO) {
            return Err(ControllerError::InvalidSettings(
                "tick interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Collaborators injected into a session.
#[derive(Clone)]
pub struct SessionPorts {
    pub summarizer: Arc<dyn Summarizer>,
    pub persister: Arc<ResultPersister>,
    pub media: Arc<dyn MediaRoom>,
    pub host: Arc<dyn SessionHost>,
    pub cache: Arc<dyn LocalCache>,
    pub journal: Option<Arc<dyn SessionJournal>>,
    pub clock: Arc<dyn WallClock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub proctoring: ProctoringState,
    pub phase: TimerPhase,
    pub remaining_seconds: u32,
    pub exit_count: u32,
    pub utterance_count: usize,
    pub feedback_persisted: bool,
    pub outcome: Option<SessionOutcome>,
    pub feedback: Option<FeedbackResult>,
}

/// Supervises one proctored interview.
///
/// Owns the proctoring state and the persistence guard. Events are handled
/// strictly one at a time; the only long suspension is the feedback request,
/// which runs as a separate task and reports back as
/// [`SessionEvent::FeedbackReady`]. Once a terminal outcome is latched every
/// further event is ignored, so a violation and a completed feedback can
/// never both take effect.
pub struct SessionController {
    session_id: SessionId,
    settings: SessionSettings,
    ports: SessionPorts,
    credentials: Option<RoomCredentials>,

    /// Held until `run` starts so callers can take senders before it.
    own_tx: Option<UnboundedSender<SessionEvent>>,
    events_tx: WeakUnboundedSender<SessionEvent>,
    events_rx: UnboundedReceiver<SessionEvent>,
    monitoring: Arc<AtomicBool>,

    proctoring: ProctoringState,
    exit_count: u32,
    phase: TimerPhase,
    timer: SessionTimer,
    ticker: TickDriver,
    transcript: TranscriptStore,
    media: Option<MediaHandle>,

    feedback_attempted: bool,
    result: Option<FeedbackResult>,
    persisted: bool,
    outcome: Option<SessionOutcome>,
}

impl SessionController {
    pub async fn open(
        session_id: SessionId,
        settings: SessionSettings,
        ports: SessionPorts,
        credentials: Option<RoomCredentials>,
    ) -> Result<Self, ControllerError> {
        settings.validate()?;

        let (own_tx, events_rx) = mpsc::unbounded_channel();
        let events_tx = own_tx.downgrade();
        let transcript = TranscriptStore::open(session_id.clone(), ports.cache.clone()).await;
        let timer = SessionTimer::new(
            session_id.clone(),
            ports.cache.clone(),
            settings.feedback_threshold_seconds,
        );

        Ok(Self {
            session_id,
            settings,
            ports,
            credentials,
            own_tx: Some(own_tx),
            events_tx,
            events_rx,
            monitoring: Arc::new(AtomicBool::new(true)),
            proctoring: ProctoringState::default(),
            exit_count: 0,
            phase: TimerPhase::default(),
            timer,
            ticker: TickDriver::new(),
            transcript,
            media: None,
            feedback_attempted: false,
            result: None,
            persisted: false,
            outcome: None,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Handle for the host's fullscreen notifications. Stops reporting once
    /// the session ends.
    pub fn monitor(&self) -> ProctoringMonitor {
        ProctoringMonitor::sharing(self.event_sender(), self.monitoring.clone())
    }

    /// The returned sender is already closed if `run` has started and every
    /// other sender is gone.
    pub fn event_sender(&self) -> UnboundedSender<SessionEvent> {
        self.sender()
            .unwrap_or_else(|| mpsc::unbounded_channel().0)
    }

    fn sender(&self) -> Option<UnboundedSender<SessionEvent>> {
        self.own_tx.clone().or_else(|| self.events_tx.upgrade())
    }

    pub fn proctoring_state(&self) -> ProctoringState {
        self.proctoring
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    pub fn is_feedback_persisted(&self) -> bool {
        self.persisted
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            proctoring: self.proctoring,
            phase: self.phase,
            remaining_seconds: self.timer.remaining_seconds(),
            exit_count: self.exit_count,
            utterance_count: self.transcript.len(),
            feedback_persisted: self.persisted,
            outcome: self.outcome,
            feedback: self.result.clone(),
        }
    }

    /// Processes queued events until a terminal outcome is latched.
    ///
    /// The controller gives up its own sender here, so the session keeps
    /// going only while the host, the ticker, the media room or a feedback
    /// request can still deliver events. Fails with
    /// [`ControllerError::EventsClosed`] once none of them can.
    pub async fn run(&mut self) -> Result<SessionOutcome, ControllerError> {
        self.own_tx = None;
        while self.outcome.is_none() {
            match self.events_rx.recv().await {
                Some(event) => self.handle(event).await,
                None => return Err(ControllerError::EventsClosed),
            }
        }
        self.outcome.ok_or(ControllerError::EventsClosed)
    }

    /// Waits for one event and handles it. Returns false if the channel closed.
    pub async fn process_next(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle(event).await;
                true
            }
            None => false,
        }
    }

    /// Handles every event already queued, without waiting for more.
    pub async fn drain(&mut self) {
        while self.outcome.is_none() {
            match self.events_rx.try_recv() {
                Ok(event) => self.handle(event).await,
                Err(_) => break,
            }
        }
    }

    pub async fn handle(&mut self, event: SessionEvent) {
        if let Some(outcome) = self.outcome {
            debug!(
                "Session {} already ended ({:?}); ignoring {}",
                self.session_id,
                outcome,
                event.kind()
            );
            return;
        }

        match event {
            SessionEvent::Fullscreen(change) => self.on_fullscreen(change).await,
            SessionEvent::Tick => self.on_tick().await,
            SessionEvent::Utterance(utterance) => self.on_utterance(utterance).await,
            SessionEvent::FeedbackReady(result) => self.on_feedback_ready(result).await,
            SessionEvent::RetryFeedback => self.on_retry().await,
        }
    }

    fn now_ms(&self) -> i64 {
        self.ports.clock.now_ms()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms())
            .single()
            .unwrap_or_else(Utc::now)
    }

    async fn on_fullscreen(&mut self, change: FullscreenChange) {
        let (next, verdict) = self.proctoring.apply(change, self.exit_count);
        if matches!(verdict, ProctoringVerdict::Warned | ProctoringVerdict::Violation) {
            self.exit_count += 1;
        }
        self.proctoring = next;

        let kind = match change {
            FullscreenChange::Entered => ProctoringEventKind::Entered,
            FullscreenChange::Exited => ProctoringEventKind::Exited,
        };
        // The session row has to exist before its first event is recorded.
        if !matches!(verdict, ProctoringVerdict::Started | ProctoringVerdict::Ignored) {
            self.journal_proctoring(kind).await;
        }

        match verdict {
            ProctoringVerdict::Started => {
                self.start_session().await;
                self.journal_proctoring(kind).await;
            }
            ProctoringVerdict::Warned => {
                warn!(
                    "Session {} left fullscreen (exit {}); warning issued",
                    self.session_id, self.exit_count
                );
                self.ports.host.notify(Notice::FullscreenWarning).await;
            }
            ProctoringVerdict::Resumed => {
                info!("Session {} back in fullscreen", self.session_id);
            }
            ProctoringVerdict::Violation => {
                warn!(
                    "Session {} left fullscreen again (exit {}); terminating",
                    self.session_id, self.exit_count
                );
                self.journal_proctoring(ProctoringEventKind::Violation).await;
                self.finish(SessionOutcome::Terminated).await;
            }
            ProctoringVerdict::Ignored => {
                debug!(
                    "Session {}: fullscreen {} ignored in state {:?}",
                    self.session_id,
                    change.as_str(),
                    self.proctoring
                );
            }
        }
    }

    async fn start_session(&mut self) {
        let now_ms = self.now_ms();
        let duration = self.settings.duration_seconds;
        match self.timer.resume(duration, now_ms).await {
            Ok(clock) => {
                if let Some(journal) = &self.ports.journal {
                    let started_at = Utc
                        .timestamp_millis_opt(clock.started_at_epoch_ms)
                        .single()
                        .unwrap_or_else(Utc::now);
                    if let Err(err) = journal
                        .session_started(&self.session_id, started_at, clock.duration_seconds)
                        .await
                    {
                        warn!("Failed to record start of session {}: {err:#}", self.session_id);
                    }
                }
            }
            Err(err) => {
                // The countdown is armed even when the anchor could not be saved.
                error!("Session {} clock is not persisted: {err:#}", self.session_id);
            }
        }

        let events = self.sender();
        if events.is_none() {
            warn!(
                "Session {} has no event source left; media and ticking are skipped",
                self.session_id
            );
        }

        if let (Some(credentials), Some(events)) = (self.credentials.clone(), events.clone()) {
            let sink = UtteranceSink::new(events);
            match self.ports.media.start(&credentials, sink).await {
                Ok(handle) => {
                    info!("Media room joined for session {}", self.session_id);
                    self.media = Some(handle);
                }
                Err(err) => {
                    error!("Failed to join media room for session {}: {err:#}", self.session_id);
                    self.ports
                        .host
                        .notify(Notice::MediaConnectionFailed {
                            message: err.to_string(),
                        })
                        .await;
                }
            }
        }

        if let (Some(interval), Some(events)) = (self.settings.tick_interval, events) {
            self.ticker.start(interval, events);
        }

        // A resumed session may already be past the threshold.
        self.on_tick().await;
    }

    async fn on_tick(&mut self) {
        if !self.timer.is_started() {
            return;
        }

        let report = self.timer.tick(self.now_ms());
        self.ports.host.time_remaining(report.remaining_seconds).await;

        for event in report.events {
            if self.outcome.is_some() {
                break;
            }
            match event {
                TimerEvent::ThresholdCrossed(watch) => {
                    info!(
                        "Session {} reached {}s remaining; generating feedback",
                        self.session_id, watch
                    );
                    if self.phase == TimerPhase::Running && !self.feedback_attempted {
                        self.begin_feedback().await;
                    }
                }
                TimerEvent::Expired => self.on_expired().await,
            }
        }
    }

    async fn on_expired(&mut self) {
        info!("Session {} ran out of time", self.session_id);
        match self.phase {
            TimerPhase::Running if self.result.is_some() => {
                self.phase = TimerPhase::FeedbackInFlight;
                self.commit_result().await;
            }
            // Validated settings report the threshold first, so this only runs
            // when the threshold was never observed.
            TimerPhase::Running if !self.feedback_attempted => {
                warn!(
                    "Session {} expired before the feedback threshold fired",
                    self.session_id
                );
                self.begin_feedback().await;
            }
            TimerPhase::Running => self.finish(SessionOutcome::Expired).await,
            // The in-flight request decides; with no time left a failure ends the session.
            TimerPhase::FeedbackInFlight => {}
            TimerPhase::Completed | TimerPhase::Expired => {}
        }
    }

    async fn on_utterance(&mut self, utterance: Utterance) {
        if self.phase != TimerPhase::Running || !self.timer.is_started() {
            debug!(
                "Session {}: dropping utterance while {:?}",
                self.session_id, self.phase
            );
            return;
        }
        if let Err(err) = self.transcript.append(utterance).await {
            warn!("{err:#}");
        }
    }

    /// Freezes the transcript and starts the feedback request.
    async fn begin_feedback(&mut self) {
        self.feedback_attempted = true;
        self.phase = TimerPhase::FeedbackInFlight;
        self.stop_media().await;
        self.ports.host.notify(Notice::FeedbackGenerating).await;

        let snapshot = self.transcript.snapshot();
        let summarizer = self.ports.summarizer.clone();
        let clock = self.ports.clock.clone();
        let session_id = self.session_id.clone();

        info!(
            "Requesting feedback for session {} ({} utterances)",
            session_id,
            snapshot.len()
        );

        let Some(events) = self.sender() else {
            // Nothing could deliver the result back, so wait for it here.
            let result =
                generate_feedback(summarizer.as_ref(), &session_id, &snapshot, clock.as_ref()).await;
            self.on_feedback_ready(result).await;
            return;
        };

        tokio::spawn(async move {
            let result =
                generate_feedback(summarizer.as_ref(), &session_id, &snapshot, clock.as_ref()).await;
            if events.send(SessionEvent::FeedbackReady(result)).is_err() {
                debug!("Session {session_id} closed before feedback arrived");
            }
        });
    }

    async fn on_feedback_ready(&mut self, result: Result<FeedbackResult, FeedbackError>) {
        if self.phase != TimerPhase::FeedbackInFlight {
            debug!(
                "Session {}: discarding feedback result while {:?}",
                self.session_id, self.phase
            );
            return;
        }

        match result {
            Ok(result) => {
                self.result = Some(result);
                self.commit_result().await;
            }
            Err(err) => {
                warn!("Feedback generation failed for session {}: {err}", self.session_id);
                self.recover_or_expire(err.to_string()).await;
            }
        }
    }

    async fn on_retry(&mut self) {
        if self.phase != TimerPhase::Running || !self.feedback_attempted {
            debug!(
                "Session {}: nothing to retry while {:?}",
                self.session_id, self.phase
            );
            return;
        }
        if self.time_left() == 0 {
            debug!("Session {}: retry ignored, no time left", self.session_id);
            return;
        }

        if self.result.is_some() {
            info!("Retrying persistence for session {}", self.session_id);
            self.phase = TimerPhase::FeedbackInFlight;
            self.commit_result().await;
        } else {
            info!("Retrying feedback generation for session {}", self.session_id);
            self.begin_feedback().await;
        }
    }

    /// Commits the generated result unless the guard is already set.
    async fn commit_result(&mut self) {
        if self.persisted {
            return;
        }
        let Some(result) = self.result.clone() else {
            return;
        };

        let snapshot = self.transcript.snapshot();
        match self
            .ports
            .persister
            .commit(&self.session_id, &result, &snapshot)
            .await
        {
            Ok(report) => {
                self.persisted = true;
                if !report.retried.is_empty() {
                    info!(
                        "Session {} persisted after retrying {:?}",
                        self.session_id, report.retried
                    );
                }
                self.finish(SessionOutcome::Completed { durable: true }).await;
            }
            Err(PersistError::Partial { failed, succeeded }) => {
                warn!(
                    "Session {} persisted partially: {:?} failed, {:?} written",
                    self.session_id, failed, succeeded
                );
                self.ports
                    .host
                    .notify(Notice::PartialPersistence { failed })
                    .await;
                // Partial state is only accepted once there is no time to retry.
                if self.time_left() > 0 {
                    self.recover_or_expire("some of your feedback could not be saved".to_string())
                        .await;
                } else {
                    self.persisted = true;
                    self.finish(SessionOutcome::Completed { durable: false }).await;
                }
            }
            Err(err @ PersistError::Failed { .. }) => {
                error!("Session {}: {err}", self.session_id);
                self.recover_or_expire("your feedback could not be saved".to_string())
                    .await;
            }
        }
    }

    /// After a failed attempt: back to running with a retry offer while time
    /// remains, otherwise the session ends without feedback.
    async fn recover_or_expire(&mut self, message: String) {
        if self.time_left() > 0 {
            self.phase = TimerPhase::Running;
            self.ports
                .host
                .notify(Notice::FeedbackFailed {
                    message,
                    retryable: true,
                })
                .await;
        } else {
            self.finish(SessionOutcome::Expired).await;
        }
    }

    fn time_left(&self) -> u32 {
        self.timer.remaining_at(self.now_ms())
    }

    async fn stop_media(&mut self) {
        if let Some(handle) = self.media.take() {
            match self.ports.media.stop(handle).await {
                Ok(()) => info!("Media room released for session {}", self.session_id),
                Err(err) => error!(
                    "Failed to release media room for session {}: {err:#}",
                    self.session_id
                ),
            }
        }
    }

    async fn journal_proctoring(&self, kind: ProctoringEventKind) {
        if let Some(journal) = &self.ports.journal {
            if let Err(err) = journal
                .proctoring_event(&self.session_id, kind, self.now())
                .await
            {
                warn!(
                    "Failed to record proctoring event for session {}: {err:#}",
                    self.session_id
                );
            }
        }
    }

    /// Latches the terminal outcome and tears the session down.
    async fn finish(&mut self, outcome: SessionOutcome) {
        if self.outcome.is_some() {
            return;
        }
        self.outcome = Some(outcome);
        self.ticker.stop();
        self.monitoring.store(false, Ordering::SeqCst);
        self.stop_media().await;

        match outcome {
            SessionOutcome::Completed { .. } => self.phase = TimerPhase::Completed,
            SessionOutcome::Expired => self.phase = TimerPhase::Expired,
            SessionOutcome::Terminated => self.proctoring = ProctoringState::Terminated,
        }

        if let Err(err) = self.timer.clear().await {
            warn!("{err:#}");
        }
        if let Err(err) = self.transcript.clear_cache().await {
            warn!("{err:#}");
        }

        let (status, detail) = match outcome {
            SessionOutcome::Completed { durable: true } => (SessionStatus::Completed, None),
            SessionOutcome::Completed { durable: false } => (
                SessionStatus::Completed,
                Some("feedback partially persisted".to_string()),
            ),
            SessionOutcome::Expired => (
                SessionStatus::Expired,
                Some("no feedback persisted".to_string()),
            ),
            SessionOutcome::Terminated => (
                SessionStatus::Terminated,
                Some(format!("fullscreen exited {} times", self.exit_count)),
            ),
        };
        if let Some(journal) = &self.ports.journal {
            if let Err(err) = journal
                .session_finished(&self.session_id, status, detail, self.now())
                .await
            {
                warn!("Failed to record end of session {}: {err:#}", self.session_id);
            }
        }

        info!("Session {} ended: {:?}", self.session_id, outcome);

        let (notice, path) = match outcome {
            SessionOutcome::Completed { .. } => {
                (Notice::InterviewComplete, self.settings.completion_path.clone())
            }
            SessionOutcome::Expired => {
                (Notice::FeedbackUnavailable, self.settings.abandon_path.clone())
            }
            SessionOutcome::Terminated => {
                (Notice::SessionTerminated, self.settings.violation_path.clone())
            }
        };
        self.ports.host.notify(notice).await;
        self.ports.host.navigate(&path).await;
    }
}
