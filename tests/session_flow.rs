use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Semaphore;

use interview_proctor_lib::db::{LocalCache, MemoryCache};
use interview_proctor_lib::error::{ControllerError, FeedbackError};
use interview_proctor_lib::feedback::Summarizer;
use interview_proctor_lib::models::{
    FeedbackDocument, RoomCredentials, SessionId, Speaker, TranscriptRecord, Utterance,
};
use interview_proctor_lib::persist::{KeyedStore, PersistTarget, ResultPersister, TranscriptArchive};
use interview_proctor_lib::proctoring::{FullscreenChange, ProctoringState};
use interview_proctor_lib::session::{
    MediaHandle, MediaRoom, Notice, SessionController, SessionEvent, SessionHost, SessionOutcome,
    SessionPorts, SessionSettings, UtteranceSink,
};
use interview_proctor_lib::timer::{ManualClock, TimerPhase};

const START: i64 = 1_700_000_000_000;

struct ScriptedSummarizer {
    replies: Mutex<VecDeque<Result<String, FeedbackError>>>,
    calls: AtomicU32,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(
        &self,
        _session_id: &SessionId,
        _transcript: &[Utterance],
    ) -> Result<String, FeedbackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(FeedbackError::Empty))
    }
}

#[derive(Default)]
struct FakeKeyedStore {
    documents: Mutex<HashMap<String, FeedbackDocument>>,
    puts: AtomicU32,
    failing: Mutex<bool>,
}

#[async_trait]
impl KeyedStore for FakeKeyedStore {
    async fn put(&self, path: &str, document: &FeedbackDocument) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(anyhow!("keyed store offline"));
        }
        self.documents
            .lock()
            .unwrap()
            .insert(path.to_string(), document.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeArchive {
    records: Mutex<HashMap<SessionId, TranscriptRecord>>,
    saves: AtomicU32,
    failing: Mutex<bool>,
}

#[async_trait]
impl TranscriptArchive for FakeArchive {
    async fn save(&self, record: &TranscriptRecord) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(anyhow!("archive offline"));
        }
        self.records
            .lock()
            .unwrap()
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeMediaRoom {
    starts: AtomicU32,
    stops: AtomicU32,
}

#[async_trait]
impl MediaRoom for FakeMediaRoom {
    async fn start(&self, _credentials: &RoomCredentials, _sink: UtteranceSink) -> Result<MediaHandle> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(MediaHandle(format!("room-{n}")))
    }

    async fn stop(&self, _handle: MediaHandle) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingHost {
    notices: Mutex<Vec<Notice>>,
    navigations: Mutex<Vec<String>>,
}

impl RecordingHost {
    fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionHost for RecordingHost {
    async fn navigate(&self, path: &str) {
        self.navigations.lock().unwrap().push(path.to_string());
    }

    async fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    cache: Arc<MemoryCache>,
    summarizer: Arc<ScriptedSummarizer>,
    keyed: Arc<FakeKeyedStore>,
    archive: Arc<FakeArchive>,
    media: Arc<FakeMediaRoom>,
    host: Arc<RecordingHost>,
}

impl Harness {
    fn new(replies: Vec<Result<String, FeedbackError>>) -> Self {
        Self::build(replies, None)
    }

    fn gated(replies: Vec<Result<String, FeedbackError>>, gate: Arc<Semaphore>) -> Self {
        Self::build(replies, Some(gate))
    }

    fn build(replies: Vec<Result<String, FeedbackError>>, gate: Option<Arc<Semaphore>>) -> Self {
        Self {
            clock: Arc::new(ManualClock::new(START)),
            cache: Arc::new(MemoryCache::new()),
            summarizer: Arc::new(ScriptedSummarizer {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
                gate,
            }),
            keyed: Arc::new(FakeKeyedStore::default()),
            archive: Arc::new(FakeArchive::default()),
            media: Arc::new(FakeMediaRoom::default()),
            host: Arc::new(RecordingHost::default()),
        }
    }

    fn ports(&self) -> SessionPorts {
        SessionPorts {
            summarizer: self.summarizer.clone(),
            persister: Arc::new(ResultPersister::new(
                self.keyed.clone(),
                self.archive.clone(),
                None,
            )),
            media: self.media.clone(),
            host: self.host.clone(),
            cache: self.cache.clone(),
            journal: None,
            clock: self.clock.clone(),
        }
    }

    async fn controller(&self, id: &str) -> SessionController {
        let settings = SessionSettings {
            tick_interval: None,
            ..SessionSettings::default()
        };
        let credentials = RoomCredentials {
            url: "wss://media.example.com".into(),
            token: "token".into(),
        };
        SessionController::open(SessionId::new(id), settings, self.ports(), Some(credentials))
            .await
            .unwrap()
    }

    fn summarize_calls(&self) -> u32 {
        self.summarizer.calls.load(Ordering::SeqCst)
    }

    /// Number of commit attempts that reached the keyed store.
    fn commits(&self) -> u32 {
        self.keyed.puts.load(Ordering::SeqCst) / 2
    }
}

fn entered() -> SessionEvent {
    SessionEvent::Fullscreen(FullscreenChange::Entered)
}

fn exited() -> SessionEvent {
    SessionEvent::Fullscreen(FullscreenChange::Exited)
}

fn said(speaker: Speaker, text: &str, at: i64) -> SessionEvent {
    SessionEvent::Utterance(Utterance::new(speaker, text, at))
}

/// Brings a session to `Active` after one warned exit, so the next exit terminates.
async fn warned_and_back(controller: &mut SessionController) {
    controller.handle(entered()).await;
    controller.handle(exited()).await;
    controller.handle(entered()).await;
    assert_eq!(controller.proctoring_state(), ProctoringState::Active);
}

#[tokio::test]
async fn threshold_generates_and_persists_feedback() {
    let harness = Harness::new(vec![Ok("Well reasoned answers ★★★★☆".into())]);
    let mut controller = harness.controller("happy").await;

    controller.handle(entered()).await;
    assert_eq!(harness.media.starts.load(Ordering::SeqCst), 1);

    controller
        .handle(said(Speaker::Interviewer, "Describe a hard bug", 1))
        .await;
    controller
        .handle(said(Speaker::Candidate, "A race in our cache layer", 2))
        .await;

    harness.clock.advance_secs(720);
    controller.handle(SessionEvent::Tick).await;
    assert_eq!(controller.phase(), TimerPhase::FeedbackInFlight);
    assert_eq!(harness.media.stops.load(Ordering::SeqCst), 1);

    let outcome = controller.run().await.unwrap();
    assert_eq!(outcome, SessionOutcome::Completed { durable: true });
    assert!(controller.is_feedback_persisted());

    let documents = harness.keyed.documents.lock().unwrap().clone();
    assert_eq!(documents.len(), 2);
    let document = &documents["sessionsfeedback/happy"];
    assert_eq!(document.transcription_count, 2);
    assert_eq!(document.star_rating, 4.0);
    assert_eq!(document, &documents["interview_feedback/candidates/happy"]);

    let records = harness.archive.records.lock().unwrap();
    assert_eq!(records[&SessionId::new("happy")].transcriptions.len(), 2);

    assert_eq!(harness.host.navigations(), vec!["/interview-complete".to_string()]);
    assert!(harness.host.notices().contains(&Notice::InterviewComplete));
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn second_exit_terminates_and_third_has_no_effect() {
    let harness = Harness::new(vec![]);
    let mut controller = harness.controller("exits").await;

    controller.handle(entered()).await;
    controller.handle(exited()).await;
    assert_eq!(controller.proctoring_state(), ProctoringState::WarnedOnce);
    assert_eq!(harness.host.notices(), vec![Notice::FullscreenWarning]);
    assert_eq!(harness.media.stops.load(Ordering::SeqCst), 0);

    controller.handle(entered()).await;
    assert_eq!(controller.proctoring_state(), ProctoringState::Active);

    controller.handle(exited()).await;
    assert_eq!(controller.proctoring_state(), ProctoringState::Terminated);
    assert_eq!(controller.outcome(), Some(SessionOutcome::Terminated));
    assert_eq!(harness.host.navigations(), vec!["/unfollowingrules".to_string()]);
    assert_eq!(harness.media.stops.load(Ordering::SeqCst), 1);

    let notices_before = harness.host.notices();
    controller.handle(exited()).await;
    assert_eq!(harness.host.notices(), notices_before);
    assert_eq!(harness.host.navigations().len(), 1);
    assert_eq!(controller.snapshot().exit_count, 2);
    assert_eq!(harness.summarize_calls(), 0);
    assert_eq!(harness.commits(), 0);
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn violation_queued_after_threshold_wins_and_skips_commit() {
    let harness = Harness::new(vec![Ok("★★★★★".into())]);
    let mut controller = harness.controller("race-a").await;
    warned_and_back(&mut controller).await;

    harness.clock.advance_secs(720);
    let events = controller.event_sender();
    events.send(SessionEvent::Tick).unwrap();
    events.send(exited()).unwrap();

    let outcome = controller.run().await.unwrap();
    assert_eq!(outcome, SessionOutcome::Terminated);

    // Give the feedback task time to report back; the latch discards it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.drain().await;
    assert_eq!(controller.outcome(), Some(SessionOutcome::Terminated));
    assert_eq!(harness.commits(), 0);
    assert_eq!(harness.archive.saves.load(Ordering::SeqCst), 0);
    assert_eq!(harness.host.navigations(), vec!["/unfollowingrules".to_string()]);
}

#[tokio::test]
async fn violation_queued_before_threshold_prevents_feedback() {
    let harness = Harness::new(vec![Ok("★★★★★".into())]);
    let mut controller = harness.controller("race-b").await;
    warned_and_back(&mut controller).await;

    harness.clock.advance_secs(720);
    let events = controller.event_sender();
    events.send(exited()).unwrap();
    events.send(SessionEvent::Tick).unwrap();

    let outcome = controller.run().await.unwrap();
    assert_eq!(outcome, SessionOutcome::Terminated);
    controller.drain().await;

    assert_eq!(harness.summarize_calls(), 0);
    assert_eq!(harness.commits(), 0);
}

#[tokio::test]
async fn violation_during_generation_does_not_cancel_it_but_wins() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = Harness::gated(vec![Ok("★★★☆☆".into())], gate.clone());
    let mut controller = harness.controller("in-flight").await;
    warned_and_back(&mut controller).await;

    harness.clock.advance_secs(720);
    controller.handle(SessionEvent::Tick).await;
    assert_eq!(controller.phase(), TimerPhase::FeedbackInFlight);

    controller.handle(exited()).await;
    assert_eq!(controller.outcome(), Some(SessionOutcome::Terminated));

    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.drain().await;

    assert_eq!(harness.summarize_calls(), 1);
    assert_eq!(harness.commits(), 0);
    assert_eq!(controller.outcome(), Some(SessionOutcome::Terminated));
}

#[tokio::test]
async fn completed_session_ignores_later_violations() {
    let harness = Harness::new(vec![Ok("★★★★☆".into())]);
    let mut controller = harness.controller("late-exit").await;
    warned_and_back(&mut controller).await;

    harness.clock.advance_secs(720);
    controller.handle(SessionEvent::Tick).await;
    assert_eq!(
        controller.run().await.unwrap(),
        SessionOutcome::Completed { durable: true }
    );

    controller.handle(exited()).await;
    assert_eq!(controller.proctoring_state(), ProctoringState::Active);
    assert_eq!(harness.host.navigations(), vec!["/interview-complete".to_string()]);
    assert_eq!(harness.commits(), 1);
}

#[tokio::test]
async fn failed_generation_with_time_left_can_be_retried() {
    let harness = Harness::new(vec![
        Err(FeedbackError::Upstream("model overloaded".into())),
        Ok("Second try ★★★½☆".into()),
    ]);
    let mut controller = harness.controller("retry").await;
    controller.handle(entered()).await;
    controller
        .handle(said(Speaker::Candidate, "hello", 1))
        .await;

    harness.clock.advance_secs(720);
    controller.handle(SessionEvent::Tick).await;
    assert!(controller.process_next().await);

    assert_eq!(controller.phase(), TimerPhase::Running);
    assert!(controller.outcome().is_none());
    assert!(harness
        .host
        .notices()
        .iter()
        .any(|notice| matches!(notice, Notice::FeedbackFailed { retryable: true, .. })));

    controller.handle(SessionEvent::RetryFeedback).await;
    assert_eq!(controller.phase(), TimerPhase::FeedbackInFlight);
    assert_eq!(
        controller.run().await.unwrap(),
        SessionOutcome::Completed { durable: true }
    );
    assert_eq!(harness.summarize_calls(), 2);
    assert_eq!(controller.snapshot().feedback.unwrap().star_rating, 3.5);
}

#[tokio::test]
async fn failed_generation_with_no_time_left_expires() {
    let harness = Harness::new(vec![Err(FeedbackError::Empty)]);
    let mut controller = harness.controller("late").await;
    controller.handle(entered()).await;

    // A single delayed tick lands after the end of the session.
    harness.clock.advance_secs(900);
    controller.handle(SessionEvent::Tick).await;
    assert_eq!(controller.phase(), TimerPhase::FeedbackInFlight);

    assert_eq!(controller.run().await.unwrap(), SessionOutcome::Expired);
    assert_eq!(harness.summarize_calls(), 1);
    assert_eq!(harness.commits(), 0);
    assert_eq!(harness.host.navigations(), vec!["/landing".to_string()]);
    assert!(harness.host.notices().contains(&Notice::FeedbackUnavailable));

    controller.handle(SessionEvent::RetryFeedback).await;
    assert_eq!(harness.summarize_calls(), 1);
}

#[tokio::test]
async fn archive_outage_with_time_left_offers_a_retry() {
    let harness = Harness::new(vec![Ok("★★★★☆".into())]);
    *harness.archive.failing.lock().unwrap() = true;
    let mut controller = harness.controller("partial").await;
    controller.handle(entered()).await;
    controller.handle(said(Speaker::Candidate, "answer", 1)).await;

    harness.clock.advance_secs(720);
    controller.handle(SessionEvent::Tick).await;
    assert!(controller.process_next().await);

    assert!(controller.outcome().is_none());
    assert_eq!(controller.phase(), TimerPhase::Running);
    assert!(!controller.is_feedback_persisted());
    assert_eq!(harness.archive.saves.load(Ordering::SeqCst), 2);
    assert_eq!(harness.keyed.puts.load(Ordering::SeqCst), 2);
    let notices = harness.host.notices();
    assert!(notices.contains(&Notice::PartialPersistence {
        failed: vec![PersistTarget::TranscriptArchive],
    }));
    assert!(notices
        .iter()
        .any(|notice| matches!(notice, Notice::FeedbackFailed { retryable: true, .. })));
    // The transcript the archive still needs is kept.
    assert!(harness.cache.get("transcript:partial").await.unwrap().is_some());

    // Still failing when time runs out: partial state is accepted.
    harness.clock.advance_secs(120);
    controller.handle(SessionEvent::Tick).await;
    assert_eq!(
        controller.outcome(),
        Some(SessionOutcome::Completed { durable: false })
    );
    assert!(controller.is_feedback_persisted());
    assert_eq!(harness.summarize_calls(), 1);
    assert_eq!(harness.archive.saves.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn retry_after_partial_persistence_completes_durably() {
    let harness = Harness::new(vec![Ok("★★★★☆".into())]);
    *harness.archive.failing.lock().unwrap() = true;
    let mut controller = harness.controller("partial-retry").await;
    controller.handle(entered()).await;
    controller.handle(said(Speaker::Candidate, "answer", 1)).await;

    harness.clock.advance_secs(720);
    controller.handle(SessionEvent::Tick).await;
    assert!(controller.process_next().await);
    assert_eq!(controller.phase(), TimerPhase::Running);

    *harness.archive.failing.lock().unwrap() = false;
    controller.handle(SessionEvent::RetryFeedback).await;

    assert_eq!(
        controller.outcome(),
        Some(SessionOutcome::Completed { durable: true })
    );
    assert_eq!(harness.summarize_calls(), 1);
    let records = harness.archive.records.lock().unwrap();
    assert_eq!(records[&SessionId::new("partial-retry")].transcriptions.len(), 1);
    assert_eq!(harness.keyed.documents.lock().unwrap().len(), 2);
    assert_eq!(harness.host.navigations(), vec!["/interview-complete".to_string()]);
}

#[tokio::test]
async fn total_persistence_failure_keeps_the_result_for_retry() {
    let harness = Harness::new(vec![Ok("★★★★☆".into())]);
    *harness.keyed.failing.lock().unwrap() = true;
    *harness.archive.failing.lock().unwrap() = true;
    let mut controller = harness.controller("offline").await;
    controller.handle(entered()).await;

    harness.clock.advance_secs(720);
    controller.handle(SessionEvent::Tick).await;
    assert!(controller.process_next().await);
    assert_eq!(controller.phase(), TimerPhase::Running);
    assert!(!controller.is_feedback_persisted());

    *harness.keyed.failing.lock().unwrap() = false;
    *harness.archive.failing.lock().unwrap() = false;
    controller.handle(SessionEvent::RetryFeedback).await;

    assert_eq!(
        controller.outcome(),
        Some(SessionOutcome::Completed { durable: true })
    );
    assert_eq!(harness.summarize_calls(), 1);
    assert_eq!(harness.keyed.documents.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn transcript_is_frozen_once_feedback_starts() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = Harness::gated(vec![Ok("★★☆☆☆".into())], gate.clone());
    let mut controller = harness.controller("frozen").await;
    controller.handle(entered()).await;
    controller.handle(said(Speaker::Candidate, "before", 1)).await;

    harness.clock.advance_secs(720);
    controller.handle(SessionEvent::Tick).await;
    controller.handle(said(Speaker::Candidate, "after", 2)).await;
    assert_eq!(controller.snapshot().utterance_count, 1);

    gate.add_permits(1);
    controller.run().await.unwrap();
    let records = harness.archive.records.lock().unwrap();
    assert_eq!(records[&SessionId::new("frozen")].transcriptions.len(), 1);
}

#[tokio::test]
async fn reload_resumes_clock_and_transcript() {
    let harness = Harness::new(vec![]);
    {
        let mut controller = harness.controller("reload").await;
        controller.handle(entered()).await;
        controller.handle(said(Speaker::Candidate, "first answer", 1)).await;
    }
    assert!(harness.cache.get("clock:reload").await.unwrap().is_some());

    harness.clock.advance_secs(300);
    let mut controller = harness.controller("reload").await;
    controller.handle(entered()).await;

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.remaining_seconds, 540);
    assert_eq!(snapshot.utterance_count, 1);
    assert!(snapshot.outcome.is_none());
}

#[tokio::test]
async fn reload_past_threshold_starts_feedback_immediately() {
    let harness = Harness::new(vec![Ok("★★★★☆".into())]);
    {
        let mut controller = harness.controller("late-reload").await;
        controller.handle(entered()).await;
        controller.handle(said(Speaker::Candidate, "answer", 1)).await;
    }

    harness.clock.advance_secs(780);
    let mut controller = harness.controller("late-reload").await;
    controller.handle(entered()).await;
    assert_eq!(controller.phase(), TimerPhase::FeedbackInFlight);
    assert_eq!(
        controller.run().await.unwrap(),
        SessionOutcome::Completed { durable: true }
    );
}

#[tokio::test]
async fn run_fails_once_no_event_source_is_left() {
    let harness = Harness::new(vec![]);
    let mut controller = harness.controller("abandoned").await;

    let outcome = tokio::time::timeout(Duration::from_secs(1), controller.run())
        .await
        .expect("run must not wait on a channel nobody can send to");
    assert!(matches!(outcome, Err(ControllerError::EventsClosed)));
    assert!(controller.outcome().is_none());
}

#[tokio::test]
async fn queued_host_events_are_handled_before_the_channel_closes() {
    let harness = Harness::new(vec![]);
    let mut controller = harness.controller("queued").await;

    let monitor = controller.monitor();
    for entered in [true, false, true, false] {
        assert!(monitor.report_fullscreen(entered));
    }
    drop(monitor);

    let outcome = tokio::time::timeout(Duration::from_secs(1), controller.run())
        .await
        .unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Terminated);
}
