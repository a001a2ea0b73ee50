//! Command-line replay of a proctored session.
//!
//! Host events arrive on stdin as newline-delimited JSON; the real controller
//! runs against the configured HTTP endpoints and the terminal snapshot is
//! printed to stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

use crate::config::ProctorConfig;
use crate::db::{Database, LocalCache};
use crate::feedback::FeedbackClient;
use crate::models::{CandidateInfo, RoomCredentials, SessionId, Speaker, Utterance};
use crate::persist::{HttpTranscriptArchive, ResultPersister, RestKeyedStore};
use crate::proctoring::{FullscreenChange, ProctoringMonitor};
use crate::session::{
    MediaHandle, MediaRoom, Notice, SessionController, SessionEvent, SessionHost, SessionPorts,
    SessionSettings, UtteranceSink,
};
use crate::timer::{format_remaining, SystemClock};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Parser, Debug)]
#[command(name = "interview-proctor")]
#[command(about = "Run a proctored interview session from host events on stdin", long_about = None)]
pub struct Cli {
    /// Session to start or resume. A new id is generated when omitted.
    #[arg(long)]
    pub session: Option<String>,

    /// JSON config file; defaults apply when absent.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub candidate_id: Option<String>,

    #[arg(long)]
    pub candidate_name: Option<String>,

    #[arg(long)]
    pub hr_id: Option<String>,

    /// Media room URL; no room is joined without it.
    #[arg(long, requires = "room_token")]
    pub room_url: Option<String>,

    #[arg(long)]
    pub room_token: Option<String>,
}

impl Cli {
    fn candidate(&self) -> Option<CandidateInfo> {
        if self.candidate_id.is_none() && self.candidate_name.is_none() && self.hr_id.is_none() {
            return None;
        }
        Some(CandidateInfo {
            mockello_id: self.candidate_id.clone(),
            candidate_name: self.candidate_name.clone(),
            hr_id: self.hr_id.clone(),
        })
    }

    fn credentials(&self) -> Option<RoomCredentials> {
        match (&self.room_url, &self.room_token) {
            (Some(url), Some(token)) => Some(RoomCredentials {
                url: url.clone(),
                token: token.clone(),
            }),
            _ => None,
        }
    }
}

/// One line of host input.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    Fullscreen {
        entered: bool,
    },
    Utterance {
        speaker: Speaker,
        text: String,
        #[serde(rename = "timestampMs", default)]
        timestamp_ms: Option<i64>,
    },
    Retry,
}

impl HostEvent {
    pub fn parse(line: &str) -> Result<Self> {
        // serde_json messages can quote the offending value, which may be
        // transcript text.
        serde_json::from_str(line).map_err(|err| {
            anyhow!(
                "invalid host event: {:?} error at column {}",
                err.classify(),
                err.column()
            )
        })
    }

    fn into_session_event(self) -> SessionEvent {
        match self {
            HostEvent::Fullscreen { entered } => {
                SessionEvent::Fullscreen(FullscreenChange::from_entered(entered))
            }
            HostEvent::Utterance {
                speaker,
                text,
                timestamp_ms,
            } => SessionEvent::Utterance(Utterance::new(
                speaker,
                text,
                timestamp_ms.unwrap_or_else(|| Utc::now().timestamp_millis()),
            )),
            HostEvent::Retry => SessionEvent::RetryFeedback,
        }
    }
}

/// Media room stand-in that only records joins and leaves. Speech arrives
/// through stdin instead.
pub struct LoggingMediaRoom;

#[async_trait]
impl MediaRoom for LoggingMediaRoom {
    async fn start(&self, credentials: &RoomCredentials, _sink: UtteranceSink) -> Result<MediaHandle> {
        let handle = MediaHandle(uuid::Uuid::new_v4().to_string());
        log_info!("Joined media room {} as {}", credentials.url, handle.0);
        Ok(handle)
    }

    async fn stop(&self, handle: MediaHandle) -> Result<()> {
        log_info!("Left media room {}", handle.0);
        Ok(())
    }
}

/// Writes notices and navigation as JSON lines on stdout.
pub struct StdoutHost;

#[async_trait]
impl SessionHost for StdoutHost {
    async fn navigate(&self, path: &str) {
        println!("{}", json!({ "navigate": path }));
    }

    async fn notify(&self, notice: Notice) {
        let message = notice.message();
        println!("{}", json!({ "notice": notice, "message": message }));
    }

    async fn time_remaining(&self, seconds: u32) {
        if seconds % 60 == 0 {
            log_debug!("{} remaining", format_remaining(seconds));
        }
    }
}

fn forward_stdin(monitor: ProctoringMonitor, events: UnboundedSender<SessionEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match HostEvent::parse(&line) {
                    Ok(HostEvent::Fullscreen { entered }) => {
                        if !monitor.report_fullscreen(entered) {
                            log_debug!("Proctoring stopped; ignoring fullscreen change");
                        }
                    }
                    Ok(event) => {
                        if events.send(event.into_session_event()).is_err() {
                            break;
                        }
                    }
                    Err(err) => log_warn!("{err:#}"),
                },
                Ok(None) => {
                    log_info!("Host input closed; the session continues only if it has started");
                    break;
                }
                Err(err) => {
                    log_error!("Failed to read host input: {err}");
                    break;
                }
            }
        }
    });
}

pub async fn replay(cli: Cli) -> Result<()> {
    let config = ProctorConfig::load(cli.config.as_deref())?;

    let database = Database::new(config.database_path())?;
    let interrupted = database.finalize_orphaned_sessions(Utc::now()).await?;
    for id in &interrupted {
        log_warn!("Recovered incomplete session {id}; marked as Interrupted");
    }
    for session in database.get_running_sessions().await? {
        log_info!("Session {} can be resumed", session.id);
    }

    let timeout = Duration::from_secs(config.request_timeout_secs);
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let persister = ResultPersister::new(
        Arc::new(RestKeyedStore::new(http.clone(), &config.store_base_url, timeout)),
        Arc::new(HttpTranscriptArchive::new(http.clone(), &config.api_base_url, timeout)),
        cli.candidate(),
    );

    let cache: Arc<dyn LocalCache> = Arc::new(database.clone());
    let ports = SessionPorts {
        summarizer: Arc::new(FeedbackClient::new(http, &config.api_base_url, timeout)),
        persister: Arc::new(persister),
        media: Arc::new(LoggingMediaRoom),
        host: Arc::new(StdoutHost),
        cache,
        journal: Some(Arc::new(database)),
        clock: Arc::new(SystemClock),
    };

    let session_id = SessionId::new(
        cli.session
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    );
    log_info!("Starting session {session_id}");

    let mut controller = SessionController::open(
        session_id,
        SessionSettings::from(&config),
        ports,
        cli.credentials(),
    )
    .await?;

    forward_stdin(controller.monitor(), controller.event_sender());
    let outcome = controller.run().await?;
    log_info!("Session finished: {outcome:?}");

    println!("{}", serde_json::to_string(&controller.snapshot())?);
    Ok(())
}
