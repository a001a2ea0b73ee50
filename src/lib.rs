pub mod config;
pub mod db;
pub mod error;
pub mod feedback;
pub mod models;
pub mod persist;
pub mod proctoring;
pub mod replay;
pub mod scoring;
pub mod session;
pub mod timer;
pub mod transcript;
pub mod utils;

use clap::Parser;

pub use config::ProctorConfig;
pub use error::{ControllerError, FeedbackError, PersistError};
pub use session::{SessionController, SessionEvent, SessionOutcome, SessionPorts, SessionSettings};

pub fn run() {
    utils::logging::init();

    let cli = replay::Cli::parse();
    log::info!("interview-proctor starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(replay::replay(cli)) {
        log::error!("{err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
