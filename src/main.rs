//! The loopcast binary: loop a local media file to a live RTMP sink.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;
use tracing_subscriber::EnvFilter;

use loopcast::config::LoopConfig;
use loopcast::control::{ControlLoop, Shutdown};
use loopcast::engine::gst::GstEngine;

/// Loop a local media file to a live RTMP sink, forever.
#[derive(Debug, Parser)]
#[command(name = "loopcast", version, about)]
struct Args {
    /// Path of the container file to loop.
    input: PathBuf,

    /// Destination address, e.g. rtmp://host/app/stream.
    destination: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        // An engine-reported error ends the session cleanly but is still
        // surfaced to the caller as a failure.
        Ok(Shutdown::EngineError) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> loopcast::Result<Shutdown> {
    let mut config = LoopConfig::new(args.input, args.destination)?;
    if let Ok(path) = std::env::var("LOOPCAST_DOT") {
        config = config.with_dot_snapshot(path);
    }

    let engine = GstEngine::new("file-looper")?;
    let (session, commands) = ControlLoop::build(engine, &config)?;

    // Pump stdin into the command channel so the control loop never blocks
    // on the terminal. A line starting with q quits.
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if commands.send(line).is_err() {
                break;
            }
        }
    });

    session.run().await
}
