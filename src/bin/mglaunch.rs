//! Build a pipeline from a launch line and run it until end-of-stream.
//!
//! ```text
//! mglaunch testsrc num-buffers=300 ! queue ! fakesink
//! ```
//!
//! While running, `p` (or space) toggles between playing and paused and
//! `q` stops the pipeline. Keys are read a line at a time from stdin.
//! Log output is controlled with `RUST_LOG`.

use mediagraph::bus::{MessageBody, MessageType};
use mediagraph::control::{ControlAction, KeyboardController};
use mediagraph::{Pipeline, State};
use std::io::BufRead;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Messages printed while running.
const SHOWN: MessageType = MessageType::ERROR
    .union(MessageType::WARNING)
    .union(MessageType::EOS)
    .union(MessageType::STATE_CHANGED)
    .union(MessageType::APPLICATION);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mediagraph=info")))
        .init();

    let description = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if description.trim().is_empty() {
        eprintln!("usage: mglaunch <element> [prop=value ...] [! <element> ...]");
        return ExitCode::from(2);
    }

    match run(&description) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "pipeline failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Spawn a thread forwarding stdin lines. The channel closes at end of
/// input.
fn spawn_stdin_reader() -> kanal::Receiver<String> {
    let (tx, rx) = kanal::bounded(16);
    let spawned = std::thread::Builder::new()
        .name("mglaunch-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        warn!(error = %err, "keyboard control unavailable");
    }
    rx
}

/// Run the pipeline. Returns whether it ended cleanly.
fn run(description: &str) -> mediagraph::Result<bool> {
    mediagraph::init();
    let mut pipeline = mediagraph::parse_launch(description)?;
    info!(pipeline = %pipeline.name(), elements = pipeline.len(), "setting pipeline to playing");
    pipeline.set_state(State::Playing)?;

    let keys = spawn_stdin_reader();
    let mut controller = KeyboardController::new(true);
    let clean = drive(&mut pipeline, &keys, &mut controller);

    info!(pipeline = %pipeline.name(), "setting pipeline to null");
    pipeline.set_state(State::Null)?;
    mediagraph::deinit();
    Ok(clean)
}

fn drive(pipeline: &mut Pipeline, keys: &kanal::Receiver<String>, controller: &mut KeyboardController) -> bool {
    loop {
        while let Ok(Some(line)) = keys.try_recv() {
            match controller.handle_line(pipeline, &line) {
                Ok(ControlAction::Ignored) => {}
                Ok(action) => info!(?action, "key handled"),
                Err(err) => warn!(error = %err, "key not handled"),
            }
        }

        let Some(msg) = pipeline.poll_interval(SHOWN) else {
            continue;
        };
        println!("{msg}");
        match msg.body() {
            MessageBody::Eos if msg.is_from_pipeline() => {
                info!(pipeline = %pipeline.name(), "got end-of-stream");
                return true;
            }
            MessageBody::Error { .. } => return false,
            _ => {}
        }
    }
}
