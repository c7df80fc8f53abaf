//! Integration tests running complete pipelines built from launch lines.
//!
//! These tests drive real streaming threads through the built-in elements
//! and check what arrives at the sinks and what the bus reports.

use mediagraph::bus::{Message, MessageBody, MessageType};
use mediagraph::element::{PropertyValue, StateChangeSuccess};
use mediagraph::pipeline::{ElementFactory, Pipeline, launch};
use mediagraph::{ClockTime, Error, MisuseError, State};
use std::io::Write;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn build(description: &str) -> Pipeline {
    launch(&ElementFactory::with_builtins(), description).unwrap()
}

fn received(pipeline: &Pipeline, sink: &str) -> i64 {
    let id = pipeline.by_name(sink).unwrap();
    match pipeline.element(id).unwrap().property("buffers-received") {
        Some(PropertyValue::Integer(n)) => n,
        other => panic!("unexpected buffers-received: {other:?}"),
    }
}

fn wait_terminal(pipeline: &mut Pipeline) -> Message {
    pipeline
        .timed_pop_filtered(Some(WAIT), MessageType::EOS | MessageType::ERROR)
        .expect("pipeline did not finish")
}

// ============================================================================
// Linear pipelines
// ============================================================================

/// A finite source runs to a single aggregated end-of-stream.
#[test]
fn test_linear_pipeline_reaches_eos() {
    let mut pipeline = build("testsrc num-buffers=25 ! identity ! fakesink name=sink");
    assert_eq!(pipeline.set_state(State::Playing).unwrap(), StateChangeSuccess::Success);

    let msg = wait_terminal(&mut pipeline);
    assert!(matches!(msg.body(), MessageBody::Eos), "{msg}");
    assert!(msg.is_from_pipeline());
    assert_eq!(received(&pipeline, "sink"), 25);

    pipeline.set_state(State::Null).unwrap();
    assert_eq!(pipeline.current_state(), State::Null);
}

/// Inline caps become a capsfilter that narrows the negotiated format.
#[test]
fn test_caps_filter_in_launch_line() {
    let mut pipeline = build("testsrc num-buffers=5 ! video/x-raw, width=320 ! fakesink name=sink");
    assert_eq!(pipeline.len(), 3);
    pipeline.set_state(State::Playing).unwrap();
    assert!(matches!(wait_terminal(&mut pipeline).body(), MessageBody::Eos));

    let sink = pipeline.element(pipeline.by_name("sink").unwrap()).unwrap();
    let caps = sink.pad("sink").unwrap().caps.unwrap();
    assert_eq!(caps.first().unwrap().name(), "video/x-raw");
}

/// Incompatible inline caps fail while building the pipeline.
#[test]
fn test_caps_mismatch_fails_launch() {
    let err = launch(&ElementFactory::with_builtins(), "testsrc ! audio/x-raw ! fakesink").unwrap_err();
    assert!(matches!(err, Error::Negotiation(_)), "{err}");
}

/// Requesting the state the pipeline is already in is a no-op.
#[test]
fn test_set_state_is_idempotent() {
    let mut pipeline = build("testsrc interval-ms=5 ! fakesink");
    assert_eq!(pipeline.set_state(State::Playing).unwrap(), StateChangeSuccess::Success);
    while pipeline.poll(MessageType::ANY).is_some() {}

    assert_eq!(pipeline.set_state(State::Playing).unwrap(), StateChangeSuccess::Success);
    assert!(pipeline.poll(MessageType::STATE_CHANGED).is_none());

    pipeline.set_state(State::Null).unwrap();
    assert_eq!(pipeline.set_state(State::Null).unwrap(), StateChangeSuccess::Success);
    assert_eq!(pipeline.current_state(), State::Null);
}

// ============================================================================
// Fanout
// ============================================================================

/// Every tee branch receives every buffer, and end-of-stream is reported
/// once after both sinks got it.
#[test]
fn test_tee_duplicates_to_all_branches() {
    let mut pipeline = build(
        "testsrc num-buffers=20 ! tee name=t \
         t. ! queue ! fakesink name=a \
         t. ! queue max-size-buffers=2 ! fakesink name=b",
    );
    pipeline.set_state(State::Playing).unwrap();

    let msg = wait_terminal(&mut pipeline);
    assert!(matches!(msg.body(), MessageBody::Eos), "{msg}");
    assert!(pipeline.poll(MessageType::EOS).is_none());
    assert_eq!(received(&pipeline, "a"), 20);
    assert_eq!(received(&pipeline, "b"), 20);

    let tee = pipeline.by_name("t").unwrap();
    let pads: Vec<String> = pipeline
        .element(tee)
        .unwrap()
        .pads()
        .into_iter()
        .filter(|p| p.name.starts_with("src_"))
        .map(|p| p.name)
        .collect();
    assert_eq!(pads, ["src_0", "src_1"]);
}

/// A branch can be released while the tee keeps feeding the other one.
#[test]
fn test_release_tee_branch_while_playing() {
    let mut pipeline = build("testsrc interval-ms=2 ! tee name=t t. ! fakesink name=a t. ! fakesink name=b");
    let tee = pipeline.by_name("t").unwrap();
    let b = pipeline.by_name("b").unwrap();
    pipeline.set_state(State::Playing).unwrap();
    let playing = std::iter::from_fn(|| pipeline.poll(MessageType::STATE_CHANGED)).any(|m| {
        m.is_from_pipeline() && matches!(m.body(), MessageBody::StateChanged { new: State::Playing, .. })
    });
    assert!(playing);
    std::thread::sleep(Duration::from_millis(30));

    pipeline.release_pad(tee, "src_1").unwrap();
    assert!(!pipeline.element(b).unwrap().pad("sink").unwrap().linked);
    let removed = pipeline.remove(b).unwrap();
    assert_eq!(removed.current_state(), State::Null);

    let before = received(&pipeline, "a");
    std::thread::sleep(Duration::from_millis(50));
    assert!(received(&pipeline, "a") > before);
    assert!(pipeline.poll(MessageType::ERROR).is_none());
    pipeline.set_state(State::Null).unwrap();
}

/// Removing the only element still prerolling completes the pending step.
#[test]
fn test_remove_last_prerolling_element_completes_state() {
    let mut pipeline = build("testsrc ! fakesink name=a async=true fakesink name=lone async=true");
    assert_eq!(pipeline.set_state(State::Paused).unwrap(), StateChangeSuccess::Async);

    // `a` prerolls from the source; `lone` has nothing upstream.
    assert!(matches!(
        pipeline.wait_state(Some(Duration::from_millis(300))),
        Err(Error::Timeout)
    ));
    assert_eq!(pipeline.current_state(), State::Ready);

    let lone = pipeline.by_name("lone").unwrap();
    pipeline.remove(lone).unwrap();
    assert_eq!(pipeline.current_state(), State::Paused);
    assert!(pipeline.pending_state().is_none());
    let done = pipeline.poll(MessageType::ASYNC_DONE).unwrap();
    assert!(done.is_from_pipeline());
    pipeline.set_state(State::Null).unwrap();
}

/// Removing the only sink that has not reached end-of-stream posts the
/// aggregated end-of-stream.
#[test]
fn test_remove_last_running_sink_posts_eos() {
    let mut pipeline = build("testsrc num-buffers=3 ! fakesink name=a fakesink name=stale");
    pipeline.set_state(State::Playing).unwrap();
    assert!(pipeline.timed_pop_filtered(Some(Duration::from_millis(300)), MessageType::EOS).is_none());
    assert_eq!(received(&pipeline, "a"), 3);

    let stale = pipeline.by_name("stale").unwrap();
    pipeline.remove(stale).unwrap();
    let msg = pipeline.poll(MessageType::EOS | MessageType::ERROR).unwrap();
    assert!(matches!(msg.body(), MessageBody::Eos), "{msg}");
    assert!(msg.is_from_pipeline());
    pipeline.set_state(State::Null).unwrap();
}

// ============================================================================
// Errors and control
// ============================================================================

/// An element error is reported and takes the pipeline down.
#[test]
fn test_element_error_tears_down() {
    let mut pipeline = build("testsrc ! identity name=faulty error-after=3 ! fakesink");
    pipeline.set_state(State::Playing).unwrap();

    let msg = wait_terminal(&mut pipeline);
    match msg.body() {
        MessageBody::Error { error, .. } => assert_eq!(error, "induced error"),
        other => panic!("expected an error, got {other:?}"),
    }
    assert_eq!(msg.src_name(), "faulty");
    assert_eq!(pipeline.current_state(), State::Null);
}

/// Sending end-of-stream stops an endless source.
#[test]
fn test_send_eos_finishes_live_source() {
    let mut pipeline = build("testsrc interval-ms=5 ! queue ! fakesink");
    pipeline.set_state(State::Playing).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    assert!(pipeline.send_eos());
    let msg = wait_terminal(&mut pipeline);
    assert!(matches!(msg.body(), MessageBody::Eos), "{msg}");
    pipeline.set_state(State::Null).unwrap();
}

/// A second flushing seek is refused until the first one completes.
#[test]
fn test_second_seek_waits_for_first() {
    let mut pipeline = build("testsrc ! fakesink async=true");
    assert_eq!(pipeline.set_state(State::Paused).unwrap(), StateChangeSuccess::Async);
    assert_eq!(pipeline.wait_state(Some(WAIT)).unwrap(), State::Paused);

    let seeking = pipeline.query_seeking().unwrap();
    assert!(seeking.seekable);

    pipeline.seek_simple(ClockTime::from_secs(2)).unwrap();
    assert!(pipeline.is_seek_pending());
    let err = pipeline.seek_simple(ClockTime::from_secs(3)).unwrap_err();
    assert!(matches!(err.as_misuse(), Some(MisuseError::SeekInProgress)));

    let done = pipeline.timed_pop_filtered(Some(WAIT), MessageType::ASYNC_DONE).unwrap();
    assert!(done.is_from_pipeline());
    assert!(!pipeline.is_seek_pending());
    pipeline.seek_simple(ClockTime::from_secs(1)).unwrap();
    pipeline.set_state(State::Null).unwrap();
    assert!(!pipeline.is_seek_pending());
}

/// Position and duration come from the sink and the source.
#[test]
fn test_position_and_duration() {
    let mut pipeline = build("testsrc num-buffers=30 ! fakesink async=true");
    assert!(matches!(pipeline.query_duration(), Err(Error::NotReady(State::Null))));

    pipeline.set_state(State::Paused).unwrap();
    pipeline.wait_state(Some(WAIT)).unwrap();
    let duration = pipeline.query_duration().unwrap().unwrap();
    assert!(duration > ClockTime::from_millis(990) && duration <= ClockTime::from_secs(1));
    assert!(pipeline.query_position().unwrap().is_some());
    pipeline.set_state(State::Null).unwrap();
}

// ============================================================================
// Files
// ============================================================================

/// A file is read in blocks and every block reaches the sink.
#[test]
fn test_filesrc_reads_whole_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[7u8; 10_000]).unwrap();
    file.flush().unwrap();

    let mut pipeline = build(&format!(
        "filesrc location=\"{}\" blocksize=4096 ! fakesink name=sink",
        file.path().display()
    ));
    pipeline.set_state(State::Playing).unwrap();
    assert!(matches!(wait_terminal(&mut pipeline).body(), MessageBody::Eos));
    assert_eq!(received(&pipeline, "sink"), 3);
}

/// A missing file fails the state change and leaves the pipeline in NULL.
#[test]
fn test_filesrc_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.bin");
    let mut pipeline = build(&format!("filesrc location=\"{}\" ! fakesink", path.display()));

    let err = pipeline.set_state(State::Playing).unwrap_err();
    assert!(matches!(err, Error::StateChange { .. }), "{err}");
    assert_eq!(pipeline.current_state(), State::Ready);
    assert_eq!(pipeline.target_state(), State::Ready);
}
