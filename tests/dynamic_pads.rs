//! Integration tests for pads that appear while the pipeline runs.
//!
//! The demuxer announces its streams from its streaming thread; handlers
//! run on the test thread while it drains the bus and decide which
//! announced pads get linked.

use mediagraph::bus::{MessageBody, MessageType};
use mediagraph::caps::Caps;
use mediagraph::buffer::Buffer;
use mediagraph::element::{Element, ElementContext, ElementImpl, FlowError, FlowResult, PadTemplate, PropertyValue};
use mediagraph::pipeline::{ElementFactory, PadAddedOutcome, Pipeline, launch};
use mediagraph::State;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn received(pipeline: &Pipeline, sink: &str) -> i64 {
    let id = pipeline.by_name(sink).unwrap();
    pipeline
        .element(id)
        .unwrap()
        .property("buffers-received")
        .and_then(|v| v.as_i64())
        .unwrap()
}

/// Only the announced stream the sink accepts gets linked; the other one
/// is reported as a caps mismatch and skipped while data flows.
#[test]
fn test_link_announced_picks_matching_stream() {
    let factory = ElementFactory::with_builtins();
    let mut pipeline = launch(&factory, "testsrc num-buffers=15 ! demux name=d link-timeout-ms=50").unwrap();
    let demux = pipeline.by_name("d").unwrap();

    let sink = factory.make("fakesink", Some("video")).unwrap();
    sink.set_property("caps", "video/x-raw".parse::<Caps>().unwrap()).unwrap();
    let sink = pipeline.add(sink).unwrap();

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&outcomes);
    pipeline.connect_pad_added(Some(demux), move |pipeline, info| {
        let outcome = pipeline.link_announced(info, sink, "sink");
        let kind = match outcome {
            PadAddedOutcome::Linked(_) => "linked",
            PadAddedOutcome::CapsMismatch { .. } => "mismatch",
            PadAddedOutcome::AlreadyLinked => "already-linked",
            PadAddedOutcome::Failed(_) => "failed",
        };
        let media = info.caps.first().map(|s| s.name().to_string()).unwrap_or_default();
        seen.lock().unwrap().push((info.pad.clone(), media, kind));
    });

    pipeline.set_state(State::Playing).unwrap();
    let msg = pipeline
        .timed_pop_filtered(Some(WAIT), MessageType::EOS | MessageType::ERROR)
        .unwrap();
    assert!(matches!(msg.body(), MessageBody::Eos), "{msg}");

    assert_eq!(
        *outcomes.lock().unwrap(),
        [
            ("src_0".to_string(), "video/x-raw".to_string(), "linked"),
            ("src_1".to_string(), "audio/x-raw".to_string(), "mismatch"),
        ]
    );
    assert_eq!(received(&pipeline, "video"), 15);
    let demux = pipeline.element(demux).unwrap();
    assert!(demux.pad("src_0").unwrap().linked);
    assert!(!demux.pad("src_1").unwrap().linked);
}

/// Sinks created inside the handler join the running pipeline and take
/// part in end-of-stream aggregation.
#[test]
fn test_sinks_added_from_handler() {
    let factory = ElementFactory::with_builtins();
    let mut pipeline = launch(&factory, "testsrc num-buffers=10 ! demux name=d").unwrap();
    let demux = pipeline.by_name("d").unwrap();

    let handler_factory = factory.clone();
    pipeline.connect_pad_added(Some(demux), move |pipeline, info| {
        let sink = handler_factory
            .make("fakesink", Some(&format!("sink_{}", info.pad)))
            .unwrap();
        let sink = pipeline.add(sink).unwrap();
        pipeline.sync_state_with_parent(sink).unwrap();
        assert!(pipeline.link_announced(info, sink, "sink").is_linked());
    });

    pipeline.set_state(State::Playing).unwrap();
    let msg = pipeline
        .timed_pop_filtered(Some(WAIT), MessageType::EOS | MessageType::ERROR)
        .unwrap();
    assert!(matches!(msg.body(), MessageBody::Eos), "{msg}");
    assert!(msg.is_from_pipeline());

    assert_eq!(pipeline.len(), 4);
    assert_eq!(received(&pipeline, "sink_src_0"), 10);
    assert_eq!(received(&pipeline, "sink_src_1"), 10);
    let sink = pipeline.by_name("sink_src_0").unwrap();
    assert_eq!(pipeline.element(sink).unwrap().current_state(), State::Playing);
}

/// A sink that has already finished and refuses every buffer.
struct FinishedSink;

impl ElementImpl for FinishedSink {
    fn pad_templates(&self) -> Vec<PadTemplate> {
        vec![PadTemplate::sink(Caps::new_any())]
    }

    fn chain(&self, _ctx: &ElementContext, _pad: &str, _buffer: Buffer) -> FlowResult {
        Err(FlowError::Eos)
    }
}

/// One stream refusing data does not stop the demuxer while another
/// stream still takes it.
#[test]
fn test_demux_keeps_streaming_while_one_stream_accepts() {
    let factory = ElementFactory::with_builtins();
    let mut pipeline = launch(&factory, "testsrc num-buffers=12 ! demux name=d").unwrap();
    let demux = pipeline.by_name("d").unwrap();
    let video = pipeline.add(factory.make("fakesink", Some("video")).unwrap()).unwrap();
    let finished = pipeline.add(Element::new("finishedsink", "finished", FinishedSink)).unwrap();

    pipeline.connect_pad_added(Some(demux), move |pipeline, info| {
        let sink = if info.pad == "src_0" { video } else { finished };
        pipeline.sync_state_with_parent(sink).unwrap();
        assert!(pipeline.link_announced(info, sink, "sink").is_linked());
    });

    pipeline.set_state(State::Playing).unwrap();
    let msg = pipeline
        .timed_pop_filtered(Some(WAIT), MessageType::EOS | MessageType::ERROR)
        .unwrap();
    assert!(matches!(msg.body(), MessageBody::Eos), "{msg}");
    assert_eq!(received(&pipeline, "video"), 12);
    pipeline.set_state(State::Null).unwrap();
}

/// With a pad-added mask the application also sees the announcements.
#[test]
fn test_pad_added_messages_visible() {
    let factory = ElementFactory::with_builtins();
    let mut pipeline = launch(&factory, "testsrc name=src ! demux name=d link-timeout-ms=10").unwrap();
    pipeline
        .element(pipeline.by_name("d").unwrap())
        .unwrap()
        .set_property("streams", PropertyValue::from("audio/x-raw, rate=8000"))
        .unwrap();

    pipeline.set_state(State::Playing).unwrap();
    let msg = pipeline
        .timed_pop_filtered(Some(WAIT), MessageType::PAD_ADDED)
        .unwrap();
    match msg.body() {
        MessageBody::PadAdded { pad, caps, .. } => {
            assert_eq!(pad, "src_0");
            assert_eq!(caps, &"audio/x-raw, rate=8000".parse::<Caps>().unwrap());
        }
        other => panic!("expected pad-added, got {other:?}"),
    }
    assert_eq!(msg.src_name(), "d");

    // Nothing links the pad, so the demuxer reports not-linked.
    let msg = pipeline.timed_pop_filtered(Some(WAIT), MessageType::ERROR).unwrap();
    assert_eq!(msg.src_name(), "src");
    assert_eq!(pipeline.current_state(), State::Null);
}
