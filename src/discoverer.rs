//! Media discovery.
//!
//! A [`Discoverer`] probes a URI by building a throwaway pipeline around
//! the source picked for it, prerolling it to PAUSED and reading back the
//! negotiated stream formats, the duration and seekability. Probes run on
//! a private tokio runtime; each one reports through the `discovered`
//! callback, and `finished` fires once the session has nothing left in
//! flight.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediagraph::discoverer::{Discoverer, DiscovererConfig};
//!
//! mediagraph::init();
//! let mut discoverer = Discoverer::new(DiscovererConfig::default())?;
//! discoverer.connect_discovered(|info| println!("{}: {:?}", info.uri, info.result));
//! discoverer.connect_finished(|| println!("done"));
//! discoverer.start()?;
//! discoverer.discover_uri_async("test://video?num-buffers=30")?;
//! ```

use crate::bus::{MessageBody, MessageType};
use crate::caps::Caps;
use crate::clock::ClockTime;
use crate::element::State;
use crate::error::{Error, MisuseError, Result};
use crate::observability;
use crate::pipeline::{ElementFactory, ElementId, PadAddedInfo, Pipeline, PipelineConfig};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info, warn};

/// Extra time the runtime grants a probe past its own deadline before
/// giving up on it.
const DEADLINE_GRACE: Duration = Duration::from_millis(500);

static PROBE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Discoverer settings.
#[derive(Debug, Clone)]
pub struct DiscovererConfig {
    /// Time allowed for one probe.
    pub timeout: Duration,
    /// Probes allowed in flight at once. Further requests are reported busy.
    pub max_concurrent: usize,
    /// How long a probe waits for bus messages between checks.
    pub poll_interval: Duration,
}

impl Default for DiscovererConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_concurrent: 4,
            poll_interval: Duration::from_millis(20),
        }
    }
}

impl DiscovererConfig {
    /// Set the per-probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the concurrency limit.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the bus poll slice.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Outcome class of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscovererResult {
    /// The stream was analysed.
    Ok,
    /// The URI is malformed or the source rejected it.
    InvalidUri,
    /// The source or pipeline failed.
    InternalError,
    /// Analysis did not finish in time.
    Timeout,
    /// Too many probes were already running.
    Busy,
    /// No element handles the URI scheme.
    MissingPlugins,
}

impl fmt::Display for DiscovererResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiscovererResult::Ok => "ok",
            DiscovererResult::InvalidUri => "invalid-uri",
            DiscovererResult::InternalError => "internal-error",
            DiscovererResult::Timeout => "timeout",
            DiscovererResult::Busy => "busy",
            DiscovererResult::MissingPlugins => "missing-plugins",
        })
    }
}

/// What a probe found out.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscovererInfo {
    /// The probed URI.
    pub uri: String,
    /// Outcome class.
    pub result: DiscovererResult,
    /// Stream duration, if known. Only set when `result` is `Ok`.
    pub duration: Option<ClockTime>,
    /// Negotiated caps of each stream. Only set when `result` is `Ok`.
    pub streams: Vec<Caps>,
    /// Whether the stream can be seeked.
    pub seekable: bool,
    /// Error text for failed probes.
    pub error: Option<String>,
}

impl DiscovererInfo {
    fn failed(uri: &str, result: DiscovererResult, error: impl Into<String>) -> Self {
        Self {
            uri: uri.to_string(),
            result,
            duration: None,
            streams: Vec::new(),
            seekable: false,
            error: Some(error.into()),
        }
    }

    /// Whether the probe succeeded.
    pub fn is_ok(&self) -> bool {
        self.result == DiscovererResult::Ok
    }

    /// Streams whose media type starts with `video/`.
    pub fn video_streams(&self) -> impl Iterator<Item = &Caps> {
        self.streams_of("video/")
    }

    /// Streams whose media type starts with `audio/`.
    pub fn audio_streams(&self) -> impl Iterator<Item = &Caps> {
        self.streams_of("audio/")
    }

    fn streams_of<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Caps> {
        self.streams
            .iter()
            .filter(move |caps| caps.first().is_some_and(|s| s.has_name_prefix(prefix)))
    }
}

type DiscoveredCallback = Arc<dyn Fn(&DiscovererInfo) + Send + Sync>;
type FinishedCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct SessionState {
    /// Cleared by `stop`; nothing is delivered afterwards.
    open: bool,
    in_flight: usize,
    finished: bool,
    /// Results waiting for the `discovered` callback, in completion order.
    outbox: VecDeque<DiscovererInfo>,
    /// Thread currently running callbacks.
    delivering: Option<ThreadId>,
}

/// One start/stop cycle.
struct Session {
    state: Mutex<SessionState>,
    /// Signalled when a thread stops delivering.
    idle: Condvar,
    cancelled: AtomicBool,
    discovered: Option<DiscoveredCallback>,
    finished: Option<FinishedCallback>,
}

impl Session {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand in the result of an admitted request.
    fn complete(&self, info: DiscovererInfo) {
        let mut state = self.state();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.outbox.push_back(info);
        self.deliver(state);
    }

    /// Hand in a busy result for a request that was never admitted.
    fn reject(&self, info: DiscovererInfo) {
        let mut state = self.state();
        state.outbox.push_back(info);
        self.deliver(state);
    }

    /// Run the callbacks for everything queued, with the state lock
    /// released. One thread delivers at a time; a thread that finds another
    /// one delivering leaves its result in the outbox for it.
    fn deliver<'a>(&'a self, mut state: MutexGuard<'a, SessionState>) {
        if state.delivering.is_some() {
            return;
        }
        state.delivering = Some(thread::current().id());
        while state.open {
            if let Some(info) = state.outbox.pop_front() {
                drop(state);
                if let Some(discovered) = &self.discovered {
                    discovered(&info);
                }
            } else if state.in_flight == 0 && !state.finished {
                state.finished = true;
                drop(state);
                if let Some(finished) = &self.finished {
                    finished();
                }
            } else {
                break;
            }
            state = self.state();
        }
        state.delivering = None;
        drop(state);
        self.idle.notify_all();
    }

    /// Stop delivering. Waits for callbacks running on other threads; a
    /// callback closing its own session returns at once.
    fn close(&self) {
        let mut state = self.state();
        state.open = false;
        state.outbox.clear();
        self.cancelled.store(true, Ordering::SeqCst);
        let current = thread::current().id();
        while state.delivering.is_some_and(|id| id != current) {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Asynchronous media analyser.
///
/// Callbacks run one at a time and must not block for long. Analysis results
/// are delivered from the discoverer's worker threads, busy results from
/// the thread that queued the request. Callbacks may call back into the
/// discoverer. They are taken when [`Discoverer::start`] is called;
/// connecting later affects the next start.
pub struct Discoverer {
    config: DiscovererConfig,
    factory: ElementFactory,
    discovered: Option<DiscoveredCallback>,
    finished: Option<FinishedCallback>,
    runtime: Option<tokio::runtime::Runtime>,
    session: Option<Arc<Session>>,
}

impl Discoverer {
    /// Create a discoverer using the global element registry.
    pub fn new(config: DiscovererConfig) -> Result<Self> {
        Ok(Self::with_factory(config, crate::registry()?))
    }

    /// Create a discoverer that builds its probe pipelines from `factory`.
    pub fn with_factory(config: DiscovererConfig, factory: ElementFactory) -> Self {
        Self {
            config,
            factory,
            discovered: None,
            finished: None,
            runtime: None,
            session: None,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &DiscovererConfig {
        &self.config
    }

    /// Called once per probed URI with its result.
    pub fn connect_discovered<F>(&mut self, callback: F)
    where
        F: Fn(&DiscovererInfo) + Send + Sync + 'static,
    {
        self.discovered = Some(Arc::new(callback));
    }

    /// Called once per start, after the results of every request in
    /// flight have been delivered.
    pub fn connect_finished<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.finished = Some(Arc::new(callback));
    }

    /// Whether a session is running.
    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    /// Start a session. Starting a started discoverer does nothing.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(self.config.max_concurrent.max(1))
            .thread_name("mediagraph-discoverer")
            .enable_time()
            .build()?;
        self.session = Some(Arc::new(Session {
            state: Mutex::new(SessionState {
                open: true,
                ..SessionState::default()
            }),
            idle: Condvar::new(),
            cancelled: AtomicBool::new(false),
            discovered: self.discovered.clone(),
            finished: self.finished.clone(),
        }));
        self.runtime = Some(runtime);
        debug!("discoverer started");
        Ok(())
    }

    /// Cancel all probes in flight. No callback runs after this returns.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("discoverer stopped");
        }
    }

    /// Queue `uri` for analysis and return immediately. The result arrives
    /// through the `discovered` callback; requests beyond the concurrency
    /// limit are reported [`DiscovererResult::Busy`] instead of waiting.
    pub fn discover_uri_async(&self, uri: &str) -> Result<()> {
        let (Some(session), Some(runtime)) = (&self.session, &self.runtime) else {
            return Err(MisuseError::NotStarted.into());
        };
        let admitted = {
            let mut state = session.state();
            if state.in_flight >= self.config.max_concurrent.max(1) {
                false
            } else {
                state.in_flight += 1;
                true
            }
        };

        if !admitted {
            debug!(%uri, "discoverer busy");
            session.reject(DiscovererInfo::failed(uri, DiscovererResult::Busy, "too many probes in flight"));
            return Ok(());
        }

        let session = session.clone();
        let uri = uri.to_string();

        let factory = self.factory.clone();
        let config = self.config.clone();
        let span = observability::span_discover(&uri);
        runtime.spawn(
            async move {
                let probe_cancel = Arc::new(AtomicBool::new(false));
                let task = {
                    let probe_cancel = probe_cancel.clone();
                    let session = session.clone();
                    let uri = uri.clone();
                    let config = config.clone();
                    tokio::task::spawn_blocking(move || {
                        let cancelled = || session.cancelled.load(Ordering::SeqCst) || probe_cancel.load(Ordering::SeqCst);
                        probe(&factory, &config, &uri, &cancelled)
                    })
                };
                let info = match tokio::time::timeout(config.timeout + DEADLINE_GRACE, task).await {
                    Ok(Ok(info)) => info,
                    Ok(Err(err)) => DiscovererInfo::failed(&uri, DiscovererResult::InternalError, err.to_string()),
                    Err(_) => {
                        probe_cancel.store(true, Ordering::SeqCst);
                        warn!(%uri, "probe did not return in time");
                        DiscovererInfo::failed(&uri, DiscovererResult::Timeout, "probe did not return in time")
                    }
                };
                session.complete(info);
            }
            .instrument(span),
        );
        Ok(())
    }

    /// Analyse `uri` on the calling thread.
    pub fn discover_uri(&self, uri: &str) -> DiscovererInfo {
        let _span = observability::span_discover(uri).entered();
        probe(&self.factory, &self.config, uri, &|| false)
    }
}

impl Drop for Discoverer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Discoverer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Discoverer")
            .field("config", &self.config)
            .field("started", &self.is_started())
            .finish()
    }
}

/// Classify a failure to build the source.
fn source_failure(uri: &str, err: &Error) -> DiscovererInfo {
    let result = match err {
        Error::InvalidUri(_) => DiscovererResult::InvalidUri,
        Error::NoUriHandler(_) | Error::FactoryNotFound(_) => DiscovererResult::MissingPlugins,
        _ => DiscovererResult::InternalError,
    };
    DiscovererInfo::failed(uri, result, err.to_string())
}

/// Build the probe pipeline: the source followed by an async fakesink, or
/// by a demuxer whose streams each get one.
fn build(factory: &ElementFactory, uri: &str) -> std::result::Result<Pipeline, DiscovererInfo> {
    let source = factory
        .make_from_uri(uri, Some("source"))
        .map_err(|err| source_failure(uri, &err))?;
    let internal = |err: Error| DiscovererInfo::failed(uri, DiscovererResult::InternalError, err.to_string());

    let caps = source.query_caps("src").map_err(internal)?;
    let needs_demux = caps.is_any() || caps.first().is_some_and(|s| s.has_name_prefix("application/"));

    let name = format!("discoverer{}", PROBE_COUNTER.fetch_add(1, Ordering::Relaxed));
    let mut pipeline = Pipeline::with_config(PipelineConfig::default().with_name(name));
    let src = pipeline.add(source).map_err(internal)?;

    if needs_demux {
        let demux = pipeline
            .add(factory.make("demux", Some("demux")).map_err(|err| source_failure(uri, &err))?)
            .map_err(internal)?;
        pipeline.link(src, demux).map_err(internal)?;
        let factory = factory.clone();
        pipeline.connect_pad_added(Some(demux), move |pipeline, info| {
            if let Err(err) = add_stream_sink(&factory, pipeline, info) {
                warn!(pad = %info.pad, error = %err, "could not attach stream");
            }
        });
    } else {
        let sink = pipeline.add(fake_sink(factory, None).map_err(internal)?).map_err(internal)?;
        pipeline.link(src, sink).map_err(internal)?;
    }
    Ok(pipeline)
}

fn fake_sink(factory: &ElementFactory, name: Option<&str>) -> Result<crate::element::Element> {
    factory.make_with_properties("fakesink", name, &[("async", true.into())])
}

fn add_stream_sink(factory: &ElementFactory, pipeline: &mut Pipeline, info: &PadAddedInfo) -> Result<()> {
    let sink = pipeline.add(fake_sink(factory, Some(&format!("sink_{}", info.pad)))?)?;
    // Running before linked, so the first pushed buffer finds it prerolling.
    pipeline.sync_state_with_parent(sink)?;
    let outcome = pipeline.link_announced(info, sink, "sink");
    if !outcome.is_linked() {
        debug!(pad = %info.pad, ?outcome, "stream not linked");
        pipeline.remove(sink)?;
    }
    Ok(())
}

fn sink_ids(pipeline: &Pipeline) -> Vec<ElementId> {
    pipeline
        .element_ids()
        .into_iter()
        .filter(|id| pipeline.element(*id).is_some_and(|e| e.is_sink()))
        .collect()
}

/// Whether every sink has prerolled.
fn prerolled(pipeline: &Pipeline) -> bool {
    let sinks = sink_ids(pipeline);
    !sinks.is_empty()
        && sinks.iter().all(|id| {
            pipeline
                .element(*id)
                .is_some_and(|e| e.current_state() == State::Paused && e.pending_state().is_none())
        })
}

/// Whether a drained message ends the probe, and how.
fn terminal(uri: &str, body: &MessageBody, from_pipeline: bool) -> Option<std::result::Result<(), DiscovererInfo>> {
    match body {
        MessageBody::Error { error, debug } => {
            let text = match debug {
                Some(debug) => format!("{error} ({debug})"),
                None => error.clone(),
            };
            Some(Err(DiscovererInfo::failed(uri, DiscovererResult::InternalError, text)))
        }
        MessageBody::Eos if from_pipeline => Some(Ok(())),
        _ => None,
    }
}

fn probe(factory: &ElementFactory, config: &DiscovererConfig, uri: &str, cancelled: &dyn Fn() -> bool) -> DiscovererInfo {
    let started = Instant::now();
    let deadline = started + config.timeout;
    let mut pipeline = match build(factory, uri) {
        Ok(pipeline) => pipeline,
        Err(info) => {
            debug!(uri, result = %info.result, "probe rejected");
            return info;
        }
    };

    if let Err(err) = pipeline.set_state(State::Paused) {
        return DiscovererInfo::failed(uri, DiscovererResult::InternalError, err.to_string());
    }

    let mask = MessageType::ERROR | MessageType::EOS;
    let outcome = loop {
        if cancelled() {
            break Err(DiscovererInfo::failed(uri, DiscovererResult::Timeout, "probe cancelled"));
        }
        // Drain everything queued, then look at the sinks.
        let mut stop = None;
        while let Some(msg) = pipeline.poll(mask) {
            stop = terminal(uri, msg.body(), msg.is_from_pipeline());
            if stop.is_some() {
                break;
            }
        }
        if let Some(stop) = stop {
            break stop;
        }
        if prerolled(&pipeline) {
            break Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            break Err(DiscovererInfo::failed(
                uri,
                DiscovererResult::Timeout,
                format!("no preroll after {:?}", config.timeout),
            ));
        }
        let wait = config.poll_interval.min(deadline - now);
        if let Some(msg) = pipeline.timed_pop_filtered(Some(wait), mask) {
            if let Some(stop) = terminal(uri, msg.body(), msg.is_from_pipeline()) {
                break stop;
            }
        }
    };

    let info = match outcome {
        Ok(()) => {
            let streams = sink_ids(&pipeline)
                .into_iter()
                .filter_map(|id| pipeline.element(id)?.pad("sink")?.caps)
                .collect();
            let duration = pipeline.query_duration().ok().flatten();
            let seekable = pipeline.query_seeking().is_ok_and(|s| s.seekable);
            DiscovererInfo {
                uri: uri.to_string(),
                result: DiscovererResult::Ok,
                duration,
                streams,
                seekable,
                error: None,
            }
        }
        Err(info) => info,
    };
    if let Err(err) = pipeline.set_state(State::Null) {
        warn!(uri, error = %err, "could not shut down probe pipeline");
    }
    info!(
        uri,
        result = %info.result,
        streams = info.streams.len(),
        elapsed = ?started.elapsed(),
        "probe finished"
    );
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discoverer(timeout: Duration) -> Discoverer {
        Discoverer::with_factory(
            DiscovererConfig::default().with_timeout(timeout),
            ElementFactory::with_builtins(),
        )
    }

    #[test]
    fn test_invalid_and_unhandled_uris() {
        let discoverer = discoverer(Duration::from_secs(1));
        assert_eq!(discoverer.discover_uri("no-scheme").result, DiscovererResult::InvalidUri);
        assert_eq!(discoverer.discover_uri("test://bogus").result, DiscovererResult::InvalidUri);
        let info = discoverer.discover_uri("rtsp://camera/1");
        assert_eq!(info.result, DiscovererResult::MissingPlugins);
        assert!(info.streams.is_empty());
        assert!(info.error.is_some());
    }

    #[test]
    fn test_discover_test_source() {
        let discoverer = discoverer(Duration::from_secs(5));
        let info = discoverer.discover_uri("test://audio?num-buffers=50");
        assert_eq!(info.result, DiscovererResult::Ok, "{:?}", info.error);
        assert_eq!(info.duration, Some(ClockTime::from_secs(1)));
        assert!(info.seekable);
        assert_eq!(info.audio_streams().count(), 1);
        assert_eq!(info.video_streams().count(), 0);
    }

    #[test]
    fn test_stalled_source_times_out() {
        let discoverer = discoverer(Duration::from_millis(200));
        let info = discoverer.discover_uri("test://stall");
        assert_eq!(info.result, DiscovererResult::Timeout);
        assert!(info.duration.is_none());
    }

    #[test]
    fn test_async_requires_start() {
        let discoverer = discoverer(Duration::from_secs(1));
        let err = discoverer.discover_uri_async("test://video").unwrap_err();
        assert_eq!(err.as_misuse(), Some(&MisuseError::NotStarted));
    }
}
