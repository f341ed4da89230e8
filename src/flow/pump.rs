//! Flow-controlled pump.
//!
//! Moves chunks from a [`FlowSource`] to a [`FlowSink`]. After every write
//! the pump checks the sink; once its queue is full the source is paused
//! and a drain handler is installed on the sink that resumes it. This keeps
//! a fast producer from growing the sink's queue without bound.
//!
//! # Example
//!
//! ```ignore
//! use sockjs_session::Pump;
//!
//! // Relay everything one session receives to another session.
//! let pump = Pump::with_max_queue(inbound.clone(), outbound.clone(), 4096)?;
//! pump.start();
//! ```
//!
//! The handlers a running pump installs hold clones of both streams.
//! [`Pump::stop`] releases them.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::Result;

use super::contract::{DataHandler, DrainHandler, FlowSink, FlowSource};

// ============================================================================
// Pump
// ============================================================================

/// Connects a source to a sink with automatic backpressure.
///
/// The pump can be started and stopped any number of times.
pub struct Pump<R, W> {
    /// Where chunks come from.
    source: R,
    /// Where chunks go.
    sink: W,
    /// Total bytes written to the sink.
    pumped: Arc<AtomicU64>,
    /// Whether the source handler is installed.
    running: AtomicBool,
}

impl<R, W> Pump<R, W>
where
    R: FlowSource + Clone + 'static,
    W: FlowSink + Clone + 'static,
{
    /// Creates a stopped pump.
    #[must_use]
    pub fn new(source: R, sink: W) -> Self {
        Self {
            source,
            sink,
            pumped: Arc::new(AtomicU64::new(0)),
            running: AtomicBool::new(false),
        }
    }

    /// Creates a stopped pump and sets the sink's queue maximum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) if
    /// `max_sink_queue` is zero.
    pub fn with_max_queue(source: R, sink: W, max_sink_queue: usize) -> Result<Self> {
        sink.set_write_queue_max_size(max_sink_queue)?;
        Ok(Self::new(source, sink))
    }

    /// Sets the sink's queue maximum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) if
    /// `max_size` is zero.
    pub fn set_write_queue_max_size(&self, max_size: usize) -> Result<()> {
        self.sink.set_write_queue_max_size(max_size)
    }

    /// Starts pumping.
    ///
    /// Calling it again while running reinstalls the handler.
    pub fn start(&self) {
        self.source.data_handler(Some(self.data_handler()));
        self.running.store(true, Ordering::SeqCst);
        debug!("Pump started");
    }

    /// Stops pumping and releases both stream handlers.
    ///
    /// Idempotent.
    pub fn stop(&self) {
        self.sink.drain_handler(None);
        self.source.data_handler(None);
        if self.running.swap(false, Ordering::SeqCst) {
            debug!(
                bytes_pumped = self.pumped.load(Ordering::Relaxed),
                "Pump stopped"
            );
        }
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the total number of bytes written to the sink.
    #[inline]
    #[must_use]
    pub fn bytes_pumped(&self) -> u64 {
        self.pumped.load(Ordering::Relaxed)
    }

    /// Builds the handler installed on the source.
    fn data_handler(&self) -> DataHandler {
        let source = self.source.clone();
        let sink = self.sink.clone();
        let pumped = Arc::clone(&self.pumped);

        let resume: DrainHandler = {
            let source = self.source.clone();
            Arc::new(move || {
                trace!("Sink drained, resuming source");
                source.resume();
            })
        };

        Arc::new(move |chunk: Bytes| {
            let len = chunk.len() as u64;
            sink.write(chunk);
            pumped.fetch_add(len, Ordering::Relaxed);

            if sink.write_queue_full() {
                trace!("Sink full, pausing source");
                source.pause();
                sink.drain_handler(Some(Arc::clone(&resume)));
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::error::Error;
    use crate::scheduler::ManualScheduler;
    use crate::session::testing::RecordingAttachment;
    use crate::session::{Session, SessionOptions};

    // ------------------------------------------------------------------------
    // Test streams
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct SourceState {
        handler: Option<DataHandler>,
        paused: bool,
        held: VecDeque<Bytes>,
    }

    /// Source that delivers emitted chunks unless paused.
    #[derive(Clone)]
    struct TestSource {
        state: Arc<Mutex<SourceState>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl TestSource {
        fn emit(&self, chunk: Bytes) {
            let handler = {
                let mut state = self.state.lock();
                if state.paused {
                    state.held.push_back(chunk);
                    return;
                }
                state.handler.clone()
            };
            if let Some(handler) = handler {
                handler(chunk);
            }
        }

        fn is_paused(&self) -> bool {
            self.state.lock().paused
        }

        fn has_handler(&self) -> bool {
            self.state.lock().handler.is_some()
        }
    }

    impl FlowSource for TestSource {
        fn data_handler(&self, handler: Option<DataHandler>) {
            self.state.lock().handler = handler;
        }

        fn pause(&self) {
            self.state.lock().paused = true;
            self.log.lock().push("pause".into());
        }

        fn resume(&self) {
            let held: Vec<Bytes> = {
                let mut state = self.state.lock();
                state.paused = false;
                state.held.drain(..).collect()
            };
            self.log.lock().push("resume".into());
            for chunk in held {
                self.emit(chunk);
            }
        }
    }

    #[derive(Default)]
    struct SinkState {
        size: usize,
        max: usize,
        drain: Option<DrainHandler>,
    }

    /// Sink whose queue only shrinks when the test says so.
    #[derive(Clone)]
    struct TestSink {
        state: Arc<Mutex<SinkState>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl TestSink {
        fn drain_to(&self, size: usize) {
            let handler = {
                let mut state = self.state.lock();
                state.size = size;
                if state.size <= state.max / 2 {
                    state.drain.take()
                } else {
                    None
                }
            };
            if let Some(handler) = handler {
                handler();
            }
        }

        fn has_drain_handler(&self) -> bool {
            self.state.lock().drain.is_some()
        }
    }

    impl FlowSink for TestSink {
        fn write(&self, chunk: Bytes) {
            self.state.lock().size += chunk.len();
            self.log.lock().push(format!("write {}", chunk.len()));
        }

        fn write_queue_full(&self) -> bool {
            let state = self.state.lock();
            state.size >= state.max
        }

        fn set_write_queue_max_size(&self, max_size: usize) -> Result<()> {
            if max_size < 1 {
                return Err(Error::invalid_argument("max size must be >= 1"));
            }
            self.state.lock().max = max_size;
            Ok(())
        }

        fn drain_handler(&self, handler: Option<DrainHandler>) {
            self.state.lock().drain = handler;
        }
    }

    fn streams() -> (TestSource, TestSink, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = TestSource {
            state: Arc::default(),
            log: Arc::clone(&log),
        };
        let sink = TestSink {
            state: Arc::new(Mutex::new(SinkState {
                max: usize::MAX,
                ..SinkState::default()
            })),
            log: Arc::clone(&log),
        };
        (source, sink, log)
    }

    fn chunk(len: usize) -> Bytes {
        Bytes::from(vec![b'x'; len])
    }

    // ------------------------------------------------------------------------
    // Pump with test streams
    // ------------------------------------------------------------------------

    #[test]
    fn test_pause_on_full_resume_on_drain() {
        let (source, sink, log) = streams();
        let pump = Pump::with_max_queue(source.clone(), sink.clone(), 150).expect("valid max");
        pump.start();

        source.emit(chunk(100));
        assert!(!source.is_paused());

        source.emit(chunk(100));
        assert!(source.is_paused());
        assert!(sink.has_drain_handler());

        // Held back by the paused source.
        source.emit(chunk(100));
        assert_eq!(pump.bytes_pumped(), 200);

        sink.drain_to(75);
        assert_eq!(pump.bytes_pumped(), 300);

        let log = log.lock();
        assert_eq!(
            log[..5],
            ["write 100", "write 100", "pause", "resume", "write 100"]
        );
    }

    #[test]
    fn test_drain_above_half_does_not_resume() {
        let (source, sink, _log) = streams();
        let pump = Pump::with_max_queue(source.clone(), sink.clone(), 150).expect("valid max");
        pump.start();

        source.emit(chunk(200));
        assert!(source.is_paused());

        sink.drain_to(100);
        assert!(source.is_paused());

        sink.drain_to(0);
        assert!(!source.is_paused());
    }

    #[test]
    fn test_stop_clears_handlers_and_is_idempotent() {
        let (source, sink, _log) = streams();
        let pump = Pump::with_max_queue(source.clone(), sink.clone(), 10).expect("valid max");
        pump.start();
        assert!(pump.is_running());

        source.emit(chunk(20));
        assert!(sink.has_drain_handler());

        pump.stop();
        pump.stop();
        assert!(!pump.is_running());
        assert!(!source.has_handler());
        assert!(!sink.has_drain_handler());

        source.resume();
        source.emit(chunk(5));
        assert_eq!(pump.bytes_pumped(), 20);
    }

    #[test]
    fn test_restart_keeps_counting() {
        let (source, sink, _log) = streams();
        let pump = Pump::new(source.clone(), sink.clone());

        pump.start();
        source.emit(chunk(3));
        pump.stop();
        source.emit(chunk(3));
        pump.start();
        pump.start();
        source.emit(chunk(4));

        assert_eq!(pump.bytes_pumped(), 7);
    }

    #[test]
    fn test_invalid_max_queue() {
        let (source, sink, _log) = streams();
        let result = Pump::with_max_queue(source.clone(), sink.clone(), 0);
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));

        let pump = Pump::new(source, sink);
        assert!(pump.set_write_queue_max_size(0).is_err());
        assert!(pump.set_write_queue_max_size(1).is_ok());
    }

    // ------------------------------------------------------------------------
    // Pump between sessions
    // ------------------------------------------------------------------------

    #[test]
    fn test_session_to_session_backpressure() {
        let scheduler = Arc::new(ManualScheduler::new());
        let options = SessionOptions::new()
            .with_heartbeat_period(Duration::from_secs(25))
            .without_timeout();

        let inbound = Session::builder(scheduler.clone())
            .options(options.clone())
            .on_open(|_| {})
            .build()
            .expect("inbound session");
        let outbound = Session::builder(scheduler.clone())
            .options(options)
            .on_open(|_| {})
            .build()
            .expect("outbound session");

        let pump = Pump::with_max_queue(inbound.clone(), outbound.clone(), 8).expect("valid max");
        pump.start();

        // Outbound is detached, so everything queues there.
        inbound.handle_messages(r#"["abcd","efgh","ijkl"]"#).expect("payload");
        assert!(inbound.is_paused());
        assert_eq!(outbound.outbound_size(), 8);
        assert_eq!(inbound.buffered_count(), 1);
        assert_eq!(pump.bytes_pumped(), 8);

        // Attaching flushes, which drains and resumes the inbound side.
        let wire = RecordingAttachment::new();
        outbound.register(wire.clone());
        assert!(!inbound.is_paused());
        assert_eq!(inbound.buffered_count(), 0);
        assert_eq!(pump.bytes_pumped(), 12);
        assert_eq!(
            wire.frames(),
            vec![
                "o".to_string(),
                r#"a["abcd","efgh"]"#.to_string(),
                r#"a["ijkl"]"#.to_string(),
            ]
        );

        pump.stop();
        inbound.destroy();
        outbound.destroy();
    }
}
