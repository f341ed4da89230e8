//! Framed session state machine.
//!
//! A [`Session`] emulates one persistent bidirectional socket over a
//! sequence of transport attachments. It owns the outbound queue, the
//! inbound pause buffer, the heartbeat timer and the disconnect timeout.
//!
//! # Attachment State Machine
//!
//! ```text
//!              register(a)                     register(b)
//!  Detached ───────────────► Attached(a) ─────────────────► b gets c[2010,...]
//!     ▲  │                        │
//!     │  │ timeout elapses        │ detach(a), or register while closed
//!     │  ▼                        ▼
//!     │ expired             Detached + timeout armed
//!     └───────────────────────────┘
//! ```
//!
//! # Locking
//!
//! State sits behind one mutex that is only held for state transitions.
//! Frames are sent and handlers are called after it is released, so a
//! handler may call back into the same session.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::flow::{DataHandler, DrainHandler, EndHandler, FlowSink, FlowSource};
use crate::identifiers::SessionId;
use crate::protocol::{CloseReason, Frame, ParseMode, parse_messages};
use crate::scheduler::{Scheduler, TimerId};

use super::attachment::{AttachmentState, RegisterOutcome, TransportAttachment};
use super::builder::SessionBuilder;

// ============================================================================
// Types
// ============================================================================

/// Called with the session the first time it gets an attachment.
pub type OpenHandler = Arc<dyn Fn(Session) + Send + Sync>;

/// Called when a detached session runs out its timeout.
pub type TimeoutHandler = Arc<dyn Fn(SessionId) + Send + Sync>;

/// Work produced under the state lock and carried out after releasing it.
enum Effect {
    /// Send a frame to an attachment.
    Send {
        attachment: Arc<dyn TransportAttachment>,
        frame: String,
    },
    /// Run the one-shot drain handler.
    Drain(DrainHandler),
}

/// Fixed configuration and collaborators of a session.
pub(crate) struct SessionParts {
    pub(crate) id: SessionId,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) heartbeat_period: Duration,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_queue_chars: usize,
    pub(crate) parse_mode: ParseMode,
    pub(crate) on_open: OpenHandler,
    pub(crate) on_timeout: Option<TimeoutHandler>,
}

/// Mutable session state.
struct SessionState {
    attachment: AttachmentState,
    /// Pending outbound messages, oldest first.
    outbound: VecDeque<String>,
    /// Sum of `outbound` lengths in characters.
    outbound_size: usize,
    /// Inbound messages held back while paused.
    inbound: VecDeque<String>,
    paused: bool,
    closed: bool,
    /// Timed out or destroyed; no attachment will be served again.
    terminated: bool,
    open_sent: bool,
    max_queue_chars: usize,
    heartbeat_timer: Option<TimerId>,
    timeout_timer: Option<TimerId>,
    /// Bumped each time a disconnect timeout is armed.
    timeout_epoch: u64,
    data_handler: Option<DataHandler>,
    drain_handler: Option<DrainHandler>,
    end_handler: Option<EndHandler>,
}

impl SessionState {
    fn new(max_queue_chars: usize) -> Self {
        Self {
            attachment: AttachmentState::Detached,
            outbound: VecDeque::new(),
            outbound_size: 0,
            inbound: VecDeque::new(),
            paused: false,
            closed: false,
            terminated: false,
            open_sent: false,
            max_queue_chars,
            heartbeat_timer: None,
            timeout_timer: None,
            timeout_epoch: 0,
            data_handler: None,
            drain_handler: None,
            end_handler: None,
        }
    }

    /// Turns the whole outbound queue into one data frame for `attachment`.
    fn flush(&mut self, attachment: Arc<dyn TransportAttachment>) -> Vec<Effect> {
        let frame = Frame::data_from(self.outbound.iter().map(String::as_str));
        let count = self.outbound.len();
        self.outbound.clear();
        self.outbound_size = 0;

        trace!(count, "Flushing outbound queue");

        let mut effects = vec![Effect::Send { attachment, frame }];
        if self.outbound_size <= self.max_queue_chars / 2
            && let Some(handler) = self.drain_handler.take()
        {
            effects.push(Effect::Drain(handler));
        }
        effects
    }
}

/// Shared session internals.
struct SessionInner {
    id: SessionId,
    scheduler: Arc<dyn Scheduler>,
    timeout: Option<Duration>,
    parse_mode: ParseMode,
    on_open: OpenHandler,
    on_timeout: Option<TimeoutHandler>,
    state: Mutex<SessionState>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for timer in [state.heartbeat_timer.take(), state.timeout_timer.take()]
            .into_iter()
            .flatten()
        {
            self.scheduler.cancel(timer);
        }
        trace!(session_id = %self.id, "Session dropped");
    }
}

// ============================================================================
// Session
// ============================================================================

/// One logical duplex connection carried by successive transport attachments.
///
/// Cloning is cheap and every clone refers to the same session.
///
/// Handlers that capture a clone of their own session form a reference
/// cycle; [`destroy`](Self::destroy) breaks it by clearing every handler.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

// ============================================================================
// Session - Constructor
// ============================================================================

impl Session {
    /// Returns a builder for a session using `scheduler` for its timers.
    #[inline]
    #[must_use]
    pub fn builder(scheduler: Arc<dyn Scheduler>) -> SessionBuilder {
        SessionBuilder::new(scheduler)
    }

    /// Creates the session and arms its heartbeat.
    pub(crate) fn start(parts: SessionParts) -> Self {
        let SessionParts {
            id,
            scheduler,
            heartbeat_period,
            timeout,
            max_queue_chars,
            parse_mode,
            on_open,
            on_timeout,
        } = parts;

        let inner = Arc::new(SessionInner {
            id,
            scheduler,
            timeout,
            parse_mode,
            on_open,
            on_timeout,
            state: Mutex::new(SessionState::new(max_queue_chars)),
        });

        let weak = Arc::downgrade(&inner);
        let heartbeat = inner.scheduler.every(
            heartbeat_period,
            Box::new(move || {
                if let Some(session) = Self::upgrade(&weak) {
                    session.send_heartbeat();
                }
            }),
        );
        inner.state.lock().heartbeat_timer = Some(heartbeat);

        debug!(
            session_id = %id,
            heartbeat_ms = heartbeat_period.as_millis() as u64,
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Session created"
        );

        Self { inner }
    }

    fn upgrade(weak: &Weak<SessionInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the session ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns `true` while an attachment carries the session.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.state.lock().attachment.is_attached()
    }

    /// Returns `true` once [`close`](Self::close) has been called, or the
    /// session has terminated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Returns `true` while inbound delivery is paused.
    #[inline]
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Returns `true` after the disconnect timeout fired or
    /// [`destroy`](Self::destroy) was called.
    #[inline]
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().terminated
    }

    /// Returns the pending outbound size in characters.
    #[inline]
    #[must_use]
    pub fn outbound_size(&self) -> usize {
        self.inner.state.lock().outbound_size
    }

    /// Returns the number of inbound messages held back by a pause.
    #[inline]
    #[must_use]
    pub fn buffered_count(&self) -> usize {
        self.inner.state.lock().inbound.len()
    }
}

// ============================================================================
// Session - Outbound
// ============================================================================

impl Session {
    /// Queues a message, flushing at once if an attachment is live.
    ///
    /// The bytes are decoded as UTF-8, replacing invalid sequences.
    pub fn write(&self, data: impl Into<Bytes>) {
        let data = data.into();
        let message = String::from_utf8_lossy(&data).into_owned();

        let effects = {
            let mut state = self.inner.state.lock();
            if state.terminated {
                trace!(session_id = %self.inner.id, "Session terminated, dropping write");
                return;
            }

            state.outbound_size += message.chars().count();
            state.outbound.push_back(message);

            match state.attachment.current() {
                Some(attachment) => state.flush(attachment),
                None => {
                    trace!(
                        session_id = %self.inner.id,
                        size = state.outbound_size,
                        "Queued while detached"
                    );
                    Vec::new()
                }
            }
        };

        self.apply(effects);
    }

    /// Returns `true` once the outbound queue reaches its ceiling.
    #[inline]
    #[must_use]
    pub fn write_queue_full(&self) -> bool {
        let state = self.inner.state.lock();
        state.outbound_size >= state.max_queue_chars
    }

    /// Sets the outbound queue ceiling, in characters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `max_size` is zero.
    pub fn set_write_queue_max_size(&self, max_size: usize) -> Result<()> {
        if max_size < 1 {
            return Err(Error::invalid_argument("max queue size must be >= 1"));
        }
        self.inner.state.lock().max_queue_chars = max_size;
        Ok(())
    }

    /// Replaces the one-shot drain handler; `None` clears it.
    pub fn drain_handler(&self, handler: Option<DrainHandler>) {
        self.inner.state.lock().drain_handler = handler;
    }

    /// Sends a heartbeat frame if attached.
    fn send_heartbeat(&self) {
        let attachment = self.inner.state.lock().attachment.current();
        match attachment {
            Some(attachment) => {
                trace!(session_id = %self.inner.id, "Sending heartbeat");
                attachment.send_frame(Frame::HEARTBEAT);
            }
            None => trace!(session_id = %self.inner.id, "Detached, heartbeat skipped"),
        }
    }

    /// Carries out deferred work with the lock released.
    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send { attachment, frame } => {
                    trace!(session_id = %self.inner.id, frame = %frame, "Sending frame");
                    attachment.send_frame(&frame);
                }
                Effect::Drain(handler) => handler(),
            }
        }
    }
}

// ============================================================================
// Session - Inbound
// ============================================================================

impl Session {
    /// Parses an inbound payload and delivers its messages in order.
    ///
    /// While paused, messages are buffered. When not paused and no data
    /// handler is set, they are dropped. Once closed, nothing is delivered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] if the payload is not a quoted
    /// string or an array of quoted strings; no message from it is
    /// delivered.
    pub fn handle_messages(&self, payload: &str) -> Result<()> {
        let messages = parse_messages(payload, self.inner.parse_mode).inspect_err(|e| {
            warn!(session_id = %self.inner.id, error = %e, "Rejected inbound payload");
        })?;

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                debug!(
                    session_id = %self.inner.id,
                    dropped = messages.len(),
                    "Session closed, dropping inbound messages"
                );
                return Ok(());
            }
            trace!(session_id = %self.inner.id, count = messages.len(), "Inbound messages");
            state.inbound.extend(messages);
        }

        self.deliver_inbound();
        Ok(())
    }

    /// Replaces the data handler; `None` clears it.
    pub fn data_handler(&self, handler: Option<DataHandler>) {
        self.inner.state.lock().data_handler = handler;
    }

    /// Replaces the end handler; `None` clears it.
    ///
    /// The end handler runs once, after the disconnect timeout fires.
    pub fn end_handler(&self, handler: Option<EndHandler>) {
        self.inner.state.lock().end_handler = handler;
    }

    /// Suspends inbound delivery; new messages are buffered.
    pub fn pause(&self) {
        self.inner.state.lock().paused = true;
        trace!(session_id = %self.inner.id, "Paused");
    }

    /// Resumes inbound delivery, replaying buffered messages first.
    ///
    /// Each buffered message is delivered once and then released.
    pub fn resume(&self) {
        self.inner.state.lock().paused = false;
        trace!(session_id = %self.inner.id, "Resumed");
        self.deliver_inbound();
    }

    /// Hands buffered messages to the data handler one at a time.
    ///
    /// Re-checks the state before every message, so a handler that pauses
    /// or closes the session stops delivery right away.
    fn deliver_inbound(&self) {
        loop {
            let (message, handler) = {
                let mut state = self.inner.state.lock();
                if state.closed {
                    state.inbound.clear();
                    return;
                }
                if state.paused {
                    return;
                }
                let Some(message) = state.inbound.pop_front() else {
                    return;
                };
                (message, state.data_handler.clone())
            };

            match handler {
                Some(handler) => handler(Bytes::from(message)),
                None => trace!(session_id = %self.inner.id, "No data handler, message dropped"),
            }
        }
    }
}

// ============================================================================
// Session - Attachment
// ============================================================================

impl Session {
    /// Offers a transport attachment to the session.
    ///
    /// - Already attached: `attachment` gets `c[2010,"Another connection
    ///   still open"]` and the live attachment is untouched.
    /// - Detached: `attachment` becomes live and any disconnect timeout is
    ///   cancelled. On the very first attachment the open frame is sent and
    ///   the open handler runs. Then, if the session is closed, `attachment`
    ///   gets `c[3000,"Go away!"]` and is detached again; otherwise pending
    ///   messages are flushed to it.
    pub fn register(&self, attachment: Arc<dyn TransportAttachment>) -> RegisterOutcome {
        let id = self.inner.id;
        let first = {
            let mut state = self.inner.state.lock();

            if state.terminated {
                drop(state);
                debug!(session_id = %id, "Session terminated, turning attachment away");
                attachment.send_frame(&Frame::close_text(&CloseReason::GO_AWAY));
                return RegisterOutcome::Closed;
            }

            if state.attachment.is_attached() {
                drop(state);
                warn!(session_id = %id, "Another connection still open, rejecting attachment");
                attachment.send_frame(&Frame::close_text(&CloseReason::ANOTHER_CONNECTION_OPEN));
                return RegisterOutcome::Rejected;
            }

            state.attachment = AttachmentState::Attached(Arc::clone(&attachment));
            if let Some(timer) = state.timeout_timer.take() {
                self.inner.scheduler.cancel(timer);
                debug!(session_id = %id, "Reattached, disconnect timeout cancelled");
            }

            let first = !state.open_sent;
            state.open_sent = true;
            first
        };

        debug!(session_id = %id, "Attachment registered");

        if first {
            info!(session_id = %id, "Session opened");
            attachment.send_frame(Frame::OPEN);
            (self.inner.on_open)(self.clone());
        }

        // The open handler may have written, closed or detached.
        let (outcome, effects) = {
            let mut state = self.inner.state.lock();
            if !state.attachment.holds(&attachment) {
                let outcome = if state.terminated {
                    RegisterOutcome::Closed
                } else {
                    RegisterOutcome::Attached
                };
                (outcome, Vec::new())
            } else if state.closed {
                debug!(session_id = %id, "Session closed, sending close frame");
                self.detach_locked(&mut state);
                let frame = Frame::close_text(&CloseReason::GO_AWAY);
                (RegisterOutcome::Closed, vec![Effect::Send { attachment, frame }])
            } else if !state.outbound.is_empty() {
                (RegisterOutcome::Attached, state.flush(attachment))
            } else {
                (RegisterOutcome::Attached, Vec::new())
            }
        };

        self.apply(effects);
        outcome
    }

    /// Reports that `attachment` went away.
    ///
    /// Ignored unless `attachment` is the live one. Otherwise the session
    /// becomes detached and, with a finite timeout, starts waiting for a
    /// new attachment.
    ///
    /// Returns `true` if the session was detached.
    pub fn detach(&self, attachment: &Arc<dyn TransportAttachment>) -> bool {
        let mut state = self.inner.state.lock();
        if !state.attachment.holds(attachment) {
            trace!(session_id = %self.inner.id, "Ignoring detach of stale attachment");
            return false;
        }
        self.detach_locked(&mut state);
        true
    }

    /// Moves to `Detached` and arms the disconnect timeout.
    fn detach_locked(&self, state: &mut SessionState) {
        state.attachment.take();
        debug!(session_id = %self.inner.id, "Attachment detached");

        let Some(timeout) = self.inner.timeout else {
            return;
        };
        if state.terminated {
            return;
        }

        if let Some(previous) = state.timeout_timer.take() {
            self.inner.scheduler.cancel(previous);
        }

        state.timeout_epoch += 1;
        let epoch = state.timeout_epoch;
        let weak = Arc::downgrade(&self.inner);
        let timer = self.inner.scheduler.after(
            timeout,
            Box::new(move || {
                if let Some(session) = Self::upgrade(&weak) {
                    session.expire(epoch);
                }
            }),
        );
        state.timeout_timer = Some(timer);

        debug!(
            session_id = %self.inner.id,
            timeout_ms = timeout.as_millis() as u64,
            "Disconnect timeout armed"
        );
    }

    /// Disconnect timeout armed as `epoch` fired.
    ///
    /// A timer that fires after it was superseded, by a registration or a
    /// newer detach, is ignored even if its cancellation came too late.
    fn expire(&self, epoch: u64) {
        let end = {
            let mut state = self.inner.state.lock();
            if state.timeout_epoch != epoch
                || state.timeout_timer.is_none()
                || state.attachment.is_attached()
                || state.terminated
            {
                trace!(session_id = %self.inner.id, epoch, "Ignoring stale disconnect timeout");
                return;
            }
            state.timeout_timer = None;
            if let Some(heartbeat) = state.heartbeat_timer.take() {
                self.inner.scheduler.cancel(heartbeat);
            }
            state.closed = true;
            state.terminated = true;
            state.inbound.clear();
            state.data_handler = None;
            state.drain_handler = None;
            state.end_handler.take()
        };

        info!(session_id = %self.inner.id, "Session timed out");

        if let Some(on_timeout) = &self.inner.on_timeout {
            on_timeout(self.inner.id);
        }
        if let Some(end) = end {
            end();
        }
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl Session {
    /// Marks the session closed.
    ///
    /// The attachment is not touched here: the next attachment event (a
    /// registration or the live attachment re-registering) sends
    /// `c[3000,"Go away!"]`. Inbound messages stop being delivered at once.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if !state.closed {
            state.closed = true;
            state.inbound.clear();
            debug!(session_id = %self.inner.id, "Session closed by application");
        }
    }

    /// Tears the session down.
    ///
    /// Cancels the heartbeat and any disconnect timeout, clears every
    /// handler and both queues, and sends `c[3000,"Go away!"]` to the live
    /// attachment if there is one. Idempotent.
    pub fn destroy(&self) {
        let (attachment, timers) = {
            let mut state = self.inner.state.lock();
            if state.terminated && state.heartbeat_timer.is_none() && !state.attachment.is_attached() {
                return;
            }
            state.closed = true;
            state.terminated = true;
            state.outbound.clear();
            state.outbound_size = 0;
            state.inbound.clear();
            state.data_handler = None;
            state.drain_handler = None;
            state.end_handler = None;
            let timers = [state.heartbeat_timer.take(), state.timeout_timer.take()];
            (state.attachment.take(), timers)
        };

        for timer in timers.into_iter().flatten() {
            self.inner.scheduler.cancel(timer);
        }

        if let Some(attachment) = attachment {
            attachment.send_frame(&Frame::close_text(&CloseReason::GO_AWAY));
        }

        debug!(session_id = %self.inner.id, "Session destroyed");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("attached", &state.attachment.is_attached())
            .field("closed", &state.closed)
            .field("terminated", &state.terminated)
            .field("paused", &state.paused)
            .field("outbound_size", &state.outbound_size)
            .finish()
    }
}

// ============================================================================
// Flow Control
// ============================================================================

impl FlowSink for Session {
    fn write(&self, chunk: Bytes) {
        Session::write(self, chunk);
    }

    fn write_queue_full(&self) -> bool {
        Session::write_queue_full(self)
    }

    fn set_write_queue_max_size(&self, max_size: usize) -> Result<()> {
        Session::set_write_queue_max_size(self, max_size)
    }

    fn drain_handler(&self, handler: Option<DrainHandler>) {
        Session::drain_handler(self, handler);
    }
}

impl FlowSource for Session {
    fn data_handler(&self, handler: Option<DataHandler>) {
        Session::data_handler(self, handler);
    }

    fn pause(&self) {
        Session::pause(self);
    }

    fn resume(&self) {
        Session::resume(self);
    }
}

// ============================================================================
// Tests
// ============================================================================
