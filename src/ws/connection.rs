//! WebSocket connection handle and its transport side.
//!
//! A [`Connection`] is what middlewares and terminal handlers see: a cheap,
//! cloneable handle exposing readiness, send, receive, end, and end
//! observers. The matching [`TransportIo`] is held by whatever drives the
//! socket (the axum pump in [`super::transport`], or a test) and is the only
//! way to feed frames in, drain frames out, and report the end of the
//! connection.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::ConnectionId;
use crate::error::WsError;
use crate::middleware::keep_alive::KeepAliveHandle;

/// Number of inbound frames buffered before new ones are dropped.
pub const INBOUND_BUFFER: usize = 64;

/// Readiness of the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ReadyState {
    /// Created but not yet attached to a live socket.
    Connecting = 0,
    /// Frames can be sent.
    Open = 1,
    /// A close was requested; the transport has not reported the end yet.
    Closing = 2,
    /// The transport reported the end of the connection.
    Closed = 3,
}

impl ReadyState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Where a connection is in its setup lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Upgrade completed, nothing has run yet.
    Upgrading = 0,
    /// Running the global middleware chain.
    GlobalMiddleware = 1,
    /// Running the route middleware chain.
    RouteMiddleware = 2,
    /// Every chain admitted the connection.
    Admitted = 3,
    /// A middleware rejected or failed.
    Rejected = 4,
    /// The transport reported the end of the connection.
    Ended = 5,
}

impl Phase {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Upgrading,
            1 => Self::GlobalMiddleware,
            2 => Self::RouteMiddleware,
            3 => Self::Admitted,
            4 => Self::Rejected,
            _ => Self::Ended,
        }
    }
}

type EndObserver = Box<dyn FnOnce() + Send>;

struct Inner {
    id: ConnectionId,
    connected_at: DateTime<Utc>,
    ready_state: AtomicU8,
    phase: AtomicU8,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    /// `None` once the end signal has been delivered.
    end_observers: Mutex<Option<Vec<EndObserver>>>,
    ended: CancellationToken,
    dropped_messages: AtomicU64,
    keep_alive: OnceLock<KeepAliveHandle>,
}

/// Handle to one live WebSocket connection.
///
/// Cloning is cheap and every clone refers to the same connection. The
/// transport owns the socket; a `Connection` must not be used to send after
/// [`Connection::ready_state`] leaves [`ReadyState::Open`].
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Creates a connection and the transport side that drives it.
    ///
    /// The connection starts in [`ReadyState::Connecting`] until
    /// [`TransportIo::open`] is called.
    #[must_use]
    pub fn pair() -> (Self, TransportIo) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let connection = Self {
            inner: Arc::new(Inner {
                id: ConnectionId::new(),
                connected_at: Utc::now(),
                ready_state: AtomicU8::new(ReadyState::Connecting as u8),
                phase: AtomicU8::new(Phase::Upgrading as u8),
                outbound: outbound_tx,
                inbound: tokio::sync::Mutex::new(inbound_rx),
                end_observers: Mutex::new(Some(Vec::new())),
                ended: CancellationToken::new(),
                dropped_messages: AtomicU64::new(0),
                keep_alive: OnceLock::new(),
            }),
        };
        let io = TransportIo {
            connection: connection.clone(),
            outbound: outbound_rx,
            inbound: inbound_tx,
        };
        (connection, io)
    }

    /// Unique connection ID.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// When the connection was created.
    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.inner.connected_at
    }

    /// Current readiness of the socket.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.inner.ready_state.load(Ordering::Acquire))
    }

    /// Returns `true` while frames can be sent.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.inner.phase.load(Ordering::Acquire))
    }

    /// Returns `true` once the transport has reported the end.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.ended.is_cancelled()
    }

    /// Total inbound frames dropped because nobody was reading.
    #[must_use]
    pub fn dropped_messages(&self) -> u64 {
        self.inner.dropped_messages.load(Ordering::Relaxed)
    }

    /// Queues one frame for the transport.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::ConnectionClosed`] if the transport has ended or
    /// its side of the connection was dropped.
    pub fn send_message(&self, message: Message) -> Result<(), WsError> {
        if self.is_ended() {
            return Err(WsError::ConnectionClosed);
        }
        self.inner
            .outbound
            .send(message)
            .map_err(|_| WsError::ConnectionClosed)
    }

    /// Waits for the next inbound text or binary frame.
    ///
    /// Frames already buffered are still delivered after the end; `None`
    /// means the connection ended and the buffer is drained.
    pub async fn recv(&self) -> Option<Message> {
        let mut inbound = self.inner.inbound.lock().await;
        tokio::select! {
            biased;
            message = inbound.recv() => return message,
            () = self.inner.ended.cancelled() => {}
        }
        inbound.try_recv().ok()
    }

    /// Terminates the connection.
    ///
    /// The first call moves the socket to [`ReadyState::Closing`] and queues
    /// a single close frame; the transport reports the end once the close
    /// handshake finishes. Returns `false` if the connection was already
    /// closing or closed.
    pub fn end(&self) -> bool {
        let previous = self.inner.ready_state.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |state| (state < ReadyState::Closing as u8).then_some(ReadyState::Closing as u8),
        );
        if previous.is_err() {
            return false;
        }
        tracing::debug!(connection_id = %self.id(), "ending connection");
        // The transport may already be gone; the end signal still arrives.
        let _ = self.inner.outbound.send(Message::Close(None));
        true
    }

    /// Registers an observer that runs once when the connection ends.
    ///
    /// If the connection has already ended the observer runs immediately.
    pub fn on_end(&self, observer: impl FnOnce() + Send + 'static) {
        {
            let mut observers = self.inner.end_observers.lock();
            if let Some(list) = observers.as_mut() {
                list.push(Box::new(observer));
                return;
            }
        }
        observer();
    }

    /// Resolves once the connection has ended.
    pub async fn closed(&self) {
        self.inner.ended.cancelled().await;
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        // `Ended` is terminal.
        let _ = self
            .inner
            .phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != Phase::Ended as u8).then_some(phase as u8)
            });
    }

    pub(crate) fn keep_alive_slot(&self) -> &OnceLock<KeepAliveHandle> {
        &self.inner.keep_alive
    }

    fn set_ready_state(&self, state: ReadyState) {
        self.inner.ready_state.store(state as u8, Ordering::Release);
    }

    fn mark_ended(&self) {
        let observers = self.inner.end_observers.lock().take();
        let Some(observers) = observers else {
            return;
        };
        self.set_ready_state(ReadyState::Closed);
        self.inner.phase.store(Phase::Ended as u8, Ordering::Release);
        self.inner.ended.cancel();
        tracing::debug!(connection_id = %self.id(), observers = observers.len(), "connection ended");
        for observer in observers {
            observer();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("ready_state", &self.ready_state())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// Transport side of a [`Connection`].
#[derive(Debug)]
pub struct TransportIo {
    connection: Connection,
    outbound: mpsc::UnboundedReceiver<Message>,
    inbound: mpsc::Sender<Message>,
}

impl TransportIo {
    /// The connection driven by this transport.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Marks the socket as open. Has no effect once closing or closed.
    pub fn open(&self) {
        let _ = self.connection.inner.ready_state.compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Overrides the readiness reported to the application.
    pub fn set_ready_state(&self, state: ReadyState) {
        self.connection.set_ready_state(state);
    }

    /// Waits for the next frame the application queued.
    pub async fn next_outbound(&mut self) -> Option<Message> {
        self.outbound.recv().await
    }

    /// Returns the next queued frame without waiting.
    pub fn try_next_outbound(&mut self) -> Option<Message> {
        self.outbound.try_recv().ok()
    }

    /// Delivers an inbound frame to the application.
    ///
    /// Returns `false` and counts the frame as dropped when the inbound
    /// buffer is full or nobody can read it anymore.
    pub fn push_inbound(&self, message: Message) -> bool {
        if self.inbound.try_send(message).is_ok() {
            return true;
        }
        let dropped = self
            .connection
            .inner
            .dropped_messages
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        tracing::warn!(
            connection_id = %self.connection.id(),
            dropped,
            "inbound buffer full, dropping frame"
        );
        false
    }

    /// Reports the end of the connection.
    ///
    /// End observers run exactly once, on the first call.
    pub fn signal_end(&self) {
        self.connection.mark_ended();
    }
}
