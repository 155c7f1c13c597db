//! Connection state machine.
//!
//! [`Connection`] holds everything about one connection except the socket:
//! lifecycle state, greeting buffer, frame reassembly, correlation ids and the
//! pending registry. The driver feeds it transport events and writes the
//! frames it hands back; no I/O happens here, so every transition is testable
//! with plain byte slices.
//!
//! ```text
//! Disconnected ─connect─► Connecting ─connected─► AwaitingGreeting
//!       ▲                                               │ 128 bytes
//!       │                                               ▼
//!       └── close ── (any) ── error ──► Failed   Idle ◄─► ReceivingFrame
//! ```

use bytes::{Bytes, BytesMut};
use rmpv::Value;

use crate::error::{Result, TarantoolError};
use crate::pending::{PendingRegistry, ResultSlot, SyncGenerator};
use crate::protocol::{
    scramble, FrameBuffer, Greeting, Request, RequestCode, Response, GREETING_SIZE,
};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport. Initial state, and the state after `destroy`.
    #[default]
    Disconnected,
    /// Transport connect issued.
    Connecting,
    /// Transport connected, greeting banner not yet complete.
    AwaitingGreeting,
    /// Ready; no partial frame buffered.
    Idle,
    /// Ready; a partial frame is buffered.
    ReceivingFrame,
    /// Transport failed. Pending requests were failed.
    Failed,
}

impl ConnectionState {
    /// Check if requests can be written in this state.
    #[inline]
    pub fn accepts_requests(self) -> bool {
        matches!(
            self,
            ConnectionState::AwaitingGreeting
                | ConnectionState::Idle
                | ConnectionState::ReceivingFrame
        )
    }
}

/// Transport-independent connection core.
pub struct Connection {
    state: ConnectionState,
    greeting_buf: BytesMut,
    greeting: Option<Greeting>,
    frames: FrameBuffer,
    pending: PendingRegistry,
    sync: SyncGenerator,
    connect_slot: Option<ResultSlot>,
}

impl Connection {
    /// Create a disconnected connection rejecting frames above `max_frame_size`.
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            greeting_buf: BytesMut::with_capacity(GREETING_SIZE),
            greeting: None,
            frames: FrameBuffer::with_max_frame_size(max_frame_size),
            pending: PendingRegistry::new(),
            sync: SyncGenerator::new(),
            connect_slot: None,
        }
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Greeting captured on this connection, if any.
    pub fn greeting(&self) -> Option<&Greeting> {
        self.greeting.as_ref()
    }

    /// Number of requests awaiting a response.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Start connecting. `slot` resolves once the greeting is parsed.
    ///
    /// Returns false (and fails `slot`) unless the connection is
    /// `Disconnected` or `Failed`.
    pub fn begin_connect(&mut self, slot: ResultSlot) -> bool {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.greeting_buf.clear();
                self.greeting = None;
                self.frames.clear();
                self.connect_slot = Some(slot);
                self.transition(ConnectionState::Connecting);
                true
            }
            other => {
                let _ = slot.send(Err(TarantoolError::InvalidState(other)));
                false
            }
        }
    }

    /// The transport reports the connect succeeded.
    pub fn on_connected(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.transition(ConnectionState::AwaitingGreeting);
        } else {
            tracing::warn!("Connect event while {:?}, ignoring", self.state);
        }
    }

    /// Bytes arrived from the transport.
    ///
    /// # Errors
    ///
    /// A framing or greeting error means the byte stream cannot be trusted;
    /// the caller should [`fail`](Self::fail) the connection.
    pub fn on_data(&mut self, data: &[u8]) -> Result<()> {
        match self.state {
            ConnectionState::AwaitingGreeting => self.receive_greeting(data),
            ConnectionState::Idle | ConnectionState::ReceivingFrame => self.receive_frames(data),
            other => {
                tracing::warn!("Dropping {} bytes received while {:?}", data.len(), other);
                Ok(())
            }
        }
    }

    fn receive_greeting(&mut self, data: &[u8]) -> Result<()> {
        self.greeting_buf.extend_from_slice(data);
        if self.greeting_buf.len() < GREETING_SIZE {
            return Ok(());
        }

        let banner = self.greeting_buf.split_to(GREETING_SIZE);
        let greeting = Greeting::parse(&banner)?;
        tracing::debug!("Greeting received: {}", greeting.version);
        self.greeting = Some(greeting);
        self.transition(ConnectionState::Idle);

        if let Some(slot) = self.connect_slot.take() {
            let _ = slot.send(Ok(Value::Nil));
        }

        // The server may already have answered early requests.
        let rest = self.greeting_buf.split();
        if rest.is_empty() {
            Ok(())
        } else {
            self.receive_frames(&rest)
        }
    }

    fn receive_frames(&mut self, data: &[u8]) -> Result<()> {
        self.frames.extend(data);
        // Frames completed ahead of a corrupt prefix are still delivered.
        while let Some(frame) = self.frames.next_frame()? {
            self.dispatch(&frame);
        }

        let next = if self.frames.is_empty() {
            ConnectionState::Idle
        } else {
            ConnectionState::ReceivingFrame
        };
        self.transition(next);
        Ok(())
    }

    /// Decode one frame and complete the matching pending request.
    fn dispatch(&mut self, payload: &Bytes) {
        let response = match Response::decode(payload) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Discarding undecodable response ({} bytes): {}", payload.len(), e);
                return;
            }
        };

        let sync = response.sync();
        let Some(entry) = self.pending.take(sync) else {
            tracing::warn!(
                "Orphan response for sync {} (code {:#x}), dropping",
                sync,
                response.header.code
            );
            return;
        };

        let outcome = match (entry.code(), response.into_result()) {
            (RequestCode::Auth, Ok(_)) => Ok(Value::Boolean(true)),
            (_, outcome) => outcome,
        };

        if !entry.complete(outcome) {
            tracing::debug!("Response for sync {} arrived after caller went away", sync);
        }
    }

    /// Register `request` under a fresh sync id and return the frame to write.
    ///
    /// Returns `None` (and fails `slot`) if the connection cannot send.
    pub fn submit(&mut self, request: &Request, slot: ResultSlot) -> Option<Bytes> {
        if !self.state.accepts_requests() {
            let _ = slot.send(Err(TarantoolError::InvalidState(self.state)));
            return None;
        }

        let Some(sync) = self.allocate_sync() else {
            let _ = slot.send(Err(TarantoolError::Protocol(format!(
                "all {} sync ids are outstanding",
                self.sync.cycle_len()
            ))));
            return None;
        };
        self.pending.register(sync, request.code(), slot).ok()?;
        tracing::debug!("Submitting {:?} as sync {}", request.code(), sync);
        Some(request.encode(sync))
    }

    /// Build and submit an auth request using the captured salt.
    pub fn submit_auth(
        &mut self,
        username: &str,
        password: &str,
        slot: ResultSlot,
    ) -> Option<Bytes> {
        if !self.state.accepts_requests() {
            let _ = slot.send(Err(TarantoolError::InvalidState(self.state)));
            return None;
        }

        let Some(greeting) = &self.greeting else {
            let _ = slot.send(Err(TarantoolError::MissingSalt));
            return None;
        };

        let request = scramble(password, &greeting.salt)
            .and_then(|scrambled| Request::auth(username, &scrambled));

        match request {
            Ok(request) => self.submit(&request, slot),
            Err(e) => {
                let _ = slot.send(Err(e));
                None
            }
        }
    }

    /// Next sync id not currently outstanding, or `None` after one full
    /// cycle without a free id.
    fn allocate_sync(&mut self) -> Option<u32> {
        for _ in 0..self.sync.cycle_len() {
            let sync = self.sync.next_id();
            if !self.pending.contains(sync) {
                return Some(sync);
            }
            tracing::warn!("Sync {} still outstanding after wrap, skipping", sync);
        }
        None
    }

    /// Transport failure: move to `Failed` and fail everything in flight,
    /// including an unfinished connect. Returns the number of requests failed.
    pub fn fail<F>(&mut self, make_error: F) -> usize
    where
        F: Fn() -> TarantoolError,
    {
        self.shutdown(ConnectionState::Failed, make_error)
    }

    /// Deliberate close: move to `Disconnected` and fail everything in flight.
    pub fn close<F>(&mut self, make_error: F) -> usize
    where
        F: Fn() -> TarantoolError,
    {
        self.shutdown(ConnectionState::Disconnected, make_error)
    }

    fn shutdown<F>(&mut self, next: ConnectionState, make_error: F) -> usize
    where
        F: Fn() -> TarantoolError,
    {
        if let Some(slot) = self.connect_slot.take() {
            let _ = slot.send(Err(make_error()));
        }
        self.frames.clear();
        self.greeting_buf.clear();
        self.transition(next);
        if !self.pending.is_empty() {
            tracing::debug!("Failing pending syncs {:?}", self.pending.ids());
        }
        self.pending.fail_all(make_error)
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::trace!("Connection state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
