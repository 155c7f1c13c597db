//! Connection driver task.
//!
//! One task owns the [`Connection`] core, the read half of the socket and
//! the writer task handle. Callers talk to it through [`Command`]s; every
//! state mutation happens inside this loop, so the core needs no locking.
//!
//! ```text
//! Client ─► mpsc<Command> ─┐
//!                          ├─► Driver ─► Connection ─► WriterHandle ─► Writer Task ─► socket
//! socket read half ────────┘        └─► watch<ConnectionState>
//! ```

use std::future::pending;
use std::sync::Arc;

use rmpv::Value;
use tokio::io::{AsyncRead, AsyncReadExt, ReadHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use super::{Connection, ConnectionState};
use crate::config::ConnectionOptions;
use crate::error::{Result, TarantoolError};
use crate::pending::ResultSlot;
use crate::protocol::Request;
use crate::transport::{BoxFuture, Connector};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Read buffer size per socket read.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Work submitted to the driver.
pub(crate) enum Command {
    Connect {
        reply: ResultSlot,
    },
    Request {
        request: Request,
        reply: ResultSlot,
    },
    Auth {
        username: String,
        password: String,
        reply: ResultSlot,
    },
    Destroy {
        forceful: bool,
        reply: ResultSlot,
    },
}

/// Graceful close in progress.
struct Drain {
    deadline: Instant,
    waiters: Vec<ResultSlot>,
}

enum Event<S> {
    Command(Option<Command>),
    Connected(Result<S>),
    Read(std::io::Result<usize>),
    WriterExited(std::result::Result<Result<()>, JoinError>),
    DrainExpired,
}

pub(crate) struct Driver<C: Connector> {
    connector: C,
    options: Arc<ConnectionOptions>,
    conn: Connection,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    connecting: Option<BoxFuture<'static, Result<C::Stream>>>,
    reader: Option<ReadHalf<C::Stream>>,
    writer: Option<WriterHandle>,
    writer_task: Option<JoinHandle<Result<()>>>,
    drain: Option<Drain>,
    buf: Vec<u8>,
}

impl<C: Connector> Driver<C> {
    pub(crate) fn new(
        connector: C,
        options: Arc<ConnectionOptions>,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            conn: Connection::new(options.max_frame_size),
            connector,
            options,
            commands,
            state_tx,
            connecting: None,
            reader: None,
            writer: None,
            writer_task: None,
            drain: None,
            buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    /// Run until every client handle is dropped.
    pub(crate) async fn run(mut self) {
        loop {
            let event = tokio::select! {
                command = self.commands.recv() => Event::Command(command),
                connected = finish_connect(self.connecting.as_mut()) => Event::Connected(connected),
                read = read_chunk(self.reader.as_mut(), &mut self.buf) => Event::Read(read),
                exited = join_writer(self.writer_task.as_mut()) => Event::WriterExited(exited),
                _ = drain_deadline(self.drain.as_ref().map(|d| d.deadline)) => Event::DrainExpired,
            };

            match event {
                Event::Command(Some(command)) => self.handle_command(command),
                Event::Command(None) => {
                    self.shutdown();
                    return;
                }
                Event::Connected(result) => self.handle_connected(result),
                Event::Read(result) => self.handle_read(result),
                Event::WriterExited(result) => self.handle_writer_exit(result),
                Event::DrainExpired => self.expire_drain().await,
            }

            if self.drain_complete() {
                self.finish_drain().await;
            }
            self.publish_state();
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => self.start_connect(reply),
            Command::Request { request, reply } => {
                if self.drain.is_some() {
                    let _ = reply.send(Err(TarantoolError::ConnectionClosed));
                    return;
                }
                if let Some(frame) = self.conn.submit(&request, reply) {
                    self.write(frame);
                }
            }
            Command::Auth {
                username,
                password,
                reply,
            } => {
                if self.drain.is_some() {
                    let _ = reply.send(Err(TarantoolError::ConnectionClosed));
                    return;
                }
                if let Some(frame) = self.conn.submit_auth(&username, &password, reply) {
                    self.write(frame);
                }
            }
            Command::Destroy { forceful, reply } => {
                if forceful {
                    self.destroy_forceful();
                    let _ = reply.send(Ok(Value::Nil));
                } else {
                    self.destroy_graceful(reply);
                }
            }
        }
    }

    fn start_connect(&mut self, reply: ResultSlot) {
        if self.drain.is_some() {
            let _ = reply.send(Err(TarantoolError::InvalidState(self.conn.state())));
            return;
        }
        if !self.conn.begin_connect(reply) {
            return;
        }
        self.publish_state();

        let timeout = self.options.timeout;
        let connect = self.connector.connect(&self.options);
        self.connecting = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, connect).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(TarantoolError::transport(e)),
                Err(_) => Err(TarantoolError::Timeout(timeout)),
            }
        }));
    }

    fn handle_connected(&mut self, result: Result<C::Stream>) {
        self.connecting = None;
        match result {
            Ok(stream) => {
                let (reader, write_half) = tokio::io::split(stream);
                let (writer, writer_task) = spawn_writer_task(write_half);
                self.reader = Some(reader);
                self.writer = Some(writer);
                self.writer_task = Some(writer_task);
                self.conn.on_connected();
                tracing::debug!("Transport connected to {}", self.options.address());
            }
            Err(e) => {
                tracing::warn!("Connect to {} failed: {}", self.options.address(), e);
                self.conn.fail(|| e.replicate());
            }
        }
    }

    fn handle_read(&mut self, result: std::io::Result<usize>) {
        match result {
            Ok(0) => {
                tracing::warn!("Server closed the connection");
                self.transport_failed(TarantoolError::ConnectionClosed);
            }
            Ok(n) => {
                if let Err(e) = self.conn.on_data(&self.buf[..n]) {
                    tracing::error!("Dropping connection: {}", e);
                    self.transport_failed(e);
                }
            }
            Err(e) => {
                tracing::error!("Read failed: {}", e);
                self.transport_failed(TarantoolError::transport(e));
            }
        }
    }

    fn handle_writer_exit(&mut self, result: std::result::Result<Result<()>, JoinError>) {
        self.writer_task = None;
        let err = match result {
            Ok(Ok(())) => TarantoolError::ConnectionClosed,
            Ok(Err(e)) => e.into_shared(),
            Err(e) => TarantoolError::Protocol(format!("writer task ended: {}", e)),
        };
        tracing::error!("Writer stopped: {}", err);
        self.transport_failed(err);
    }

    /// Queue a frame on the writer task.
    fn write(&mut self, frame: bytes::Bytes) {
        let sent = match &self.writer {
            Some(writer) => writer.send(frame),
            None => Err(TarantoolError::ConnectionClosed),
        };
        if let Err(e) = sent {
            self.transport_failed(e);
        }
    }

    /// Fail everything in flight and release the socket.
    fn transport_failed(&mut self, err: TarantoolError) {
        let failed = self.conn.fail(|| err.replicate());
        if failed > 0 {
            tracing::debug!("Failed {} pending requests", failed);
        }
        self.release_transport(true);

        // A graceful close was waiting on the requests just failed.
        if let Some(drain) = self.drain.take() {
            self.conn.close(|| TarantoolError::ConnectionClosed);
            reply_all(drain.waiters);
        }
    }

    fn destroy_forceful(&mut self) {
        tracing::debug!("Forceful destroy");
        self.connecting = None;
        self.conn.close(|| TarantoolError::ConnectionClosed);
        self.release_transport(true);
        if let Some(drain) = self.drain.take() {
            reply_all(drain.waiters);
        }
    }

    fn destroy_graceful(&mut self, reply: ResultSlot) {
        if let Some(drain) = self.drain.as_mut() {
            drain.waiters.push(reply);
            return;
        }

        match self.conn.state() {
            ConnectionState::Disconnected => {
                let _ = reply.send(Ok(Value::Nil));
            }
            ConnectionState::Connecting | ConnectionState::Failed => {
                self.connecting = None;
                self.conn.close(|| TarantoolError::ConnectionClosed);
                self.release_transport(true);
                let _ = reply.send(Ok(Value::Nil));
            }
            _ => {
                tracing::debug!(
                    "Graceful destroy, draining {} pending requests",
                    self.conn.pending_len()
                );
                self.drain = Some(Drain {
                    deadline: Instant::now() + self.options.timeout,
                    waiters: vec![reply],
                });
            }
        }
    }

    fn drain_complete(&self) -> bool {
        self.drain.is_some() && self.conn.pending_len() == 0
    }

    async fn expire_drain(&mut self) {
        let timeout = self.options.timeout;
        tracing::warn!(
            "Graceful destroy timed out after {:?} with {} requests pending",
            timeout,
            self.conn.pending_len()
        );
        self.conn.close(|| TarantoolError::Timeout(timeout));
        self.finish_drain().await;
    }

    /// Close with nothing pending and let the writer flush.
    async fn finish_drain(&mut self) {
        let Some(drain) = self.drain.take() else {
            return;
        };

        self.conn.close(|| TarantoolError::ConnectionClosed);
        self.reader = None;
        if let Some(writer) = self.writer.take() {
            tracing::debug!("Flushing {} queued frames", writer.pending_count());
        }
        if let Some(task) = self.writer_task.take() {
            match tokio::time::timeout(self.options.timeout, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::warn!("Writer failed while flushing: {}", e),
                Ok(Err(e)) => tracing::warn!("Writer task ended abnormally: {}", e),
                Err(_) => tracing::warn!("Writer did not flush within {:?}", self.options.timeout),
            }
        }
        tracing::debug!("Connection closed");
        reply_all(drain.waiters);
    }

    /// Every client handle is gone.
    fn shutdown(&mut self) {
        tracing::debug!("All client handles dropped, stopping driver");
        self.connecting = None;
        self.conn.close(|| TarantoolError::ConnectionClosed);
        // Dropping the handle lets the writer flush and exit on its own.
        self.release_transport(false);
        if let Some(drain) = self.drain.take() {
            reply_all(drain.waiters);
        }
        self.publish_state();
    }

    fn release_transport(&mut self, abort_writer: bool) {
        self.reader = None;
        self.writer = None;
        if let Some(task) = self.writer_task.take() {
            if abort_writer {
                task.abort();
            }
        }
    }

    fn publish_state(&self) {
        let state = self.conn.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

fn reply_all(waiters: Vec<ResultSlot>) {
    for waiter in waiters {
        let _ = waiter.send(Ok(Value::Nil));
    }
}

async fn finish_connect<S>(connecting: Option<&mut BoxFuture<'static, Result<S>>>) -> Result<S> {
    match connecting {
        Some(connect) => connect.await,
        None => pending().await,
    }
}

async fn read_chunk<R>(reader: Option<&mut R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(reader) => reader.read(buf).await,
        None => pending().await,
    }
}

async fn join_writer(
    task: Option<&mut JoinHandle<Result<()>>>,
) -> std::result::Result<Result<()>, JoinError> {
    match task {
        Some(task) => task.await,
        None => pending().await,
    }
}

async fn drain_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

