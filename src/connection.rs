use crate::dispatch::{self, SharedDispatcher};
use crate::error::{Result, RioError};
use crate::parser::{LineBuffer, ResponseLine, Status};
use crate::protocol::Command;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{Instrument, Span};

/// Default time to wait for the response to a command
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const READ_BUFFER_SIZE: usize = 4096;

/// A command waiting for its turn on the wire
struct PendingCommand {
    command: Command,
    reply: oneshot::Sender<Result<String>>,
}

/// Socket state shared by the reader and the queue task
struct ConnectionState {
    open: bool,
    /// Listener for the next response line, set while a command is in flight
    awaiting: Option<oneshot::Sender<ResponseLine>>,
}

fn lock(state: &Mutex<ConnectionState>) -> MutexGuard<'_, ConnectionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Low-level RIO connection handler
///
/// Commands are queued and written one at a time. The protocol carries no
/// request id, so the first `S`/`E` line read after a write is taken as that
/// command's response; `N` lines are never treated as responses.
pub(crate) struct Connection {
    state: Arc<Mutex<ConnectionState>>,
    queue_tx: mpsc::UnboundedSender<PendingCommand>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Open a TCP connection to the controller
    pub async fn connect(
        host: &str,
        port: u16,
        request_timeout: Duration,
        dispatcher: SharedDispatcher,
        span: Span,
    ) -> Result<Self> {
        tracing::info!("Connecting to {}:{}", host, port);
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;

        Ok(Self::from_stream(stream, request_timeout, dispatcher, span))
    }

    fn from_stream(
        stream: TcpStream,
        request_timeout: Duration,
        dispatcher: SharedDispatcher,
        span: Span,
    ) -> Self {
        let (read, write) = stream.into_split();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let state = Arc::new(Mutex::new(ConnectionState {
            open: true,
            awaiting: None,
        }));

        // Single writer: one command in flight at a time
        let writer = tokio::spawn(
            Self::run_queue(write, queue_rx, state.clone(), request_timeout)
                .instrument(span.clone()),
        );

        let reader = tokio::spawn(Self::run_reader(read, state.clone(), dispatcher).instrument(span));

        Self {
            state,
            queue_tx,
            reader,
            writer,
        }
    }

    /// Whether the socket is still usable
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Queue a command and wait for its response payload
    pub async fn send(&self, command: Command) -> Result<String> {
        if !self.is_open() {
            return Err(RioError::NotConnected);
        }

        let (reply, rx) = oneshot::channel();
        self.queue_tx
            .send(PendingCommand { command, reply })
            .map_err(|_| RioError::NotConnected)?;

        rx.await.map_err(|_| RioError::ConnectionClosed)?
    }

    /// Close the socket. Returns false if it was already closed.
    ///
    /// Commands still queued or in flight fail with
    /// [`RioError::ConnectionClosed`].
    pub fn close(&self) -> bool {
        self.reader.abort();
        self.writer.abort();
        Self::mark_closed(&self.state)
    }

    /// Flip the state to closed, dropping any response listener
    fn mark_closed(state: &Mutex<ConnectionState>) -> bool {
        let mut state = lock(state);
        state.awaiting = None;
        std::mem::replace(&mut state.open, false)
    }

    async fn run_queue(
        mut write: OwnedWriteHalf,
        mut queue_rx: mpsc::UnboundedReceiver<PendingCommand>,
        state: Arc<Mutex<ConnectionState>>,
        request_timeout: Duration,
    ) {
        while let Some(PendingCommand { command, reply }) = queue_rx.recv().await {
            let outcome = Self::exchange(&mut write, &state, &command, request_timeout).await;
            match &outcome {
                Err(RioError::Protocol { detail }) => {
                    tracing::warn!("Controller rejected {}: {}", command, detail);
                }
                Err(e) => tracing::debug!("Command {} failed: {}", command, e),
                Ok(_) => {}
            }
            // The caller may have given up waiting
            let _ = reply.send(outcome);
        }

        let _ = write.shutdown().await;
    }

    /// Write one command and wait for the next response line
    async fn exchange(
        write: &mut OwnedWriteHalf,
        state: &Mutex<ConnectionState>,
        command: &Command,
        request_timeout: Duration,
    ) -> Result<String> {
        // Register before writing so a fast reply cannot slip past
        let rx = {
            let mut state = lock(state);
            if !state.open {
                return Err(RioError::ConnectionClosed);
            }
            let (tx, rx) = oneshot::channel();
            state.awaiting = Some(tx);
            rx
        };

        tracing::debug!("TX > {}", command);
        if let Err(e) = write.write_all(command.to_wire().as_bytes()).await {
            tracing::error!("Failed to send {}: {}", command, e);
            lock(state).awaiting = None;
            return Err(e.into());
        }

        match timeout(request_timeout, rx).await {
            Ok(Ok(line)) => line.into_result(),
            Ok(Err(_)) => Err(RioError::ConnectionClosed),
            Err(_) => {
                lock(state).awaiting = None;
                Err(RioError::Timeout)
            }
        }
    }

    async fn run_reader(
        mut read: OwnedReadHalf,
        state: Arc<Mutex<ConnectionState>>,
        dispatcher: SharedDispatcher,
    ) {
        let mut lines = LineBuffer::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let error = loop {
            match read.read(&mut buf).await {
                Ok(0) => {
                    tracing::info!("Controller closed the connection");
                    break None;
                }
                Ok(n) => {
                    for line in lines.feed(&buf[..n]) {
                        Self::handle_line(&state, &dispatcher, &line);
                    }
                }
                Err(e) => {
                    tracing::error!("Socket error: {}", e);
                    break Some(e.to_string());
                }
            }
        };

        if Self::mark_closed(&state) {
            dispatch::lock(&dispatcher).connection_lost(error);
        }
    }

    /// Dispatch a line into the cache, then hand it to the waiting command
    fn handle_line(state: &Mutex<ConnectionState>, dispatcher: &SharedDispatcher, raw: &str) {
        tracing::debug!("RX < {}", raw);

        let Some(line) = ResponseLine::parse(raw) else {
            tracing::warn!("Unrecognised line from controller: {}", raw);
            return;
        };

        dispatch::lock(dispatcher).dispatch(&line);

        if line.status == Status::Notification {
            return;
        }

        let awaiting = lock(state).awaiting.take();
        match awaiting {
            Some(tx) => {
                let _ = tx.send(line);
            }
            None if line.is_error() => {
                tracing::warn!("Unsolicited controller error: {}", line.payload);
            }
            None => {}
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
