//! Client end of the GUI/server transport.
//!
//! One `CommClient` per GUI process, one long-lived loopback connection.
//! `execute` is a synchronous-looking call over the asynchronous queue:
//! it assigns a strictly increasing correlation id, enqueues the request
//! for the dispatcher, and awaits the matching reply with a bounded
//! timeout. Signals arrive out-of-band on the event receiver.
//!
//! There is no automatic reconnect: connection loss fails every pending
//! request and surfaces one `Disconnected` event, after which the caller
//! decides whether to restart the server or exit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use cumulus_core::proto::{RequestNum, SignalNum};
use cumulus_core::{ExitCause, ExitCode, ExitInfo};

use crate::dispatch::{DispatchOrder, DispatchQueues, WorkItem};
use crate::envelope::{decode_frame, EnvelopeError, Message};

/// How long `stop` waits for the worker tasks before forcing termination.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum CommError {
    #[error("server is not running")]
    InvalidPort,
    #[error("not connected")]
    NotConnected,
    #[error("connection timeout")]
    ConnectTimeout,
    #[error("request timeout")]
    Timeout,
    #[error("request could not be sent")]
    SendFailed,
    #[error("connection lost")]
    Disconnected,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<&CommError> for ExitInfo {
    fn from(err: &CommError) -> Self {
        match err {
            CommError::Timeout | CommError::ConnectTimeout => {
                ExitInfo::new(ExitCode::NetworkError, ExitCause::NetworkTimeout)
            }
            _ => ExitCode::NetworkError.into(),
        }
    }
}

/// Out-of-band notification pushed by the server.
#[derive(Debug, Clone)]
pub struct SignalEvent {
    pub id: u64,
    pub num: SignalNum,
    pub params: Bytes,
}

/// Everything the connection can hand the application asynchronously.
#[derive(Debug)]
pub enum ClientEvent {
    Signal(SignalEvent),
    Disconnected,
}

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<Bytes, CommError>>>>;

struct Shared {
    queues: DispatchQueues,
    pending: PendingMap,
    next_id: AtomicU64,
    connected: AtomicBool,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Shared {
    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.fail_pending(|| CommError::Disconnected);
            self.queues.stop();
            let _ = self.events.send(ClientEvent::Disconnected);
        }
    }

    fn fail_pending(&self, err: impl Fn() -> CommError) {
        let mut pending = self.pending.lock().expect("pending map lock poisoned");
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(err()));
        }
    }
}

pub struct CommClient {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl CommClient {
    /// Open the loopback connection with a bounded timeout.
    ///
    /// Port 0 means "server not running"; it fails immediately without a
    /// connection attempt. Neither timeout nor refusal is retried here —
    /// retry policy belongs to the caller.
    pub async fn connect(
        port: u16,
        timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), CommError> {
        if port == 0 {
            debug!("server is not running, no comm port");
            return Err(CommError::InvalidPort);
        }

        debug!(port, "connecting to server");
        let stream = tokio::time::timeout(timeout, TcpStream::connect(("127.0.0.1", port)))
            .await
            .map_err(|_| CommError::ConnectTimeout)??;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            queues: DispatchQueues::new(DispatchOrder::default()),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            connected: AtomicBool::new(true),
            writer: tokio::sync::Mutex::new(write_half),
            events: events_tx,
        });

        let reader = tokio::spawn(read_loop(read_half, shared.clone()));
        let dispatcher = tokio::spawn(dispatch_loop(shared.clone()));

        Ok((
            Self {
                shared,
                reader,
                dispatcher,
            },
            events_rx,
        ))
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Issue one request and await its correlated reply.
    ///
    /// Fails with `NotConnected` immediately when the socket is gone,
    /// `SendFailed` when the write fails, `Timeout` when no reply with a
    /// matching id arrives in time.
    pub async fn execute(
        &self,
        num: RequestNum,
        params: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, CommError> {
        if !self.is_connected() {
            return Err(CommError::NotConnected);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending
            .lock()
            .expect("pending map lock poisoned")
            .insert(id, tx);
        self.shared.queues.push_request(id, num, params);

        debug!(id, ?num, "request enqueued");
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a reply: connection torn down.
            Ok(Err(_)) => Err(CommError::Disconnected),
            Err(_) => {
                self.shared
                    .pending
                    .lock()
                    .expect("pending map lock poisoned")
                    .remove(&id);
                debug!(id, "request timeout");
                Err(CommError::Timeout)
            }
        }
    }

    /// Cooperative shutdown: stop flag, wake, bounded join, then abort.
    pub async fn stop(self) {
        self.shared.queues.stop();
        self.shared.fail_pending(|| CommError::Disconnected);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.reader.abort();

        if tokio::time::timeout(STOP_JOIN_TIMEOUT, self.dispatcher)
            .await
            .is_err()
        {
            warn!("comm dispatcher did not stop in time");
        }
    }
}

async fn read_loop(mut read_half: OwnedReadHalf, shared: Arc<Shared>) {
    let mut buf = BytesMut::with_capacity(8 * 1024);

    'connection: loop {
        match read_half.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("comm read error: {e}");
                break;
            }
        }

        loop {
            let body = match decode_frame(&mut buf) {
                Ok(Some(body)) => body,
                Ok(None) => break,
                Err(EnvelopeError::Oversized(len)) => {
                    warn!(len, "oversized frame, resetting connection");
                    break 'connection;
                }
                Err(e) => {
                    warn!("bad frame: {e}");
                    break 'connection;
                }
            };

            match Message::from_json(&body) {
                Ok(Message::Reply { id, result }) => shared.queues.push_reply(id, result),
                Ok(Message::Signal { id, num, params }) => {
                    shared.queues.push_signal(id, num, params)
                }
                Ok(Message::Request { id, .. }) => {
                    warn!(id, "unexpected request received on client side");
                }
                // Malformed unit: log and drop, keep the stream.
                Err(e) => warn!("bad message received: {e}"),
            }
        }
    }

    debug!("comm connection closed");
    shared.disconnect();
}

async fn dispatch_loop(shared: Arc<Shared>) {
    while let Some(item) = shared.queues.next().await {
        match item {
            WorkItem::Reply(id, result) => {
                let waiter = shared
                    .pending
                    .lock()
                    .expect("pending map lock poisoned")
                    .remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(Ok(result));
                    }
                    None => debug!(id, "reply without waiter (late or canceled)"),
                }
            }
            WorkItem::Signal(id, num, params) => {
                let _ = shared
                    .events
                    .send(ClientEvent::Signal(SignalEvent { id, num, params }));
            }
            WorkItem::Request(id, num, params) => {
                let frame = Message::Request { id, num, params }.to_frame();
                let mut writer = shared.writer.lock().await;
                if let Err(e) = writer.write_all(&frame).await {
                    warn!(id, "send error: {e}");
                    if let Some(tx) = shared
                        .pending
                        .lock()
                        .expect("pending map lock poisoned")
                        .remove(&id)
                    {
                        let _ = tx.send(Err(CommError::SendFailed));
                    }
                }
            }
        }
    }
    debug!("comm dispatcher stopped");
}
