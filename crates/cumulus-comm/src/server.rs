//! Server end of the GUI/server transport.
//!
//! The daemon binds an OS-assigned loopback port and publishes it
//! out-of-band (port file). Each accepted connection gets a reader that
//! decodes REQUEST envelopes and hands them to the [`RequestHandler`],
//! and a writer that serializes correlated replies plus broadcast
//! signals. Handlers run on the blocking pool, so slow requests never
//! stall the socket and replies may overtake each other — correlation
//! ids, not arrival order, pair them with callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use cumulus_core::proto::{RequestNum, SignalNum};

use crate::envelope::{decode_frame, EnvelopeError, Message};

/// Server-side request dispatch.
///
/// Payloads are opaque to the transport; implementations own the
/// parameter and result encodings, including how errors are conveyed.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, num: RequestNum, params: &[u8]) -> Bytes;
}

#[derive(Debug, Clone)]
struct OutboundSignal {
    num: SignalNum,
    params: Bytes,
}

pub struct CommServer {
    port: u16,
    signal_tx: broadcast::Sender<OutboundSignal>,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl CommServer {
    /// Bind `127.0.0.1:0` and start accepting clients.
    pub async fn bind(handler: Arc<dyn RequestHandler>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        info!(port, "comm server listening");

        let (signal_tx, _) = broadcast::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            handler,
            signal_tx.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            port,
            signal_tx,
            shutdown_tx,
            accept_task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Push a signal to every connected client (at-most-once each).
    pub fn broadcast_signal(&self, num: SignalNum, params: Bytes) {
        // No receivers just means no clients are connected.
        let _ = self.signal_tx.send(OutboundSignal { num, params });
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.accept_task.abort();
        let _ = self.accept_task.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    signal_tx: broadcast::Sender<OutboundSignal>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("comm server shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "client connected");
                        let _ = stream.set_nodelay(true);
                        tokio::spawn(serve_connection(
                            stream,
                            handler.clone(),
                            signal_tx.subscribe(),
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<dyn RequestHandler>,
    mut signals: broadcast::Receiver<OutboundSignal>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (mut read_half, write_half) = stream.into_split();

    // Replies and signals funnel through one writer task so frames never
    // interleave mid-write.
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Bytes>();
    let writer = tokio::spawn(write_loop(write_half, out_rx));

    let signal_out = out_tx.clone();
    let signal_forwarder = tokio::spawn(async move {
        // Signal ids are per-connection and monotonically increasing.
        let next_signal_id = AtomicU64::new(0);
        loop {
            match signals.recv().await {
                Ok(signal) => {
                    let id = next_signal_id.fetch_add(1, Ordering::Relaxed);
                    let frame = Message::Signal {
                        id,
                        num: signal.num,
                        params: signal.params,
                    }
                    .to_frame();
                    if signal_out.send(frame).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "client fell behind on signals");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut buf = BytesMut::with_capacity(8 * 1024);
    'connection: loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("closing client connection on shutdown");
                break;
            }
            read = read_half.read_buf(&mut buf) => match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("comm read error: {e}");
                    break;
                }
            }
        }

        loop {
            let body = match decode_frame(&mut buf) {
                Ok(Some(body)) => body,
                Ok(None) => break,
                Err(EnvelopeError::Oversized(len)) => {
                    warn!(len, "oversized frame from client, dropping connection");
                    break 'connection;
                }
                Err(e) => {
                    warn!("bad frame from client: {e}");
                    break 'connection;
                }
            };

            let request = match Message::from_json(&body) {
                Ok(Message::Request { id, num, params }) => (id, num, params),
                Ok(other) => {
                    warn!(?other, "unexpected message kind on server side");
                    continue;
                }
                Err(e) => {
                    warn!("bad message received: {e}");
                    continue;
                }
            };

            let (id, num, params) = request;
            let handler = handler.clone();
            let reply_out = out_tx.clone();
            // Handlers may block (VFS calls touch the filesystem).
            tokio::task::spawn_blocking(move || {
                let result = handler.handle(num, &params);
                let frame = Message::Reply { id, result }.to_frame();
                let _ = reply_out.send(frame);
            });
        }
    }

    debug!("client disconnected");
    signal_forwarder.abort();
    drop(out_tx);
    let _ = writer.await;
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut out_rx: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(frame) = out_rx.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            warn!("comm write error: {e}");
            break;
        }
    }
}
