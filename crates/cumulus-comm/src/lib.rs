//! cumulus-comm: loopback transport between the GUI and server processes.
//!
//! Three layers:
//! - [`envelope`] — length-prefixed JSON framing with base64 payloads
//! - [`channel`] — separator-framed byte channel for the shell extension
//! - [`client`] / [`server`] — correlated request/reply plus signal push
//!
//! Security model: loopback only, no TLS; the port is published
//! out-of-band and OS process isolation does the rest.

pub mod channel;
pub mod client;
pub mod dispatch;
pub mod envelope;
pub mod server;

pub use channel::{CommChannel, LOG_EXCERPT_MAX, MESSAGE_SEPARATOR};
pub use client::{ClientEvent, CommClient, CommError, SignalEvent};
pub use dispatch::DispatchOrder;
pub use envelope::{Message, MAX_FRAME_LEN};
pub use server::{CommServer, RequestHandler};
