//! Wire envelope: `[4-byte length][JSON body]`.
//!
//! Three message kinds travel over one loopback stream:
//!
//! ```text
//! request: {"msgType": 0, "requestId": n, "requestNum": n, "params": <base64>}
//! reply:   {"msgType": 1, "replyId":   n, "result": <base64>}
//! signal:  {"msgType": 2, "signalId":  n, "signalNum": n, "params": <base64>}
//! ```
//!
//! Payloads are base64-encoded before framing, so arbitrary bytes
//! (including the shell channel's separator byte) survive the trip.
//! The length prefix is little-endian on every supported target.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cumulus_core::proto::{MsgType, RequestNum, SignalNum};

/// Frames above this size indicate a desynchronized stream, not a real
/// message; the connection is reset rather than misparsed forever.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("bad message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad message: unknown msgType {0}")]
    UnknownType(i32),
    #[error("bad message: unknown requestNum {0}")]
    UnknownRequestNum(i32),
    #[error("bad message: unknown signalNum {0}")]
    UnknownSignalNum(i32),
    #[error("bad message: missing field {0}")]
    MissingField(&'static str),
    #[error("bad message: invalid base64 payload")]
    Base64(#[from] base64::DecodeError),
    #[error("frame length {0} exceeds limit, stream desynchronized")]
    Oversized(usize),
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: u64,
        num: RequestNum,
        params: Bytes,
    },
    Reply {
        id: u64,
        result: Bytes,
    },
    Signal {
        id: u64,
        num: SignalNum,
        params: Bytes,
    },
}

/// Transport view of the JSON body; every field optional so one struct
/// covers all three kinds.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "msgType")]
    msg_type: i32,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    request_id: Option<u64>,
    #[serde(rename = "requestNum", skip_serializing_if = "Option::is_none")]
    request_num: Option<i32>,
    #[serde(rename = "replyId", skip_serializing_if = "Option::is_none")]
    reply_id: Option<u64>,
    #[serde(rename = "signalId", skip_serializing_if = "Option::is_none")]
    signal_id: Option<u64>,
    #[serde(rename = "signalNum", skip_serializing_if = "Option::is_none")]
    signal_num: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
}

impl Message {
    /// Serialize to a length-prefixed frame ready to write to the socket.
    pub fn to_frame(&self) -> Bytes {
        let raw = match self {
            Message::Request { id, num, params } => RawEnvelope {
                msg_type: MsgType::Request as i32,
                request_id: Some(*id),
                request_num: Some(*num as i32),
                params: Some(BASE64.encode(params)),
                ..Default::default()
            },
            Message::Reply { id, result } => RawEnvelope {
                msg_type: MsgType::Reply as i32,
                reply_id: Some(*id),
                result: Some(BASE64.encode(result)),
                ..Default::default()
            },
            Message::Signal { id, num, params } => RawEnvelope {
                msg_type: MsgType::Signal as i32,
                signal_id: Some(*id),
                signal_num: Some(*num as i32),
                params: Some(BASE64.encode(params)),
                ..Default::default()
            },
        };
        let body = serde_json::to_vec(&raw).expect("envelope serialization is infallible");
        let mut frame = BytesMut::with_capacity(LEN_PREFIX + body.len());
        frame.put_u32_le(body.len() as u32);
        frame.put_slice(&body);
        frame.freeze()
    }

    /// Parse one JSON body (without the length prefix).
    pub fn from_json(body: &[u8]) -> Result<Self, EnvelopeError> {
        let raw: RawEnvelope = serde_json::from_slice(body)?;
        let msg_type =
            MsgType::try_from(raw.msg_type).map_err(EnvelopeError::UnknownType)?;
        match msg_type {
            MsgType::Request => {
                let id = raw
                    .request_id
                    .ok_or(EnvelopeError::MissingField("requestId"))?;
                let num = raw
                    .request_num
                    .ok_or(EnvelopeError::MissingField("requestNum"))?;
                let num =
                    RequestNum::try_from(num).map_err(EnvelopeError::UnknownRequestNum)?;
                let params = decode_payload(raw.params.as_deref())?;
                Ok(Message::Request { id, num, params })
            }
            MsgType::Reply => {
                let id = raw.reply_id.ok_or(EnvelopeError::MissingField("replyId"))?;
                let result = decode_payload(raw.result.as_deref())?;
                Ok(Message::Reply { id, result })
            }
            MsgType::Signal => {
                let id = raw
                    .signal_id
                    .ok_or(EnvelopeError::MissingField("signalId"))?;
                let num = raw
                    .signal_num
                    .ok_or(EnvelopeError::MissingField("signalNum"))?;
                let num = SignalNum::try_from(num).map_err(EnvelopeError::UnknownSignalNum)?;
                let params = decode_payload(raw.params.as_deref())?;
                Ok(Message::Signal { id, num, params })
            }
        }
    }
}

fn decode_payload(field: Option<&str>) -> Result<Bytes, EnvelopeError> {
    match field {
        Some(text) => Ok(Bytes::from(BASE64.decode(text)?)),
        None => Ok(Bytes::new()),
    }
}

/// Peel one complete `[length][body]` unit off the reassembly buffer.
///
/// Returns `Ok(None)` while the unit is still partial; the buffered bytes
/// persist across socket reads. An oversized length prefix is a
/// desynchronized stream and yields `Oversized`, which the caller turns
/// into a connection reset.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Bytes>, EnvelopeError> {
    if buf.len() < LEN_PREFIX {
        return Ok(None);
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(EnvelopeError::Oversized(len));
    }
    if buf.len() < LEN_PREFIX + len {
        return Ok(None);
    }
    buf.advance(LEN_PREFIX);
    Ok(Some(buf.split_to(len).freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip(msg: Message) -> Message {
        let frame = msg.to_frame();
        let mut buf = BytesMut::from(&frame[..]);
        let body = decode_frame(&mut buf).unwrap().expect("complete frame");
        assert!(buf.is_empty(), "frame must consume exactly its bytes");
        Message::from_json(&body).unwrap()
    }

    #[test]
    fn request_round_trips() {
        let msg = Message::Request {
            id: 7,
            num: RequestNum::SyncStart,
            params: Bytes::from_static(b"{\"syncDbId\":42}"),
        };
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn separator_bytes_in_payload_survive_framing() {
        // The shell channel separator (newline) must not break the envelope.
        let msg = Message::Request {
            id: 1,
            num: RequestNum::SyncStatus,
            params: Bytes::from_static(b"\n\n\x00\xff\n"),
        };
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn partial_frame_stays_buffered() {
        let frame = Message::Reply {
            id: 3,
            result: Bytes::from_static(b"ok"),
        }
        .to_frame();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame[..5]);
        assert!(decode_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(&frame[5..]);
        let body = decode_frame(&mut buf).unwrap().expect("now complete");
        assert!(matches!(
            Message::from_json(&body).unwrap(),
            Message::Reply { id: 3, .. }
        ));
    }

    #[test]
    fn two_frames_in_one_read_both_decode() {
        let a = Message::Signal {
            id: 0,
            num: SignalNum::SyncProgressInfo,
            params: Bytes::from_static(b"55"),
        };
        let b = Message::Signal {
            id: 1,
            num: SignalNum::SyncCompletedItem,
            params: Bytes::new(),
        };
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&a.to_frame());
        buf.extend_from_slice(&b.to_frame());

        let first = decode_frame(&mut buf).unwrap().unwrap();
        let second = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(Message::from_json(&first).unwrap(), a);
        assert_eq!(Message::from_json(&second).unwrap(), b);
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_length_prefix_is_desync() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(u32::MAX);
        buf.put_slice(b"garbage");
        assert!(matches!(
            decode_frame(&mut buf),
            Err(EnvelopeError::Oversized(_))
        ));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(Message::from_json(b"{not json").is_err());
    }

    #[test]
    fn unknown_msg_type_is_rejected() {
        assert!(matches!(
            Message::from_json(br#"{"msgType": 9}"#),
            Err(EnvelopeError::UnknownType(9))
        ));
    }

    proptest! {
        /// Arbitrary payload bytes round-trip exactly, id and num intact.
        #[test]
        fn payload_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..4096), id in any::<u64>()) {
            let msg = Message::Request {
                id,
                num: RequestNum::NodeVfsStatus,
                params: Bytes::from(payload),
            };
            prop_assert_eq!(round_trip(msg.clone()), msg);
        }
    }
}
