//! Wire framing - length-prefixed messages over a TCP stream
//!
//! Layout: `[u32 BE total length][u8 tag][payload]`. Control payloads are
//! JSON; frame payloads embed the two-part frame layout with their own
//! header-length prefix so image bytes are never copied through JSON.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use sieve_protocol::EncodedFrame;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;
use crate::Result;

/// Hard cap on a single wire message (header + image)
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

const TAG_HELLO: u8 = 1;
const TAG_SUBSCRIBE: u8 = 2;
const TAG_PING: u8 = 3;
const TAG_PONG: u8 = 4;
const TAG_EOS: u8 = 5;
const TAG_FRAME: u8 = 6;

/// Producer greeting, sent when a consumer connects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub producer_id: String,
    pub run_id: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SubscribePayload {
    pub topics: Vec<String>,
    pub ephemeral: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TsPayload {
    ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TopicPayload {
    topic: String,
}

/// One wire message
#[derive(Debug, Clone)]
pub enum Message {
    /// Producer → consumer greeting
    Hello(Hello),
    /// Consumer → producer subscription; doubly-ephemeral consumers never
    /// send it
    Subscribe { topics: Vec<String>, ephemeral: bool },
    /// Producer → consumer heartbeat
    Ping { ts: i64 },
    /// Consumer → producer heartbeat reply
    Pong { ts: i64 },
    /// No further frames will arrive on this topic
    Eos { topic: String },
    /// A frame in two-part wire form
    Frame(EncodedFrame),
}

impl Message {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello(_) => "hello",
            Message::Subscribe { .. } => "subscribe",
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Eos { .. } => "eos",
            Message::Frame(_) => "frame",
        }
    }
}

fn control_message(tag: u8, payload: &impl Serialize) -> Bytes {
    let body = serde_json::to_vec(payload).expect("control payloads are plain structs");
    let mut buf = BytesMut::with_capacity(4 + 1 + body.len());
    buf.put_u32((1 + body.len()) as u32);
    buf.put_u8(tag);
    buf.put_slice(&body);
    buf.freeze()
}

/// Encode a message into a single contiguous buffer
///
/// Frame messages copy the image once into the output buffer; the encoded
/// result is `Bytes`, so fanning the same message out to N consumers is N
/// reference bumps.
pub fn encode_message(message: &Message) -> Result<Bytes> {
    let encoded = match message {
        Message::Hello(hello) => control_message(TAG_HELLO, hello),
        Message::Subscribe { topics, ephemeral } => control_message(
            TAG_SUBSCRIBE,
            &SubscribePayload {
                topics: topics.clone(),
                ephemeral: *ephemeral,
            },
        ),
        Message::Ping { ts } => control_message(TAG_PING, &TsPayload { ts: *ts }),
        Message::Pong { ts } => control_message(TAG_PONG, &TsPayload { ts: *ts }),
        Message::Eos { topic } => control_message(
            TAG_EOS,
            &TopicPayload {
                topic: topic.clone(),
            },
        ),
        Message::Frame(frame) => {
            let image_len = frame.image.as_ref().map_or(0, Bytes::len);
            let body_len = 4 + frame.header.len() + image_len;
            let mut buf = BytesMut::with_capacity(4 + 1 + body_len);
            buf.put_u32((1 + body_len) as u32);
            buf.put_u8(TAG_FRAME);
            buf.put_u32(frame.header.len() as u32);
            buf.put_slice(&frame.header);
            if let Some(image) = &frame.image {
                buf.put_slice(image);
            }
            buf.freeze()
        }
    };

    if encoded.len() > MAX_MESSAGE_BYTES + 4 {
        return Err(TransportError::MessageTooLarge {
            size: encoded.len(),
            limit: MAX_MESSAGE_BYTES,
        });
    }
    Ok(encoded)
}

fn decode_control<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| TransportError::WireDecode {
        reason: e.to_string(),
    })
}

/// Decode one message from its framed body (tag + payload, prefix stripped)
pub fn decode_message(body: Bytes) -> Result<Message> {
    let Some((&tag, payload)) = body.split_first() else {
        return Err(TransportError::WireDecode {
            reason: "empty message".into(),
        });
    };

    match tag {
        TAG_HELLO => Ok(Message::Hello(decode_control(payload)?)),
        TAG_SUBSCRIBE => {
            let sub: SubscribePayload = decode_control(payload)?;
            Ok(Message::Subscribe {
                topics: sub.topics,
                ephemeral: sub.ephemeral,
            })
        }
        TAG_PING => {
            let ping: TsPayload = decode_control(payload)?;
            Ok(Message::Ping { ts: ping.ts })
        }
        TAG_PONG => {
            let pong: TsPayload = decode_control(payload)?;
            Ok(Message::Pong { ts: pong.ts })
        }
        TAG_EOS => {
            let eos: TopicPayload = decode_control(payload)?;
            Ok(Message::Eos { topic: eos.topic })
        }
        TAG_FRAME => {
            if payload.len() < 4 {
                return Err(TransportError::WireDecode {
                    reason: "frame message too short".into(),
                });
            }
            let header_len =
                u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
            if payload.len() < 4 + header_len {
                return Err(TransportError::WireDecode {
                    reason: format!(
                        "frame header length {header_len} exceeds payload {}",
                        payload.len() - 4
                    ),
                });
            }
            // Slice the original Bytes so header and image share the buffer.
            let header = body.slice(5..5 + header_len);
            let image_start = 5 + header_len;
            let image = if body.len() > image_start {
                Some(body.slice(image_start..))
            } else {
                None
            };
            Ok(Message::Frame(EncodedFrame { header, image }))
        }
        other => Err(TransportError::WireDecode {
            reason: format!("unknown message tag {other}"),
        }),
    }
}

/// Read one length-prefixed message from the stream
///
/// Returns `Closed` on clean EOF at a message boundary.
pub async fn read_message<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::Closed);
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len == 0 || len > MAX_MESSAGE_BYTES {
        return Err(TransportError::MessageTooLarge {
            size: len,
            limit: MAX_MESSAGE_BYTES,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode_message(Bytes::from(body))
}

/// Write one message to the stream
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = encode_message(message)?;
    writer.write_all(&encoded).await?;
    Ok(())
}

/// Write pre-encoded message bytes to the stream
pub async fn write_encoded<W>(writer: &mut W, encoded: &Bytes) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(encoded).await
}
