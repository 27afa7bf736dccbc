//! `application/vnd.amazon.eventstream` decoding
//!
//! Bedrock's `invoke-with-response-stream` wraps each generation event in a
//! binary frame: a 12-byte prelude (total length, headers length, prelude
//! CRC), a header block, the payload, and a trailing message CRC. For
//! `chunk` events the payload is `{"bytes": "<base64 JSON event>"}`.
//!
//! The decoder is incremental: feed it transport bytes as they arrive and
//! drain complete frames. CRCs are parsed past but not validated; integrity
//! is already covered by TLS on this path.

use crate::adk::error::AdkError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

const PRELUDE_LEN: usize = 12;
// prelude + message CRC
const FRAME_OVERHEAD: usize = 16;

/// One decoded transport frame
#[derive(Debug)]
pub struct Frame {
    pub event_type: Option<String>,
    pub exception_type: Option<String>,
    pub payload: Vec<u8>,
}

/// Incremental frame decoder over a byte stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete frame, or None if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, AdkError> {
        if self.buf.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let total_len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
            as usize;
        let headers_len = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]])
            as usize;

        if total_len < FRAME_OVERHEAD || PRELUDE_LEN + headers_len + 4 > total_len {
            return Err(AdkError::stream(format!(
                "malformed eventstream prelude (total {}, headers {})",
                total_len, headers_len
            )));
        }
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let headers = parse_headers(&self.buf[PRELUDE_LEN..PRELUDE_LEN + headers_len])?;
        let payload = self.buf[PRELUDE_LEN + headers_len..total_len - 4].to_vec();
        self.buf.drain(..total_len);

        let mut frame = Frame {
            event_type: None,
            exception_type: None,
            payload,
        };
        for (name, value) in headers {
            match name.as_str() {
                ":event-type" => frame.event_type = Some(value),
                ":exception-type" => frame.exception_type = Some(value),
                _ => {}
            }
        }
        Ok(Some(frame))
    }
}

/// Header block: name length (u8), name, value type (u8), value. Only string
/// values are surfaced; other types are skipped over.
fn parse_headers(mut block: &[u8]) -> Result<Vec<(String, String)>, AdkError> {
    let mut headers = Vec::new();

    while !block.is_empty() {
        let name_len = block[0] as usize;
        block = &block[1..];
        if block.len() < name_len + 1 {
            return Err(AdkError::stream("truncated eventstream header name"));
        }
        let name = String::from_utf8_lossy(&block[..name_len]).into_owned();
        let value_type = block[name_len];
        block = &block[name_len + 1..];

        let skip = match value_type {
            // boolean true / false carry no value bytes
            0 | 1 => 0,
            2 => 1,
            3 => 2,
            4 => 4,
            5 | 8 => 8,
            9 => 16,
            // byte array (6) and string (7): u16 length prefix
            6 | 7 => {
                if block.len() < 2 {
                    return Err(AdkError::stream("truncated eventstream header value"));
                }
                let len = u16::from_be_bytes([block[0], block[1]]) as usize;
                if block.len() < 2 + len {
                    return Err(AdkError::stream("truncated eventstream header value"));
                }
                if value_type == 7 {
                    let value = String::from_utf8_lossy(&block[2..2 + len]).into_owned();
                    headers.push((name, value));
                }
                block = &block[2 + len..];
                continue;
            }
            other => {
                return Err(AdkError::stream(format!(
                    "unknown eventstream header value type {}",
                    other
                )));
            }
        };
        if block.len() < skip {
            return Err(AdkError::stream("truncated eventstream header value"));
        }
        block = &block[skip..];
    }

    Ok(headers)
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    bytes: String,
}

/// Token-usage counters as they appear inside stream events
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StreamUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct MessageInfo {
    #[serde(default)]
    pub usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
pub struct BlockDelta {
    #[serde(default)]
    pub text: Option<String>,
}

/// Generation events carried inside `chunk` frames, in transport order.
/// Unrecognized event types decode to [StreamEvent::Unknown] rather than
/// erroring, so new upstream event kinds pass through harmlessly.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        #[serde(default)]
        message: Option<MessageInfo>,
    },
    ContentBlockStart,
    ContentBlockDelta {
        #[serde(default)]
        delta: Option<BlockDelta>,
    },
    ContentBlockStop,
    MessageDelta,
    MessageStop,
    #[serde(other)]
    Unknown,
}

/// Unwrap a transport frame into a generation event. Exception frames become
/// errors; non-chunk event frames are silently dropped.
pub fn decode_event(frame: Frame) -> Result<Option<StreamEvent>, AdkError> {
    if let Some(exception) = frame.exception_type {
        let detail = String::from_utf8_lossy(&frame.payload).into_owned();
        return Err(AdkError::api("bedrock", format!("{}: {}", exception, detail)));
    }

    match frame.event_type.as_deref() {
        Some("chunk") => {
            let chunk: ChunkPayload = serde_json::from_slice(&frame.payload)?;
            let raw = BASE64
                .decode(chunk.bytes.as_bytes())
                .map_err(|e| AdkError::stream(format!("invalid chunk encoding: {}", e)))?;
            let event: StreamEvent = serde_json::from_slice(&raw)?;
            Ok(Some(event))
        }
        _ => Ok(None),
    }
}
