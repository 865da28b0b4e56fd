//! Preview record codec.
//!
//! Framing: none. A record is a single flat JSON object and the end of
//! the stream (pipe closed by the sender) delimits it.
//!
//! Encoding is written out by hand so the escaping rules stay exact:
//! - path: `\` → `\\`, `"` → `\"`, characters above 7-bit ASCII dropped
//! - extension: UTF-8, same structural escaping
//! - size: decimal integer
//!
//! Control characters in either string become `\u00XX`.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::protocol::{MAX_RECORD_SIZE, PreviewRequest};
use crate::probe::SelectedFile;

/// Codec error type.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("record too large: {0} bytes (max {MAX_RECORD_SIZE})")]
    RecordTooLarge(usize),
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a resolved selection into its wire record.
pub fn encode(file: &SelectedFile) -> Vec<u8> {
    encode_request(&PreviewRequest::from(file))
}

/// Encode a wire-level request.
pub fn encode_request(request: &PreviewRequest) -> Vec<u8> {
    let mut out = String::with_capacity(request.path.len() + request.extension.len() + 48);
    out.push_str("{\"path\":\"");
    push_escaped(&mut out, &request.path, false);
    out.push_str("\",\"extension\":\"");
    push_escaped(&mut out, &request.extension, true);
    out.push_str("\",\"size\":");
    out.push_str(&request.size.to_string());
    out.push('}');
    out.into_bytes()
}

/// Decode a complete wire record.
pub fn decode(record: &[u8]) -> Result<PreviewRequest, CodecError> {
    if record.len() > MAX_RECORD_SIZE {
        return Err(CodecError::RecordTooLarge(record.len()));
    }
    Ok(serde_json::from_slice(record)?)
}

fn push_escaped(out: &mut String, value: &str, keep_non_ascii: bool) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c if c.is_ascii() || keep_non_ascii => out.push(c),
            _ => {}
        }
    }
}

/// Stream codec for the receiver side.
///
/// Buffers bytes until end of stream and yields exactly one record per
/// connection. Used by the diagnostic listener with `FramedRead`.
#[derive(Debug, Default)]
pub struct RecordCodec;

impl RecordCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RecordCodec {
    type Item = PreviewRequest;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // No delimiter inside the stream; only enforce the size cap.
        if src.len() > MAX_RECORD_SIZE {
            return Err(CodecError::RecordTooLarge(src.len()));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let record = src.split();
        decode(&record).map(Some)
    }
}

impl Encoder<PreviewRequest> for RecordCodec {
    type Error = CodecError;

    fn encode(&mut self, item: PreviewRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let record = encode_request(&item);
        if record.len() > MAX_RECORD_SIZE {
            return Err(CodecError::RecordTooLarge(record.len()));
        }
        dst.reserve(record.len());
        dst.put_slice(&record);
        Ok(())
    }
}
