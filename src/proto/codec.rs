// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Binary XTalk framing for [`Frame`] documents.
//!
//! Layout of one document:
//!
//! ```text
//! 'X' <version:u8=0> <top-level count:i32>
//!     ('p' <string> <string>)*            processing instructions, skipped
//!     'E' <tag:string> <attrs> <child count:i32> <child>*
//! child  := 's' <string>                   text under the empty key
//!         | 'E' <tag> <attrs> <count:i32> <child>*
//!         | 'p' <string> <string>
//! attrs  := <count:i32> (<key:string> <value:string>)*
//! string := <len:i32> <utf-8 bytes>
//! ```
//!
//! An element holding exactly one text child decodes to a leaf. Attributes are
//! accepted on input and never written.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::frame::{Frame, FrameValue, PCDATA_KEY};

pub const DOCUMENT_MARKER: u8 = b'X';
pub const ELEMENT_MARKER: u8 = b'E';
pub const PI_MARKER: u8 = b'p';
pub const STRING_MARKER: u8 = b's';
pub const VERSION_CODE: u8 = 0;

/// Root element tag of every document.
pub const ROOT_TAG: &str = "vinci:FRAME";

/// Largest string or leaf accepted from the wire (1 GiB).
pub const OVERSIZE_LIMIT: usize = 1024 * 1024 * 1024;

/// Deepest element nesting accepted from the wire.
pub const MAX_DEPTH: usize = 128;

const HEADER: [u8; 7] = [DOCUMENT_MARKER, VERSION_CODE, 0, 0, 0, 1, ELEMENT_MARKER];

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("expected {expected} marker, found {found:?}")]
    UnexpectedMarker { expected: &'static str, found: char },

    #[error("unsupported XTalk version code {0}")]
    UnsupportedVersion(u8),

    #[error("Oversize field: {0}")]
    Oversize(i64),

    #[error("invalid UTF-8 in frame: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("invalid top-level element count {0}")]
    InvalidTopLevelCount(i32),

    #[error("elements nested deeper than {0}")]
    TooDeep(usize),
}

enum Parse {
    /// The buffer must hold at least this many bytes before parsing can go further.
    Incomplete(usize),
    Invalid(CodecError),
}

impl From<CodecError> for Parse {
    fn from(e: CodecError) -> Self {
        Parse::Invalid(e)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Result<u8, Parse> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(Parse::Incomplete(self.pos + 1))
    }

    fn byte(&mut self) -> Result<u8, Parse> {
        let b = self.peek()?;
        self.pos += 1;
        Ok(b)
    }

    fn int(&mut self) -> Result<i32, Parse> {
        let end = self.pos + 4;
        let raw = self.buf.get(self.pos..end).ok_or(Parse::Incomplete(end))?;
        self.pos = end;
        Ok(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn length(&mut self) -> Result<usize, Parse> {
        let len = self.int()?;
        if len < 0 || len as usize > OVERSIZE_LIMIT {
            return Err(CodecError::Oversize(len as i64).into());
        }
        Ok(len as usize)
    }

    fn bytes(&mut self) -> Result<&'a [u8], Parse> {
        let len = self.length()?;
        let end = self.pos + len;
        let raw = self.buf.get(self.pos..end).ok_or(Parse::Incomplete(end))?;
        self.pos = end;
        Ok(raw)
    }

    fn string(&mut self) -> Result<String, Parse> {
        let raw = self.bytes()?;
        String::from_utf8(raw.to_vec()).map_err(|e| CodecError::from(e).into())
    }

    fn skip_string(&mut self) -> Result<(), Parse> {
        self.bytes().map(|_| ())
    }

    fn skip_pi(&mut self) -> Result<(), Parse> {
        self.skip_string()?;
        self.skip_string()
    }

    fn skip_attributes(&mut self) -> Result<(), Parse> {
        let count = self.int()?;
        for _ in 0..count.max(0) {
            self.skip_string()?;
            self.skip_string()?;
        }
        Ok(())
    }

    fn expect(&mut self, expected: &'static str, marker: u8) -> Result<(), Parse> {
        let found = self.byte()?;
        if found != marker {
            return Err(CodecError::UnexpectedMarker {
                expected,
                found: found as char,
            }
            .into());
        }
        Ok(())
    }

    fn document(&mut self) -> Result<Frame, Parse> {
        self.expect("document", DOCUMENT_MARKER)?;
        let version = self.byte()?;
        if version != VERSION_CODE {
            return Err(CodecError::UnsupportedVersion(version).into());
        }
        // The root element plus any processing instructions around it.
        let mut top_level = self.int()?;
        if top_level < 1 {
            return Err(CodecError::InvalidTopLevelCount(top_level).into());
        }

        let mut marker = self.byte()?;
        while marker == PI_MARKER {
            self.skip_pi()?;
            top_level = top_level.saturating_sub(1);
            marker = self.byte()?;
        }
        if marker != ELEMENT_MARKER {
            return Err(CodecError::UnexpectedMarker {
                expected: "element",
                found: marker as char,
            }
            .into());
        }

        // Root tag is always vinci:FRAME.
        self.skip_string()?;
        self.skip_attributes()?;
        let count = self.int()?;
        let frame = self.children(count, 1)?;
        top_level = top_level.saturating_sub(1);

        while top_level > 0 {
            self.expect("pi", PI_MARKER)?;
            self.skip_pi()?;
            top_level -= 1;
        }
        Ok(frame)
    }

    fn children(&mut self, count: i32, depth: usize) -> Result<Frame, Parse> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooDeep(MAX_DEPTH).into());
        }
        let mut frame = Frame::new();
        for _ in 0..count.max(0) {
            match self.byte()? {
                PI_MARKER => self.skip_pi()?,
                STRING_MARKER => {
                    frame.add_str(PCDATA_KEY, self.string()?);
                }
                ELEMENT_MARKER => {
                    let tag = self.string()?;
                    self.skip_attributes()?;
                    let sub_count = self.int()?;
                    let value = if sub_count == 1 && self.peek()? == STRING_MARKER {
                        self.pos += 1;
                        FrameValue::Leaf(self.string()?)
                    } else {
                        FrameValue::Frame(self.children(sub_count, depth + 1)?)
                    };
                    frame.push(tag, value);
                }
                other => {
                    return Err(CodecError::UnexpectedMarker {
                        expected: "child",
                        found: other as char,
                    }
                    .into())
                }
            }
        }
        Ok(frame)
    }
}

/// `tokio_util` codec turning a byte stream into [`Frame`]s and back.
///
/// A document is only parsed once the whole of it has arrived. After a
/// partial read the codec remembers how many bytes the parse got stuck
/// needing and skips reparsing until the buffer holds them.
#[derive(Debug, Default, Clone, Copy)]
pub struct XTalkCodec {
    needed: usize,
}

impl XTalkCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for XTalkCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if src.is_empty() || src.len() < self.needed {
            return Ok(None);
        }
        let mut cursor = Cursor { buf: &src[..], pos: 0 };
        match cursor.document() {
            Ok(frame) => {
                let consumed = cursor.pos;
                src.advance(consumed);
                self.needed = 0;
                Ok(Some(frame))
            }
            Err(Parse::Incomplete(needed)) => {
                self.needed = needed;
                Ok(None)
            }
            Err(Parse::Invalid(e)) => {
                self.needed = 0;
                Err(e)
            }
        }
    }
}

impl Encoder<Frame> for XTalkCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        dst.extend_from_slice(&HEADER);
        put_string(dst, ROOT_TAG.as_bytes())?;
        dst.put_i32(0);
        put_element(dst, &frame)
    }
}

fn put_string(dst: &mut BytesMut, raw: &[u8]) -> Result<(), CodecError> {
    if raw.len() > OVERSIZE_LIMIT {
        return Err(CodecError::Oversize(raw.len() as i64));
    }
    dst.put_i32(raw.len() as i32);
    dst.extend_from_slice(raw);
    Ok(())
}

fn put_element(dst: &mut BytesMut, frame: &Frame) -> Result<(), CodecError> {
    dst.put_i32(frame.len() as i32);
    for (key, value) in frame.iter() {
        match value {
            FrameValue::Leaf(text) if key == PCDATA_KEY => {
                dst.put_u8(STRING_MARKER);
                put_string(dst, text.as_bytes())?;
            }
            FrameValue::Leaf(text) => {
                dst.put_u8(ELEMENT_MARKER);
                put_string(dst, key.as_bytes())?;
                dst.put_i32(0);
                dst.put_i32(1);
                dst.put_u8(STRING_MARKER);
                put_string(dst, text.as_bytes())?;
            }
            FrameValue::Frame(child) => {
                dst.put_u8(ELEMENT_MARKER);
                put_string(dst, key.as_bytes())?;
                dst.put_i32(0);
                put_element(dst, child)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(&(s.len() as i32).to_be_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    /// Hand-assembled document: a PI, then a root holding a leaf with an
    /// attribute and an empty sub-frame.
    fn sample_document() -> Vec<u8> {
        let mut buf = vec![DOCUMENT_MARKER, VERSION_CODE];
        buf.extend_from_slice(&2i32.to_be_bytes());
        buf.push(PI_MARKER);
        string(&mut buf, "xml");
        string(&mut buf, "version=1.0");
        buf.push(ELEMENT_MARKER);
        string(&mut buf, ROOT_TAG);
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&2i32.to_be_bytes());

        buf.push(ELEMENT_MARKER);
        string(&mut buf, "vinci:COMMAND");
        buf.extend_from_slice(&1i32.to_be_bytes());
        string(&mut buf, "lang");
        string(&mut buf, "en");
        buf.extend_from_slice(&1i32.to_be_bytes());
        buf.push(STRING_MARKER);
        string(&mut buf, "GetMeta");

        buf.push(ELEMENT_MARKER);
        string(&mut buf, "DATA");
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf
    }

    #[test]
    fn decodes_hand_built_document() {
        let mut codec = XTalkCodec::new();
        let mut src = BytesMut::from(&sample_document()[..]);
        let frame = codec.decode(&mut src).unwrap().unwrap();

        assert!(src.is_empty());
        assert_eq!(frame.get_str("vinci:COMMAND"), Some("GetMeta"));
        assert_eq!(frame.get_frame("DATA"), Some(&Frame::new()));
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn waits_for_more_bytes_on_partial_input() {
        let mut codec = XTalkCodec::new();
        let full = sample_document();
        let mut src = BytesMut::from(&full[..full.len() - 3]);

        assert!(codec.decode(&mut src).unwrap().is_none());
        assert_eq!(src.len(), full.len() - 3);

        src.extend_from_slice(&full[full.len() - 3..]);
        assert!(codec.decode(&mut src).unwrap().is_some());
    }

    #[test]
    fn rejects_bad_document_marker() {
        let mut codec = XTalkCodec::new();
        let mut src = BytesMut::from(&b"Q\0\0\0\0\x01E"[..]);
        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedMarker { found: 'Q', .. }));
    }

    #[test]
    fn rejects_oversize_length() {
        let mut codec = XTalkCodec::new();
        let mut buf = HEADER.to_vec();
        buf.extend_from_slice(&i32::MAX.to_be_bytes());
        let err = codec.decode(&mut BytesMut::from(&buf[..])).unwrap_err();
        assert!(matches!(err, CodecError::Oversize(_)));
    }

    #[test]
    fn encoded_nested_frame_decodes_with_text_children() {
        let mut codec = XTalkCodec::new();
        let mut keys = Frame::new();
        keys.add_str("UEID", "42");
        keys.add_str(PCDATA_KEY, "loose text");
        let mut request = Frame::command("Annotate");
        request.add_frame("KEYS", keys);

        let mut dst = BytesMut::new();
        codec.encode(request.clone(), &mut dst).unwrap();
        assert_eq!(&dst[..HEADER.len()], &HEADER);

        let decoded = codec.decode(&mut dst).unwrap().unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn two_documents_in_one_buffer_decode_in_order() {
        let mut codec = XTalkCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(Frame::command("GetPid"), &mut dst).unwrap();
        codec.encode(Frame::command("Shutdown"), &mut dst).unwrap();

        let first = codec.decode(&mut dst).unwrap().unwrap();
        let second = codec.decode(&mut dst).unwrap().unwrap();
        assert_eq!(first.get_str("vinci:COMMAND"), Some("GetPid"));
        assert_eq!(second.get_str("vinci:COMMAND"), Some("Shutdown"));
        assert!(codec.decode(&mut dst).unwrap().is_none());
    }

    #[test]
    fn rejects_top_level_count_below_one() {
        for count in [i32::MIN, -1, 0] {
            let mut codec = XTalkCodec::new();
            let mut buf = vec![DOCUMENT_MARKER, VERSION_CODE];
            buf.extend_from_slice(&count.to_be_bytes());
            buf.push(ELEMENT_MARKER);
            let err = codec.decode(&mut BytesMut::from(&buf[..])).unwrap_err();
            assert!(matches!(err, CodecError::InvalidTopLevelCount(c) if c == count));
        }
    }

    #[test]
    fn rejects_runaway_nesting() {
        let mut codec = XTalkCodec::new();
        let mut buf = HEADER.to_vec();
        string(&mut buf, ROOT_TAG);
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&1i32.to_be_bytes());
        for _ in 0..MAX_DEPTH + 8 {
            buf.push(ELEMENT_MARKER);
            string(&mut buf, "n");
            buf.extend_from_slice(&0i32.to_be_bytes());
            buf.extend_from_slice(&1i32.to_be_bytes());
        }
        let err = codec.decode(&mut BytesMut::from(&buf[..])).unwrap_err();
        assert!(matches!(err, CodecError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn partial_read_records_bytes_still_needed() {
        let mut codec = XTalkCodec::new();
        let mut request = Frame::command("Annotate");
        request.add_str("DocumentText", "x".repeat(4096));
        let mut full = BytesMut::new();
        codec.encode(request.clone(), &mut full).unwrap();

        // Cut inside the long leaf: the parse knows where the leaf ends.
        let mut src = BytesMut::from(&full[..full.len() - 100]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert_eq!(codec.needed, full.len());

        src.extend_from_slice(&full[full.len() - 100..full.len() - 1]);
        assert!(codec.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&full[full.len() - 1..]);
        assert_eq!(codec.decode(&mut src).unwrap().unwrap(), request);
        assert_eq!(codec.needed, 0);
    }
}
