//! Blob payloads: encoding source text into a printable literal and back

use std::{
    fmt,
    io::{Read, Write},
    ops::Range,
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};

use crate::{
    error::{BlobError, Result},
    options::EncodingOptions,
};

/// Line-continuation marker inside a Python string literal
pub const CONTINUATION: &str = "\\\n";

/// How the consuming side turns the embedded literal back into source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeKind {
    /// The literal is the escaped source text itself
    Raw,
    /// base64 of the UTF-8 source
    Base64,
    /// base64 of the zlib-compressed UTF-8 source
    Base64Inflate,
}

impl DecodeKind {
    /// Python expression that yields the executable payload from `blob`
    pub fn expression(self) -> &'static str {
        match self {
            Self::Raw => "blob",
            Self::Base64 => "b.b64decode(blob)",
            Self::Base64Inflate => "z.decompress(b.b64decode(blob))",
        }
    }
}

impl fmt::Display for DecodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Base64 => write!(f, "base64"),
            Self::Base64Inflate => write!(f, "base64+inflate"),
        }
    }
}

/// An encoded payload, produced once per encode call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Printable payload: base64 text, or escaped source for [`DecodeKind::Raw`]
    pub payload: String,
    pub decode_kind: DecodeKind,
}

impl Blob {
    /// Encode `source` according to the compression and literal options
    pub fn encode(source: &str, options: &EncodingOptions) -> Result<Self> {
        if options.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(source.as_bytes())
                .and_then(|()| encoder.finish())
                .map(|compressed| Self {
                    payload: STANDARD.encode(compressed),
                    decode_kind: DecodeKind::Base64Inflate,
                })
                .map_err(|err| BlobError::io("<zlib stream>", err))
        } else if options.emit_as_literal {
            Ok(Self {
                payload: escape_literal(source),
                decode_kind: DecodeKind::Raw,
            })
        } else {
            Ok(Self {
                payload: STANDARD.encode(source.as_bytes()),
                decode_kind: DecodeKind::Base64,
            })
        }
    }

    /// Render the payload as a Python literal wrapped at `line_width`
    pub fn literal(&self, line_width: usize) -> String {
        match self.decode_kind {
            DecodeKind::Raw => {
                let lines: Vec<String> = self
                    .payload
                    .split('\n')
                    .map(|line| wrap_escaped(line, line_width).join(CONTINUATION))
                    .collect();
                format!("\"\"\"{}\"\"\"", lines.join("\n"))
            }
            DecodeKind::Base64 | DecodeKind::Base64Inflate => {
                let lines = wrap_ascii(&self.payload, line_width);
                if lines.is_empty() {
                    "b''".to_owned()
                } else {
                    format!("b'{CONTINUATION}{}'", lines.join(CONTINUATION))
                }
            }
        }
    }

    /// Reverse the encoding, yielding the original source text.
    ///
    /// `payload` must be the literal's value as the consuming interpreter sees
    /// it: continuation markers already removed and, for raw payloads, escapes
    /// already interpreted.
    pub fn decode_payload(module: &str, payload: &[u8], kind: DecodeKind) -> Result<String> {
        let bytes = match kind {
            DecodeKind::Raw => payload.to_vec(),
            DecodeKind::Base64 => decode_base64(module, payload)?,
            DecodeKind::Base64Inflate => {
                let compressed = decode_base64(module, payload)?;
                let mut inflated = Vec::new();
                ZlibDecoder::new(compressed.as_slice())
                    .read_to_end(&mut inflated)
                    .map_err(|err| BlobError::malformed(module, format!("inflate failed: {err}")))?;
                inflated
            }
        };
        String::from_utf8(bytes)
            .map_err(|err| BlobError::malformed(module, format!("payload is not UTF-8: {err}")))
    }
}

fn decode_base64(module: &str, payload: &[u8]) -> Result<Vec<u8>> {
    // Python's b64decode discards characters outside the alphabet by default
    let cleaned: Vec<u8> = payload
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(cleaned)
        .map_err(|err| BlobError::malformed(module, format!("invalid base64: {err}")))
}

/// Escape source text for a non-raw, triple-quoted Python string literal
pub fn escape_literal(source: &str) -> String {
    let mut escaped = String::with_capacity(source.len());
    for c in source.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\x00"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Split ASCII text into chunks of at most `width` characters
fn wrap_ascii(text: &str, width: usize) -> Vec<&str> {
    let bytes = text.as_bytes();
    bytes
        .chunks(width.max(1))
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect()
}

/// Split one line of escaped text into chunks of at most `width` characters.
/// An escape sequence is never split, so a chunk grows past `width` only when
/// `width` is narrower than one escape.
fn wrap_escaped(line: &str, width: usize) -> Vec<&str> {
    let width = width.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for unit in escape_units(line) {
        let len = line[unit.clone()].chars().count();
        if count > 0 && count + len > width {
            chunks.push(&line[start..unit.start]);
            start = unit.start;
            count = 0;
        }
        count += len;
    }
    if start < line.len() || chunks.is_empty() {
        chunks.push(&line[start..]);
    }
    chunks
}

/// Byte ranges of the characters and escape sequences (`\c`, `\xHH`) of
/// escaped text
fn escape_units(line: &str) -> Vec<Range<usize>> {
    let mut units = Vec::new();
    let mut chars = line.char_indices();
    while let Some((start, c)) = chars.next() {
        let mut end = start + c.len_utf8();
        if c == '\\' {
            if let Some((offset, escaped)) = chars.next() {
                end = offset + escaped.len_utf8();
                if escaped == 'x' {
                    for (offset, digit) in chars.by_ref().take(2) {
                        end = offset + digit.len_utf8();
                    }
                }
            }
        }
        units.push(start..end);
    }
    units
}
