//! Byte-to-text converters.

use std::fmt::Write as _;

use bytes::{Bytes, BytesMut};

use super::{Converter, Output};
use crate::config::{Encoding, StreamConfig};
use crate::error::BoxError;

/// Splits a byte stream into lines.
///
/// Lines are emitted without their `\n` (and without a preceding `\r`). A
/// line split across chunk boundaries is held back until its terminator
/// arrives; the trailing unterminated line, if any, is emitted on flush.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: BytesMut,
}

impl LineSplitter {
    /// Creates a splitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    fn emit(mut line: BytesMut, out: &mut Output<Bytes>) {
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        out.push(line.freeze());
    }
}

impl<I: AsRef<[u8]>> Converter<I, Bytes> for LineSplitter {
    fn transform(&mut self, chunk: I, out: &mut Output<Bytes>) -> Result<(), BoxError> {
        let mut data = chunk.as_ref();
        while let Some(pos) = data.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&data[..pos]);
            Self::emit(self.partial.split(), out);
            data = &data[pos + 1..];
        }
        self.partial.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self, out: &mut Output<Bytes>) -> Result<(), BoxError> {
        if !self.partial.is_empty() {
            Self::emit(self.partial.split(), out);
        }
        Ok(())
    }
}

/// Decodes bytes into text at a stream boundary.
///
/// For UTF-8, a multi-byte sequence split across chunks is carried over to
/// the next chunk; invalid sequences become U+FFFD, as does a partial
/// sequence still pending at flush. Chunks that decode to nothing (a lone
/// lead byte, say) emit nothing.
#[derive(Debug)]
pub struct TextDecoder {
    encoding: Encoding,
    pending: Vec<u8>,
}

impl TextDecoder {
    /// Creates a decoder for `encoding`.
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            pending: Vec::new(),
        }
    }

    /// Creates a decoder for the configured encoding, UTF-8 if none is set.
    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.encoding().unwrap_or(Encoding::Utf8))
    }

    /// The decoder's encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn decode_utf8(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);
        let mut text = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            rest = tail;
                            break;
                        }
                    }
                }
            }
        }
        let carry = rest.to_vec();
        self.pending = carry;
        text
    }
}

impl<I: AsRef<[u8]>> Converter<I, String> for TextDecoder {
    fn transform(&mut self, chunk: I, out: &mut Output<String>) -> Result<(), BoxError> {
        let data = chunk.as_ref();
        let text = match self.encoding {
            Encoding::Utf8 => self.decode_utf8(data),
            Encoding::Latin1 => data.iter().map(|&b| char::from(b)).collect(),
            Encoding::Hex => {
                let mut hex = String::with_capacity(data.len() * 2);
                for b in data {
                    let _ = write!(hex, "{:02x}", b);
                }
                hex
            }
        };
        if !text.is_empty() {
            out.push(text);
        }
        Ok(())
    }

    fn flush(&mut self, out: &mut Output<String>) -> Result<(), BoxError> {
        if !self.pending.is_empty() {
            self.pending.clear();
            out.push(char::REPLACEMENT_CHARACTER.to_string());
        }
        Ok(())
    }
}
