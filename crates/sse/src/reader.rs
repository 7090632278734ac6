use std::fmt::{self, Display};

use crate::chunks::{Chunks, Error as ChunksError};

/// Errors that may occur while reading events.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The underlying body could not be read.
    ChunksError(ChunksError),
    /// The body is not a well-formed event stream.
    InvalidPayload,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChunksError(err) => Display::fmt(err, f),
            Error::InvalidPayload => write!(f, "invalid event stream payload"),
        }
    }
}

impl std::error::Error for Error {}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` fields of an event are surfaced. Multiple `data` lines
/// are joined with a line feed. Comments and every other field are
/// skipped, and so are events that carry no data at all. A line without a
/// colon is a field with an empty value.
pub struct Sse {
    buf: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    /// Creates a reader over the given chunks.
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
        }
    }

    /// Returns the data of the next event, or `None` at the end of the
    /// stream. Trailing bytes that never form a complete event are
    /// discarded.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Events already buffered are delivered before touching the
            // connection again.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                if !self.buf.is_empty() {
                    trace!("dropping {} incomplete bytes", self.buf.len());
                }
                return Ok(None);
            };
            // Line endings are normalized to a single line feed.
            self.buf.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        while let Some(eol_idx) = find_blank_line(&self.buf) {
            let block: Vec<u8> = self.buf.drain(0..eol_idx + 2).collect();
            let Ok(block) = str::from_utf8(&block[..eol_idx]) else {
                return Err(Error::InvalidPayload);
            };

            let mut data: Option<String> = None;
            for line in block.split('\n') {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (name, value) = line.split_once(':').unwrap_or((line, ""));
                let value = value.strip_prefix(' ').unwrap_or(value);
                match name {
                    "data" => match &mut data {
                        Some(data) => {
                            data.push('\n');
                            data.push_str(value);
                        }
                        None => data = Some(value.to_owned()),
                    },
                    _ => trace!("skipping sse field {name}: {value}"),
                }
            }

            if let Some(data) = data {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }
}

#[inline]
fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}
