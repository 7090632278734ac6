use std::collections::VecDeque;
use std::fmt::{self, Display};

use bytes::Bytes;
use reqwest::Response;

/// The body could not be read from the connection.
#[derive(Debug, PartialEq, Eq)]
pub struct Error;

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to read response body")
    }
}

impl std::error::Error for Error {}

/// An adapter for streaming byte chunks.
pub enum Chunks {
    /// Chunks pulled from a live HTTP response.
    Response(Response),
    /// Chunks queued in memory, mostly useful for tests.
    VecDeque(VecDeque<Bytes>),
}

impl Chunks {
    /// Reads chunks from an HTTP response body.
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    /// Reads chunks from an in-memory queue.
    #[inline]
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Chunks::VecDeque(vec)
    }

    /// Returns the next chunk, or `None` once the body is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Chunks::Response(response) => match response.chunk().await {
                Ok(chunk) => Ok(chunk),
                Err(err) => {
                    debug!("failed to read chunk: {err}");
                    Err(Error)
                }
            },
            Chunks::VecDeque(vec) => Ok(vec.pop_front()),
        }
    }
}
