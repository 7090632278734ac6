use toolchat_model::{ErrorKind, ModelProviderError};

/// Errors returned by the error handler callbacks, mostly from front-ends
/// that failed to deliver a chunk.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Describes why a completion failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model endpoint failed, either before or while responding.
    #[error("model request failed ({kind}): {message}")]
    Transport {
        /// The kind reported by the provider.
        kind: ErrorKind,
        /// The provider's error message.
        message: String,
    },
    /// The endpoint answered without any choice.
    #[error("no choices found")]
    NoChoices,
    /// The endpoint answered, but requested no tool calls.
    #[error("no tool calls detected")]
    NoToolCalls,
    /// The chunk handler asked to stop streaming.
    #[error("streaming interrupted: {0}")]
    Interrupted(#[source] BoxError),
    /// The cancellation token fired while streaming.
    #[error("streaming cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn transport(err: &dyn ModelProviderError) -> Self {
        Self::Transport {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Returns `true` if the error came from the model endpoint.
    #[inline]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// A failed streaming completion, along with the text received before the
/// failure.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct StreamError {
    /// The concatenated chunks received so far.
    pub partial: String,
    /// What stopped the stream.
    #[source]
    pub error: Error,
}

impl StreamError {
    #[inline]
    pub(crate) fn new(partial: String, error: Error) -> Self {
        Self { partial, error }
    }
}
