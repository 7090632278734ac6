//! A model provider for OpenAI-compatible APIs.
//!
//! Besides the hosted OpenAI API, this covers local model runners that
//! expose the same `/chat/completions` endpoint, which is how the assistant
//! is usually deployed.

#[macro_use]
extern crate tracing;

mod config;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};
use toolchat_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};
use toolchat_sse::{Chunks, EVENT_STREAM_SUBTYPE, Sse};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use proto::{ChatCompletion, ErrorBody};
use response::OpenAIResponse;

/// Error type for [`OpenAIProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible model provider.
///
/// The provider is cheap to clone and can be shared by several agents,
/// each of them naming its own model in the request.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this provider.
    #[inline]
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let stream = req.stream;
        let openai_req = proto::create_request(req, &self.config);
        let mut req_builder = self
            .client
            .post(self.config.completions_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::ACCEPT,
                if stream {
                    "text/event-stream"
                } else {
                    "application/json"
                },
            )
            .json(&openai_req);
        if !self.config.api_key.is_empty() {
            req_builder = req_builder.bearer_auth(&self.config.api_key);
        }
        let resp_fut = req_builder.send();

        async move {
            let resp = resp_fut.await.map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::Transport)
            })?;
            let resp = check_status(resp).await?;

            if !stream {
                let completion =
                    resp.json::<ChatCompletion>().await.map_err(|err| {
                        Error::new(
                            format!("malformed completion: {err}"),
                            ErrorKind::Transport,
                        )
                    })?;
                return Ok(OpenAIResponse::from_completion(completion));
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == EVENT_STREAM_SUBTYPE)
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Transport,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(OpenAIResponse::from_sse(sse))
        }
    }
}

/// Turns a non-success status into an error, using the server's message
/// when it sent one.
async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
        _ => ErrorKind::Transport,
    };
    let body = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(body) => format!("{status}: {}", body.error.message),
        Err(_) if body.is_empty() => format!("{status}"),
        Err(_) => format!("{status}: {body}"),
    };
    error!("completion request failed: {message}");
    Err(Error::new(message, kind))
}
