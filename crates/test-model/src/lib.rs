//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use toolchat_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    #[inline]
    fn new<S: Into<String>>(message: S, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: VecDeque<PresetEvent>,
    completion: Option<ModelFinishReason>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TestModelResponse {
    fn new(preset: PresetResponse, delay: Duration) -> Self {
        let has_tool_call = preset
            .events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)));
        let completion = preset.has_choice.then_some(if has_tool_call {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        });
        Self {
            events: preset.events.into(),
            completion,
            delay,
            sleep: None,
        }
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();

        // Every event is delayed a little, so that consumers really have to
        // wait for the stream like they would with a real model.
        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(this.delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        let Some(event) = this.events.pop_front() else {
            // `take` makes sure that polling after completion returns `None`.
            return Poll::Ready(Ok(this
                .completion
                .take()
                .map(ModelResponseEvent::Completed)));
        };
        let event = match event {
            PresetEvent::MessageDelta(msg) => ModelResponseEvent::MessageDelta(msg),
            PresetEvent::ToolCall(req) => ModelResponseEvent::ToolCall(req),
            PresetEvent::StreamError(message) => {
                this.events.clear();
                this.completion = None;
                return Poll::Ready(Err(Error::new(message, ErrorKind::Transport)));
            }
        };
        Poll::Ready(Ok(Some(event)))
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond to each request. Responses are handed out in the
/// order they were added, no matter which agent sends the request. If the
/// script runs out of responses, an error will be returned.
///
/// Clones share the same script, so a test can keep a clone around to
/// inspect the requests the model has received.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&self, preset: PresetResponse) {
        self.script().responses.push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.script().requests.clone()
    }

    /// Returns the number of presets that have not been consumed yet.
    #[inline]
    pub fn remaining_responses(&self) -> usize {
        self.script().responses.len()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        // A poisoned script only means another test thread panicked.
        self.script.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut script = self.script();
        script.requests.push(req.clone());
        let result = match script.responses.pop_front() {
            None => Err(Error::new("no enough steps", ErrorKind::Other)),
            Some(PresetResponse {
                failure: Some(failure),
                ..
            }) => {
                let kind = match failure {
                    PresetFailure::Transport => ErrorKind::Transport,
                    PresetFailure::RateLimited => ErrorKind::RateLimitExceeded,
                };
                Err(Error::new("preset failure", kind))
            }
            Some(preset) => Ok(TestModelResponse::new(
                preset,
                self.delay.unwrap_or(Duration::from_millis(1)),
            )),
        };
        ready(result)
    }
}
