//! Agents, each of them a request template bound to a model endpoint.

mod error;
#[cfg(test)]
mod tests;

use toolchat_model::{
    ModelMessage, ModelProvider, ModelRequest, ModelResponseEvent, ModelTool,
    ToolCallRequest,
};
use tokio_util::sync::CancellationToken;

use crate::model_client::{ModelClient, ModelStream};
pub use error::{BoxError, Error, StreamError};

/// The request template of an agent.
///
/// Everything but `messages` stays fixed for the lifetime of the agent.
#[derive(Clone, Debug, Default)]
pub struct AgentConfig {
    /// Display name, used by front-ends and in logs.
    pub name: String,
    /// Optional avatar shown by front-ends.
    pub avatar: Option<String>,
    /// Optional display color for front-ends.
    pub color: Option<String>,
    /// The model identifier. `None` uses the provider default.
    pub model: Option<String>,
    /// Sampling temperature. `None` uses the endpoint default.
    pub temperature: Option<f32>,
    /// The initial message list.
    pub messages: Vec<ModelMessage>,
    /// Whether the model may request several tool calls at once.
    pub parallel_tool_calls: Option<bool>,
    /// Tools offered to the model.
    pub tools: Vec<ModelTool>,
}

impl AgentConfig {
    /// Creates an empty template with the given name.
    #[inline]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Everything a single choice carried.
#[derive(Default)]
struct Completion {
    text: String,
    tool_calls: Vec<ToolCallRequest>,
    has_choice: bool,
}

/// An agent, which holds a request template and sends completions to a
/// model endpoint.
///
/// All completion methods take `&mut self`, so an agent has at most one
/// completion in flight.
pub struct Agent {
    client: ModelClient,
    config: AgentConfig,
}

impl Agent {
    /// Creates an agent talking to the given client.
    #[inline]
    pub fn new(client: ModelClient, config: AgentConfig) -> Self {
        Self { client, config }
    }

    /// Creates an agent with its own client for the given provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
        config: AgentConfig,
    ) -> Self {
        Self::new(ModelClient::new(provider), config)
    }

    /// Returns the request template.
    #[inline]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Returns the display name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the current message list.
    #[inline]
    pub fn messages(&self) -> &[ModelMessage] {
        &self.config.messages
    }

    /// Returns the message list for in-place edits.
    #[inline]
    pub fn messages_mut(&mut self) -> &mut Vec<ModelMessage> {
        &mut self.config.messages
    }

    /// Replaces the whole message list.
    #[inline]
    pub fn replace_messages<M: Into<Vec<ModelMessage>>>(&mut self, messages: M) {
        self.config.messages = messages.into();
    }

    /// Requests a single, non-streaming completion and returns the text of
    /// the first choice.
    pub async fn complete(&mut self) -> Result<String, Error> {
        let stream = self.send(false).await?;
        let completion = collect(stream).await?;
        if !completion.has_choice {
            return Err(Error::NoChoices);
        }
        Ok(completion.text)
    }

    /// Requests a non-streaming completion and returns the tool calls of
    /// the first choice.
    ///
    /// Text the model produced instead of tool calls is discarded, an answer
    /// without tool calls is [`Error::NoToolCalls`].
    pub async fn complete_for_tool_calls(
        &mut self,
    ) -> Result<Vec<ToolCallRequest>, Error> {
        let stream = self.send(false).await?;
        let completion = collect(stream).await?;
        if !completion.has_choice {
            return Err(Error::NoChoices);
        }
        if completion.tool_calls.is_empty() {
            debug!(agent = %self.config.name, "no tool calls in the answer");
            return Err(Error::NoToolCalls);
        }
        Ok(completion.tool_calls)
    }

    /// Requests a streaming completion, handing every non-empty chunk to
    /// `on_chunk` as soon as it arrives.
    ///
    /// Chunks are delivered in arrival order, and the returned text is their
    /// concatenation. If `on_chunk` fails, streaming stops and the error
    /// carries the text up to and including the rejected chunk. The same
    /// applies when `cancel` fires. In every case the response stream is
    /// closed before this method returns.
    pub async fn complete_streaming<F>(
        &mut self,
        cancel: &CancellationToken,
        mut on_chunk: F,
    ) -> Result<String, StreamError>
    where
        F: FnMut(&Agent, &str) -> Result<(), BoxError>,
    {
        if cancel.is_cancelled() {
            return Err(StreamError::new(String::new(), Error::Cancelled));
        }
        let mut stream = self
            .send(true)
            .await
            .map_err(|err| StreamError::new(String::new(), err))?;

        let mut text = String::new();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(agent = %self.config.name, "streaming cancelled");
                    return Err(StreamError::new(text, Error::Cancelled));
                }
                event = stream.next_event() => event,
            };
            let event = match event {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(err) => {
                    return Err(StreamError::new(
                        text,
                        Error::transport(&*err),
                    ));
                }
            };
            let ModelResponseEvent::MessageDelta(delta) = event else {
                continue;
            };
            if delta.is_empty() {
                continue;
            }
            text.push_str(&delta);
            if let Err(err) = on_chunk(self, &delta) {
                debug!(agent = %self.config.name, "chunk handler failed: {err}");
                return Err(StreamError::new(text, Error::Interrupted(err)));
            }
        }
        Ok(text)
    }

    async fn send(&self, stream: bool) -> Result<ModelStream, Error> {
        let req = ModelRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            messages: self.config.messages.clone(),
            tools: self.config.tools.clone(),
            parallel_tool_calls: self.config.parallel_tool_calls,
            stream,
        };
        debug!(
            agent = %self.config.name,
            messages = req.messages.len(),
            stream,
            "sending completion request"
        );
        self.client
            .send_request(req)
            .await
            .map_err(|err| Error::transport(&*err))
    }
}

/// Drains a response, keeping the text and tool calls of the first choice.
async fn collect(mut stream: ModelStream) -> Result<Completion, Error> {
    let mut completion = Completion::default();
    while let Some(event) = stream
        .next_event()
        .await
        .map_err(|err| Error::transport(&*err))?
    {
        completion.has_choice = true;
        match event {
            ModelResponseEvent::MessageDelta(delta) => {
                completion.text.push_str(&delta)
            }
            ModelResponseEvent::ToolCall(call) => {
                completion.tool_calls.push(call)
            }
            ModelResponseEvent::Completed(reason) => {
                trace!("completion finished: {reason:?}");
            }
        }
    }
    Ok(completion)
}
