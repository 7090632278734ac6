use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use toolchat_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use toolchat_sse::Sse;

use crate::Error;
use crate::proto::{ChatCompletion, ChatCompletionChunk, ToolCall};

struct PartialState {
    // `None` once the stream is drained, or for a buffered completion.
    sse: Option<Sse>,
    id: Option<String>,
    // Fragments of the tool calls, merged by their index. They are only
    // turned into events when the choice finishes, since arguments arrive
    // piece by piece.
    tool_calls: Vec<ToolCall>,
    saw_choice: bool,
    finish_reason: Option<ModelFinishReason>,
    pending_events: VecDeque<ModelResponseEvent>,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    /// Creates a response that pulls completion chunks from an event stream.
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        Self::from_state(PartialState {
            sse: Some(sse),
            id: None,
            tool_calls: Default::default(),
            saw_choice: false,
            finish_reason: None,
            pending_events: Default::default(),
        })
    }

    /// Creates a response from a completion that has been received in one
    /// piece. Only the first choice is reported.
    pub fn from_completion(completion: ChatCompletion) -> Self {
        let mut pending_events = VecDeque::new();
        if let Some(choice) = completion.choices.into_iter().next() {
            if let Some(content) = choice.message.content.filter(|c| !c.is_empty())
            {
                pending_events.push_back(ModelResponseEvent::MessageDelta(content));
            }
            pending_events.extend(
                choice
                    .message
                    .tool_calls
                    .iter()
                    .map(|call| ModelResponseEvent::ToolCall(finish_tool_call(call))),
            );
            pending_events.push_back(ModelResponseEvent::Completed(
                parse_finish_reason(choice.finish_reason.as_deref()),
            ));
        }
        Self::from_state(PartialState {
            sse: None,
            id: None,
            tool_calls: Default::default(),
            saw_choice: false,
            finish_reason: None,
            pending_events,
        })
    }

    fn from_state(partial_state: PartialState) -> Self {
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }
        let Some(sse) = &mut partial_state.sse else {
            return Ok((None, partial_state));
        };

        let sse_event = match sse.next_event().await {
            Ok(Some(event)) if event != "[DONE]" => event,
            Ok(_) => {
                partial_state.sse = None;
                partial_state.flush();
                continue;
            }
            Err(err) => {
                return Err(Error::new(format!("{err}"), ErrorKind::Transport));
            }
        };
        trace!("got sse event: {sse_event}");

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| {
                Error::new(format!("malformed chunk: {err}"), ErrorKind::Transport)
            })?;
        if partial_state.id.get_or_insert_with(|| chunk.id.clone()) != &chunk.id
        {
            return Err(Error::new("chunk id mismatch", ErrorKind::Transport));
        };

        // The final usage chunk carries no choices.
        let Some(choice) = chunk.choices.into_iter().next() else {
            continue;
        };
        partial_state.saw_choice = true;

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            partial_state
                .pending_events
                .push_back(ModelResponseEvent::MessageDelta(content));
        }
        for tool_call in choice.delta.tool_calls.into_iter().flatten() {
            partial_state.merge_tool_call(tool_call);
        }
        if let Some(finish_reason) = choice.finish_reason {
            partial_state.finish_reason =
                Some(parse_finish_reason(Some(finish_reason.as_str())));
        }
    }
}

impl PartialState {
    fn merge_tool_call(&mut self, tool_call: ToolCall) {
        let Some(partial_tool_call) = self
            .tool_calls
            .iter_mut()
            .find(|t| t.index == tool_call.index)
        else {
            self.tool_calls.push(tool_call);
            return;
        };
        // Patch the partial tool call.
        if let Some(id) = tool_call.id {
            partial_tool_call.id.get_or_insert_default().push_str(&id);
        }
        if let Some(ty) = tool_call.r#type {
            partial_tool_call.r#type.get_or_insert_default().push_str(&ty);
        }
        if let Some(function) = tool_call.function {
            match partial_tool_call.function {
                Some(ref mut partial_func) => {
                    if let Some(name) = function.name {
                        partial_func.name.get_or_insert_default().push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial_func
                            .arguments
                            .get_or_insert_default()
                            .push_str(&arguments);
                    }
                }
                None => partial_tool_call.function = Some(function),
            }
        }
    }

    /// Emits the merged tool calls followed by the completion of the choice.
    fn flush(&mut self) {
        for tool_call in self.tool_calls.drain(..) {
            self.pending_events
                .push_back(ModelResponseEvent::ToolCall(finish_tool_call(&tool_call)));
        }
        if !self.saw_choice {
            return;
        }
        let finish_reason = self.finish_reason.take().unwrap_or(ModelFinishReason::Stop);
        self.pending_events
            .push_back(ModelResponseEvent::Completed(finish_reason));
    }
}

fn finish_tool_call(tool_call: &ToolCall) -> ToolCallRequest {
    let function = tool_call.function.as_ref();
    ToolCallRequest {
        id: tool_call.id.clone().unwrap_or_default(),
        name: function.and_then(|f| f.name.clone()).unwrap_or_default(),
        arguments: function
            .and_then(|f| f.arguments.clone())
            .unwrap_or_default(),
    }
}

#[inline]
fn parse_finish_reason(reason: Option<&str>) -> ModelFinishReason {
    match reason {
        Some("tool_calls") | Some("function_call") => ModelFinishReason::ToolCalls,
        _ => ModelFinishReason::Stop,
    }
}
