use serde::{Deserialize, Serialize};
use toolchat_model::ToolCallRequest;

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
    /// Breaks the response with a transport error at this point.
    #[serde(rename = "stream_error")]
    StreamError(String),
}

/// How a preset request fails before producing any response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetFailure {
    #[serde(rename = "transport")]
    Transport,
    #[serde(rename = "rate_limited")]
    RateLimited,
}

/// The preset response for one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// Whether the response carries a choice. A response without choices
    /// ends without emitting any event, including the completion.
    #[serde(default = "default_has_choice")]
    pub has_choice: bool,
    /// If set, the request fails instead of producing a response.
    pub failure: Option<PresetFailure>,
}

#[inline]
fn default_has_choice() -> bool {
    true
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            has_choice: true,
            failure: None,
        }
    }

    /// Creates a `PresetResponse` with a single text message.
    #[inline]
    pub fn with_text<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::MessageDelta(text.into())])
    }

    /// Creates a `PresetResponse` that requests the given tool calls.
    pub fn with_tool_calls<I, N, A>(calls: I) -> Self
    where
        I: IntoIterator<Item = (N, A)>,
        N: Into<String>,
        A: Into<String>,
    {
        let events = calls
            .into_iter()
            .enumerate()
            .map(|(idx, (name, arguments))| {
                PresetEvent::ToolCall(ToolCallRequest {
                    id: format!("call_{idx}"),
                    name: name.into(),
                    arguments: arguments.into(),
                })
            })
            .collect::<Vec<_>>();
        Self::with_events(events)
    }

    /// Creates a `PresetResponse` that has no choices at all.
    #[inline]
    pub fn without_choices() -> Self {
        Self {
            events: vec![],
            has_choice: false,
            failure: None,
        }
    }

    /// Makes the request fail with the given reason.
    #[inline]
    pub fn failing(failure: PresetFailure) -> Self {
        Self {
            events: vec![],
            has_choice: false,
            failure: Some(failure),
        }
    }
}
