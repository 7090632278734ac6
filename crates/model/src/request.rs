use serde_json::Value;

/// A request to be sent to the model provider.
///
/// The request is a complete description of one completion call. Fields
/// left as `None` fall back to whatever the provider is configured with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelRequest {
    /// The model to use. `None` selects the provider's default model.
    pub model: Option<String>,
    /// The sampling temperature.
    pub temperature: Option<f32>,
    /// The input messages.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
    /// Whether the model may request several tool calls at once.
    pub parallel_tool_calls: Option<bool>,
    /// Whether the response should be delivered incrementally.
    ///
    /// When this is `false`, the provider asks the backend for a single
    /// complete answer. The response is still consumed through
    /// [`ModelResponse`](crate::ModelResponse) events either way.
    pub stream: bool,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}
