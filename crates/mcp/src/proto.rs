//! MCP messages exchanged with the tool host.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use toolchat_core::tool::{ToolContent, ToolOutput};
use toolchat_model::ModelTool;

/// The protocol revision this client speaks.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Name and version of a client or server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Program name.
    pub name: String,
    /// Program version.
    pub version: String,
}

impl Implementation {
    /// Creates an identity.
    #[inline]
    pub fn new<N: Into<String>, V: Into<String>>(name: N, version: V) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

pub(crate) fn initialize_params(client_info: &Implementation) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": client_info,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub server_info: Option<Implementation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A tool as described by the host.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique name of the tool.
    pub name: String,
    /// What the tool does.
    #[serde(default)]
    pub description: Option<String>,
    /// The parameters the tool accepts.
    #[serde(default)]
    pub input_schema: InputSchema,
}

/// The JSON schema of a tool's parameters. Only the parts the model needs
/// are kept.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct InputSchema {
    /// Parameter schemas by name.
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
    /// Names of the mandatory parameters.
    #[serde(default)]
    pub required: Option<Vec<String>>,
}

impl Tool {
    /// Converts the description to the model endpoint's format.
    ///
    /// Missing properties become an empty object, and a missing required
    /// list becomes an empty list.
    pub fn to_model_tool(&self) -> ModelTool {
        let properties = self.input_schema.properties.clone().unwrap_or_default();
        let required = self.input_schema.required.clone().unwrap_or_default();
        ModelTool {
            name: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        Self {
            content: result.content.into_iter().map(convert_content).collect(),
            is_error: result.is_error,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum KnownContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: EmbeddedResource,
    },
}

#[derive(Deserialize)]
struct EmbeddedResource {
    uri: String,
    #[serde(default)]
    text: Option<String>,
}

fn convert_content(item: Value) -> ToolContent {
    let kind = item
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned();
    match serde_json::from_value::<KnownContent>(item) {
        Ok(KnownContent::Text { text }) => ToolContent::Text(text),
        Ok(KnownContent::Image { data, mime_type }) => {
            ToolContent::Image { data, mime_type }
        }
        Ok(KnownContent::Audio { data, mime_type }) => {
            ToolContent::Audio { data, mime_type }
        }
        Ok(KnownContent::Resource { resource }) => ToolContent::Resource {
            uri: resource.uri,
            text: resource.text,
        },
        Err(err) => {
            trace!("unsupported content `{kind}`: {err}");
            ToolContent::Unsupported { kind }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_to_model_tool() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "start_workspace",
            "description": "Starts a workspace",
            "inputSchema": {
                "type": "object",
                "properties": { "a": { "type": "string" } },
                "required": ["a"],
            },
        }))
        .unwrap();

        let model_tool = tool.to_model_tool();
        assert_eq!(model_tool.name, "start_workspace");
        assert_eq!(model_tool.description, "Starts a workspace");
        assert_eq!(
            model_tool.parameters,
            json!({
                "type": "object",
                "properties": { "a": { "type": "string" } },
                "required": ["a"],
            })
        );
    }

    #[test]
    fn test_tool_without_schema_fields() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "list_workspaces",
            "inputSchema": { "type": "object" },
        }))
        .unwrap();
        assert_eq!(
            tool.to_model_tool().parameters,
            json!({ "type": "object", "properties": {}, "required": [] })
        );

        let tool: Tool =
            serde_json::from_value(json!({ "name": "ping" })).unwrap();
        assert_eq!(tool.to_model_tool().description, "");
        assert_eq!(
            tool.to_model_tool().parameters,
            json!({ "type": "object", "properties": {}, "required": [] })
        );
    }

    #[test]
    fn test_call_tool_result() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "demo is running" },
                { "type": "image", "data": "aGk=", "mimeType": "image/png" },
                {
                    "type": "resource",
                    "resource": { "uri": "file:///log.txt", "text": "ok" },
                },
                { "type": "resource_link", "uri": "file:///other.txt" },
            ],
            "isError": true,
        }))
        .unwrap();

        let output = ToolOutput::from(result);
        assert!(output.is_error);
        assert_eq!(
            output.content,
            [
                ToolContent::Text("demo is running".to_owned()),
                ToolContent::Image {
                    data: "aGk=".to_owned(),
                    mime_type: "image/png".to_owned(),
                },
                ToolContent::Resource {
                    uri: "file:///log.txt".to_owned(),
                    text: Some("ok".to_owned()),
                },
                ToolContent::Unsupported {
                    kind: "resource_link".to_owned(),
                },
            ]
        );
        assert_eq!(output.first_text().unwrap(), "demo is running");
    }

    #[test]
    fn test_initialize_params() {
        let params = initialize_params(&Implementation::new("toolchat", "0.0.0"));
        assert_eq!(
            params,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "toolchat", "version": "0.0.0" },
            })
        );
    }
}
