//! Tool call supports.
//!
//! Tools live on a remote host. This module defines what the rest of the
//! crate needs from that host ([`ToolHost`]) and the values flowing through
//! a call.

mod error;

use serde_json::{Map, Value};
use toolchat_model::ModelTool;

pub use error::{Error, ErrorKind};

/// A remote host offering tools to the model.
pub trait ToolHost {
    /// Returns the catalog in the model endpoint's tool format.
    fn tool_definitions(&self) -> Vec<ModelTool>;

    /// Invokes a tool by name with the raw JSON arguments the model emitted.
    ///
    /// A result the tool itself flagged as an error is still `Ok`, see
    /// [`ToolOutput::is_error`].
    fn invoke_tool(
        &self,
        name: &str,
        arguments: &str,
    ) -> impl Future<Output = Result<ToolOutput, Error>> + Send;
}

/// The arguments of a tool call, decoded from the model's JSON string.
///
/// Models sometimes emit arguments that are not a JSON object. Instead of
/// failing the call, such arguments degrade to an empty object and the
/// original text is kept for diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolArguments {
    /// The arguments decoded into an object.
    Parsed(Map<String, Value>),
    /// The arguments could not be decoded, an empty object is sent instead.
    EmptyArgsFallback {
        /// The text the model emitted.
        raw: String,
        /// Why decoding failed.
        reason: String,
    },
}

impl ToolArguments {
    /// Decodes the raw arguments. Blank input and `null` are an empty
    /// object.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::Parsed(Map::new());
        }
        match serde_json::from_str::<Option<Map<String, Value>>>(raw) {
            Ok(map) => Self::Parsed(map.unwrap_or_default()),
            Err(err) => Self::EmptyArgsFallback {
                raw: raw.to_owned(),
                reason: err.to_string(),
            },
        }
    }

    /// Returns `true` if decoding failed.
    #[inline]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::EmptyArgsFallback { .. })
    }

    /// Returns the object to send to the tool host.
    #[inline]
    pub fn into_map(self) -> Map<String, Value> {
        match self {
            Self::Parsed(map) => map,
            Self::EmptyArgsFallback { .. } => Map::new(),
        }
    }
}

/// One item of a tool result.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolContent {
    /// Plain text.
    Text(String),
    /// Base64 encoded image.
    Image {
        /// The encoded bytes.
        data: String,
        /// The MIME type of the image.
        mime_type: String,
    },
    /// Base64 encoded audio.
    Audio {
        /// The encoded bytes.
        data: String,
        /// The MIME type of the audio.
        mime_type: String,
    },
    /// An embedded resource.
    Resource {
        /// The resource URI.
        uri: String,
        /// The text of the resource, if it is a text resource.
        text: Option<String>,
    },
    /// A content kind this client does not understand.
    Unsupported {
        /// The kind tag sent by the host.
        kind: String,
    },
}

impl ToolContent {
    /// Returns the kind tag of this item.
    pub fn kind(&self) -> &str {
        match self {
            ToolContent::Text(_) => "text",
            ToolContent::Image { .. } => "image",
            ToolContent::Audio { .. } => "audio",
            ToolContent::Resource { .. } => "resource",
            ToolContent::Unsupported { kind } => kind,
        }
    }
}

/// The result envelope of a tool call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolOutput {
    /// The content items, in the order the host sent them.
    pub content: Vec<ToolContent>,
    /// Whether the tool reported a failure.
    pub is_error: bool,
}

impl ToolOutput {
    /// Creates a successful output with a single text item.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![ToolContent::Text(text.into())],
            is_error: false,
        }
    }

    /// Returns the text of the first item.
    ///
    /// Only the first item is considered. It fails if there is no content,
    /// or if the first item is not text.
    pub fn first_text(&self) -> Result<&str, Error> {
        match self.content.first() {
            None => Err(Error::empty_result()),
            Some(ToolContent::Text(text)) => Ok(text),
            Some(other) => Err(Error::unexpected_content(other.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_arguments() {
        let args = ToolArguments::parse(r#"{"a":"v"}"#);
        assert!(!args.is_fallback());
        assert_eq!(
            Value::Object(args.into_map()),
            json!({ "a": "v" })
        );
    }

    #[test]
    fn test_parse_blank_arguments() {
        for raw in ["", "  ", "null"] {
            assert_eq!(
                ToolArguments::parse(raw),
                ToolArguments::Parsed(Map::new()),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn test_parse_arguments_fallback() {
        for raw in ["not json", "[1, 2]", r#"{"a": "#] {
            let args = ToolArguments::parse(raw);
            let ToolArguments::EmptyArgsFallback { raw: kept, reason } = &args
            else {
                panic!("expected a fallback for {raw:?}");
            };
            assert_eq!(kept, raw);
            assert!(!reason.is_empty());
            assert!(args.into_map().is_empty());
        }
    }

    #[test]
    fn test_first_text() {
        let output = ToolOutput {
            content: vec![
                ToolContent::Text("first".to_owned()),
                ToolContent::Text("second".to_owned()),
            ],
            is_error: false,
        };
        assert_eq!(output.first_text().unwrap(), "first");

        let err = ToolOutput::default().first_text().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResult);

        let output = ToolOutput {
            content: vec![
                ToolContent::Image {
                    data: "aGk=".to_owned(),
                    mime_type: "image/png".to_owned(),
                },
                ToolContent::Text("ignored".to_owned()),
            ],
            is_error: false,
        };
        let err = output.first_text().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedContent);
        assert!(err.reason().contains("image"), "{err}");
    }
}
