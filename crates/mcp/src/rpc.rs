//! JSON-RPC 2.0 framing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    params: Value,
}

impl<'a> RpcRequest<'a> {
    /// A request expecting a response with the same id.
    pub fn call(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method,
            params,
        }
    }

    /// A notification, which is never answered.
    pub fn notification(method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method,
            params,
        }
    }
}

/// The error object of a failed call.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RpcError {
    /// The error code.
    pub code: i64,
    /// A short description.
    pub message: String,
    /// Additional information, if the server sent any.
    #[serde(default)]
    pub data: Option<Value>,
}

/// Any message the server may send: a response, a request, or a
/// notification.
#[derive(Debug, Deserialize)]
pub(crate) struct RpcMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl RpcMessage {
    /// Returns `true` if this is the response to the request with `id`.
    pub fn is_response_to(&self, id: u64) -> bool {
        self.method.is_none()
            && self.id.as_ref().and_then(Value::as_u64) == Some(id)
    }

    /// Turns the response into its result, or its error.
    pub fn into_result(self) -> Result<Value, Error> {
        if let Some(err) = self.error {
            return Err(Error::Rpc(err));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Finds the response to `id` in a JSON body, which is either a single
/// message or a batch.
pub(crate) fn decode_json_body(body: &[u8], id: u64) -> Result<RpcMessage, Error> {
    let messages = match serde_json::from_slice::<Value>(body)? {
        Value::Array(batch) => batch,
        single => vec![single],
    };
    for message in messages {
        let message: RpcMessage = serde_json::from_value(message)?;
        if message.is_response_to(id) {
            return Ok(message);
        }
        skip_message(&message);
    }
    Err(Error::MissingResponse(id))
}

/// Logs a message that is not the awaited response.
pub(crate) fn skip_message(message: &RpcMessage) {
    match &message.method {
        Some(method) => debug!("skipping server message `{method}`"),
        None => warn!("skipping response to unknown request {:?}", message.id),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_serialize_requests() {
        let req = RpcRequest::call(7, "tools/list", json!({ "cursor": "abc" }));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/list",
                "params": { "cursor": "abc" },
            })
        );

        let req = RpcRequest::notification("notifications/initialized", Value::Null);
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })
        );
    }

    #[test]
    fn test_decode_single_response() {
        let body = br#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#;
        let message = decode_json_body(body, 3).unwrap();
        assert_eq!(message.into_result().unwrap(), json!({ "tools": [] }));

        let err = decode_json_body(body, 4).unwrap_err();
        assert!(matches!(err, Error::MissingResponse(4)), "{err:?}");
    }

    #[test]
    fn test_decode_batch() {
        let body = br#"[
            {"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}},
            {"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}
        ]"#;
        let err = decode_json_body(body, 1).unwrap().into_result().unwrap_err();
        let Error::Rpc(err) = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "Method not found");
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_json_body(b"<html>", 1).unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "{err:?}");
    }

    #[test]
    fn test_requests_from_server_are_not_responses() {
        let message: RpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "ping",
        }))
        .unwrap();
        assert!(!message.is_response_to(1));
    }
}
