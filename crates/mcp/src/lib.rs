//! A client for tool hosts speaking the Model Context Protocol over
//! streamable HTTP.
//!
//! Every message is a JSON-RPC 2.0 `POST` to a single endpoint. The host
//! answers either with a plain JSON body or with an event stream carrying
//! the response among its own notifications.

#[macro_use]
extern crate tracing;

mod proto;
mod rpc;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use toolchat_core::tool::{Error as ToolError, ToolArguments, ToolHost, ToolOutput};
use toolchat_model::ModelTool;
use toolchat_sse::{Chunks, EVENT_STREAM_SUBTYPE, Sse};
use tracing::Instrument;

pub use proto::{Implementation, InputSchema, PROTOCOL_VERSION, Tool};
use proto::{CallToolResult, InitializeResult, ListToolsResult};
pub use rpc::RpcError;
use rpc::{RpcMessage, RpcRequest};

const SESSION_ID_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Errors talking to the tool host.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request could not be sent, or the body could not be read.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The host answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// The status code.
        status: StatusCode,
        /// The response body, possibly empty.
        body: String,
    },
    /// The host answered with something that is neither JSON nor an event
    /// stream.
    #[error("unexpected content type: {0:?}")]
    ContentType(Option<String>),
    /// A message could not be decoded.
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
    /// The event stream broke off.
    #[error("event stream failed: {0}")]
    Stream(#[from] toolchat_sse::Error),
    /// The host answered with a JSON-RPC error.
    #[error("server error {}: {}", .0.code, .0.message)]
    Rpc(RpcError),
    /// The host never answered the request with this id.
    #[error("no response to request {0}")]
    MissingResponse(u64),
    /// [`McpClient::connect`] has not succeeded yet.
    #[error("not connected")]
    NotConnected,
}

impl From<Error> for ToolError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotConnected => ToolError::not_connected(),
            err => ToolError::transport().with_reason(err.to_string()),
        }
    }
}

#[derive(Debug)]
struct Session {
    id: Option<String>,
    protocol_version: String,
}

/// A session with a tool host.
///
/// The client is created disconnected. [`connect`](Self::connect) performs
/// the handshake and caches the tool catalog, [`close`](Self::close) ends
/// the session.
#[derive(Debug)]
pub struct McpClient {
    http: Client,
    url: String,
    client_info: Implementation,
    session: Option<Session>,
    tools: Vec<Tool>,
    next_id: AtomicU64,
}

impl McpClient {
    /// Creates a client for the host at `url`, introducing itself as
    /// `client_info`.
    pub fn new<S: Into<String>>(url: S, client_info: Implementation) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            client_info,
            session: None,
            tools: vec![],
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns `true` once the handshake has succeeded.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the session id assigned by the host, if any.
    #[inline]
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref()?.id.as_deref()
    }

    /// Returns the cached tool catalog.
    #[inline]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Performs the handshake and fetches the whole tool catalog.
    ///
    /// Nothing is retried. Connecting an already connected client only
    /// refreshes the catalog.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.session.is_none() {
            let span = debug_span!("mcp initialize", url = %self.url);
            self.initialize().instrument(span).await?;
        }
        self.tools = self.list_tools().await?;
        info!("{} tools available", self.tools.len());
        Ok(())
    }

    async fn initialize(&mut self) -> Result<(), Error> {
        let id = self.next_id();
        let params = proto::initialize_params(&self.client_info);
        let resp = self.post(&RpcRequest::call(id, "initialize", params)).await?;
        let session_id = resp
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let result: InitializeResult =
            decode_result(read_response(resp, id).await?)?;

        if result.protocol_version != PROTOCOL_VERSION {
            warn!(
                "host speaks protocol {}, continuing anyway",
                result.protocol_version
            );
        }
        info!(
            "connected to {:?} (session {:?})",
            result.server_info, session_id
        );
        self.session = Some(Session {
            id: session_id,
            protocol_version: result.protocol_version,
        });

        self.notify("notifications/initialized").await
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, Error> {
        let mut tools = vec![];
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();
        loop {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let page: ListToolsResult =
                serde_json::from_value(self.request("tools/list", params).await?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if next.is_empty() => break,
                Some(next) if !seen_cursors.insert(next.clone()) => {
                    warn!("host repeated cursor {next:?}, stopping");
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tools)
    }

    /// Describes the cached catalog in the model endpoint's format.
    pub fn describe_tools_for_model(&self) -> Vec<ModelTool> {
        self.tools.iter().map(Tool::to_model_tool).collect()
    }

    /// Calls a tool with the raw JSON arguments emitted by the model.
    ///
    /// Arguments that are not a JSON object are replaced by an empty
    /// object. Results the tool flagged as errors are returned as they are.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &str,
    ) -> Result<ToolOutput, ToolError> {
        if self.session.is_none() {
            return Err(ToolError::not_connected());
        }
        let arguments = ToolArguments::parse(arguments);
        if let ToolArguments::EmptyArgsFallback { raw, reason } = &arguments {
            warn!("invalid arguments for `{name}` ({reason}), sending none: {raw}");
        }
        let params = json!({
            "name": name,
            "arguments": arguments.into_map(),
        });
        let result: CallToolResult =
            decode_result(self.request_message("tools/call", params).await?)?;

        if result.content.is_empty() {
            return Err(ToolError::empty_result()
                .with_reason(format!("no content returned from tool {name}")));
        }
        let output = ToolOutput::from(result);
        if output.is_error {
            warn!("tool `{name}` returned an error result");
        }
        Ok(output)
    }

    /// Ends the session.
    ///
    /// Failures are logged and otherwise ignored. Closing twice, or closing
    /// a client that never connected, does nothing.
    pub async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let Some(session_id) = session.id else {
            return;
        };
        let result = self
            .http
            .delete(&self.url)
            .header(SESSION_ID_HEADER, &session_id)
            .header(PROTOCOL_VERSION_HEADER, &session.protocol_version)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!("session {session_id} closed");
            }
            Ok(resp) if resp.status() == StatusCode::METHOD_NOT_ALLOWED => {
                debug!("host does not support closing sessions");
            }
            Ok(resp) => warn!("failed to close session: {}", resp.status()),
            Err(err) => warn!("failed to close session: {err}"),
        }
    }

    #[inline]
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, Error> {
        self.request_message(method, params).await?.into_result()
    }

    async fn request_message(
        &self,
        method: &str,
        params: Value,
    ) -> Result<RpcMessage, Error> {
        if self.session.is_none() {
            return Err(Error::NotConnected);
        }
        let id = self.next_id();
        trace!("-> {method} ({id})");
        let resp = self.post(&RpcRequest::call(id, method, params)).await?;
        read_response(resp, id).await
    }

    async fn notify(&self, method: &str) -> Result<(), Error> {
        trace!("-> {method}");
        self.post(&RpcRequest::notification(method, Value::Null))
            .await?;
        Ok(())
    }

    async fn post(&self, body: &RpcRequest<'_>) -> Result<Response, Error> {
        let mut req = self
            .http
            .post(&self.url)
            .header(header::ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = &self.session {
            if let Some(id) = &session.id {
                req = req.header(SESSION_ID_HEADER, id);
            }
            req = req.header(PROTOCOL_VERSION_HEADER, &session.protocol_version);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("tool host answered {status}: {body}");
            return Err(Error::Status { status, body });
        }
        Ok(resp)
    }
}

impl ToolHost for McpClient {
    fn tool_definitions(&self) -> Vec<ModelTool> {
        self.describe_tools_for_model()
    }

    async fn invoke_tool(
        &self,
        name: &str,
        arguments: &str,
    ) -> Result<ToolOutput, ToolError> {
        self.call_tool(name, arguments).await
    }
}

fn decode_result<T: DeserializeOwned>(message: RpcMessage) -> Result<T, Error> {
    Ok(serde_json::from_value(message.into_result()?)?)
}

/// Reads the response to request `id`, from either kind of body.
async fn read_response(resp: Response, id: u64) -> Result<RpcMessage, Error> {
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let mime = content_type.as_deref().and_then(|v| v.parse::<Mime>().ok());
    match mime {
        Some(m) if m.subtype().as_str() == EVENT_STREAM_SUBTYPE => {
            let sse = Sse::new(Chunks::from_response(resp));
            read_event_stream(sse, id).await
        }
        Some(m) if m.subtype() == mime::JSON => {
            let body = resp.bytes().await?;
            rpc::decode_json_body(&body, id)
        }
        _ => Err(Error::ContentType(content_type)),
    }
}

/// Reads events until the response to request `id` arrives.
async fn read_event_stream(mut sse: Sse, id: u64) -> Result<RpcMessage, Error> {
    while let Some(data) = sse.next_event().await? {
        let message = match serde_json::from_str::<RpcMessage>(&data) {
            Ok(message) => message,
            Err(err) => {
                warn!("skipping malformed event ({err}): {data}");
                continue;
            }
        };
        if message.is_response_to(id) {
            return Ok(message);
        }
        rpc::skip_message(&message);
    }
    Err(Error::MissingResponse(id))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Bytes;
    use toolchat_core::tool::ErrorKind as ToolErrorKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;

    fn client_for(mock_server: &MockServer) -> McpClient {
        McpClient::new(
            format!("{}/mcp", mock_server.uri()),
            Implementation::new("test", "0.0.0"),
        )
    }

    /// Answers a JSON-RPC call with `result`, echoing the request id.
    fn reply(request: &Request, result: &Value) -> ResponseTemplate {
        let id = request
            .body_json::<Value>()
            .map(|body| body["id"].clone())
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result,
        }))
    }

    /// Same as [`reply`], as an event stream preceded by a notification.
    fn reply_with_events(request: &Request, result: &Value) -> ResponseTemplate {
        let id = request
            .body_json::<Value>()
            .map(|body| body["id"].clone())
            .unwrap_or_default();
        let progress = json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": { "progress": 1 },
        });
        let response = json!({ "jsonrpc": "2.0", "id": id, "result": result });
        let body = format!(
            "event: message\ndata: {progress}\n\nevent: message\ndata: {response}\n\n"
        );
        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
    }

    fn tool(name: &str) -> Value {
        json!({
            "name": name,
            "description": format!("{name} tool"),
            "inputSchema": { "type": "object", "properties": {} },
        })
    }

    async fn mount_initialize(mock_server: &MockServer, session_id: Option<&'static str>) {
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "workspaces", "version": "1.0.0" },
        });
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({ "method": "initialize" })))
            .respond_with(move |request: &Request| {
                let resp = reply(request, &result);
                match session_id {
                    Some(session_id) => resp.insert_header(SESSION_ID_HEADER, session_id),
                    None => resp,
                }
            })
            .expect(1)
            .mount(mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({ "method": "notifications/initialized" })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(mock_server)
            .await;
    }

    #[tokio::test]
    async fn test_connect_call_close() {
        let mock_server = MockServer::start().await;
        mount_initialize(&mock_server, Some("session-1")).await;

        let first_page = json!({
            "tools": [tool("list_workspaces")],
            "nextCursor": "page-2",
        });
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "tools/list" })))
            .and(header(SESSION_ID_HEADER, "session-1"))
            .and(header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION))
            .respond_with(move |request: &Request| reply(request, &first_page))
            .expect(1)
            .mount(&mock_server)
            .await;
        let second_page = json!({ "tools": [tool("start_workspace")] });
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "tools/list",
                "params": { "cursor": "page-2" },
            })))
            .and(header(SESSION_ID_HEADER, "session-1"))
            .respond_with(move |request: &Request| reply(request, &second_page))
            .with_priority(1)
            .expect(1)
            .mount(&mock_server)
            .await;

        let started = json!({ "content": [{ "type": "text", "text": "demo started" }] });
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "tools/call",
                "params": { "name": "start_workspace" },
            })))
            .and(header(SESSION_ID_HEADER, "session-1"))
            .respond_with(move |request: &Request| reply_with_events(request, &started))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/mcp"))
            .and(header(SESSION_ID_HEADER, "session-1"))
            .respond_with(ResponseTemplate::new(405))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut client = client_for(&mock_server);
        client.connect().await.unwrap();
        assert_eq!(client.session_id(), Some("session-1"));
        let names = client
            .describe_tools_for_model()
            .into_iter()
            .map(|tool| tool.name)
            .collect::<Vec<_>>();
        assert_eq!(names, ["list_workspaces", "start_workspace"]);

        let output = client.call_tool("start_workspace", "not json").await.unwrap();
        assert_eq!(output.first_text().unwrap(), "demo started");

        // Unparsable arguments go out as an empty object.
        let requests = mock_server.received_requests().await.unwrap();
        let call = requests
            .iter()
            .filter_map(|request| request.body_json::<Value>().ok())
            .find(|body| body["method"] == "tools/call")
            .unwrap();
        assert_eq!(call["params"]["arguments"], json!({}));

        client.close().await;
        client.close().await;
        assert!(!client.is_connected());
        mock_server.verify().await;
    }

    #[tokio::test]
    async fn test_cursor_cycle_stops_listing() {
        let mock_server = MockServer::start().await;
        mount_initialize(&mock_server, None).await;

        let pages = [
            (None, json!({ "tools": [tool("a")], "nextCursor": "cursor-a" })),
            (Some("cursor-a"), json!({ "tools": [tool("b")], "nextCursor": "cursor-b" })),
            (Some("cursor-b"), json!({ "tools": [tool("c")], "nextCursor": "cursor-a" })),
        ];
        for (cursor, page) in pages {
            let (mock, priority) = match cursor {
                Some(cursor) => (
                    Mock::given(body_partial_json(json!({
                        "method": "tools/list",
                        "params": { "cursor": cursor },
                    }))),
                    1,
                ),
                None => (Mock::given(body_partial_json(json!({ "method": "tools/list" }))), 5),
            };
            mock.respond_with(move |request: &Request| reply(request, &page))
                .with_priority(priority)
                .expect(1)
                .mount(&mock_server)
                .await;
        }
        // Without a session id there is nothing to delete.
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let mut client = client_for(&mock_server);
        client.connect().await.unwrap();
        assert_eq!(client.session_id(), None);
        assert_eq!(client.tools().len(), 3);

        client.close().await;
        mock_server.verify().await;
    }

    #[tokio::test]
    async fn test_connect_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let mut client = client_for(&mock_server);
        let err = client.connect().await.unwrap_err();
        assert!(
            matches!(&err, Error::Status { status, body } if status.as_u16() == 500 && body == "boom"),
            "{err:?}"
        );
        assert!(!client.is_connected());

        let err = client.call_tool("list_workspaces", "{}").await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_unexpected_content_type() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("hello", "text/plain"))
            .mount(&mock_server)
            .await;

        let mut client = client_for(&mock_server);
        let err = client.connect().await.unwrap_err();
        assert!(
            matches!(&err, Error::ContentType(Some(content_type)) if content_type == "text/plain"),
            "{err:?}"
        );
    }

    fn sse_from(chunks: &[&'static str]) -> Sse {
        let chunks = chunks
            .iter()
            .map(|chunk| Bytes::from_static(chunk.as_bytes()))
            .collect::<VecDeque<_>>();
        Sse::new(Chunks::from_vec_deque(chunks))
    }

    #[tokio::test]
    async fn test_read_event_stream() {
        let sse = sse_from(&[
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n\n",
            "data: not json\n\n",
            "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,",
            "\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"ok\"}]}}\n\n",
        ]);
        let message = read_event_stream(sse, 2).await.unwrap();
        let result: CallToolResult = decode_result(message).unwrap();
        let output = ToolOutput::from(result);
        assert_eq!(output.first_text().unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_read_event_stream_without_response() {
        let sse = sse_from(&[
            "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n",
        ]);
        let err = read_event_stream(sse, 2).await.unwrap_err();
        assert!(matches!(err, Error::MissingResponse(2)), "{err:?}");
    }

    #[tokio::test]
    async fn test_read_event_stream_error_response() {
        let sse = sse_from(&[
            "data: {\"jsonrpc\":\"2.0\",\"id\":5,\"error\":{\"code\":-32602,\"message\":\"Unknown tool\"}}\n\n",
        ]);
        let message = read_event_stream(sse, 5).await.unwrap();
        let err = decode_result::<CallToolResult>(message).unwrap_err();
        assert!(matches!(&err, Error::Rpc(rpc) if rpc.code == -32602), "{err:?}");

        let err = ToolError::from(err);
        assert_eq!(err.kind(), ToolErrorKind::Transport);
        assert!(err.reason().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_disconnected_client() {
        let mut client =
            McpClient::new("http://127.0.0.1:9/mcp", Implementation::new("test", "0.0.0"));
        assert!(!client.is_connected());
        assert!(client.describe_tools_for_model().is_empty());

        let err = client.call_tool("list_workspaces", "{}").await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::NotConnected);

        // Closing never fails, even twice.
        client.close().await;
        client.close().await;
        assert!(client.session_id().is_none());
    }
}
