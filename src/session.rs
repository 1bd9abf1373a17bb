//! MCP session: handshake and tool operations over a transport

use crate::error::BridgeError;
use crate::protocol::{
    Message, Notification, PROTOCOL_VERSION, Request, RequestId, Response, methods,
};
use crate::transport::Transport;
use crate::types::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, RemoteTool, ServerInfo,
    ToolCallResult,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// A live session with one tool server.
///
/// Owns the transport; every tool wrapped from this session shares it through
/// an `Arc`, so the session stays alive as long as any of its tools do.
pub struct McpSession {
    transport: Mutex<Box<dyn Transport>>,
    server_info: RwLock<Option<ServerInfo>>,
    request_id: AtomicI64,
    initialized: RwLock<bool>,
}

impl McpSession {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Mutex::new(transport),
            server_info: RwLock::new(None),
            request_id: AtomicI64::new(1),
            initialized: RwLock::new(false),
        }
    }

    /// Perform the initialize handshake.
    ///
    /// Failures here are transport- or protocol-level and therefore
    /// retryable by the connection layer.
    pub async fn initialize(&self) -> Result<ServerInfo, BridgeError> {
        if *self.initialized.read().await {
            return Err(BridgeError::protocol("session already initialized"));
        }

        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo::default(),
        };

        let result: InitializeResult = self.call(methods::INITIALIZE, Some(json!(params))).await?;

        *self.server_info.write().await = Some(result.server_info.clone());
        *self.initialized.write().await = true;

        self.notify(methods::INITIALIZED, None).await?;

        debug!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            "handshake complete"
        );

        Ok(result.server_info)
    }

    pub async fn is_initialized(&self) -> bool {
        *self.initialized.read().await
    }

    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().await.clone()
    }

    /// Request the server's tool list
    pub async fn list_tools(&self) -> Result<Vec<RemoteTool>, BridgeError> {
        self.ensure_initialized().await?;

        let result: Value = self.call(methods::TOOLS_LIST, None).await?;
        let tools: Vec<RemoteTool> =
            serde_json::from_value(result["tools"].clone()).unwrap_or_default();

        Ok(tools)
    }

    /// Invoke a remote tool; the result is normalized to its joined text
    /// content, error-flagged results surfacing as execution errors
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, BridgeError> {
        self.ensure_initialized().await?;

        let params = json!({
            "name": name,
            "arguments": arguments,
        });

        let result: ToolCallResult = self.call(methods::TOOLS_CALL, Some(params)).await?;
        let text = result.joined_text();

        if result.is_error {
            Err(BridgeError::execution(name, text))
        } else {
            Ok(text)
        }
    }

    pub async fn close(&self) -> Result<(), BridgeError> {
        let mut transport = self.transport.lock().await;
        transport.close().await?;
        *self.initialized.write().await = false;
        Ok(())
    }

    async fn call<T>(&self, method: &str, params: Option<Value>) -> Result<T, BridgeError>
    where
        T: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let expected = id.to_string();

        let mut request = Request::new(id, method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        // Hold the transport across send and receive; responses are matched
        // by id, so interleaved requests on one session serialize here
        let mut transport = self.transport.lock().await;
        transport.send(Message::Request(request)).await?;

        let response = Self::receive_response(&mut **transport, &expected).await?;
        match response.into_result() {
            Ok(value) => serde_json::from_value(value).map_err(BridgeError::from),
            Err(e) => Err(BridgeError::server(e.code, e.message)),
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), BridgeError> {
        let mut notification = Notification::new(method);
        if let Some(p) = params {
            notification = notification.with_params(p);
        }

        let mut transport = self.transport.lock().await;
        transport.send(Message::Notification(notification)).await
    }

    async fn receive_response(
        transport: &mut dyn Transport,
        expected_id: &str,
    ) -> Result<Response, BridgeError> {
        loop {
            match transport.receive().await? {
                Message::Response(response) => {
                    if response.id.to_string() == expected_id {
                        return Ok(response);
                    }
                    // Stale response from an abandoned request; skip
                }
                // Server notifications and requests are outside this layer's
                // contract; discard them
                Message::Notification(_) | Message::Request(_) => {}
            }
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn ensure_initialized(&self) -> Result<(), BridgeError> {
        if !*self.initialized.read().await {
            return Err(BridgeError::protocol("session not initialized"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RpcError;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Transport fed from a scripted queue of responses
    struct ScriptedTransport {
        sent: Vec<Message>,
        replies: VecDeque<Message>,
        connected: bool,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Message>) -> Self {
            Self {
                sent: Vec::new(),
                replies: replies.into(),
                connected: true,
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, message: Message) -> Result<(), BridgeError> {
            self.sent.push(message);
            Ok(())
        }

        async fn receive(&mut self) -> Result<Message, BridgeError> {
            self.replies
                .pop_front()
                .ok_or_else(|| BridgeError::connection("script exhausted"))
        }

        async fn close(&mut self) -> Result<(), BridgeError> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    fn init_response(id: i64) -> Message {
        Message::Response(Response::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "serverInfo": {"name": "scripted", "version": "1.0"}
            }),
        ))
    }

    #[tokio::test]
    async fn test_initialize_records_server_info() {
        let transport = ScriptedTransport::new(vec![init_response(1)]);
        let session = McpSession::new(Box::new(transport));

        let info = session.initialize().await.unwrap();
        assert_eq!(info.name, "scripted");
        assert!(session.is_initialized().await);
        assert_eq!(session.server_info().await.unwrap().version, "1.0");
    }

    #[tokio::test]
    async fn test_double_initialize_rejected() {
        let transport = ScriptedTransport::new(vec![init_response(1)]);
        let session = McpSession::new(Box::new(transport));
        session.initialize().await.unwrap();

        let result = session.initialize().await;
        assert!(matches!(result, Err(BridgeError::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_list_tools_before_initialize_fails() {
        let transport = ScriptedTransport::new(vec![]);
        let session = McpSession::new(Box::new(transport));
        assert!(matches!(
            session.list_tools().await,
            Err(BridgeError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_tools_parses_result() {
        let transport = ScriptedTransport::new(vec![
            init_response(1),
            Message::Response(Response::success(
                2i64,
                json!({"tools": [
                    {"name": "echo", "description": "Echo input", "inputSchema": {}}
                ]}),
            )),
        ]);
        let session = McpSession::new(Box::new(transport));
        session.initialize().await.unwrap();

        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
    }

    #[tokio::test]
    async fn test_call_tool_joins_text_content() {
        let transport = ScriptedTransport::new(vec![
            init_response(1),
            Message::Response(Response::success(
                2i64,
                json!({"content": [
                    {"type": "text", "text": "hello"},
                    {"type": "text", "text": "world"}
                ], "isError": false}),
            )),
        ]);
        let session = McpSession::new(Box::new(transport));
        session.initialize().await.unwrap();

        let text = session.call_tool("echo", json!({"msg": "hi"})).await.unwrap();
        assert_eq!(text, "hello\nworld");
    }

    #[tokio::test]
    async fn test_call_tool_error_flag_becomes_execution_error() {
        let transport = ScriptedTransport::new(vec![
            init_response(1),
            Message::Response(Response::success(
                2i64,
                json!({"content": [{"type": "text", "text": "disk full"}], "isError": true}),
            )),
        ]);
        let session = McpSession::new(Box::new(transport));
        session.initialize().await.unwrap();

        let result = session.call_tool("write", json!({})).await;
        match result {
            Err(BridgeError::Execution { tool, message }) => {
                assert_eq!(tool, "write");
                assert_eq!(message, "disk full");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rpc_error_becomes_server_error() {
        let transport = ScriptedTransport::new(vec![
            init_response(1),
            Message::Response(Response::error(2i64, RpcError::new(-32601, "no such method"))),
        ]);
        let session = McpSession::new(Box::new(transport));
        session.initialize().await.unwrap();

        let result = session.list_tools().await;
        assert!(matches!(result, Err(BridgeError::Server { code: -32601, .. })));
    }

    #[tokio::test]
    async fn test_close_resets_initialized() {
        let transport = ScriptedTransport::new(vec![init_response(1)]);
        let session = McpSession::new(Box::new(transport));
        session.initialize().await.unwrap();
        session.close().await.unwrap();
        assert!(!session.is_initialized().await);
    }
}
