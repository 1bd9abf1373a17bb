//! Callable tools: the uniform unit every provider produces
//!
//! A `CallableTool` pairs an immutable descriptor with a handler body. Handler
//! bodies come in two flavors, async and sync, and every tool is invocable
//! from both async and blocking call sites regardless of which flavor it
//! carries.

use crate::error::BridgeError;
use crate::types::ToolDescriptor;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

type AsyncBody =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<String, BridgeError>> + Send + Sync>;
type SyncBody = Arc<dyn Fn(Value) -> Result<String, BridgeError> + Send + Sync>;

/// The body of a tool
#[derive(Clone)]
pub enum ToolHandler {
    Async(AsyncBody),
    Sync(SyncBody),
}

/// A ready-to-invoke tool with a validated parameter contract.
///
/// Invocation never returns `Err` to the caller for validation or execution
/// failures; those are folded into a structured JSON error payload so that a
/// misbehaving tool cannot take down the caller's control loop.
#[derive(Clone)]
pub struct CallableTool {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
}

impl CallableTool {
    pub fn new(descriptor: ToolDescriptor, handler: ToolHandler) -> Self {
        Self {
            descriptor,
            handler,
        }
    }

    /// Build a tool from an async closure
    pub fn from_async<F, Fut>(descriptor: ToolDescriptor, body: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, BridgeError>> + Send + 'static,
    {
        let body = Arc::new(body);
        Self::new(
            descriptor,
            ToolHandler::Async(Arc::new(move |args| Box::pin(body(args)))),
        )
    }

    /// Build a tool from a blocking closure
    pub fn from_sync<F>(descriptor: ToolDescriptor, body: F) -> Self
    where
        F: Fn(Value) -> Result<String, BridgeError> + Send + Sync + 'static,
    {
        Self::new(descriptor, ToolHandler::Sync(Arc::new(body)))
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Invoke from an async context.
    ///
    /// Sync bodies run on the blocking pool so a long-running tool cannot
    /// stall the reactor.
    pub async fn invoke(&self, arguments: Value) -> String {
        let args = match crate::schema::validate_arguments(&self.descriptor, arguments) {
            Ok(args) => args,
            Err(e) => return self.error_payload(&e),
        };

        let result = match &self.handler {
            ToolHandler::Async(body) => body(args).await,
            ToolHandler::Sync(body) => {
                let body = Arc::clone(body);
                match tokio::task::spawn_blocking(move || body(args)).await {
                    Ok(result) => result,
                    Err(e) => Err(BridgeError::execution(
                        &self.descriptor.name,
                        format!("tool task panicked: {}", e),
                    )),
                }
            }
        };

        match result {
            Ok(output) => output,
            Err(e) => self.error_payload(&e),
        }
    }

    /// Invoke from a blocking context.
    ///
    /// Async bodies are driven to completion here: inside a multi-thread
    /// runtime the current worker is parked via `block_in_place`; outside any
    /// runtime a throwaway current-thread runtime is spun up.
    pub fn invoke_blocking(&self, arguments: Value) -> String {
        let args = match crate::schema::validate_arguments(&self.descriptor, arguments) {
            Ok(args) => args,
            Err(e) => return self.error_payload(&e),
        };

        let result = match &self.handler {
            ToolHandler::Sync(body) => body(args),
            ToolHandler::Async(body) => self.block_on_body(body(args)),
        };

        match result {
            Ok(output) => output,
            Err(e) => self.error_payload(&e),
        }
    }

    /// Drive an async body to completion from a blocking context.
    ///
    /// On a multi-thread runtime worker, `block_in_place` parks the worker
    /// safely. Everywhere else (no runtime, a current-thread runtime, or a
    /// blocking-pool thread) the future runs on a throwaway current-thread
    /// runtime on a dedicated thread.
    fn block_on_body(
        &self,
        fut: BoxFuture<'static, Result<String, BridgeError>>,
    ) -> Result<String, BridgeError> {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread {
                return tokio::task::block_in_place(|| handle.block_on(fut));
            }
        }

        let name = self.descriptor.name.clone();
        std::thread::scope(|scope| {
            scope
                .spawn(move || {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(|e| {
                            BridgeError::execution(&name, format!("failed to build runtime: {}", e))
                        })?;
                    runtime.block_on(fut)
                })
                .join()
                .unwrap_or_else(|_| {
                    Err(BridgeError::execution(
                        &self.descriptor.name,
                        "tool task panicked",
                    ))
                })
        })
    }

    fn error_payload(&self, error: &BridgeError) -> String {
        warn!(tool = %self.descriptor.name, %error, "tool invocation failed");
        json!({
            "error": error.to_string(),
            "errorKind": error.kind(),
            "toolName": self.descriptor.name,
        })
        .to_string()
    }
}

impl std::fmt::Debug for CallableTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableTool")
            .field("name", &self.descriptor.name)
            .field(
                "handler",
                &match self.handler {
                    ToolHandler::Async(_) => "async",
                    ToolHandler::Sync(_) => "sync",
                },
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParamKind, ParamSpec};

    fn echo_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "echo".to_string(),
            description: "Echo the message back".to_string(),
            parameters: vec![ParamSpec {
                name: "message".to_string(),
                description: String::new(),
                kind: ParamKind::String,
                required: true,
                default: None,
                enum_values: None,
            }],
            closed: false,
        }
    }

    fn echo_async() -> CallableTool {
        CallableTool::from_async(echo_descriptor(), |args| async move {
            Ok(args["message"].as_str().unwrap_or_default().to_string())
        })
    }

    fn echo_sync() -> CallableTool {
        CallableTool::from_sync(echo_descriptor(), |args| {
            Ok(args["message"].as_str().unwrap_or_default().to_string())
        })
    }

    #[tokio::test]
    async fn test_async_invoke_async_body() {
        let out = echo_async().invoke(json!({"message": "hi"})).await;
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn test_async_invoke_sync_body_runs_on_blocking_pool() {
        let out = echo_sync().invoke(json!({"message": "hi"})).await;
        assert_eq!(out, "hi");
    }

    #[test]
    fn test_blocking_invoke_sync_body_outside_runtime() {
        let out = echo_sync().invoke_blocking(json!({"message": "hi"}));
        assert_eq!(out, "hi");
    }

    #[test]
    fn test_blocking_invoke_async_body_outside_runtime() {
        let out = echo_async().invoke_blocking(json!({"message": "hi"}));
        assert_eq!(out, "hi");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_invoke_async_body_inside_runtime() {
        let tool = echo_async();
        let out = tokio::task::spawn_blocking(move || tool.invoke_blocking(json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn test_missing_required_yields_error_payload() {
        let out = echo_async().invoke(json!({})).await;
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(payload["errorKind"], "ValidationError");
        assert_eq!(payload["toolName"], "echo");
        assert!(payload["error"].as_str().unwrap().contains("message"));
    }

    #[tokio::test]
    async fn test_execution_failure_yields_error_payload() {
        let tool = CallableTool::from_sync(echo_descriptor(), |_| {
            Err(BridgeError::execution("echo", "boom"))
        });
        let out = tool.invoke(json!({"message": "x"})).await;
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(payload["errorKind"], "ExecutionError");
        assert!(payload["error"].as_str().unwrap().contains("boom"));
    }
}
