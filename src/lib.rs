//! Client layer for MCP tool servers
//!
//! Connects to tool servers over stdio, legacy HTTP+SSE, streamable HTTP, or
//! WebSocket, translates their JSON-Schema tool definitions into validated
//! parameter contracts, and exposes everything as uniform [`CallableTool`]s
//! that can be invoked from both async and blocking call sites.
//!
//! The high-level entry point is [`ToolLoader`], which reads a YAML
//! composition document, resolves each entry against the [`ToolRegistry`]
//! catalog, connects external servers concurrently with retry/backoff, and
//! owns the resulting connections until [`ToolLoader::close_all`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use toolbridge::{CompositionDoc, ToolLoader, ToolRegistry};
//!
//! # async fn run() -> Result<(), toolbridge::BridgeError> {
//! let registry = Arc::new(ToolRegistry::with_descriptor_dir("config/servers"));
//! let mut loader = ToolLoader::new(registry);
//!
//! let doc = CompositionDoc::from_file("config/tools.yaml".as_ref())?;
//! loader.load(&doc).await?;
//!
//! for tool in loader.get_tools() {
//!     println!("{}: {}", tool.name(), tool.description());
//! }
//!
//! loader.close_all().await;
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod connection;
pub mod error;
pub mod factory;
pub mod loader;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod session;
pub mod tool;
pub mod transport;
pub mod types;

pub use aggregate::MultiServerConnection;
pub use config::{ServerConfig, TransportConfig};
pub use connection::{Connection, ConnectionState, ServerConnection};
pub use error::BridgeError;
pub use factory::create_connection;
pub use loader::{CompositionDoc, LoadSummary, ToolLoader};
pub use protocol::{Message, Notification, Request, RequestId, Response};
pub use registry::{CatalogEntry, InternalToolFactory, ToolRegistry};
pub use retry::{RetryObserver, RetryPolicy, retry};
pub use schema::{translate_schema, validate_arguments, wrap_remote_tool};
pub use session::McpSession;
pub use tool::{CallableTool, ToolHandler};
pub use transport::{
    SseTransport, StdioTransport, StreamableHttpTransport, Transport, WebSocketTransport,
};
pub use types::{
    ItemKind, ParamKind, ParamSpec, RemoteTool, ServerInfo, ToolCallResult, ToolDescriptor,
};
