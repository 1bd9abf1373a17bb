//! Multi-server aggregation
//!
//! One logical connection fanned out over several named sub-servers. Tool
//! names stay disjoint because each sub-connection namespaces its tools with
//! the sub-server name.

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionState, ServerConnection};
use crate::error::BridgeError;
use crate::retry::RetryPolicy;
use crate::tool::CallableTool;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{error, info, warn};

/// Aggregated connection over several sub-servers.
///
/// Partial success is the design point: sub-servers that fail to connect are
/// logged and skipped, and the aggregate counts as connected while at least
/// one sub-connection is live. Even total failure is not an error; it yields
/// an empty tool list with `is_connected() == false`.
pub struct MultiServerConnection {
    name: String,
    connections: Vec<Box<dyn Connection>>,
    state: ConnectionState,
}

impl MultiServerConnection {
    /// Build from a validated `multi` config; every sub-server carries a
    /// unique name by the time validation has passed
    pub fn new(name: impl Into<String>, config: &ServerConfig, defaults: &RetryPolicy) -> Self {
        let connections = config
            .servers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|sub| {
                let sub_name = sub.name.clone().unwrap_or_default();
                Box::new(ServerConnection::new(sub_name, sub.clone(), defaults))
                    as Box<dyn Connection>
            })
            .collect();

        Self::from_connections(name, connections)
    }

    /// Aggregate over pre-built sub-connections
    pub fn from_connections(
        name: impl Into<String>,
        connections: Vec<Box<dyn Connection>>,
    ) -> Self {
        Self {
            name: name.into(),
            connections,
            state: ConnectionState::Disconnected,
        }
    }

    /// Names of sub-servers that are currently connected
    pub fn connected_servers(&self) -> Vec<&str> {
        self.connections
            .iter()
            .filter(|c| c.is_connected())
            .map(|c| c.name())
            .collect()
    }
}

#[async_trait]
impl Connection for MultiServerConnection {
    async fn connect(&mut self) -> Result<Vec<CallableTool>, BridgeError> {
        self.state = ConnectionState::Connecting;

        let results = join_all(self.connections.iter_mut().map(|connection| async move {
            (connection.name().to_string(), connection.connect().await)
        }))
        .await;

        let mut tools = Vec::new();
        let mut failed = 0usize;

        for (server, result) in results {
            match result {
                Ok(mut server_tools) => tools.append(&mut server_tools),
                Err(e) => {
                    error!(%server, %e, "sub-server connection failed");
                    failed += 1;
                }
            }
        }

        if failed == self.connections.len() {
            warn!(aggregate = %self.name, "no sub-servers connected");
            self.state = ConnectionState::Failed;
            return Ok(Vec::new());
        }

        info!(
            aggregate = %self.name,
            connected = self.connections.len() - failed,
            failed,
            tools = tools.len(),
            "aggregate connected"
        );

        self.state = ConnectionState::Connected;
        Ok(tools)
    }

    async fn close(&mut self) -> Result<(), BridgeError> {
        self.state = ConnectionState::Closing;

        // Close everything even when some closes fail
        for connection in &mut self.connections {
            if let Err(e) = connection.close().await {
                error!(server = %connection.name(), %e, "error closing sub-server");
            }
        }

        self.state = ConnectionState::Closed;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connections.iter().any(|c| c.is_connected())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolDescriptor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unreachable(name: &str) -> ServerConfig {
        let mut config =
            ServerConfig::stdio("definitely-not-a-real-binary-xyz", vec![]).named(name);
        config.retry_attempts = Some(1);
        config
    }

    /// Sub-connection with a scripted connect outcome
    struct FixedConnection {
        name: String,
        fail: bool,
        connected: bool,
        closes: Arc<AtomicU32>,
    }

    impl FixedConnection {
        fn new(name: &str, fail: bool) -> Self {
            Self {
                name: name.to_string(),
                fail,
                connected: false,
                closes: Arc::new(AtomicU32::new(0)),
            }
        }

        fn tool(name: &str) -> CallableTool {
            CallableTool::from_sync(
                ToolDescriptor {
                    name: name.to_string(),
                    description: String::new(),
                    parameters: vec![],
                    closed: false,
                },
                |_| Ok(String::new()),
            )
        }
    }

    #[async_trait]
    impl Connection for FixedConnection {
        async fn connect(&mut self) -> Result<Vec<CallableTool>, BridgeError> {
            if self.fail {
                return Err(BridgeError::connection("refused"));
            }
            self.connected = true;
            Ok(vec![Self::tool(&format!("{}_echo", self.name))])
        }

        async fn close(&mut self) -> Result<(), BridgeError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.connected = false;
            if self.fail {
                return Err(BridgeError::connection("close failed"));
            }
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn state(&self) -> ConnectionState {
            if self.connected {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            }
        }
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_surviving_tools() {
        let mut aggregate = MultiServerConnection::from_connections(
            "suite",
            vec![
                Box::new(FixedConnection::new("good", false)),
                Box::new(FixedConnection::new("bad", true)),
            ],
        );

        let tools = aggregate.connect().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "good_echo");
        assert!(aggregate.is_connected());
        assert_eq!(aggregate.state(), ConnectionState::Connected);
        assert_eq!(aggregate.connected_servers(), vec!["good"]);
    }

    #[tokio::test]
    async fn test_all_sub_servers_failing_yields_empty_toolset() {
        let config = ServerConfig::multi(vec![unreachable("a"), unreachable("b")]);
        let mut aggregate = MultiServerConnection::new("suite", &config, &RetryPolicy::default());

        let tools = aggregate.connect().await.unwrap();
        assert!(tools.is_empty());
        assert_eq!(aggregate.state(), ConnectionState::Failed);
        assert!(!aggregate.is_connected());
        assert!(aggregate.connected_servers().is_empty());
    }

    #[tokio::test]
    async fn test_close_visits_every_sub_connection_despite_failures() {
        let failing = FixedConnection::new("a", true);
        let healthy = FixedConnection::new("b", false);
        let a_closes = Arc::clone(&failing.closes);
        let b_closes = Arc::clone(&healthy.closes);

        let mut aggregate = MultiServerConnection::from_connections(
            "suite",
            vec![Box::new(failing), Box::new(healthy)],
        );
        let _ = aggregate.connect().await;
        aggregate.close().await.unwrap();

        // The first close fails, the second still runs
        assert_eq!(a_closes.load(Ordering::SeqCst), 1);
        assert_eq!(b_closes.load(Ordering::SeqCst), 1);
        assert_eq!(aggregate.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_close_is_safe_before_connect() {
        let config = ServerConfig::multi(vec![unreachable("a")]);
        let mut aggregate = MultiServerConnection::new("suite", &config, &RetryPolicy::default());
        aggregate.close().await.unwrap();
        aggregate.close().await.unwrap();
        assert_eq!(aggregate.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_aggregate_reports_name() {
        let config = ServerConfig::multi(vec![unreachable("a")]);
        let aggregate = MultiServerConnection::new("suite", &config, &RetryPolicy::default());
        assert_eq!(aggregate.name(), "suite");
    }
}
