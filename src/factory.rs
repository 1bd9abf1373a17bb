//! Connection factory: transport tag to connection constructor
//!
//! The transport set is a closed sum; this is the one place that maps a
//! validated config onto the matching connection type.

use crate::aggregate::MultiServerConnection;
use crate::config::ServerConfig;
use crate::connection::{Connection, ServerConnection};
use crate::error::BridgeError;
use crate::retry::RetryPolicy;
use tracing::warn;

/// Build a connection for a validated config.
///
/// The config must have passed [`ServerConfig::validate`]; an invalid config
/// surfaces here as a fatal configuration error before anything is opened.
pub fn create_connection(
    name: &str,
    config: &ServerConfig,
    defaults: &RetryPolicy,
) -> Result<Box<dyn Connection>, BridgeError> {
    config.validate()?;

    match config.transport_tag().as_str() {
        "sse" => {
            warn!(
                server = name,
                "the sse transport is deprecated; prefer streamable_http"
            );
            Ok(Box::new(ServerConnection::new(name, config.clone(), defaults)))
        }
        "multi" => Ok(Box::new(MultiServerConnection::new(name, config, defaults))),
        // Remaining tags are single-server transports handled uniformly
        _ => Ok(Box::new(ServerConnection::new(name, config.clone(), defaults))),
    }
}
