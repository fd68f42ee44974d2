//! Host configuration.

use serde::{Deserialize, Serialize};
use tablesync_protocol::SessionInfo;

/// Settings for a host endpoint.
///
/// Sent to each client in `JOIN_ACCEPT` (session id and name) and shown
/// as roster entry 0 (host name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Identifies this session to joining clients.
    pub session_id: u64,

    /// Human-readable session name.
    pub session_name: String,

    /// The host's own roster name.
    pub host_name: String,
}

impl HostConfig {
    pub(crate) fn session(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id,
            session_name: self.session_name.clone(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            session_id: 1,
            session_name: "tablesync".to_string(),
            host_name: "host".to_string(),
        }
    }
}
