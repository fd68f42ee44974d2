//! Unified error type for tablesync.

use tablesync_bus::BusError;
use tablesync_protocol::ProtocolError;
use tablesync_replication::ReplicationError;
use tablesync_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum TablesyncError {
    /// Binding, connecting, or sending failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Bytes that don't parse as a frame, envelope, or payload.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A stale mailbox handle.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The endpoint refused an operation.
    #[error(transparent)]
    Replication(#[from] ReplicationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let err: TablesyncError = err.into();
        assert!(matches!(err, TablesyncError::Transport(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let err: TablesyncError = err.into();
        assert!(matches!(err, TablesyncError::Protocol(_)));
    }

    #[test]
    fn test_from_replication_error() {
        let err = ReplicationError::HostOnly("PLAYER_VIEW".into());
        let err: TablesyncError = err.into();
        assert!(matches!(err, TablesyncError::Replication(_)));
        assert!(err.to_string().contains("PLAYER_VIEW"));
    }
}
