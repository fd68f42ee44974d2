//! Error types for the replication layer.

use tablesync_bus::BusError;
use tablesync_protocol::ProtocolError;
use tablesync_transport::TransportError;

use crate::CallbackId;

/// Errors that can occur in the replication endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// An inbound item on `channel` didn't parse as the expected payload,
    /// or an outbound payload couldn't be encoded.
    #[error("bad payload on {channel}: {source}")]
    Payload {
        channel: String,
        #[source]
        source: ProtocolError,
    },

    /// Only the host may publish on this channel.
    #[error("only the host may publish on {0}")]
    HostOnly(String),

    /// The operation only makes sense on a client endpoint.
    #[error("{0} is only available to clients")]
    ClientOnly(&'static str),

    /// No callback is registered under this id.
    #[error("no callback registered as {0}")]
    UnknownCallback(CallbackId),

    /// The transport refused an outbound frame.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A bus operation failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl ReplicationError {
    pub(crate) fn payload(channel: impl Into<String>, source: ProtocolError) -> Self {
        Self::Payload {
            channel: channel.into(),
            source,
        }
    }
}
