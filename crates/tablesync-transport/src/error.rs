use tablesync_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing to a socket failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading from a socket failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listening socket failed.
    #[error("bind to {addr} failed: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The host name could not be resolved.
    #[error("could not resolve {addr}: {source}")]
    ResolveFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Every resolved address refused the connection.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The host refused a `JOIN` (reserved or duplicate client id).
    #[error("join refused: {0}")]
    JoinRefused(String),

    /// The peer sent bytes that don't parse as a frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The background runtime or thread could not be started.
    #[error("could not start I/O thread: {0}")]
    Runtime(#[source] std::io::Error),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
