use thiserror::Error;

/// Represents the errors that can occur anywhere in the relay server.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Represents a general connection error.
    ///
    /// This error occurs when the WebSocket handshake or a socket read fails.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Indicates that the server refused a connection because it is full.
    #[error("Connection limit of {0} reached")]
    ConnectionLimit(usize),

    /// Represents an error related to WebSocket envelope handling.
    ///
    /// This error occurs when frames are malformed or fail to be processed.
    #[error("Message error: {0}")]
    MessageError(#[from] crate::server::message::MessageError),

    /// A stroke or frame request was rejected by the canvas.
    #[error("Canvas error: {0}")]
    CanvasError(#[from] crate::canvas::CanvasError),

    /// Indicates a failure in serializing or deserializing data.
    ///
    /// This can happen when converting events to or from JSON.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Represents an error in the server configuration.
    ///
    /// This occurs when an invalid or inconsistent configuration is detected.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Represents an error related to client operations.
    ///
    /// This includes failing to queue a frame for a client that went away.
    #[error("Client error: {0}")]
    ClientError(#[from] crate::server::client::ClientError),

    /// Metric registration or exposition failed.
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    /// A listener could not be bound or served.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Implements conversion from `serde_json::Error` to `RelayError`.
///
/// This allows serialization errors to be automatically converted into
/// `RelayError::SerializationError`.
impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::SerializationError(err.to_string())
    }
}
