use thiserror::Error;

/// Errors raised by the realtime channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Socket-level failure while connecting, reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An outbound event could not be serialized.
    #[error("failed to encode {event} event: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The channel was closed, or the peer hung up.
    #[error("realtime channel is closed")]
    Closed,
}

/// Why a device location could not be obtained.
///
/// Every variant is recoverable: the user may retry or continue with the
/// fallback coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location access denied. Please enable location permissions and try again.")]
    PermissionDenied,

    #[error("Location information is unavailable.")]
    PositionUnavailable,

    #[error("Location request timed out. Please try again.")]
    Timeout,

    #[error("Geolocation is not supported on this device.")]
    Unsupported,
}
