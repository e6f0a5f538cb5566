use thiserror::Error;

/// Top-level error type for the `zwbridge-api` crate.
///
/// Covers every failure mode at the driver boundary: the gateway
/// socket, frame encoding/decoding, and a closed command sink.
/// `zwbridge-core` wraps these into its own error type.
#[derive(Debug, Error)]
pub enum Error {
    // ── Gateway transport ───────────────────────────────────────────
    /// WebSocket connection to the driver gateway failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// Gateway URL could not be parsed.
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Frames ──────────────────────────────────────────────────────
    /// A driver command could not be serialized.
    #[error("Failed to encode driver command: {0}")]
    Encode(#[source] serde_json::Error),

    /// An inbound frame was not a valid driver event, with the raw frame for debugging.
    #[error("Failed to decode driver event: {message}")]
    Decode { message: String, frame: String },

    // ── Command sink ────────────────────────────────────────────────
    /// The driver no longer accepts commands (shut down or dropped).
    #[error("Driver command channel closed")]
    Closed,
}

impl Error {
    /// Returns `true` if this is a transient transport error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WebSocketConnect(_) | Self::WebSocketClosed { .. })
    }
}
