// ── Core error types ──
//
// User-facing errors from zwbridge-core. Consumers never see raw gateway
// or frame errors directly; the `From<zwbridge_api::Error>` impl wraps
// them into domain variants.

use thiserror::Error;
use zwbridge_api::{CommandClassId, NodeId};

use crate::model::ValueKey;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Z-Wave network not connected")]
    NotConnected,

    #[error("Failed to start driver on {port}")]
    ConnectionFailed { port: String },

    #[error("Connection attempt on {port} was cancelled")]
    ConnectionCancelled { port: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Unsupported class {class_id} on node {node_id}")]
    UnsupportedClass {
        node_id: NodeId,
        class_id: CommandClassId,
    },

    #[error("Node {node_id} has no value at {key} ({event})")]
    InconsistentValue {
        node_id: NodeId,
        key: ValueKey,
        event: &'static str,
    },

    #[error("Unknown node: {node_id}")]
    UnknownNode { node_id: NodeId },

    #[error("Node {node_id} is no longer registered")]
    NodeGone { node_id: NodeId },

    #[error("Node {node_id} has not finished its interview")]
    NodeNotReady { node_id: NodeId },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Settings errors ──────────────────────────────────────────────
    #[error("Settings error: {message}")]
    Settings { message: String },

    // ── Driver errors (wrapped, not exposed raw) ─────────────────────
    #[error("Driver error: {message}")]
    Driver {
        message: String,
        /// Whether the underlying transport failure is worth retrying.
        transient: bool,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<zwbridge_api::Error> for CoreError {
    fn from(err: zwbridge_api::Error) -> Self {
        match err {
            zwbridge_api::Error::Closed => CoreError::Driver {
                message: "driver is shut down".into(),
                transient: false,
            },
            zwbridge_api::Error::InvalidUrl(e) => CoreError::ValidationFailed {
                message: format!("Invalid gateway URL: {e}"),
            },
            zwbridge_api::Error::Encode(e) => {
                CoreError::Internal(format!("Failed to encode driver command: {e}"))
            }
            zwbridge_api::Error::Decode { message, frame: _ } => {
                CoreError::Internal(format!("Failed to decode driver event: {message}"))
            }
            other => CoreError::Driver {
                transient: other.is_transient(),
                message: other.to_string(),
            },
        }
    }
}
