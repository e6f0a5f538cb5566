//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use zwbridge_config::ConfigError;
use zwbridge_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Z-Wave network not connected")]
    #[diagnostic(
        code(zwbridge::not_connected),
        help(
            "Check that the driver gateway is running and the controller is plugged in.\n\
             Try: zwbridge status"
        )
    )]
    NotConnected,

    #[error("No serial port configured")]
    #[diagnostic(
        code(zwbridge::no_port),
        help("Store one with: zwbridge connect /dev/ttyACM0")
    )]
    NoPort,

    #[error("Driver could not open {port}")]
    #[diagnostic(
        code(zwbridge::connection_failed),
        help(
            "Check the port path and that no other process holds it.\n\
             Set a different port with: zwbridge connect <PORT>"
        )
    )]
    ConnectionFailed { port: String },

    #[error("Driver gateway error: {message}")]
    #[diagnostic(
        code(zwbridge::gateway),
        help("Check the gateway URL with --gateway or `zwbridge config show`.")
    )]
    Gateway { message: String },

    // ── Nodes ────────────────────────────────────────────────────────
    #[error("Node {node} not found")]
    #[diagnostic(
        code(zwbridge::not_found),
        help("Run: zwbridge nodes to see registered devices")
    )]
    NodeNotFound { node: String },

    #[error("Node {node} is still being interviewed")]
    #[diagnostic(
        code(zwbridge::not_ready),
        help("Wait for the interview to finish, then retry.")
    )]
    NodeNotReady { node: String },

    #[error("Node {node} does not support class {class}")]
    #[diagnostic(
        code(zwbridge::unsupported_class),
        help("Run: zwbridge classes {node} to see the classes it reports")
    )]
    UnsupportedClass { node: String, class: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(zwbridge::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(zwbridge::config),
        help("Inspect the effective settings with: zwbridge config show")
    )]
    Config(#[from] ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s waiting for {what}")]
    #[diagnostic(
        code(zwbridge::timeout),
        help("Increase the wait with --scan-timeout or check the gateway logs.")
    )]
    Timeout { what: &'static str, seconds: u64 },

    // ── Everything else from the core ────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(zwbridge::core))]
    Core(CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(zwbridge::serialize))]
    Serialize(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotConnected
            | Self::NoPort
            | Self::ConnectionFailed { .. }
            | Self::Gateway { .. } => exit_code::CONNECTION,
            Self::NodeNotFound { .. } | Self::NodeNotReady { .. } => exit_code::NOT_FOUND,
            Self::UnsupportedClass { .. } => exit_code::UNSUPPORTED,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Core(_) | Self::Io(_) | Self::Serialize(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotConnected => CliError::NotConnected,
            CoreError::ConnectionFailed { port } | CoreError::ConnectionCancelled { port } => {
                CliError::ConnectionFailed { port }
            }
            CoreError::UnknownNode { node_id } | CoreError::NodeGone { node_id } => {
                CliError::NodeNotFound {
                    node: node_id.to_string(),
                }
            }
            CoreError::NodeNotReady { node_id } => CliError::NodeNotReady {
                node: node_id.to_string(),
            },
            CoreError::UnsupportedClass { node_id, class_id } => CliError::UnsupportedClass {
                node: node_id.to_string(),
                class: class_id.to_string(),
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Driver { message, .. } => CliError::Gateway { message },
            other => CliError::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zwbridge_core::{CommandClassId, NodeId};

    #[test]
    fn core_errors_map_to_exit_codes() {
        let unsupported: CliError = CoreError::UnsupportedClass {
            node_id: NodeId(5),
            class_id: CommandClassId(0x31),
        }
        .into();
        assert_eq!(unsupported.exit_code(), exit_code::UNSUPPORTED);
        assert_eq!(
            unsupported.to_string(),
            "Node 5 does not support class 0x31"
        );

        let missing: CliError = CoreError::UnknownNode { node_id: NodeId(9) }.into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let offline: CliError = CoreError::NotConnected.into();
        assert_eq!(offline.exit_code(), exit_code::CONNECTION);

        let internal: CliError = CoreError::Internal("boom".into()).into();
        assert_eq!(internal.exit_code(), exit_code::GENERAL);
    }
}
