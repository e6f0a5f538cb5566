// ── Command API ──
//
// Everything the bridge asks of the driver flows through one
// `DriverCommand` enum. Commands are fire-and-forget: their effects
// come back later as independent `DriverEvent`s.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{CommandClassId, NodeId};

/// All outbound operations against the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum DriverCommand {
    // ── Controller ───────────────────────────────────────────────────
    Connect {
        port: String,
    },
    Disconnect {
        port: String,
    },
    /// Persist the driver's own network configuration.
    WriteConfig,

    // ── Inclusion / exclusion ────────────────────────────────────────
    AddNode {
        secure: bool,
    },
    RemoveNode,

    // ── Per-node operations ──────────────────────────────────────────
    SetValue {
        node_id: NodeId,
        class_id: CommandClassId,
        instance: u8,
        index: u16,
        value: serde_json::Value,
    },
    SetNodeName {
        node_id: NodeId,
        name: String,
    },
    EnablePoll {
        node_id: NodeId,
        class_id: CommandClassId,
    },
    DisablePoll {
        node_id: NodeId,
        class_id: CommandClassId,
    },
}

impl DriverCommand {
    /// Static command name, matching the wire tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::WriteConfig => "write-config",
            Self::AddNode { .. } => "add-node",
            Self::RemoveNode => "remove-node",
            Self::SetValue { .. } => "set-value",
            Self::SetNodeName { .. } => "set-node-name",
            Self::EnablePoll { .. } => "enable-poll",
            Self::DisablePoll { .. } => "disable-poll",
        }
    }
}

/// Command sink of the driver.
///
/// `Ok(())` means the command was accepted for delivery, never that it
/// took effect on the network.
pub trait Driver: Send + Sync {
    fn send(&self, command: DriverCommand) -> Result<(), Error>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_tagged_commands() {
        let cmd = DriverCommand::SetValue {
            node_id: NodeId(5),
            class_id: CommandClassId(0x25),
            instance: 1,
            index: 0,
            value: json!(true),
        };
        let encoded = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            encoded,
            json!({
                "command": "set-value",
                "node_id": 5,
                "class_id": 37,
                "instance": 1,
                "index": 0,
                "value": true
            })
        );
        assert_eq!(encoded["command"], json!(cmd.kind()));
    }

    #[test]
    fn encodes_unit_command() {
        let encoded = serde_json::to_string(&DriverCommand::WriteConfig).unwrap();
        assert_eq!(encoded, r#"{"command":"write-config"}"#);
    }
}
