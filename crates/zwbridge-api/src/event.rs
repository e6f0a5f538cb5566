//! Inbound driver events.
//!
//! The driver reports everything it learns about the network as a
//! single ordered stream of [`DriverEvent`]s. Payloads carry only the
//! fields the bridge consumes; anything else the driver sends is kept
//! in `extra` so nothing is silently dropped.

use serde::{Deserialize, Serialize};

use crate::types::{CommandClassId, NetworkId, NodeId};

// ── ValueDescriptor ──────────────────────────────────────────────────

/// A value as reported by the driver in `value added` / `value changed`
/// / `value refreshed` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDescriptor {
    /// The reported value. Shape depends on `type`.
    #[serde(default)]
    pub value: serde_json::Value,

    /// Display name of the value, e.g. `"Switch"`.
    #[serde(default)]
    pub label: String,

    /// Value kind tag: `"bool"`, `"byte"`, `"list"`, ...
    #[serde(rename = "type", default)]
    pub value_type: String,

    /// Unit of measurement. The driver sends `""` for unitless values.
    #[serde(default)]
    pub units: Option<String>,

    #[serde(default)]
    pub min: Option<f64>,

    #[serde(default)]
    pub max: Option<f64>,

    #[serde(default)]
    pub help: Option<String>,

    /// Endpoint within the command class (multi-channel devices).
    pub instance: u8,

    /// Position of the value within the class/instance.
    pub index: u16,

    /// All remaining fields the driver sends.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── NodeInfo ─────────────────────────────────────────────────────────

/// Free-form node attributes reported with `node available` / `node ready`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturerid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producttype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub productid: Option<String>,

    /// Generic device type, e.g. `"Binary Power Switch"`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,

    /// User-assigned node name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// User-assigned location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── DriverEvent ──────────────────────────────────────────────────────

/// Every event the driver can emit, in one ordered stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum DriverEvent {
    /// The controller is up; the network id is now known.
    DriverReady { network_id: NetworkId },
    /// The driver could not open (or lost) the controller.
    DriverFailed,
    /// The initial network scan finished.
    ScanComplete,
    NodeAdded {
        node_id: NodeId,
    },
    NodeAvailable {
        node_id: NodeId,
        #[serde(default)]
        info: NodeInfo,
    },
    /// The node has been fully interviewed.
    NodeReady {
        node_id: NodeId,
        #[serde(default)]
        info: NodeInfo,
    },
    /// Raw node event (e.g. basic set from a sensor).
    NodeEvent {
        node_id: NodeId,
        #[serde(default)]
        data: serde_json::Value,
    },
    ValueAdded {
        node_id: NodeId,
        class_id: CommandClassId,
        value: ValueDescriptor,
    },
    ValueChanged {
        node_id: NodeId,
        class_id: CommandClassId,
        value: ValueDescriptor,
    },
    ValueRefreshed {
        node_id: NodeId,
        class_id: CommandClassId,
        value: ValueDescriptor,
    },
    ValueRemoved {
        node_id: NodeId,
        class_id: CommandClassId,
        instance: u8,
        index: u16,
    },
    SceneEvent {
        node_id: NodeId,
        scene_id: u32,
    },
}

impl DriverEvent {
    /// The node this event belongs to, or `None` for driver-level events.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::DriverReady { .. } | Self::DriverFailed | Self::ScanComplete => None,
            Self::NodeAdded { node_id }
            | Self::NodeAvailable { node_id, .. }
            | Self::NodeReady { node_id, .. }
            | Self::NodeEvent { node_id, .. }
            | Self::ValueAdded { node_id, .. }
            | Self::ValueChanged { node_id, .. }
            | Self::ValueRefreshed { node_id, .. }
            | Self::ValueRemoved { node_id, .. }
            | Self::SceneEvent { node_id, .. } => Some(*node_id),
        }
    }

    /// Static event name, matching the wire tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DriverReady { .. } => "driver-ready",
            Self::DriverFailed => "driver-failed",
            Self::ScanComplete => "scan-complete",
            Self::NodeAdded { .. } => "node-added",
            Self::NodeAvailable { .. } => "node-available",
            Self::NodeReady { .. } => "node-ready",
            Self::NodeEvent { .. } => "node-event",
            Self::ValueAdded { .. } => "value-added",
            Self::ValueChanged { .. } => "value-changed",
            Self::ValueRefreshed { .. } => "value-refreshed",
            Self::ValueRemoved { .. } => "value-removed",
            Self::SceneEvent { .. } => "scene-event",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_value_added_with_extra_fields() {
        let frame = json!({
            "event": "value-added",
            "node_id": 5,
            "class_id": 37,
            "value": {
                "value": false,
                "label": "Switch",
                "type": "bool",
                "units": "",
                "instance": 1,
                "index": 0,
                "genre": "user",
                "read_only": false
            }
        });

        let event: DriverEvent = serde_json::from_value(frame).unwrap();
        let DriverEvent::ValueAdded {
            node_id,
            class_id,
            value,
        } = event
        else {
            panic!("expected value-added, got {event:?}");
        };

        assert_eq!(node_id, NodeId(5));
        assert_eq!(class_id, CommandClassId(0x25));
        assert_eq!(value.value, json!(false));
        assert_eq!(value.value_type, "bool");
        assert_eq!(value.instance, 1);
        assert_eq!(value.index, 0);
        assert_eq!(value.min, None);
        assert_eq!(value.extra.get("genre"), Some(&json!("user")));
    }

    #[test]
    fn decodes_node_ready_info() {
        let frame = json!({
            "event": "node-ready",
            "node_id": 3,
            "info": {
                "manufacturer": "Aeotec",
                "product": "Smart Switch 6",
                "type": "Binary Power Switch",
                "name": "",
                "loc": "kitchen"
            }
        });

        let event: DriverEvent = serde_json::from_value(frame).unwrap();
        let DriverEvent::NodeReady { node_id, info } = event else {
            panic!("expected node-ready");
        };
        assert_eq!(node_id, NodeId(3));
        assert_eq!(info.product.as_deref(), Some("Smart Switch 6"));
        assert_eq!(info.node_type.as_deref(), Some("Binary Power Switch"));
        assert_eq!(info.loc.as_deref(), Some("kitchen"));
    }

    #[test]
    fn decodes_unit_variants() {
        let failed: DriverEvent = serde_json::from_str(r#"{"event":"driver-failed"}"#).unwrap();
        assert_eq!(failed, DriverEvent::DriverFailed);
        assert_eq!(failed.node_id(), None);

        let ready: DriverEvent =
            serde_json::from_str(r#"{"event":"driver-ready","network_id":3735928559}"#).unwrap();
        assert_eq!(
            ready,
            DriverEvent::DriverReady {
                network_id: NetworkId(0xdead_beef)
            }
        );
    }

    #[test]
    fn kind_matches_wire_tag() {
        let event = DriverEvent::ValueRemoved {
            node_id: NodeId(5),
            class_id: CommandClassId(0x25),
            instance: 1,
            index: 0,
        };
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["event"], json!(event.kind()));
        assert_eq!(event.node_id(), Some(NodeId(5)));
    }

    #[test]
    fn rejects_unknown_event() {
        let result = serde_json::from_str::<DriverEvent>(r#"{"event":"node-naming"}"#);
        assert!(result.is_err());
    }
}
