// ── Outward notifications ──
//
// Payloads a `DeviceProxy` emits on its three channels.

use chrono::{DateTime, Utc};
use serde::Serialize;
use zwbridge_api::CommandClassId;

use super::device_id::DeviceId;

/// A value appeared, changed, or disappeared.
///
/// `old_value` is `None` for a newly added value; `new_value` is `None`
/// for a removed one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueChange {
    pub device: DeviceId,
    pub class_id: CommandClassId,
    pub instance: u8,
    pub index: u16,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

/// Raw node event, forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeEventNotice {
    pub device: DeviceId,
    pub data: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Scene activation reported by a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneNotice {
    pub device: DeviceId,
    pub scene_id: u32,
    pub at: DateTime<Utc>,
}
