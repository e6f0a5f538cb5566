//! Human-readable command class names.

use serde::Serialize;
use zwbridge_api::CommandClassId;

/// Label used for ids missing from the table.
pub const UNKNOWN_CLASS: &str = "Unknown Class";

/// A command class present on a node, paired with its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    pub id: CommandClassId,
    pub label: &'static str,
}

impl From<CommandClassId> for ClassInfo {
    fn from(id: CommandClassId) -> Self {
        Self {
            id,
            label: label(id),
        }
    }
}

/// Label for a command class id, or [`UNKNOWN_CLASS`].
pub fn label(id: CommandClassId) -> &'static str {
    match id.0 {
        0x20 => "Basic",
        0x21 => "Controller Replication",
        0x22 => "Application Status",
        0x23 => "Z/IP Services",
        0x24 => "Z/IP Server",
        0x25 => "Switch Binary",
        0x26 => "Switch Multilevel",
        0x27 => "Switch All",
        0x28 => "Switch Toggle Binary",
        0x29 => "Switch Toggle Multilevel",
        0x2a => "Chimney Fan",
        0x2b => "Scene Activation",
        0x2c => "Scene Actuator Configuration",
        0x2d => "Scene Controller Configuration",
        0x2e => "Z/IP Client",
        0x2f => "Z/IP Advanced Services",
        0x30 => "Sensor Binary",
        0x31 => "Sensor Multilevel",
        0x32 => "Meter",
        0x33 => "Z/IP Advanced Server",
        0x34 => "Z/IP Advanced Client",
        0x35 => "Meter Pulse",
        0x38 => "Thermostat Heating",
        0x3c => "Meter Table Config",
        0x3d => "Meter Table Monitor",
        0x3e => "Meter Table Push",
        0x40 => "Thermostat Mode",
        0x42 => "Thermostat Operating State",
        0x43 => "Thermostat Setpoint",
        0x44 => "Thermostat Fan Mode",
        0x45 => "Thermostat Fan State",
        0x46 => "Climate Control Schedule",
        0x47 => "Thermostat Setback",
        0x4c => "Door Lock Logging",
        0x4e => "Schedule Entry Lock",
        0x50 => "Basic Window Covering",
        0x51 => "MTP Window Covering",
        0x59 => "Association Group Info",
        0x5a => "Device Reset Locally",
        0x5b => "Central Scene",
        0x5c => "IP Association",
        0x5d => "Antitheft",
        0x5e => "ZWave+ Info",
        0x60 => "Multi Channel V2 / Multi Instance",
        0x62 => "Door Lock",
        0x63 => "User Code",
        0x66 => "Barrier Operator",
        0x70 => "Configuration",
        0x71 => "Alarm",
        0x72 => "Manufacturer Specific",
        0x73 => "Powerlevel",
        0x75 => "Protection",
        0x76 => "Lock",
        0x77 => "Node Naming",
        0x7a => "Firmware Update Metadata",
        0x7b => "Grouping Name",
        0x7c => "Remote Association Activate",
        0x7d => "Remote Association",
        0x80 => "Battery",
        0x81 => "Clock",
        0x82 => "Hail",
        0x84 => "Wake Up",
        0x85 => "Association",
        0x86 => "Version",
        0x87 => "Indicator",
        0x88 => "Proprietary",
        0x89 => "Language",
        0x8a => "Time",
        0x8b => "Time Parameters",
        0x8c => "Geographic Location",
        0x8d => "Composite",
        0x8e => "Multi Channel Association",
        0x8f => "Multi Command",
        0x90 => "Energy Production",
        0x91 => "Manufacturer Proprietary",
        0x92 => "Screen Metadata",
        0x93 => "Screen Attributes",
        0x94 => "Simple A/V Control",
        0x95 => "A/V Content Directory Metadata",
        0x96 => "A/V Renderer Status",
        0x97 => "A/V Content Search Metadata",
        0x98 => "Security",
        0x99 => "A/V Tagging Metadata",
        0x9a => "IP Configuration",
        0x9b => "Association Command Configuration",
        0x9c => "Sensor Alarm",
        0x9d => "Silence Alarm",
        0x9e => "Sensor Configuration",
        0xef => "Mark",
        _ => UNKNOWN_CLASS,
    }
}
