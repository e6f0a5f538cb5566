// ── Value records ──

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use zwbridge_api::{CommandClassId, ValueDescriptor};

/// Address of one value on a node: command class, instance, index.
///
/// Ordering is lexicographic over the triple, so all values of one class
/// (and of one instance within it) are contiguous in a sorted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueKey {
    pub class_id: CommandClassId,
    pub instance: u8,
    pub index: u16,
}

impl ValueKey {
    pub fn new(class_id: CommandClassId, instance: u8, index: u16) -> Self {
        Self {
            class_id,
            instance,
            index,
        }
    }

    pub fn from_descriptor(class_id: CommandClassId, descriptor: &ValueDescriptor) -> Self {
        Self::new(class_id, descriptor.instance, descriptor.index)
    }

    /// Every key belonging to `class_id`.
    pub(crate) fn class_range(class_id: CommandClassId) -> RangeInclusive<Self> {
        Self::new(class_id, u8::MIN, u16::MIN)..=Self::new(class_id, u8::MAX, u16::MAX)
    }

    /// Every key belonging to one instance of `class_id`.
    pub(crate) fn instance_range(class_id: CommandClassId, instance: u8) -> RangeInclusive<Self> {
        Self::new(class_id, instance, u16::MIN)..=Self::new(class_id, instance, u16::MAX)
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.class_id, self.instance, self.index)
    }
}

/// Kind tag the driver attaches to each value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ValueKind {
    Bool,
    Byte,
    Short,
    Int,
    Decimal,
    List,
    String,
    Button,
    Schedule,
    Raw,
    Unknown,
}

impl ValueKind {
    /// Parse a driver tag, falling back to [`ValueKind::Unknown`].
    pub fn from_tag(tag: &str) -> Self {
        tag.parse().unwrap_or(Self::Unknown)
    }
}

/// One reported value and its metadata.
///
/// Records are immutable once stored; an update replaces the whole record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueRecord {
    pub value: serde_json::Value,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl From<&ValueDescriptor> for ValueRecord {
    fn from(d: &ValueDescriptor) -> Self {
        Self {
            value: d.value.clone(),
            label: d.label.clone(),
            kind: ValueKind::from_tag(&d.value_type),
            // The driver sends "" for unitless values.
            unit: d.units.clone().filter(|u| !u.is_empty()),
            min: d.min,
            max: d.max,
            help: d.help.clone().filter(|h| !h.is_empty()),
        }
    }
}

/// Values of one command class: instance → index → record.
pub type ClassValues = BTreeMap<u8, BTreeMap<u16, Arc<ValueRecord>>>;
