// ── Filter predicates for device snapshots ──
//
// Narrow a device snapshot without touching the registry.

use zwbridge_api::CommandClassId;

use crate::device::DeviceProxy;

/// Filter predicate for device collections.
pub enum DeviceFilter {
    All,
    /// Devices reporting at least one value of the class.
    SupportsClass(CommandClassId),
    /// Case-insensitive substring match on the display name.
    NameContains(String),
    Custom(Box<dyn Fn(&DeviceProxy) -> bool + Send + Sync>),
}

impl DeviceFilter {
    /// Devices whose node is gone never match.
    pub fn matches(&self, device: &DeviceProxy) -> bool {
        match self {
            Self::All => true,
            Self::SupportsClass(class_id) => device
                .state()
                .is_ok_and(|node| node.has_class(*class_id)),
            Self::NameContains(needle) => device
                .name()
                .is_ok_and(|name| name.to_lowercase().contains(&needle.to_lowercase())),
            Self::Custom(f) => f(device),
        }
    }
}
