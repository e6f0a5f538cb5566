// ── Device registration boundary ──
//
// Where ready devices are published. The controller always feeds its
// own `DeviceDirectory`; embedders may add another `Discovery` sink.

use std::sync::Arc;

use zwbridge_api::NodeId;

use crate::device::DeviceProxy;
use crate::store::collection::EntityCollection;
use crate::stream::EntityStream;

/// Receives devices as they become ready and as they are torn down.
pub trait Discovery: Send + Sync {
    fn register(&self, device: Arc<DeviceProxy>);
    fn unregister(&self, device: &DeviceProxy);
}

/// Reactive set of the currently registered devices, keyed by node id.
pub struct DeviceDirectory {
    devices: EntityCollection<NodeId, DeviceProxy>,
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self {
            devices: EntityCollection::new(),
        }
    }

    pub fn get(&self, node_id: NodeId) -> Option<Arc<DeviceProxy>> {
        self.devices.get(&node_id)
    }

    /// Current devices, ordered by node id.
    pub fn snapshot(&self) -> Arc<Vec<Arc<DeviceProxy>>> {
        self.devices.snapshot()
    }

    pub fn subscribe(&self) -> EntityStream<DeviceProxy> {
        EntityStream::new(self.devices.subscribe())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.len() == 0
    }

    /// Bumped on every registration change.
    pub fn version(&self) -> u64 {
        self.devices.version()
    }
}

impl Default for DeviceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Discovery for DeviceDirectory {
    fn register(&self, device: Arc<DeviceProxy>) {
        self.devices.upsert(device.node_id(), device);
    }

    fn unregister(&self, device: &DeviceProxy) {
        // Only drop the entry if it is this very proxy.
        self.devices
            .remove_if(&device.node_id(), |stored| std::ptr::eq(stored.as_ref(), device));
    }
}
