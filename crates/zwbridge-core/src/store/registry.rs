// ── Node registry ──
//
// Applies node-level driver events to per-node state. Events arrive
// one at a time from the controller's dispatch loop; readers get
// lock-free snapshots through `ArcSwap`. `clear` may be called from
// other tasks, so it shares the writer lock with `apply`.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use tracing::{debug, info, warn};
use zwbridge_api::{CommandClassId, Driver, DriverEvent, NetworkId, NodeId, NodeInfo, ValueDescriptor};

use crate::device::DeviceProxy;
use crate::discovery::Discovery;
use crate::error::CoreError;
use crate::model::{DeviceId, NodeMetadata, NodeState, ValueKey, ValueRecord};

// ── NodeSlot ─────────────────────────────────────────────────────────

/// Storage for one registered node and its proxy, once it has one.
///
/// The registry holds the only strong reference; proxies hold a `Weak`.
pub(crate) struct NodeSlot {
    state: ArcSwap<NodeState>,
    device: ArcSwapOption<DeviceProxy>,
    /// Serializes writers; readers never take it.
    write: Mutex<()>,
}

impl NodeSlot {
    fn new(id: NodeId) -> Self {
        Self {
            state: ArcSwap::from_pointee(NodeState::new(id)),
            device: ArcSwapOption::empty(),
            write: Mutex::new(()),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<NodeState> {
        self.state.load_full()
    }

    /// Copy-on-write update of the node state.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut NodeState) -> R) -> R {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = NodeState::clone(&self.state.load());
        let out = f(&mut next);
        self.state.store(Arc::new(next));
        out
    }

    fn device(&self) -> Option<Arc<DeviceProxy>> {
        self.device.load_full()
    }
}

// ── NodeRegistry ─────────────────────────────────────────────────────

/// Sole owner of every [`NodeState`].
pub struct NodeRegistry {
    nodes: DashMap<NodeId, Arc<NodeSlot>>,
    driver: Arc<dyn Driver>,
    sinks: Vec<Arc<dyn Discovery>>,
    notification_capacity: usize,
    /// Held for the whole of `apply` and `clear`.
    write: Mutex<()>,
}

impl NodeRegistry {
    pub fn new(
        driver: Arc<dyn Driver>,
        sinks: Vec<Arc<dyn Discovery>>,
        notification_capacity: usize,
    ) -> Self {
        Self {
            nodes: DashMap::new(),
            driver,
            sinks,
            notification_capacity,
            write: Mutex::new(()),
        }
    }

    /// Apply one node-level event.
    ///
    /// Driver-level events are ignored here. Events that cannot be applied
    /// are logged and dropped; nothing propagates to the dispatch loop.
    pub fn apply(&self, event: &DriverEvent, network_id: NetworkId) {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let result = match event {
            DriverEvent::NodeAdded { node_id } => {
                self.node_added(*node_id);
                Ok(())
            }
            DriverEvent::NodeAvailable { node_id, info } => {
                debug!(node_id = %node_id, product = ?info.product, "node available");
                Ok(())
            }
            DriverEvent::NodeReady { node_id, info } => {
                self.node_ready(*node_id, info, network_id)
            }
            DriverEvent::NodeEvent { node_id, data } => self.node_event(*node_id, data),
            DriverEvent::ValueAdded {
                node_id,
                class_id,
                value,
            } => self.value_added(*node_id, *class_id, value),
            DriverEvent::ValueChanged {
                node_id,
                class_id,
                value,
            } => self.value_changed(*node_id, *class_id, value),
            DriverEvent::ValueRefreshed {
                node_id,
                class_id,
                value,
            } => self.value_refreshed(*node_id, *class_id, value),
            DriverEvent::ValueRemoved {
                node_id,
                class_id,
                instance,
                index,
            } => self.value_removed(*node_id, ValueKey::new(*class_id, *instance, *index)),
            DriverEvent::SceneEvent { node_id, scene_id } => self.scene_event(*node_id, *scene_id),
            DriverEvent::DriverReady { .. } | DriverEvent::DriverFailed | DriverEvent::ScanComplete => {
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(event = event.kind(), error = %e, "dropping driver event");
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Registered node ids, ascending.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of one node's state.
    pub fn node(&self, node_id: NodeId) -> Option<Arc<NodeState>> {
        self.nodes.get(&node_id).map(|slot| slot.snapshot())
    }

    /// The proxy of a ready node.
    pub fn device(&self, node_id: NodeId) -> Option<Arc<DeviceProxy>> {
        self.nodes.get(&node_id).and_then(|slot| slot.device())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node, unregistering its proxy first. Returns how many
    /// nodes were dropped.
    pub fn clear(&self) -> usize {
        let _guard = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let mut dropped = 0;
        for node_id in self.node_ids() {
            if let Some((_, slot)) = self.nodes.remove(&node_id) {
                self.detach(&slot);
                dropped += 1;
            }
        }
        dropped
    }

    // ── Event handlers ───────────────────────────────────────────────

    fn node_added(&self, node_id: NodeId) {
        // The old proxy must be gone before the new slot is visible.
        if let Some((_, old)) = self.nodes.remove(&node_id) {
            self.detach(&old);
            info!(node_id = %node_id, "node re-added, replacing previous entry");
        } else {
            debug!(node_id = %node_id, "node added");
        }
        self.nodes.insert(node_id, Arc::new(NodeSlot::new(node_id)));
    }

    fn node_ready(&self, node_id: NodeId, info: &NodeInfo, network_id: NetworkId) -> Result<(), CoreError> {
        let slot = self.slot(node_id)?;
        let metadata = NodeMetadata::from(info.clone());
        let name = metadata.display_name();
        slot.update(|node| node.mark_ready(metadata));

        if slot.device().is_some() {
            debug!(node_id = %node_id, "node ready again, metadata refreshed");
            return Ok(());
        }

        let device = Arc::new(DeviceProxy::new(
            DeviceId::new(network_id, node_id),
            Arc::downgrade(&slot),
            Arc::clone(&self.driver),
            self.notification_capacity,
        ));
        slot.device.store(Some(Arc::clone(&device)));
        for sink in &self.sinks {
            sink.register(Arc::clone(&device));
        }

        info!(node_id = %node_id, device = %device.id(), name = %name, "node ready");
        Ok(())
    }

    fn node_event(&self, node_id: NodeId, data: &serde_json::Value) -> Result<(), CoreError> {
        let slot = self.slot(node_id)?;
        debug!(node_id = %node_id, data = %data, "node event");
        if let Some(device) = slot.device() {
            device.emit_node_event(data.clone());
        }
        Ok(())
    }

    fn value_added(
        &self,
        node_id: NodeId,
        class_id: CommandClassId,
        descriptor: &ValueDescriptor,
    ) -> Result<(), CoreError> {
        let slot = self.slot(node_id)?;
        let key = ValueKey::from_descriptor(class_id, descriptor);
        let record = Arc::new(ValueRecord::from(descriptor));

        let previous = slot.update(|node| node.insert_value(key, record));
        if previous.is_some() {
            debug!(node_id = %node_id, key = %key, "value re-added, record replaced");
        } else {
            debug!(node_id = %node_id, key = %key, value = %descriptor.value, "value added");
        }

        if let Some(device) = slot.device() {
            device.emit_value_change(key, None, Some(descriptor.value.clone()));
        }
        Ok(())
    }

    fn value_changed(
        &self,
        node_id: NodeId,
        class_id: CommandClassId,
        descriptor: &ValueDescriptor,
    ) -> Result<(), CoreError> {
        let slot = self.slot(node_id)?;
        let key = ValueKey::from_descriptor(class_id, descriptor);
        let record = Arc::new(ValueRecord::from(descriptor));

        let old_value = slot.update(|node| {
            let old = node.value(&key).map(|current| current.value.clone())?;
            node.insert_value(key, record);
            Some(old)
        });
        let Some(old_value) = old_value else {
            return Err(CoreError::InconsistentValue {
                node_id,
                key,
                event: "value changed",
            });
        };

        debug!(node_id = %node_id, key = %key, old = %old_value, new = %descriptor.value, "value changed");
        if let Some(device) = slot.device() {
            device.emit_value_change(key, Some(old_value), Some(descriptor.value.clone()));
        }
        Ok(())
    }

    fn value_refreshed(
        &self,
        node_id: NodeId,
        class_id: CommandClassId,
        descriptor: &ValueDescriptor,
    ) -> Result<(), CoreError> {
        let slot = self.slot(node_id)?;
        if slot.snapshot().is_ready() {
            let key = ValueKey::from_descriptor(class_id, descriptor);
            debug!(node_id = %node_id, key = %key, value = %descriptor.value, "value refreshed");
        }
        Ok(())
    }

    fn value_removed(&self, node_id: NodeId, key: ValueKey) -> Result<(), CoreError> {
        let slot = self.slot(node_id)?;
        let Some(removed) = slot.update(|node| node.remove_value(&key)) else {
            return Err(CoreError::InconsistentValue {
                node_id,
                key,
                event: "value removed",
            });
        };

        debug!(node_id = %node_id, key = %key, "value removed");
        if let Some(device) = slot.device() {
            device.emit_value_change(key, Some(removed.value.clone()), None);
        }
        Ok(())
    }

    fn scene_event(&self, node_id: NodeId, scene_id: u32) -> Result<(), CoreError> {
        let slot = self.slot(node_id)?;
        debug!(node_id = %node_id, scene_id, "scene event");
        if let Some(device) = slot.device() {
            device.emit_scene(scene_id);
        }
        Ok(())
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn slot(&self, node_id: NodeId) -> Result<Arc<NodeSlot>, CoreError> {
        self.nodes
            .get(&node_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(CoreError::UnknownNode { node_id })
    }

    /// Unregister and forget the slot's proxy, if it has one.
    fn detach(&self, slot: &NodeSlot) {
        if let Some(device) = slot.device.swap(None) {
            for sink in &self.sinks {
                sink.unregister(&device);
            }
            debug!(device = %device.id(), "device unregistered");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::discovery::DeviceDirectory;
    use serde_json::json;
    use zwbridge_api::DriverCommand;

    struct NullDriver;

    impl Driver for NullDriver {
        fn send(&self, _command: DriverCommand) -> Result<(), zwbridge_api::Error> {
            Ok(())
        }
    }

    fn registry() -> (NodeRegistry, Arc<DeviceDirectory>) {
        let directory = Arc::new(DeviceDirectory::new());
        let sink: Arc<dyn Discovery> = directory.clone();
        (NodeRegistry::new(Arc::new(NullDriver), vec![sink], 16), directory)
    }

    fn value_event(kind: &str, node: u8, value: serde_json::Value) -> DriverEvent {
        serde_json::from_value(json!({
            "event": kind,
            "node_id": node,
            "class_id": 0x25,
            "value": { "value": value, "label": "Switch", "type": "bool", "instance": 1, "index": 0 }
        }))
        .unwrap()
    }

    const NET: NetworkId = NetworkId(0xabcd_0001);

    #[test]
    fn unknown_node_events_are_dropped() {
        let (reg, _) = registry();
        reg.apply(&value_event("value-added", 9, json!(true)), NET);
        assert!(reg.is_empty());
    }

    #[test]
    fn change_without_add_leaves_state_untouched() {
        let (reg, _) = registry();
        reg.apply(&DriverEvent::NodeAdded { node_id: NodeId(4) }, NET);
        reg.apply(&value_event("value-changed", 4, json!(true)), NET);
        assert!(reg.node(NodeId(4)).unwrap().values().is_empty());
    }

    #[test]
    fn ready_node_gets_one_proxy() {
        let (reg, directory) = registry();
        reg.apply(&DriverEvent::NodeAdded { node_id: NodeId(4) }, NET);
        assert!(reg.device(NodeId(4)).is_none());

        let ready = DriverEvent::NodeReady {
            node_id: NodeId(4),
            info: NodeInfo::default(),
        };
        reg.apply(&ready, NET);
        let first = reg.device(NodeId(4)).unwrap();
        reg.apply(&ready, NET);
        let second = reg.device(NodeId(4)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(directory.len(), 1);
        assert_eq!(first.id(), DeviceId::new(NET, NodeId(4)));
    }

    #[test]
    fn clear_unregisters_everything() {
        let (reg, directory) = registry();
        for id in [2, 3] {
            reg.apply(&DriverEvent::NodeAdded { node_id: NodeId(id) }, NET);
            reg.apply(
                &DriverEvent::NodeReady {
                    node_id: NodeId(id),
                    info: NodeInfo::default(),
                },
                NET,
            );
        }
        assert_eq!(directory.len(), 2);

        assert_eq!(reg.clear(), 2);
        assert!(reg.is_empty());
        assert_eq!(directory.len(), 0);
    }

    #[test]
    fn clear_racing_node_ready_leaves_no_stale_device() {
        let (reg, directory) = registry();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for round in 0..500u32 {
                    let node_id = NodeId(u8::try_from(round % 8).unwrap() + 2);
                    reg.apply(&DriverEvent::NodeAdded { node_id }, NET);
                    reg.apply(
                        &DriverEvent::NodeReady {
                            node_id,
                            info: NodeInfo::default(),
                        },
                        NET,
                    );
                }
            });
            scope.spawn(|| {
                for _ in 0..500 {
                    reg.clear();
                    std::thread::yield_now();
                }
            });
        });

        // Whatever survived the race is still reachable by `clear`.
        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(directory.len(), 0);
    }

    #[test]
    fn node_ids_are_sorted() {
        let (reg, _) = registry();
        for id in [12, 3, 7] {
            reg.apply(&DriverEvent::NodeAdded { node_id: NodeId(id) }, NET);
        }
        assert_eq!(reg.node_ids(), vec![NodeId(3), NodeId(7), NodeId(12)]);
    }
}
