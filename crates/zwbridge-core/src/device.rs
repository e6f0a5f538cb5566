// ── Device proxy ──
//
// Read/write facade over one ready node. Reads go to the registry's
// current snapshot; writes are forwarded to the driver and confirmed
// later by driver events. The proxy never owns the node state.

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;
use zwbridge_api::{CommandClassId, Driver, DriverCommand, NodeId};

use crate::error::CoreError;
use crate::model::{
    ClassInfo, ClassValues, DeviceId, Inspection, NodeEventNotice, NodeState, SceneNotice,
    ValueChange, ValueKey,
};
use crate::store::NodeSlot;

/// Handle to one ready node on the network.
///
/// Created by the registry when a node becomes ready and torn down when
/// the node is replaced or the controller clears its nodes. After that,
/// every query fails with [`CoreError::NodeGone`].
pub struct DeviceProxy {
    id: DeviceId,
    slot: Weak<NodeSlot>,
    driver: Arc<dyn Driver>,
    value_tx: broadcast::Sender<Arc<ValueChange>>,
    event_tx: broadcast::Sender<Arc<NodeEventNotice>>,
    scene_tx: broadcast::Sender<Arc<SceneNotice>>,
}

impl DeviceProxy {
    pub(crate) fn new(
        id: DeviceId,
        slot: Weak<NodeSlot>,
        driver: Arc<dyn Driver>,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        let (value_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);
        let (scene_tx, _) = broadcast::channel(capacity);
        Self {
            id,
            slot,
            driver,
            value_tx,
            event_tx,
            scene_tx,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn node_id(&self) -> NodeId {
        self.id.node_id
    }

    /// Current snapshot of the backing node.
    pub fn state(&self) -> Result<Arc<NodeState>, CoreError> {
        self.slot
            .upgrade()
            .map(|slot| slot.snapshot())
            .ok_or(CoreError::NodeGone {
                node_id: self.node_id(),
            })
    }

    /// Display name: the user-assigned name, else product and type.
    pub fn name(&self) -> Result<String, CoreError> {
        Ok(self.state()?.metadata().display_name())
    }

    pub fn is_attached(&self) -> bool {
        self.slot.strong_count() > 0
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Metadata plus every value, nested class → instance → index.
    pub fn inspect(&self) -> Result<Inspection, CoreError> {
        Ok(self.state()?.inspect())
    }

    /// Command classes with at least one value, with their labels.
    pub fn value_classes(&self) -> Result<Vec<ClassInfo>, CoreError> {
        Ok(self
            .state()?
            .classes()
            .into_iter()
            .map(ClassInfo::from)
            .collect())
    }

    /// Values of a class, all instances or just one.
    pub fn values(&self, class_id: CommandClassId, instance: Option<u8>) -> Result<ClassValues, CoreError> {
        self.state()?
            .class_values(class_id, instance)
            .ok_or_else(|| self.unsupported(class_id))
    }

    /// The stored value at a triple. `Ok(None)` when the class is known
    /// but the instance or index is not.
    pub fn get_value(
        &self,
        class_id: CommandClassId,
        instance: u8,
        index: u16,
    ) -> Result<Option<serde_json::Value>, CoreError> {
        let node = self.state()?;
        self.lookup(&node, &ValueKey::new(class_id, instance, index))
    }

    /// [`get_value`](Self::get_value) for several keys against one
    /// snapshot. Fails as a whole on the first unsupported class.
    pub fn get_values(&self, keys: &[ValueKey]) -> Result<Vec<Option<serde_json::Value>>, CoreError> {
        let node = self.state()?;
        keys.iter().map(|key| self.lookup(&node, key)).collect()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Ask the node to change a value. Local state is untouched until the
    /// driver reports the change.
    pub fn set_value(
        &self,
        class_id: CommandClassId,
        instance: u8,
        index: u16,
        value: serde_json::Value,
    ) -> Result<(), CoreError> {
        self.send(DriverCommand::SetValue {
            node_id: self.node_id(),
            class_id,
            instance,
            index,
            value,
        })
    }

    pub fn enable_poll(&self, class_id: CommandClassId) -> Result<(), CoreError> {
        self.send(DriverCommand::EnablePoll {
            node_id: self.node_id(),
            class_id,
        })
    }

    pub fn disable_poll(&self, class_id: CommandClassId) -> Result<(), CoreError> {
        self.send(DriverCommand::DisablePoll {
            node_id: self.node_id(),
            class_id,
        })
    }

    /// Rename the node. The driver never confirms a name change, so the
    /// local metadata is updated right away.
    pub fn rename(&self, name: &str) -> Result<(), CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "device name must not be empty".into(),
            });
        }
        let slot = self.slot()?;
        self.driver.send(DriverCommand::SetNodeName {
            node_id: self.node_id(),
            name: name.to_owned(),
        })?;
        slot.update(|node| node.set_name(name.to_owned()));
        debug!(device = %self.id, name, "device renamed");
        Ok(())
    }

    // ── Notifications ────────────────────────────────────────────────

    pub fn value_changes(&self) -> broadcast::Receiver<Arc<ValueChange>> {
        self.value_tx.subscribe()
    }

    pub fn node_events(&self) -> broadcast::Receiver<Arc<NodeEventNotice>> {
        self.event_tx.subscribe()
    }

    pub fn scene_events(&self) -> broadcast::Receiver<Arc<SceneNotice>> {
        self.scene_tx.subscribe()
    }

    pub(crate) fn emit_value_change(
        &self,
        key: ValueKey,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) {
        // No subscribers is fine.
        let _ = self.value_tx.send(Arc::new(ValueChange {
            device: self.id,
            class_id: key.class_id,
            instance: key.instance,
            index: key.index,
            old_value,
            new_value,
            at: Utc::now(),
        }));
    }

    pub(crate) fn emit_node_event(&self, data: serde_json::Value) {
        let _ = self.event_tx.send(Arc::new(NodeEventNotice {
            device: self.id,
            data,
            at: Utc::now(),
        }));
    }

    pub(crate) fn emit_scene(&self, scene_id: u32) {
        let _ = self.scene_tx.send(Arc::new(SceneNotice {
            device: self.id,
            scene_id,
            at: Utc::now(),
        }));
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn slot(&self) -> Result<Arc<NodeSlot>, CoreError> {
        self.slot.upgrade().ok_or(CoreError::NodeGone {
            node_id: self.node_id(),
        })
    }

    /// Forward a command, refusing once the node is gone.
    fn send(&self, command: DriverCommand) -> Result<(), CoreError> {
        self.slot()?;
        debug!(device = %self.id, command = command.kind(), "forwarding command");
        self.driver.send(command)?;
        Ok(())
    }

    fn lookup(&self, node: &NodeState, key: &ValueKey) -> Result<Option<serde_json::Value>, CoreError> {
        if !node.knows_class(key.class_id) {
            return Err(self.unsupported(key.class_id));
        }
        Ok(node.value(key).map(|record| record.value.clone()))
    }

    fn unsupported(&self, class_id: CommandClassId) -> CoreError {
        CoreError::UnsupportedClass {
            node_id: self.node_id(),
            class_id,
        }
    }
}

impl fmt::Debug for DeviceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceProxy")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}
