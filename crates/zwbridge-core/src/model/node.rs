// ── Per-node aggregate ──

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use zwbridge_api::{CommandClassId, NodeId, NodeInfo};

use super::value::{ClassValues, ValueKey, ValueRecord};

/// Free-form node attributes, populated when the node becomes ready.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NodeMetadata {
    info: NodeInfo,
}

impl NodeMetadata {
    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// User-assigned name, if any.
    pub fn name(&self) -> Option<&str> {
        self.info.name.as_deref().filter(|n| !n.is_empty())
    }

    /// Name to show for the node: its own name, else `"{product} ({type})"`.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name() {
            return name.to_owned();
        }
        format!(
            "{} ({})",
            self.info.product.as_deref().unwrap_or("Unknown product"),
            self.info.node_type.as_deref().unwrap_or("unknown type"),
        )
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.info.name = Some(name);
    }
}

impl From<NodeInfo> for NodeMetadata {
    fn from(info: NodeInfo) -> Self {
        Self { info }
    }
}

/// Read-only view of a node returned by `inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub metadata: NodeMetadata,
    pub values: BTreeMap<CommandClassId, ClassValues>,
}

/// Everything known about one node.
///
/// Values may be populated before the node is ready. The value table is
/// keyed by the full `(class, instance, index)` triple, so a triple maps to
/// at most one record.
#[derive(Debug, Clone)]
pub struct NodeState {
    id: NodeId,
    ready: bool,
    metadata: NodeMetadata,
    values: BTreeMap<ValueKey, Arc<ValueRecord>>,
    /// Every class that has held a value since the node was added.
    known_classes: BTreeSet<CommandClassId>,
}

impl NodeState {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            ready: false,
            metadata: NodeMetadata::default(),
            values: BTreeMap::new(),
            known_classes: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }

    pub fn values(&self) -> &BTreeMap<ValueKey, Arc<ValueRecord>> {
        &self.values
    }

    pub fn value(&self, key: &ValueKey) -> Option<&Arc<ValueRecord>> {
        self.values.get(key)
    }

    /// Command classes with at least one value.
    pub fn classes(&self) -> BTreeSet<CommandClassId> {
        self.values.keys().map(|k| k.class_id).collect()
    }

    pub fn has_class(&self, class_id: CommandClassId) -> bool {
        self.values
            .range(ValueKey::class_range(class_id))
            .next()
            .is_some()
    }

    /// Whether the class has ever had a value on this node, even if all of
    /// them have since been removed.
    pub fn knows_class(&self, class_id: CommandClassId) -> bool {
        self.known_classes.contains(&class_id)
    }

    /// Values of one class, optionally narrowed to one instance.
    ///
    /// Returns `None` when the class never had a value.
    pub fn class_values(&self, class_id: CommandClassId, instance: Option<u8>) -> Option<ClassValues> {
        if !self.knows_class(class_id) {
            return None;
        }
        let range = match instance {
            Some(instance) => ValueKey::instance_range(class_id, instance),
            None => ValueKey::class_range(class_id),
        };
        Some(group(self.values.range(range)))
    }

    pub fn inspect(&self) -> Inspection {
        let mut values: BTreeMap<CommandClassId, ClassValues> = BTreeMap::new();
        for (key, record) in &self.values {
            values
                .entry(key.class_id)
                .or_default()
                .entry(key.instance)
                .or_default()
                .insert(key.index, Arc::clone(record));
        }
        Inspection {
            metadata: self.metadata.clone(),
            values,
        }
    }

    // ── Mutation (registry only) ─────────────────────────────────────

    pub(crate) fn mark_ready(&mut self, metadata: NodeMetadata) {
        self.metadata = metadata;
        self.ready = true;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.metadata.set_name(name);
    }

    /// Insert or replace a record, returning the previous one.
    pub(crate) fn insert_value(
        &mut self,
        key: ValueKey,
        record: Arc<ValueRecord>,
    ) -> Option<Arc<ValueRecord>> {
        self.known_classes.insert(key.class_id);
        self.values.insert(key, record)
    }

    pub(crate) fn remove_value(&mut self, key: &ValueKey) -> Option<Arc<ValueRecord>> {
        self.values.remove(key)
    }
}

fn group<'a>(entries: impl Iterator<Item = (&'a ValueKey, &'a Arc<ValueRecord>)>) -> ClassValues {
    let mut out = ClassValues::new();
    for (key, record) in entries {
        out.entry(key.instance)
            .or_default()
            .insert(key.index, Arc::clone(record));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ValueKind;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Arc<ValueRecord> {
        Arc::new(ValueRecord {
            value,
            label: "Level".into(),
            kind: ValueKind::Byte,
            unit: None,
            min: None,
            max: None,
            help: None,
        })
    }

    fn populated() -> NodeState {
        let mut node = NodeState::new(NodeId(7));
        node.insert_value(ValueKey::new(CommandClassId(0x26), 1, 0), record(json!(10)));
        node.insert_value(ValueKey::new(CommandClassId(0x26), 2, 0), record(json!(20)));
        node.insert_value(ValueKey::new(CommandClassId(0x80), 1, 0), record(json!(95)));
        node
    }

    #[test]
    fn classes_follow_values() {
        let mut node = populated();
        assert_eq!(node.classes().len(), 2);

        node.remove_value(&ValueKey::new(CommandClassId(0x80), 1, 0));
        assert_eq!(
            node.classes().into_iter().collect::<Vec<_>>(),
            vec![CommandClassId(0x26)]
        );
        assert!(!node.has_class(CommandClassId(0x80)));
        assert!(node.knows_class(CommandClassId(0x80)));
    }

    #[test]
    fn emptied_class_stays_known() {
        let mut node = populated();
        node.remove_value(&ValueKey::new(CommandClassId(0x80), 1, 0));

        let values = node.class_values(CommandClassId(0x80), None).unwrap();
        assert!(values.is_empty());
        assert!(node.class_values(CommandClassId(0x31), None).is_none());
    }

    #[test]
    fn class_values_by_instance() {
        let node = populated();

        let all = node.class_values(CommandClassId(0x26), None).unwrap();
        assert_eq!(all.len(), 2);

        let second = node.class_values(CommandClassId(0x26), Some(2)).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[&2][&0].value, json!(20));

        let missing = node.class_values(CommandClassId(0x26), Some(9)).unwrap();
        assert!(missing.is_empty());

        assert!(node.class_values(CommandClassId(0x31), None).is_none());
    }

    #[test]
    fn inspect_nests_values() {
        let node = populated();
        let inspection = node.inspect();
        assert_eq!(inspection.values[&CommandClassId(0x80)][&1][&0].value, json!(95));

        let encoded = serde_json::to_value(&inspection).unwrap();
        assert_eq!(encoded["values"]["38"]["2"]["0"]["value"], json!(20));
    }

    #[test]
    fn display_name_falls_back_to_product() {
        let mut metadata = NodeMetadata::from(NodeInfo {
            product: Some("ZW100 MultiSensor 6".into()),
            node_type: Some("Routing Multilevel Sensor".into()),
            name: Some(String::new()),
            ..NodeInfo::default()
        });
        assert_eq!(
            metadata.display_name(),
            "ZW100 MultiSensor 6 (Routing Multilevel Sensor)"
        );

        metadata.set_name("Hallway".into());
        assert_eq!(metadata.display_name(), "Hallway");
    }
}
