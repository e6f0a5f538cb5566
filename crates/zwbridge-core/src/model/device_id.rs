use std::fmt;

use serde::{Serialize, Serializer};
use zwbridge_api::{NetworkId, NodeId};

/// Process-wide identity of a device: network plus node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId {
    pub network_id: NetworkId,
    pub node_id: NodeId,
}

impl DeviceId {
    pub fn new(network_id: NetworkId, node_id: NodeId) -> Self {
        Self {
            network_id,
            node_id,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zwave:{}:{}", self.network_id, self.node_id)
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_network_and_node() {
        let id = DeviceId::new(NetworkId(0xc0ff_ee01), NodeId(5));
        assert_eq!(id.to_string(), "zwave:c0ffee01:5");
    }
}
