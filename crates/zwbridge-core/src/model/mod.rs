// ── Domain model ──
//
// Immutable snapshots of what the driver has told us about each node.
// The registry owns the live state; everything here is plain data.

pub mod command_class;
mod device_id;
mod node;
mod notice;
mod value;

pub use command_class::ClassInfo;
pub use device_id::DeviceId;
pub use node::{Inspection, NodeMetadata, NodeState};
pub use notice::{NodeEventNotice, SceneNotice, ValueChange};
pub use value::{ClassValues, ValueKey, ValueKind, ValueRecord};
