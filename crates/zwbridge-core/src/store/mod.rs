// ── Node storage ──
//
// The registry owns every node; the collection publishes ready devices
// to subscribers.

pub(crate) mod collection;
mod registry;

pub(crate) use registry::NodeSlot;
pub use registry::NodeRegistry;
