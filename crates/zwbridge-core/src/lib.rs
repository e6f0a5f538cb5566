// zwbridge-core: Node/value state mirror and controller life cycle between zwbridge-api and consumers.

pub mod config;
pub mod controller;
pub mod device;
pub mod discovery;
pub mod error;
pub mod model;
pub mod settings;
pub mod store;
pub mod stream;
pub mod supervisor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::ControllerConfig;
pub use controller::{
    Controller, ControllerBuilder, ControllerStatus, PAIR_INSTRUCTIONS, REMOVE_INSTRUCTIONS,
};
pub use device::DeviceProxy;
pub use discovery::{DeviceDirectory, Discovery};
pub use error::CoreError;
pub use settings::{CONTROLLER_SETTINGS_KEY, ControllerSettings, MemorySettings, SettingsStore};
pub use store::NodeRegistry;
pub use stream::{DeviceFilter, EntityStream};
pub use supervisor::{
    AttemptError, AttemptState, ConnectStatus, ConnectionState, ConnectionSupervisor, Rendezvous,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ClassInfo, ClassValues, DeviceId, Inspection, NodeEventNotice, NodeMetadata, NodeState,
    SceneNotice, ValueChange, ValueKey, ValueKind, ValueRecord,
};

// Boundary types consumers need alongside the core.
pub use zwbridge_api::{CommandClassId, Driver, DriverCommand, DriverEvent, NetworkId, NodeId};
