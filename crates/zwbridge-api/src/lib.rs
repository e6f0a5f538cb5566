// zwbridge-api: Typed boundary with the Z-Wave driver (events in, commands out)

pub mod command;
pub mod error;
pub mod event;
pub mod gateway;
pub mod types;

pub use command::{Driver, DriverCommand};
pub use error::Error;
pub use event::{DriverEvent, NodeInfo, ValueDescriptor};
pub use gateway::{GatewayDriver, ReconnectConfig};
pub use types::{CommandClassId, NetworkId, NodeId};
