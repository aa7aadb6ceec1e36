// hostwatch-driver: Windows collaborators for the hostwatch agent
// Registry reads, registry change notification and desktop alerts

pub mod error;
pub mod notify;
pub mod registry;

pub use error::{DriverError, DriverResult};
pub use registry::{Hive, KeyNotification, WaitStatus};

/// Driver version
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");
