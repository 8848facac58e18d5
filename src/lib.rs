//! Serial Dispatch: checksummed line protocol and subsystem dispatcher
//!
//! This library implements the communication core of a motor/sensor
//! controller. Frames of the form `$<tid>,<subsystem>,<message>,...*CC\r\n`
//! are assembled from a byte stream, routed to registered subsystems over
//! bounded queues, and replies and error codes are serialized back to the
//! peer in strict priority order.
pub mod core;

pub mod dispatch;
pub mod link;
pub mod protocol;
pub mod sched;
pub mod spinner;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Config, Error, ErrorCode, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
