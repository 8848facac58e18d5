//! Core types for the serial dispatcher
//!
//! This module contains the error taxonomy, the configuration surface and the
//! compile-time defaults every other module sizes itself from.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, ErrorCode, Result};
pub use self::types::{Config, PoolSizes, QueueDepths};

/// Size in bytes of the UART receive ring
pub const RX_BUFFER_SIZE: usize = 1000;

/// Size in bytes of the UART transmit ring
pub const TX_BUFFER_SIZE: usize = 1000;

/// Maximum frame length in bytes, excluding the leading `$` on ingress
pub const MAX_FRAME_LEN: usize = 1000;

/// Maximum number of legs any one spin plan may contain
pub const MAX_PLAN_LEGS: usize = 100;

/// Number of message headers that may be in flight at once
pub const MESSAGE_POOL_SIZE: usize = 35;

/// Number of small payloads (channel selectors, states, return values) in flight
pub const SMALL_PAYLOAD_POOL_SIZE: usize = 30;

/// Number of spin plan payloads in flight
pub const PLAN_PAYLOAD_POOL_SIZE: usize = 5;

/// Depth of every outbound error queue
pub const MAX_OUTBOUND_ERRORS: usize = 20;

/// Depth of every outbound message queue
pub const MAX_OUTBOUND_MESSAGES: usize = 35;

/// Depth of every inbound message queue
pub const MAX_INBOUND_MESSAGES: usize = 20;

/// Maximum number of subsystems the dispatcher accepts
pub const MAX_SUBSYSTEMS: usize = 4;

/// Stack size for threads standing in for interrupt handlers
pub const TASK_STACK_SIZE: usize = 64 * 1024;

/// Priority tag of the communication workers
pub const COMM_TASK_PRIORITY: u8 = 5;

/// Idle sleep of the communication workers, in milliseconds
pub const IDLE_POLL_INTERVAL_MS: u64 = 10;
