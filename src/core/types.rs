use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};
use crate::protocol::MIN_FRAME_LEN;

/// Sizes of the fixed-capacity pools, one per payload class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSizes {
    /// Message header slots
    pub messages: usize,
    /// Channel selector, state and return value payloads
    pub small_payloads: usize,
    /// Spin plan payloads
    pub plan_payloads: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        PoolSizes {
            messages: super::MESSAGE_POOL_SIZE,
            small_payloads: super::SMALL_PAYLOAD_POOL_SIZE,
            plan_payloads: super::PLAN_PAYLOAD_POOL_SIZE,
        }
    }
}

/// Depths of the queues created for a subsystem at registration.
///
/// `None` leaves the queue out; routing to a subsystem without an inbound
/// queue fails with `MESSAGE_ROUTING_ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueDepths {
    /// Dispatcher to subsystem
    pub inbound: Option<usize>,
    /// Subsystem to dispatcher
    pub outbound: Option<usize>,
    /// Subsystem error codes to dispatcher
    pub errors: Option<usize>,
}

impl Default for QueueDepths {
    fn default() -> Self {
        QueueDepths {
            inbound: Some(super::MAX_INBOUND_MESSAGES),
            outbound: Some(super::MAX_OUTBOUND_MESSAGES),
            errors: Some(super::MAX_OUTBOUND_ERRORS),
        }
    }
}

/// Configuration of the dispatcher and the spinner subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Receive ring size in bytes
    pub rx_buffer_size: usize,
    /// Transmit ring size in bytes
    pub tx_buffer_size: usize,
    /// Maximum frame length in bytes
    pub max_frame_len: usize,
    /// Maximum number of spin plan legs accepted on the wire
    pub max_plan_legs: usize,
    /// Pool sizes per payload class
    pub pools: PoolSizes,
    /// Queue depths used for subsystems registered with defaults
    pub queues: QueueDepths,
    /// Depth of the dispatcher's own error queue
    pub max_dispatcher_errors: usize,
    /// Maximum number of registered subsystems
    pub max_subsystems: usize,
    /// Stack size of the byte pump threads
    pub task_stack_size: usize,
    /// Priority tag of the communication workers
    pub task_priority: u8,
    /// Sleep between polls when a worker found nothing to do
    #[serde(serialize_with = "super::serde::serialize_duration_ms")]
    #[serde(deserialize_with = "super::serde::deserialize_duration_ms")]
    pub idle_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rx_buffer_size: super::RX_BUFFER_SIZE,
            tx_buffer_size: super::TX_BUFFER_SIZE,
            max_frame_len: super::MAX_FRAME_LEN,
            max_plan_legs: super::MAX_PLAN_LEGS,
            pools: PoolSizes::default(),
            queues: QueueDepths::default(),
            max_dispatcher_errors: super::MAX_OUTBOUND_ERRORS,
            max_subsystems: super::MAX_SUBSYSTEMS,
            task_stack_size: super::TASK_STACK_SIZE,
            task_priority: super::COMM_TASK_PRIORITY,
            idle_poll_interval: Duration::from_millis(super::IDLE_POLL_INTERVAL_MS),
        }
    }
}

impl Config {
    /// Parses a configuration from TOML, filling missing keys with defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validates a configuration
    ///
    /// Checks that every buffer, pool and queue can hold at least one item
    /// and that a frame can hold the smallest valid message.
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_len < MIN_FRAME_LEN {
            return Err(Error::config(format!(
                "max_frame_len must be at least {}",
                MIN_FRAME_LEN
            )));
        }

        if self.rx_buffer_size == 0 || self.tx_buffer_size == 0 {
            return Err(Error::config("Byte buffers must not be empty"));
        }

        if self.max_plan_legs == 0 || self.max_plan_legs > super::MAX_PLAN_LEGS {
            return Err(Error::config(format!(
                "max_plan_legs must be within 1..={}",
                super::MAX_PLAN_LEGS
            )));
        }

        if self.pools.messages == 0
            || self.pools.small_payloads == 0
            || self.pools.plan_payloads == 0
        {
            return Err(Error::config("Pools need at least one slot"));
        }

        let depths = [self.queues.inbound, self.queues.outbound, self.queues.errors];
        if depths.iter().any(|depth| *depth == Some(0)) || self.max_dispatcher_errors == 0 {
            return Err(Error::config("Queues need a depth of at least one"));
        }

        if self.max_subsystems == 0 {
            return Err(Error::config("At least one subsystem must be allowed"));
        }

        if self.idle_poll_interval.is_zero() {
            return Err(Error::config("Idle poll interval must not be zero"));
        }

        Ok(())
    }
}
