//! Utility module
//!
//! This module provides the fixed-capacity pools message payloads are drawn
//! from.

pub mod pool;

pub use self::pool::{Pool, Pooled};
