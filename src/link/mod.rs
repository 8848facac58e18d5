//! Byte link module
//!
//! This module defines the byte source and sink the dispatcher workers talk
//! to, the bounded ring standing in for interrupt-fed UART buffers, and the
//! serial port pumps that feed those rings on the host.

pub mod ring;
pub mod serial;

pub use self::ring::ByteRing;
pub use self::serial::SerialLink;

/// Non-blocking source of received bytes
pub trait ByteSource: Send {
    /// Takes the next received byte, if any
    fn try_read_byte(&mut self) -> Option<u8>;

    /// Reports, once, that received bytes were lost because the buffer was full
    fn take_overrun(&mut self) -> bool {
        false
    }
}

/// Sink for transmitted bytes
pub trait ByteSink: Send {
    /// Writes as many bytes as fit without blocking and returns that count
    fn write_bytes(&mut self, bytes: &[u8]) -> usize;

    /// Writes every byte, waiting for room as needed
    fn write_all_blocking(&mut self, bytes: &[u8]);
}
