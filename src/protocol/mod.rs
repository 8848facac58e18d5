//! Wire protocol module
//!
//! This module defines the `$...*CC\r\n` line framing, the field tokenizer
//! used by message parsers, the bounded outbound frame builder and the
//! message model every subsystem plugs into.

pub mod assembler;
pub mod checksum;
pub mod codec;
pub mod fields;
pub mod frame;
pub mod message;

pub use self::assembler::{Assembled, FrameAssembler};
pub use self::codec::LineCodec;
pub use self::fields::{Fields, ParseError};
pub use self::frame::FrameBuilder;
pub use self::message::{Catalog, Message, MessageHandler, MessageHeader};

// Constants
/// Byte opening every frame
pub const FRAME_START: u8 = b'$';

/// Byte separating the checksummed region from the checksum
pub const CHECKSUM_DELIMITER: u8 = b'*';

/// Separator between fields
pub const FIELD_SEPARATOR: u8 = b',';

/// Terminator closing every frame
pub const FRAME_END: &[u8] = b"\r\n";

/// Length of `*CC\r\n`
pub const SUFFIX_LEN: usize = 5;

/// Smallest buffered frame, one region byte plus the suffix
pub const MIN_FRAME_LEN: usize = 1 + SUFFIX_LEN;

/// Name used in error frames raised by the dispatcher itself
pub const DISPATCHER_NAME: &str = "DISPATCHER";

/// Message field of error frames
pub const ERROR_TAG: &str = "ERROR";
