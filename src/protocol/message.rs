use std::fmt;

use super::fields::{Fields, ParseError};
use crate::util::Pooled;

/// Header carried by every message, drawn from the message pool
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Index into the owning subsystem's handler table
    pub kind: usize,
    /// Peer supplied correlation number, echoed on replies
    pub transaction_id: u32,
}

/// A routed message.
///
/// Messages are move-only; whoever drops the last owner returns the header
/// and payload slots to their pools.
pub struct Message<P> {
    header: Pooled<MessageHeader>,
    /// Subsystem specific payload
    pub payload: P,
}

impl<P> Message<P> {
    /// Builds a message of `kind` from a pooled header and payload
    pub fn new(mut header: Pooled<MessageHeader>, kind: usize, payload: P) -> Self {
        header.kind = kind;
        header.transaction_id = 0;
        Message { header, payload }
    }

    pub fn kind(&self) -> usize {
        self.header.kind
    }

    pub fn transaction_id(&self) -> u32 {
        self.header.transaction_id
    }

    pub fn set_transaction_id(&mut self, transaction_id: u32) {
        self.header.transaction_id = transaction_id;
    }
}

impl<P: fmt::Debug> fmt::Debug for Message<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind())
            .field("transaction_id", &self.transaction_id())
            .field("payload", &self.payload)
            .finish()
    }
}

/// Fills a payload from the fields after the message name
pub type ParseFn<P> = fn(&mut P, &mut Fields<'_>) -> Result<(), ParseError>;

/// Writes a payload as `,field,field...`
pub type SerializeFn<P> = fn(&P, &mut dyn fmt::Write) -> fmt::Result;

/// One named message kind of a subsystem.
///
/// Kinds the peer may send carry a parse function, kinds sent back to the
/// peer carry a serialize function.
pub struct MessageHandler<P> {
    pub name: &'static str,
    pub parse: Option<ParseFn<P>>,
    pub serialize: Option<SerializeFn<P>>,
}

impl<P> MessageHandler<P> {
    /// Handler for a message only ever received
    pub const fn inbound(name: &'static str, parse: ParseFn<P>) -> Self {
        MessageHandler {
            name,
            parse: Some(parse),
            serialize: None,
        }
    }

    /// Handler for a message only ever sent
    pub const fn outbound(name: &'static str, serialize: SerializeFn<P>) -> Self {
        MessageHandler {
            name,
            parse: None,
            serialize: Some(serialize),
        }
    }
}

impl<P> fmt::Debug for MessageHandler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandler")
            .field("name", &self.name)
            .field("parse", &self.parse.is_some())
            .field("serialize", &self.serialize.is_some())
            .finish()
    }
}

/// A subsystem's handler table plus its allocator
pub trait Catalog: Send + Sync + 'static {
    /// Payload carried by this subsystem's messages
    type Payload: Send + 'static;

    /// Handler table, indexed by message kind
    fn handlers(&self) -> &[MessageHandler<Self::Payload>];

    /// Allocates a message of `kind` with a default payload, or `None` when a pool is exhausted
    fn alloc(&self, kind: usize) -> Option<Message<Self::Payload>>;

    /// Looks a handler up by its exact name
    fn find(&self, name: &str) -> Option<(usize, &MessageHandler<Self::Payload>)> {
        self.handlers()
            .iter()
            .enumerate()
            .find(|(_, handler)| handler.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Pool;
    use std::fmt::Write;

    const PING: usize = 0;
    const PONG: usize = 1;

    fn parse_ping(payload: &mut u32, fields: &mut Fields<'_>) -> Result<(), ParseError> {
        *payload = fields.u32()?;
        fields.expect_end()
    }

    fn serialize_pong(payload: &u32, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, ",{}", payload)
    }

    struct PingCatalog {
        handlers: [MessageHandler<u32>; 2],
        headers: Pool<MessageHeader>,
    }

    impl PingCatalog {
        fn new(slots: usize) -> Self {
            PingCatalog {
                handlers: [
                    MessageHandler::inbound("PING", parse_ping),
                    MessageHandler::outbound("PONG", serialize_pong),
                ],
                headers: Pool::new("headers", slots),
            }
        }
    }

    impl Catalog for PingCatalog {
        type Payload = u32;

        fn handlers(&self) -> &[MessageHandler<u32>] {
            &self.handlers
        }

        fn alloc(&self, kind: usize) -> Option<Message<u32>> {
            Some(Message::new(self.headers.try_take()?, kind, 0))
        }
    }

    #[test]
    fn test_handler_lookup() {
        let catalog = PingCatalog::new(1);
        let (kind, handler) = catalog.find("PONG").unwrap();
        assert_eq!(kind, PONG);
        assert!(handler.parse.is_none());
        assert!(catalog.find("pong").is_none());
    }

    #[test]
    fn test_parse_and_serialize() {
        let catalog = PingCatalog::new(1);
        let mut message = catalog.alloc(PING).unwrap();
        message.set_transaction_id(9);

        let parse = catalog.handlers()[PING].parse.unwrap();
        parse(&mut message.payload, &mut Fields::new("42")).unwrap();
        assert_eq!(message.payload, 42);
        assert_eq!(message.transaction_id(), 9);

        let mut out = String::new();
        let serialize = catalog.handlers()[PONG].serialize.unwrap();
        serialize(&message.payload, &mut out).unwrap();
        assert_eq!(out, ",42");
    }

    #[test]
    fn test_drop_frees_header() {
        let catalog = PingCatalog::new(1);
        let message = catalog.alloc(PING).unwrap();
        assert!(catalog.alloc(PING).is_none());
        drop(message);

        let message = catalog.alloc(PONG).unwrap();
        assert_eq!(message.kind(), PONG);
        assert_eq!(message.transaction_id(), 0);
    }
}
