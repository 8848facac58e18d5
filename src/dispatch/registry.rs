use std::fmt::Write;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::core::ErrorCode;
use crate::protocol::{Catalog, Fields, FrameBuilder, Message};

/// Dispatcher-side view of a subsystem's inbound half
pub(crate) trait InboundRoute: Send {
    fn name(&self) -> &str;

    /// Resolves, parses and enqueues one message for this subsystem
    fn route(&self, transaction_id: u32, message_name: &str, fields: &mut Fields<'_>)
        -> Result<(), ErrorCode>;
}

/// Dispatcher-side view of a subsystem's outbound half
pub(crate) trait OutboundDrain: Send {
    fn name(&self) -> &str;

    /// Takes the next queued error code
    fn try_recv_error(&mut self) -> Option<ErrorCode>;

    /// Takes the next queued message and writes its region into `builder`.
    ///
    /// Returns `None` when the queue is empty. The message is dropped before
    /// returning, whatever the outcome.
    fn serialize_next(&mut self, builder: &mut FrameBuilder) -> Option<Result<(), ErrorCode>>;
}

pub(crate) struct Route<C: Catalog> {
    pub(crate) name: Arc<str>,
    pub(crate) catalog: Arc<C>,
    pub(crate) inbound: Option<mpsc::Sender<Message<C::Payload>>>,
}

impl<C: Catalog> InboundRoute for Route<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn route(
        &self,
        transaction_id: u32,
        message_name: &str,
        fields: &mut Fields<'_>,
    ) -> Result<(), ErrorCode> {
        let (kind, handler) = self
            .catalog
            .find(message_name)
            .ok_or(ErrorCode::MissingMessageHandler)?;
        let parse = handler.parse.ok_or(ErrorCode::MissingMessageHandler)?;

        let mut message = self.catalog.alloc(kind).ok_or(ErrorCode::MemAlloc)?;
        message.set_transaction_id(transaction_id);
        parse(&mut message.payload, fields)?;

        let queue = self.inbound.as_ref().ok_or(ErrorCode::MessageRouting)?;
        queue
            .try_send(message)
            .map_err(|_| ErrorCode::MessageRouting)
    }
}

pub(crate) struct Drain<C: Catalog> {
    pub(crate) name: Arc<str>,
    pub(crate) catalog: Arc<C>,
    pub(crate) outbound: Option<mpsc::Receiver<Message<C::Payload>>>,
    pub(crate) errors: Option<mpsc::Receiver<ErrorCode>>,
}

impl<C: Catalog> Drain<C> {
    fn serialize(&self, message: &Message<C::Payload>, builder: &mut FrameBuilder) -> Result<(), ErrorCode> {
        let handler = self
            .catalog
            .handlers()
            .get(message.kind())
            .ok_or(ErrorCode::MissingMessageHandler)?;
        let serialize = handler.serialize.ok_or(ErrorCode::MissingMessageHandler)?;

        builder.begin();
        write!(
            builder,
            "{},{},{}",
            message.transaction_id(),
            self.name,
            handler.name
        )
        .map_err(|_| ErrorCode::MessageFormatting)?;

        let header_len = builder.len();
        match serialize(&message.payload, builder) {
            Ok(()) if builder.len() > header_len => Ok(()),
            Err(_) if builder.overflowed() => Err(ErrorCode::MessageBufTooSmall),
            _ => Err(ErrorCode::MessageFormatting),
        }
    }
}

impl<C: Catalog> OutboundDrain for Drain<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_recv_error(&mut self) -> Option<ErrorCode> {
        self.errors.as_mut()?.try_recv().ok()
    }

    fn serialize_next(&mut self, builder: &mut FrameBuilder) -> Option<Result<(), ErrorCode>> {
        let message = self.outbound.as_mut()?.try_recv().ok()?;
        Some(self.serialize(&message, builder))
    }
}

/// A subsystem's end of its queues
pub struct SubsystemHandle<C: Catalog> {
    name: Arc<str>,
    catalog: Arc<C>,
    inbound: Option<mpsc::Receiver<Message<C::Payload>>>,
    outbound: Option<mpsc::Sender<Message<C::Payload>>>,
    errors: Option<mpsc::Sender<ErrorCode>>,
}

impl<C: Catalog> SubsystemHandle<C> {
    pub(crate) fn new(
        name: Arc<str>,
        catalog: Arc<C>,
        inbound: Option<mpsc::Receiver<Message<C::Payload>>>,
        outbound: Option<mpsc::Sender<Message<C::Payload>>>,
        errors: Option<mpsc::Sender<ErrorCode>>,
    ) -> Self {
        SubsystemHandle {
            name,
            catalog,
            inbound,
            outbound,
            errors,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Takes the next routed message, if any
    pub fn try_recv(&mut self) -> Option<Message<C::Payload>> {
        self.inbound.as_mut()?.try_recv().ok()
    }

    /// Allocates a message of `kind` from the subsystem's pools
    pub fn alloc(&self, kind: usize) -> Option<Message<C::Payload>> {
        self.catalog.alloc(kind)
    }

    /// Queues a message for the peer, handing it back when the queue is full or absent
    pub fn send(&self, message: Message<C::Payload>) -> Result<(), Message<C::Payload>> {
        match &self.outbound {
            Some(queue) => queue.try_send(message).map_err(|e| e.into_inner()),
            None => Err(message),
        }
    }

    /// Queues an error code for the peer; returns false when it was dropped
    pub fn send_error(&self, code: ErrorCode) -> bool {
        let sent = self
            .errors
            .as_ref()
            .map(|queue| queue.try_send(code).is_ok())
            .unwrap_or(false);
        if !sent {
            warn!("Dropped error {} from {}", code.code(), self.name);
        }
        sent
    }
}
