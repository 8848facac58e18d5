use tracing::debug;

use super::registry::InboundRoute;
use super::ErrorReporter;
use crate::core::ErrorCode;
use crate::link::ByteSource;
use crate::protocol::fields::parse_u32;
use crate::protocol::{Assembled, Fields, FrameAssembler};
use crate::sched::Step;

/// Receive half of the dispatcher: frame assembly plus routing
pub struct InboundPipeline {
    assembler: FrameAssembler,
    routes: Vec<Box<dyn InboundRoute>>,
    errors: ErrorReporter,
}

impl InboundPipeline {
    pub(crate) fn new(
        max_frame_len: usize,
        routes: Vec<Box<dyn InboundRoute>>,
        errors: ErrorReporter,
    ) -> Self {
        InboundPipeline {
            assembler: FrameAssembler::new(max_frame_len),
            routes,
            errors,
        }
    }

    /// Consumes at most one byte from `source`
    pub fn step(&mut self, source: &mut dyn ByteSource) -> Step {
        if source.take_overrun() {
            self.errors.report(ErrorCode::RxBufferFull);
        }

        let byte = match source.try_read_byte() {
            Some(byte) => byte,
            None => return Step::Idle,
        };

        match self.assembler.feed(byte) {
            Some(Assembled::Payload(payload)) => self.dispatch(&payload),
            Some(Assembled::Rejected(code)) => {
                debug!("Dropped inbound frame: {}", code);
                self.errors.report(code);
            }
            None => {}
        }

        Step::Worked
    }

    /// Routes one de-framed payload, reporting any failure
    pub fn dispatch(&self, payload: &[u8]) {
        if let Err(code) = self.route(payload) {
            debug!("Frame not routed: {}", code);
            self.errors.report(code);
        }
    }

    fn route(&self, payload: &[u8]) -> Result<(), ErrorCode> {
        let text = std::str::from_utf8(payload).map_err(|_| ErrorCode::MessageParsing)?;
        let mut fields = Fields::new(text);

        let transaction_id = fields
            .next_field()
            .and_then(parse_u32)
            .ok_or(ErrorCode::MessageParsing)?;
        let subsystem = fields.required()?;
        let message = fields.required()?;

        let route = self
            .routes
            .iter()
            .find(|route| route.name() == subsystem)
            .ok_or(ErrorCode::UnknownSubsystem)?;

        route.route(transaction_id, message, &mut fields)?;
        debug!(transaction_id, subsystem, message, "Routed frame");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Config, QueueDepths};
    use crate::dispatch::testing::{EchoCatalog, RecordingSink, PING};
    use crate::dispatch::{Dispatcher, OutboundSerializer, SubsystemHandle};
    use crate::link::ByteRing;
    use crate::protocol::frame::encode_frame;

    fn setup(depths: QueueDepths, slots: usize) -> (InboundPipeline, OutboundSerializer, SubsystemHandle<EchoCatalog>) {
        let mut dispatcher = Dispatcher::new(Config::default()).unwrap();
        let echo = dispatcher
            .register_with("ECHO", EchoCatalog::new(slots), depths)
            .unwrap();
        let (inbound, outbound) = dispatcher.split();
        (inbound, outbound, echo)
    }

    fn feed(inbound: &mut InboundPipeline, bytes: &[u8]) {
        let mut source = ByteRing::new(bytes.len().max(1));
        source.push_slice(bytes);
        while inbound.step(&mut source) == Step::Worked {}
    }

    /// Drains every pending outbound frame as text
    fn frames(outbound: &mut OutboundSerializer) -> String {
        let mut sink = RecordingSink::default();
        while outbound.step(&mut sink) == Step::Worked {}
        sink.text()
    }

    #[test]
    fn test_routes_to_subsystem() {
        let (mut inbound, mut outbound, mut echo) = setup(QueueDepths::default(), 4);
        feed(&mut inbound, &encode_frame(b"17,ECHO,PING,42"));

        let message = echo.try_recv().unwrap();
        assert_eq!(message.kind(), PING);
        assert_eq!(message.transaction_id(), 17);
        assert_eq!(message.payload, 42);
        assert!(echo.try_recv().is_none());
        assert_eq!(frames(&mut outbound), "");
    }

    #[test]
    fn test_routing_is_deterministic() {
        let (mut inbound, _outbound, mut echo) = setup(QueueDepths::default(), 4);
        let frame = encode_frame(b"5,ECHO,PING,1");
        feed(&mut inbound, &frame);
        feed(&mut inbound, &frame);

        for _ in 0..2 {
            let message = echo.try_recv().unwrap();
            assert_eq!((message.kind(), message.transaction_id(), message.payload), (PING, 5, 1));
        }
    }

    #[test]
    fn test_routing_errors() {
        let cases: &[(&[u8], i32)] = &[
            (b"x,ECHO,PING,1", -2),
            (b"-1,ECHO,PING,1", -2),
            (b"1,ECHO", -2),
            (b"1,NOBODY,PING,1", -12),
            (b"1,echo,PING,1", -12),
            (b"1,ECHO,PANG,1", -13),
            (b"1,ECHO,PONG,1", -13),
            (b"1,ECHO,NOOP", -13),
            (b"1,ECHO,PING", -2),
            (b"1,ECHO,PING,abc", -2),
            (b"1,ECHO,PING,1,2", -3),
            (b"1,ECHO,\xff", -2),
        ];

        for (payload, code) in cases {
            let (mut inbound, mut outbound, mut echo) = setup(QueueDepths::default(), 4);
            feed(&mut inbound, &encode_frame(payload));

            assert!(echo.try_recv().is_none());
            let expected = format!("DISPATCHER,ERROR,{}", code);
            assert_eq!(
                frames(&mut outbound),
                String::from_utf8(encode_frame(expected.as_bytes()).to_vec()).unwrap(),
                "{:?}",
                String::from_utf8_lossy(payload)
            );
            // Every allocated header went back to the pool
            assert_eq!(echo.catalog().headers.available(), 4);
        }
    }

    #[test]
    fn test_framing_errors_reported() {
        let (mut inbound, mut outbound, _echo) = setup(QueueDepths::default(), 4);
        feed(&mut inbound, b"$1,ECHO,PING,1*00\r\n");
        assert_eq!(frames(&mut outbound), "$DISPATCHER,ERROR,-6*44\r\n");
    }

    #[test]
    fn test_pool_exhaustion() {
        let (mut inbound, mut outbound, mut echo) = setup(QueueDepths::default(), 1);
        let frame = encode_frame(b"1,ECHO,PING,1");
        feed(&mut inbound, &frame);
        feed(&mut inbound, &frame);

        assert_eq!(frames(&mut outbound), "$DISPATCHER,ERROR,-1*43\r\n");

        // Freeing the routed message makes room for exactly one more
        drop(echo.try_recv().unwrap());
        feed(&mut inbound, &frame);
        assert!(echo.try_recv().is_some());
    }

    #[test]
    fn test_full_or_missing_inbound_queue() {
        let depths = QueueDepths {
            inbound: Some(1),
            ..Default::default()
        };
        let (mut inbound, mut outbound, echo) = setup(depths, 4);
        let frame = encode_frame(b"1,ECHO,PING,1");
        feed(&mut inbound, &frame);
        feed(&mut inbound, &frame);
        assert_eq!(frames(&mut outbound), "$DISPATCHER,ERROR,-10*73\r\n");
        assert_eq!(echo.catalog().headers.available(), 3);

        let depths = QueueDepths {
            inbound: None,
            ..Default::default()
        };
        let (mut inbound, mut outbound, echo) = setup(depths, 4);
        feed(&mut inbound, &frame);
        assert_eq!(frames(&mut outbound), "$DISPATCHER,ERROR,-10*73\r\n");
        assert_eq!(echo.catalog().headers.available(), 4);
    }

    #[test]
    fn test_overrun_reported() {
        let (mut inbound, mut outbound, _echo) = setup(QueueDepths::default(), 4);
        let mut source = ByteRing::new(1);
        source.push(b'$');
        source.push(b'1');

        inbound.step(&mut source);
        assert_eq!(frames(&mut outbound), "$DISPATCHER,ERROR,-8*4A\r\n");
        assert_eq!(inbound.step(&mut source), Step::Idle);
    }
}
