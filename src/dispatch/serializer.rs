use std::fmt::Write;

use bytes::{Buf, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::registry::OutboundDrain;
use super::ErrorReporter;
use crate::core::ErrorCode;
use crate::link::ByteSink;
use crate::protocol::{FrameBuilder, DISPATCHER_NAME, ERROR_TAG};
use crate::sched::Step;

/// Transmit half of the dispatcher.
///
/// Each step sends at most one frame, picked in strict priority order: the
/// dispatcher's own errors, then subsystem errors, then subsystem messages,
/// subsystems taken in registration order.
///
/// Error frames are never torn. An error frame the sink cannot take at once
/// stays pending and goes out over the following steps before anything else.
pub struct OutboundSerializer {
    builder: FrameBuilder,
    drains: Vec<Box<dyn OutboundDrain>>,
    errors: mpsc::Receiver<ErrorCode>,
    reporter: ErrorReporter,
    /// Unwritten tail of the current error frame
    pending: BytesMut,
}

impl OutboundSerializer {
    pub(crate) fn new(
        max_frame_len: usize,
        drains: Vec<Box<dyn OutboundDrain>>,
        errors: mpsc::Receiver<ErrorCode>,
        reporter: ErrorReporter,
    ) -> Self {
        OutboundSerializer {
            builder: FrameBuilder::new(max_frame_len),
            drains,
            errors,
            reporter,
            pending: BytesMut::with_capacity(max_frame_len),
        }
    }

    /// Bytes of an error frame still waiting for room in the sink
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Sends at most one pending item to `sink`
    pub fn step(&mut self, sink: &mut dyn ByteSink) -> Step {
        if !self.pending.is_empty() {
            return self.flush_pending(sink);
        }

        if let Ok(code) = self.errors.try_recv() {
            self.queue_error(DISPATCHER_NAME, code);
            self.flush_pending(sink);
            return Step::Worked;
        }

        for index in 0..self.drains.len() {
            if let Some(code) = self.drains[index].try_recv_error() {
                let name = self.drains[index].name().to_owned();
                self.queue_error(&name, code);
                self.flush_pending(sink);
                return Step::Worked;
            }
        }

        for drain in self.drains.iter_mut() {
            if let Some(serialized) = drain.serialize_next(&mut self.builder) {
                let outcome = serialized.and_then(|()| {
                    let frame = self.builder.finish()?;
                    let written = sink.write_bytes(frame);
                    if written < frame.len() {
                        warn!(
                            "Transmit buffer full, frame torn after {} of {} bytes",
                            written,
                            frame.len()
                        );
                        return Err(ErrorCode::TxBufferFull);
                    }
                    Ok(())
                });

                if let Err(code) = outcome {
                    debug!("Message from {} not sent: {}", drain.name(), code);
                    self.reporter.report(code);
                }
                return Step::Worked;
            }
        }

        Step::Idle
    }

    /// Builds `$<name>,ERROR,<code>*CC\r\n` into the pending buffer
    fn queue_error(&mut self, name: &str, code: ErrorCode) {
        self.builder.begin();
        let written = write!(self.builder, "{},{},{}", name, ERROR_TAG, code.code());
        match written
            .map_err(|_| ErrorCode::MessageFormatting)
            .and_then(|()| self.builder.finish())
        {
            Ok(frame) => self.pending.extend_from_slice(frame),
            // Registration keeps names short enough for this not to happen
            Err(_) => warn!("Error frame for {} does not fit, dropped error {}", name, code.code()),
        }
    }

    /// Writes as much of the pending error frame as the sink takes
    fn flush_pending(&mut self, sink: &mut dyn ByteSink) -> Step {
        let written = sink.write_bytes(&self.pending);
        self.pending.advance(written);
        if written == 0 {
            // Sink full; sleep instead of spinning
            Step::Idle
        } else {
            Step::Worked
        }
    }
}
