//! Dispatcher module
//!
//! This module owns the subsystem registry and the dispatcher's own error
//! queue, and splits them into the inbound pipeline and the outbound
//! serializer driven by the two communication workers.

pub mod registry;
pub mod router;
pub mod serializer;

pub use self::registry::SubsystemHandle;
pub use self::router::InboundPipeline;
pub use self::serializer::OutboundSerializer;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use self::registry::{Drain, InboundRoute, OutboundDrain, Route};
use crate::core::{Config, Error, ErrorCode, QueueDepths, Result};
use crate::link::{ByteSink, ByteSource};
use crate::protocol::{
    Catalog, CHECKSUM_DELIMITER, DISPATCHER_NAME, ERROR_TAG, FIELD_SEPARATOR, FRAME_START, MIN_FRAME_LEN,
};
use crate::sched::Worker;

/// Non-blocking sender onto the dispatcher's own error queue
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    queue: mpsc::Sender<ErrorCode>,
}

impl ErrorReporter {
    /// Queues `code` for the peer; a full queue drops it
    pub fn report(&self, code: ErrorCode) {
        if self.queue.try_send(code).is_err() {
            warn!("Dispatcher error queue full, dropped error {}", code.code());
        }
    }
}

/// The dispatcher context: subsystem registry plus its own error queue
pub struct Dispatcher {
    config: Config,
    routes: Vec<Box<dyn InboundRoute>>,
    drains: Vec<Box<dyn OutboundDrain>>,
    reporter: ErrorReporter,
    errors: mpsc::Receiver<ErrorCode>,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty registry
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let (queue, errors) = mpsc::channel(config.max_dispatcher_errors);

        Ok(Dispatcher {
            config,
            routes: Vec::new(),
            drains: Vec::new(),
            reporter: ErrorReporter { queue },
            errors,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sender onto the dispatcher's own error queue
    pub fn reporter(&self) -> ErrorReporter {
        self.reporter.clone()
    }

    /// Names of the registered subsystems, in registration order
    pub fn subsystems(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|route| route.name())
    }

    /// Registers a subsystem with the configured default queue depths
    pub fn register<C: Catalog>(&mut self, name: &str, catalog: C) -> Result<SubsystemHandle<C>> {
        let depths = self.config.queues;
        self.register_with(name, catalog, depths)
    }

    /// Registers a subsystem.
    ///
    /// Fails, leaving the registry untouched, when the registry is full, the
    /// name is taken or the name cannot appear in a frame.
    pub fn register_with<C: Catalog>(
        &mut self,
        name: &str,
        catalog: C,
        depths: QueueDepths,
    ) -> Result<SubsystemHandle<C>> {
        if self.routes.len() >= self.config.max_subsystems {
            return Err(Error::registration(format!(
                "Cannot register {}: {} subsystems already registered",
                name, self.config.max_subsystems
            )));
        }

        self.validate_name(name)?;

        if self.subsystems().any(|existing| existing == name) {
            return Err(Error::registration(format!(
                "Subsystem {} is already registered",
                name
            )));
        }

        let queue_depths = [depths.inbound, depths.outbound, depths.errors];
        if queue_depths.iter().any(|depth| *depth == Some(0)) {
            return Err(Error::registration(format!(
                "Queues of {} need a depth of at least one",
                name
            )));
        }

        let name: Arc<str> = Arc::from(name);
        let catalog = Arc::new(catalog);
        let (inbound_tx, inbound_rx) = split_channel(depths.inbound);
        let (outbound_tx, outbound_rx) = split_channel(depths.outbound);
        let (errors_tx, errors_rx) = split_channel(depths.errors);

        self.routes.push(Box::new(Route {
            name: Arc::clone(&name),
            catalog: Arc::clone(&catalog),
            inbound: inbound_tx,
        }));
        self.drains.push(Box::new(Drain {
            name: Arc::clone(&name),
            catalog: Arc::clone(&catalog),
            outbound: outbound_rx,
            errors: errors_rx,
        }));

        info!(
            "Registered subsystem {} with {} message kinds",
            name,
            catalog.handlers().len()
        );

        Ok(SubsystemHandle::new(
            name,
            catalog,
            inbound_rx,
            outbound_tx,
            errors_tx,
        ))
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::registration("Subsystem name must not be empty"));
        }

        // Error frames carrying this name come from the dispatcher itself
        if name == DISPATCHER_NAME {
            return Err(Error::registration(format!(
                "Subsystem name {} is reserved",
                DISPATCHER_NAME
            )));
        }

        let reserved = [FRAME_START, CHECKSUM_DELIMITER, FIELD_SEPARATOR, b'\r', b'\n'];
        if name.bytes().any(|byte| reserved.contains(&byte) || !byte.is_ascii_graphic()) {
            return Err(Error::registration(format!(
                "Subsystem name {:?} contains framing characters",
                name
            )));
        }

        // The longest error frame this subsystem can raise must fit a frame
        let longest_error = format!("{},{},{}", name, ERROR_TAG, i32::MIN);
        if longest_error.len() + MIN_FRAME_LEN > self.config.max_frame_len {
            return Err(Error::registration(format!(
                "Subsystem name {} is too long for {} byte frames",
                name, self.config.max_frame_len
            )));
        }

        Ok(())
    }

    /// Splits the context into the receive and transmit halves
    pub fn split(self) -> (InboundPipeline, OutboundSerializer) {
        let inbound = InboundPipeline::new(
            self.config.max_frame_len,
            self.routes,
            self.reporter.clone(),
        );
        let outbound = OutboundSerializer::new(
            self.config.max_frame_len,
            self.drains,
            self.errors,
            self.reporter,
        );
        (inbound, outbound)
    }

    /// Spawns the receive and transmit workers
    pub fn start<S, K>(self, mut source: S, mut sink: K) -> DispatcherTasks
    where
        S: ByteSource + 'static,
        K: ByteSink + 'static,
    {
        let priority = self.config.task_priority;
        let idle = self.config.idle_poll_interval;
        let (mut inbound, mut outbound) = self.split();

        let rx = Worker::spawn("rx_worker", priority, idle, move || inbound.step(&mut source));
        let tx = Worker::spawn("tx_worker", priority, idle, move || outbound.step(&mut sink));

        DispatcherTasks { rx, tx }
    }
}

fn split_channel<T>(depth: Option<usize>) -> (Option<mpsc::Sender<T>>, Option<mpsc::Receiver<T>>) {
    match depth {
        Some(depth) => {
            let (tx, rx) = mpsc::channel(depth);
            (Some(tx), Some(rx))
        }
        None => (None, None),
    }
}

/// The running communication workers
#[derive(Debug)]
pub struct DispatcherTasks {
    rx: Worker,
    tx: Worker,
}

impl DispatcherTasks {
    /// Stops both workers and waits for them
    pub async fn shutdown(self) -> Result<()> {
        self.rx.stop();
        self.tx.stop();
        self.rx.join().await?;
        self.tx.join().await
    }
}
