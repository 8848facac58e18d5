use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::ByteRing;
use crate::core::{Config, Error, Result};

/// Read timeout of the serial port, also the pumps' stop latency
const PUMP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Spawns a thread moving bytes from `reader` into `ring`.
///
/// Bytes arriving while the ring is full are dropped; the ring latches the
/// overrun for the consumer to report. The thread ends on `stop`, on end of
/// stream or on a read error.
pub fn spawn_rx_pump<R>(
    mut reader: R,
    ring: ByteRing,
    stop: Arc<AtomicBool>,
    stack_size: usize,
) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("uart-rx".into())
        .stack_size(stack_size)
        .spawn(move || {
            let mut chunk = [0u8; 64];
            while !stop.load(Ordering::Relaxed) {
                match reader.read(&mut chunk) {
                    Ok(0) => {
                        debug!("Receive stream closed");
                        break;
                    }
                    Ok(count) => {
                        let dropped = chunk[..count]
                            .iter()
                            .filter(|byte| !ring.push(**byte))
                            .count();
                        if dropped > 0 {
                            warn!("Receive buffer full, dropped {} bytes", dropped);
                        }
                    }
                    Err(e) if is_transient(&e) => continue,
                    Err(e) => {
                        warn!("Serial read failed: {}", e);
                        break;
                    }
                }
            }
        })
}

/// Spawns a thread moving bytes from `ring` into `writer`
pub fn spawn_tx_pump<W>(
    mut writer: W,
    ring: ByteRing,
    stop: Arc<AtomicBool>,
    stack_size: usize,
) -> io::Result<JoinHandle<()>>
where
    W: Write + Send + 'static,
{
    thread::Builder::new()
        .name("uart-tx".into())
        .stack_size(stack_size)
        .spawn(move || {
            let mut chunk = [0u8; 64];
            while !stop.load(Ordering::Relaxed) {
                let count = ring.pop_into(&mut chunk, PUMP_POLL_INTERVAL);
                if count == 0 {
                    continue;
                }
                if let Err(e) = writer.write_all(&chunk[..count]).and_then(|_| writer.flush()) {
                    warn!("Serial write failed: {}", e);
                    break;
                }
            }
        })
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// A serial port with its receive and transmit rings and pump threads
pub struct SerialLink {
    /// Bytes received from the port
    pub rx: ByteRing,
    /// Bytes queued for the port
    pub tx: ByteRing,
    stop: Arc<AtomicBool>,
    pumps: Vec<JoinHandle<()>>,
}

impl SerialLink {
    /// Opens `device` and starts both pumps
    pub fn open(device: &str, baud_rate: u32, config: &Config) -> Result<Self> {
        let port = serialport::new(device, baud_rate)
            .timeout(PUMP_POLL_INTERVAL)
            .open()?;
        let writer = port.try_clone()?;

        info!("Opened {} at {} baud", device, baud_rate);
        Self::from_io(port, writer, config)
    }

    /// Starts the pumps over an arbitrary reader and writer
    pub fn from_io<R, W>(reader: R, writer: W, config: &Config) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let rx = ByteRing::new(config.rx_buffer_size);
        let tx = ByteRing::new(config.tx_buffer_size);
        let stop = Arc::new(AtomicBool::new(false));

        let pumps = vec![
            spawn_rx_pump(reader, rx.clone(), Arc::clone(&stop), config.task_stack_size)?,
            spawn_tx_pump(writer, tx.clone(), Arc::clone(&stop), config.task_stack_size)?,
        ];

        Ok(SerialLink { rx, tx, stop, pumps })
    }

    /// Stops both pumps and waits for them
    pub fn close(self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        for pump in self.pumps {
            pump.join()
                .map_err(|_| Error::worker("Serial pump panicked"))?;
        }
        Ok(())
    }
}
