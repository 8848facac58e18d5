//! Comm Tester - interactive host side of the serial line protocol
//!
//! Reads payloads from stdin, frames them as `$<payload>*CC\r\n` and sends
//! them to the device. Every frame coming back is printed with a timestamp
//! and the outcome of its checksum check.
//!
//! # Usage
//!
//! ```bash
//! comm-tester /dev/ttyACM0 --baud 115200
//! > 1,SPINNER,SET_STATE,0,ON
//! ```
//!
//! Type `exit` to quit.

use std::time::Duration;

use chrono::Local;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use serial_dispatch::core::ErrorCode;
use serial_dispatch::link::{ByteSink, SerialLink};
use serial_dispatch::protocol::{Assembled, LineCodec};
use serial_dispatch::{Config, Result};

/// Size of the in-process pipe between the serial rings and the codec
const BRIDGE_BUFFER: usize = 4096;

/// How long the receive bridge waits for bytes before checking for shutdown
const BRIDGE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Interactive tester for the `$...*CC` serial protocol
#[derive(Parser, Debug)]
#[command(name = "comm-tester")]
#[command(about = "Send framed messages to a device and print its replies")]
#[command(version)]
struct Args {
    /// Serial device path
    device: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

fn print_inbound(item: Assembled) {
    match item {
        Assembled::Payload(payload) => {
            println!("{} < {} (checksum ok)", timestamp(), String::from_utf8_lossy(&payload));
        }
        Assembled::Rejected(ErrorCode::RxChecksum) => {
            println!("{} < frame with bad checksum", timestamp());
        }
        Assembled::Rejected(code) => {
            println!("{} < frame dropped: {} ({})", timestamp(), code, code.code());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let link = SerialLink::open(&args.device, args.baud, &Config::default())?;
    info!("Comm tester v{} on {}", serial_dispatch::VERSION, args.device);

    let (host, bridge) = tokio::io::duplex(BRIDGE_BUFFER);
    let (host_reader, host_writer) = tokio::io::split(host);
    let (mut bridge_reader, mut bridge_writer) = tokio::io::split(bridge);

    // Serial receive ring into the codec's side of the pipe
    let (chunks_tx, mut chunks_rx) = mpsc::channel::<Vec<u8>>(16);
    let rx_ring = link.rx.clone();
    tokio::task::spawn_blocking(move || {
        let mut chunk = [0u8; 256];
        while !chunks_tx.is_closed() {
            let count = rx_ring.pop_into(&mut chunk, BRIDGE_POLL_INTERVAL);
            if count > 0 && chunks_tx.blocking_send(chunk[..count].to_vec()).is_err() {
                break;
            }
        }
    });
    tokio::spawn(async move {
        while let Some(chunk) = chunks_rx.recv().await {
            if bridge_writer.write_all(&chunk).await.is_err() {
                break;
            }
        }
    });

    // Encoded frames from the pipe into the serial transmit ring
    let mut tx_ring = link.tx.clone();
    tokio::spawn(async move {
        let mut chunk = [0u8; 256];
        loop {
            match bridge_reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(count) => tokio::task::block_in_place(|| tx_ring.write_all_blocking(&chunk[..count])),
            }
        }
    });

    let mut frames_in = FramedRead::new(host_reader, LineCodec::new());
    let mut frames_out = FramedWrite::new(host_writer, LineCodec::new());
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };
                let line = line.trim();
                if line == "exit" {
                    break;
                }
                if line.is_empty() {
                    continue;
                }

                frames_out.send(line).await?;
                println!("{} > {}", timestamp(), line);
            }
            item = frames_in.next() => {
                match item {
                    Some(Ok(item)) => print_inbound(item),
                    Some(Err(e)) => {
                        warn!("Receive failed: {}", e);
                        break;
                    }
                    None => {
                        debug!("Receive pipe closed");
                        break;
                    }
                }
            }
        }
    }

    drop(frames_in);
    drop(frames_out);
    link.close()
}
