use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::{ByteSink, ByteSource};

#[derive(Debug)]
struct RingState {
    bytes: VecDeque<u8>,
    overrun: bool,
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    state: Mutex<RingState>,
    /// Signalled when bytes are pushed
    readable: Condvar,
    /// Signalled when bytes are popped
    writable: Condvar,
}

/// Bounded byte FIFO shared between a pump thread and a worker.
///
/// Clones share the same buffer. Pushing into a full ring drops the byte
/// and latches an overrun flag.
#[derive(Debug, Clone)]
pub struct ByteRing {
    inner: Arc<Inner>,
}

impl ByteRing {
    pub fn new(capacity: usize) -> Self {
        ByteRing {
            inner: Arc::new(Inner {
                capacity,
                state: Mutex::new(RingState {
                    bytes: VecDeque::with_capacity(capacity),
                    overrun: false,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes one byte, returning false (and latching the overrun flag) when full
    pub fn push(&self, byte: u8) -> bool {
        let mut state = self.inner.state.lock();
        if state.bytes.len() >= self.inner.capacity {
            state.overrun = true;
            return false;
        }
        state.bytes.push_back(byte);
        drop(state);
        self.inner.readable.notify_one();
        true
    }

    /// Pushes as many bytes as fit and returns the count
    pub fn push_slice(&self, bytes: &[u8]) -> usize {
        let mut state = self.inner.state.lock();
        let room = self.inner.capacity - state.bytes.len();
        let count = room.min(bytes.len());
        state.bytes.extend(&bytes[..count]);
        drop(state);
        if count > 0 {
            self.inner.readable.notify_one();
        }
        count
    }

    /// Pops one byte
    pub fn pop(&self) -> Option<u8> {
        let mut state = self.inner.state.lock();
        let byte = state.bytes.pop_front();
        drop(state);
        if byte.is_some() {
            self.inner.writable.notify_one();
        }
        byte
    }

    /// Waits up to `timeout` for bytes, then moves as many as fit into `out`
    pub fn pop_into(&self, out: &mut [u8], timeout: Duration) -> usize {
        let mut state = self.inner.state.lock();
        if state.bytes.is_empty() {
            self.inner.readable.wait_for(&mut state, timeout);
        }

        let count = out.len().min(state.bytes.len());
        for (slot, byte) in out.iter_mut().zip(state.bytes.drain(..count)) {
            *slot = byte;
        }
        drop(state);
        if count > 0 {
            self.inner.writable.notify_all();
        }
        count
    }

    /// Clears and returns the overrun flag
    pub fn take_overrun(&self) -> bool {
        std::mem::take(&mut self.inner.state.lock().overrun)
    }
}

impl ByteSource for ByteRing {
    fn try_read_byte(&mut self) -> Option<u8> {
        self.pop()
    }

    fn take_overrun(&mut self) -> bool {
        ByteRing::take_overrun(self)
    }
}

impl ByteSink for ByteRing {
    fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        self.push_slice(bytes)
    }

    fn write_all_blocking(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let mut state = self.inner.state.lock();
            while state.bytes.len() >= self.inner.capacity {
                self.inner.writable.wait(&mut state);
            }
            let room = self.inner.capacity - state.bytes.len();
            let count = room.min(bytes.len());
            state.bytes.extend(&bytes[..count]);
            drop(state);
            self.inner.readable.notify_one();
            bytes = &bytes[count..];
        }
    }
}
