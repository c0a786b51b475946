//! The capture gate: many concurrent producers, at most one open window.
//!
//! Process-wide state is exactly two pieces: an activity flag readable
//! without locking, and the sink for the current window behind a mutex. The
//! flag alone decides whether a producer even looks at the sink: with no
//! window open, a submit is one atomic load and a branch. The sink pointer
//! stays mutex-guarded regardless, so an active flag with a half-installed
//! sink is impossible: the flag is cleared before the sink is swapped and
//! set again only after the swap completes.
//!
//! A producer that observes the flag set may still find no sink after
//! taking the mutex (the window just closed); it returns without writing.
//! Every record is written as one contiguous `write_all`, so records from
//! concurrent producers interleave only at record granularity.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use flate2::write::GzEncoder;
use tracing::debug;

/// Byte sink for one capture window. Writable while the window is open;
/// consumed at close to produce the final encoded stream.
pub trait RecordSink: Write + Send {
    /// Consumes the sink, flushing any trailer, and returns the bytes.
    fn finish(self: Box<Self>) -> std::io::Result<Vec<u8>>;
}

impl RecordSink for GzEncoder<Vec<u8>> {
    fn finish(self: Box<Self>) -> std::io::Result<Vec<u8>> {
        GzEncoder::finish(*self)
    }
}

/// Plain in-memory sink, useful for hosts (and tests) that want the raw
/// record stream without compression.
impl RecordSink for Vec<u8> {
    fn finish(self: Box<Self>) -> std::io::Result<Vec<u8>> {
        Ok(*self)
    }
}

pub struct CaptureGate {
    /// Lock-free fast-path flag; carries no invariant beyond its own value.
    active: AtomicBool,
    /// Reservation for the window protocol: set for the whole lifetime of
    /// one HTTP capture request so a second request can be rejected instead
    /// of corrupting the stream.
    reserved: AtomicBool,
    sink: Mutex<Option<Box<dyn RecordSink>>>,
}

impl CaptureGate {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            reserved: AtomicBool::new(false),
            sink: Mutex::new(None),
        }
    }

    /// Whether a capture window is currently accepting records.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Submits one complete record. Never blocks unless a window is open,
    /// never fails observably: write errors are dropped (the window stays
    /// up), a just-closed window drops the record.
    pub fn submit(&self, record: &[u8]) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        // The producer path must not panic, so poisoning is recovered
        // rather than unwrapped.
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(writer) = sink.as_mut() else {
            return;
        };
        if let Err(e) = writer.write_all(record) {
            debug!("dropping record: sink write failed: {e}");
        }
    }

    /// Reserves the window slot. Returns `false` when another window is
    /// already in progress.
    pub fn try_reserve(&self) -> bool {
        self.reserved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the reservation taken by [`try_reserve`](Self::try_reserve).
    pub fn release(&self) {
        self.reserved.store(false, Ordering::Release);
    }

    /// Installs the sink for a new window and activates the gate.
    pub fn open_window(&self, sink: Box<dyn RecordSink>) {
        self.active.store(false, Ordering::Release);
        {
            let mut guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
            *guard = Some(sink);
        }
        self.active.store(true, Ordering::Release);
    }

    /// Deactivates the gate and removes the sink. The caller finishes the
    /// sink to obtain the encoded stream.
    pub fn close_window(&self) -> Option<Box<dyn RecordSink>> {
        self.active.store(false, Ordering::Release);
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Scratch-buffer pool
// ---------------------------------------------------------------------------

/// Buffers kept around once released; beyond this they are simply dropped.
const MAX_POOLED: usize = 64;

/// Thread-safe reservoir of reusable record buffers.
///
/// A buffer is exclusive to the caller between `acquire` and `release`. An
/// empty pool hands out a fresh allocation, so acquisition never blocks on
/// anything but the pool lock.
pub struct BufPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufPool {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Returns a cleared buffer: length zero, capacity retained.
    pub fn acquire(&self) -> Vec<u8> {
        let mut buf = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        buf.clear();
        buf
    }

    pub fn release(&self, buf: Vec<u8>) {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < MAX_POOLED {
            free.push(buf);
        }
    }
}

impl Default for BufPool {
    fn default() -> Self {
        Self::new()
    }
}
