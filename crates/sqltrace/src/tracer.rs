//! The slow-query observer and the installation entry point.
//!
//! `Tracer` is the single handler behind the driver proxy's notifications.
//! For each successful operation at or above the threshold it formats one
//! wire record (kind, connection token, statement, duration in nanoseconds
//! and the captured call stack) into a pooled scratch buffer and submits
//! it to the capture gate. Everything else is dropped.
//!
//! The tracer must do no harm: it never returns an error into the driver
//! call path, never retries an operation and never panics on internal
//! failure.

use std::sync::Arc;
use std::time::Duration;

use sqltrace_core::wire;

use crate::driver::{Driver, OpObserver, Operation, ProxyDriver};
use crate::gate::{BufPool, CaptureGate};
use crate::http::CaptureEndpoint;
use crate::registry;
use crate::stack;

/// Name the traced driver is registered under. Hosts open connections
/// against this name; the string itself is an opaque identifier.
pub const TRACE_DRIVER_NAME: &str = "mysql:trace";

pub(crate) struct Tracer {
    threshold: Duration,
    gate: Arc<CaptureGate>,
    pool: BufPool,
}

impl Tracer {
    pub(crate) fn new(threshold: Duration, gate: Arc<CaptureGate>) -> Self {
        Self {
            threshold,
            gate,
            pool: BufPool::new(),
        }
    }
}

impl OpObserver for Tracer {
    fn operation(&self, op: &Operation<'_>) {
        if !op.ok {
            return;
        }
        if op.elapsed < self.threshold {
            return;
        }

        // Called directly (not through a helper) so the fixed skip count
        // in `stack` stays accurate.
        let frames = stack::capture(stack::TRACER_SKIP_FRAMES);

        // Clock granularity can report zero for sub-tick operations; the
        // wire format requires a positive duration.
        let duration_ns = (op.elapsed.as_nanos() as u64).max(1);

        let mut buf = self.pool.acquire();
        wire::write_record(
            &mut buf,
            op.kind,
            op.conn,
            op.statement.unwrap_or(""),
            duration_ns,
            &frames,
        );
        self.gate.submit(&buf);
        self.pool.release(buf);
    }
}

/// Installs the traced driver and returns the HTTP capture endpoint.
///
/// Wraps `inner` in the timing proxy, registers the proxy under
/// [`TRACE_DRIVER_NAME`], and hands back the endpoint whose router the host
/// mounts to open capture windows. Operations faster than `threshold` are
/// never emitted.
pub fn install(threshold: Duration, inner: Arc<dyn Driver>) -> CaptureEndpoint {
    let gate = Arc::new(CaptureGate::new());
    let observer: Arc<dyn OpObserver> = Arc::new(Tracer::new(threshold, Arc::clone(&gate)));
    registry::register(TRACE_DRIVER_NAME, Arc::new(ProxyDriver::new(inner, observer)));
    CaptureEndpoint::new(gate)
}
