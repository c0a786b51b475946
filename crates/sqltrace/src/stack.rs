//! Call-stack capture for emitted records.
//!
//! Walks the native stack at emission time and keeps `(file, line)` pairs,
//! innermost-first, starting at the application's invocation of the
//! database API. Frames without debug info are dropped; the leading run of
//! backtrace-machinery frames is recognized by symbol name, and a fixed
//! count of tracer/proxy frames is skipped on top of that.

use backtrace::Backtrace;

use sqltrace_core::record::Frame;

/// At most this many frames are recorded per event.
pub const MAX_FRAMES: usize = 30;

/// Resolved frames between [`capture`] and the application code on the
/// emission path: `capture` itself, the tracer's observer notification, the
/// proxy's `observed` helper and the proxy trait method.
pub(crate) const TRACER_SKIP_FRAMES: usize = 4;

/// Captures up to [`MAX_FRAMES`] frames, skipping the backtrace machinery
/// and then `skip` additional resolved frames.
pub fn capture(skip: usize) -> Vec<Frame> {
    let trace = Backtrace::new();
    let mut frames = Vec::new();
    let mut to_skip = skip;
    let mut leading_machinery = true;

    for frame in trace.frames() {
        // First symbol with full debug info; inlined duplicates add noise
        // without adding locations.
        let Some(symbol) = frame
            .symbols()
            .iter()
            .find(|s| s.filename().is_some() && s.lineno().is_some())
        else {
            continue;
        };

        if leading_machinery {
            let in_backtrace = symbol
                .name()
                .map(|n| n.to_string().starts_with("backtrace"))
                .unwrap_or(false);
            if in_backtrace {
                continue;
            }
            leading_machinery = false;
        }

        if to_skip > 0 {
            to_skip -= 1;
            continue;
        }

        // Both are Some by the filter above.
        let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) else {
            continue;
        };
        frames.push(Frame::new(file.display().to_string(), line));
        if frames.len() == MAX_FRAMES {
            break;
        }
    }

    frames
}
