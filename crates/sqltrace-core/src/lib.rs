//! sqltrace-core — shared library for the sqltrace profiler.
//!
//! Provides:
//! - `record` — operation kinds and the raw event model
//! - `wire` — the NUL-framed record codec (writer and parser)
//! - `group` — frame filtering, group keys, per-group accumulation
//! - `stats` — descriptive statistics over duration samples
//!
//! The tracer (`sqltrace`) uses the writer side of `wire`; the report CLI
//! (`sqltrace-report`) uses the parser, grouping and statistics. Neither
//! direction performs I/O beyond `std::io` traits; compression is layered
//! on by the callers.

pub mod group;
pub mod record;
pub mod stats;
pub mod wire;
