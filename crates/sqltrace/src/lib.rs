//! sqltrace — in-process slow-query tracer for database drivers.
//!
//! Wraps a [`driver::Driver`] in a timing proxy. Every database operation
//! (open, exec, query, begin, commit, rollback, close) is measured; when an
//! operation succeeds and its wall-clock duration reaches the configured
//! threshold, the tracer emits one wire record carrying the operation kind,
//! connection token, statement text, duration and the application call
//! stack that issued it.
//!
//! Emission is gated: records only flow while an HTTP capture window is
//! open. The window handler installs a gzip sink, sleeps for the requested
//! number of seconds, and returns the compressed stream as the response
//! body. With no window open, the per-operation cost on the emission path
//! is a single atomic load and branch.
//!
//! Entry point:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn wire_up(driver: Arc<dyn sqltrace::driver::Driver>) {
//! let endpoint = sqltrace::install(Duration::from_millis(500), driver);
//! // Mount `endpoint.router()` wherever the host serves HTTP, then open
//! // connections through the traced driver:
//! let conn = sqltrace::registry::open(sqltrace::TRACE_DRIVER_NAME, "db://...");
//! # let _ = conn;
//! # }
//! ```
//!
//! The captured stream is aggregated offline by `sqltrace-report`.

pub mod driver;
pub mod gate;
pub mod http;
pub mod registry;
pub mod stack;

mod tracer;

pub use http::CaptureEndpoint;
pub use tracer::{TRACE_DRIVER_NAME, install};
