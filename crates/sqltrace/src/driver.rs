//! Driver abstraction and the timing proxy.
//!
//! The tracer does not talk to a database itself. It consumes a driver
//! through the trait seam below and interposes a proxy that times every
//! operation. Instead of a before/after hook pair per operation, the proxy
//! exposes one uniform capability: after each operation it notifies a
//! single [`OpObserver`] with the operation kind, the connection token, the
//! statement (if any), the elapsed wall-clock time and whether the driver
//! succeeded. The observer dispatches on the kind.
//!
//! The proxy never retries, never swallows and never alters a driver
//! result; observer failures must not propagate into the driver call path.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqltrace_core::record::OpKind;

/// Result rows from [`Connection::query`], materialized as text cells.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A database driver: a factory for connections.
pub trait Driver: Send + Sync {
    /// Opens a new connection to `dsn`.
    fn open(&self, dsn: &str) -> io::Result<Box<dyn Connection>>;
}

/// One driver connection. Implementations need not be thread-safe; callers
/// own a connection exclusively (`&mut self` throughout).
pub trait Connection: Send {
    /// Executes a statement that returns no rows; yields the affected-row
    /// count.
    fn exec(&mut self, statement: &str) -> io::Result<u64>;

    /// Executes a statement and returns its result rows.
    fn query(&mut self, statement: &str) -> io::Result<Rows>;

    /// Begins a transaction on this connection.
    fn begin(&mut self) -> io::Result<()>;

    /// Commits the open transaction.
    fn commit(&mut self) -> io::Result<()>;

    /// Rolls back the open transaction.
    fn rollback(&mut self) -> io::Result<()>;

    /// Closes the connection.
    fn close(&mut self) -> io::Result<()>;
}

/// Post-operation notification delivered by the proxy.
#[derive(Debug)]
pub struct Operation<'a> {
    pub kind: OpKind,
    /// Opaque printable token identifying the connection, or `"nil"` when
    /// the driver returned none (failed open).
    pub conn: &'a str,
    /// Statement text for `Exec`/`Query`; `None` otherwise.
    pub statement: Option<&'a str>,
    /// Wall-clock time of exactly the inner driver call.
    pub elapsed: Duration,
    /// Whether the driver reported success.
    pub ok: bool,
}

/// Receives one notification per proxied operation, on the caller's thread.
///
/// Implementations must be cheap when idle and must never panic: they run
/// inside the application's database call path.
pub trait OpObserver: Send + Sync {
    fn operation(&self, op: &Operation<'_>);
}

/// Wraps an inner driver so that every operation on it, and on every
/// connection it opens, is timed and reported to the observer.
pub struct ProxyDriver {
    inner: Arc<dyn Driver>,
    observer: Arc<dyn OpObserver>,
}

impl ProxyDriver {
    pub fn new(inner: Arc<dyn Driver>, observer: Arc<dyn OpObserver>) -> Self {
        Self { inner, observer }
    }
}

impl Driver for ProxyDriver {
    fn open(&self, dsn: &str) -> io::Result<Box<dyn Connection>> {
        let started = Instant::now();
        let result = self.inner.open(dsn);
        let elapsed = started.elapsed();
        match result {
            Ok(inner) => {
                let conn = ProxyConn::new(inner, Arc::clone(&self.observer));
                self.observer.operation(&Operation {
                    kind: OpKind::Open,
                    conn: &conn.token,
                    statement: None,
                    elapsed,
                    ok: true,
                });
                Ok(Box::new(conn))
            }
            Err(e) => {
                self.observer.operation(&Operation {
                    kind: OpKind::Open,
                    conn: "nil",
                    statement: None,
                    elapsed,
                    ok: false,
                });
                Err(e)
            }
        }
    }
}

/// A proxied connection: forwards every call to the inner connection and
/// notifies the observer afterwards.
struct ProxyConn {
    inner: Box<dyn Connection>,
    /// Stable for the lifetime of this connection: the inner connection's
    /// heap address, rendered as hex. Addresses may be reused after the
    /// connection is dropped, so tokens are correlation hints only.
    token: String,
    observer: Arc<dyn OpObserver>,
}

impl ProxyConn {
    fn new(inner: Box<dyn Connection>, observer: Arc<dyn OpObserver>) -> Self {
        let addr = &*inner as *const dyn Connection as *const () as usize;
        Self {
            inner,
            token: format!("0x{addr:x}"),
            observer,
        }
    }

    fn observed<T>(
        &mut self,
        kind: OpKind,
        statement: Option<&str>,
        call: impl FnOnce(&mut dyn Connection) -> io::Result<T>,
    ) -> io::Result<T> {
        let started = Instant::now();
        let result = call(self.inner.as_mut());
        self.observer.operation(&Operation {
            kind,
            conn: &self.token,
            statement,
            elapsed: started.elapsed(),
            ok: result.is_ok(),
        });
        result
    }
}

impl Connection for ProxyConn {
    fn exec(&mut self, statement: &str) -> io::Result<u64> {
        self.observed(OpKind::Exec, Some(statement), |c| c.exec(statement))
    }

    fn query(&mut self, statement: &str) -> io::Result<Rows> {
        self.observed(OpKind::Query, Some(statement), |c| c.query(statement))
    }

    fn begin(&mut self) -> io::Result<()> {
        self.observed(OpKind::Begin, None, |c| c.begin())
    }

    fn commit(&mut self) -> io::Result<()> {
        self.observed(OpKind::Commit, None, |c| c.commit())
    }

    fn rollback(&mut self) -> io::Result<()> {
        self.observed(OpKind::Rollback, None, |c| c.rollback())
    }

    fn close(&mut self) -> io::Result<()> {
        self.observed(OpKind::Close, None, |c| c.close())
    }
}
