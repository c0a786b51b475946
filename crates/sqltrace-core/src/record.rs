//! Operation kinds and the raw event model.
//!
//! A `RawEvent` is one observed database operation: what it was, which
//! connection issued it, how long it took, and the application call stack
//! that triggered it. Events are produced by the tracer and re-materialized
//! by the wire parser; everything downstream (filtering, grouping,
//! statistics) works on this type.

/// The class of database operation a record describes.
///
/// Persisted verbatim (`as_str`) as the first field of every wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// A new driver connection was opened.
    Open,
    /// A prepared statement was executed (no result rows).
    Exec,
    /// A prepared statement was queried for rows.
    Query,
    /// A transaction began.
    Begin,
    /// A transaction committed.
    Commit,
    /// A transaction rolled back.
    Rollback,
    /// A driver connection was closed.
    Close,
}

impl OpKind {
    /// Wire name, written as the first record field.
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Open => "Open",
            OpKind::Exec => "Exec",
            OpKind::Query => "Query",
            OpKind::Begin => "Begin",
            OpKind::Commit => "Commit",
            OpKind::Rollback => "Rollback",
            OpKind::Close => "Close",
        }
    }

    /// Two-character prefix used to compress the kind column in reports.
    pub fn prefix(self) -> &'static str {
        match self {
            OpKind::Open => "Op",
            OpKind::Exec => "Ex",
            OpKind::Query => "Qu",
            OpKind::Begin => "Be",
            OpKind::Commit => "Co",
            OpKind::Rollback => "Ro",
            OpKind::Close => "Cl",
        }
    }

    /// Parses a wire name back into a kind.
    pub fn from_wire(s: &str) -> Option<OpKind> {
        match s {
            "Open" => Some(OpKind::Open),
            "Exec" => Some(OpKind::Exec),
            "Query" => Some(OpKind::Query),
            "Begin" => Some(OpKind::Begin),
            "Commit" => Some(OpKind::Commit),
            "Rollback" => Some(OpKind::Rollback),
            "Close" => Some(OpKind::Close),
            _ => None,
        }
    }

    /// Literal the aggregator substitutes for the (empty) description of
    /// transaction operations. `None` for kinds that keep their description.
    pub fn desc_literal(self) -> Option<&'static str> {
        match self {
            OpKind::Begin => Some("BEGIN"),
            OpKind::Commit => Some("COMMIT"),
            OpKind::Rollback => Some("ROLLBACK"),
            _ => None,
        }
    }
}

/// One call-stack frame: a source file and a line number.
///
/// Captured innermost-first, starting at the caller of the database API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
}

impl Frame {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// One decoded operation record.
///
/// `frames` holds `file:line` strings, innermost-first. The connection token
/// is an opaque correlation hint: stable for the lifetime of one driver
/// connection, but not guaranteed unique across the whole capture (the
/// tracer derives it from a memory address, which the allocator may reuse).
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: OpKind,
    pub conn: String,
    pub desc: String,
    pub duration_ns: u64,
    pub frames: Vec<String>,
}

impl RawEvent {
    /// Duration in seconds, the unit all statistics are computed in.
    pub fn duration_secs(&self) -> f64 {
        self.duration_ns as f64 / 1_000_000_000.0
    }
}
