//! NUL-framed record codec.
//!
//! Record layout (one operation per record, fields NUL-terminated):
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ kind \0 conn \0 desc \0 duration_ns \0                   │
//! │ file0 \0 line0 \0 file1 \0 line1 \0 …                    │
//! │ \0                      (empty file field ends the list) │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! - `kind` is one of the operation kind wire names (`Open`, `Exec`, …).
//! - `conn` is the opaque connection token, or `nil`.
//! - `desc` is the statement text for `Exec`/`Query`, empty otherwise.
//! - `duration_ns` is decimal ASCII and must be positive.
//! - Frames are innermost-first; the list is self-delimited by a trailing
//!   empty file field, which appears as two consecutive NULs in the stream.
//!
//! NUL cannot occur inside any field. Statement text containing NUL is out
//! of contract: the reader would misframe.
//!
//! The stream carries no header and no record count: the parser reads
//! records until end of input, which is only legal at a record boundary.

use std::io::{self, BufRead};

use crate::record::{Frame, OpKind, RawEvent};

/// Field terminator.
const SEP: u8 = 0x00;

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Appends one complete record to `buf` in the exact wire layout.
///
/// The buffer is not cleared first; the tracer reuses pooled buffers and
/// clears them on acquisition.
pub fn write_record(
    buf: &mut Vec<u8>,
    kind: OpKind,
    conn: &str,
    desc: &str,
    duration_ns: u64,
    frames: &[Frame],
) {
    push_field(buf, kind.as_str());
    push_field(buf, conn);
    push_field(buf, desc);
    push_field(buf, &duration_ns.to_string());
    for frame in frames {
        push_field(buf, &frame.file);
        push_field(buf, &frame.line.to_string());
    }
    buf.push(SEP);
}

fn push_field(buf: &mut Vec<u8>, field: &str) {
    buf.extend_from_slice(field.as_bytes());
    buf.push(SEP);
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Single-pass parser over a decoded capture stream.
///
/// Yields `io::Result<RawEvent>`; the first decode error is terminal (the
/// iterator returns `None` afterwards). End of input is clean only at a
/// record boundary; anywhere else the stream is malformed.
///
/// On emission the description of `Begin`/`Commit`/`Rollback` records is
/// rewritten to the `BEGIN`/`COMMIT`/`ROLLBACK` literals.
pub struct RecordReader<R: BufRead> {
    input: R,
    token: Vec<u8>,
    failed: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            token: Vec::new(),
            failed: false,
        }
    }

    /// Reads one NUL-terminated token. `Ok(None)` means end of input before
    /// any byte; a token cut off by end of input is an error.
    fn read_token(&mut self) -> io::Result<Option<String>> {
        self.token.clear();
        let n = self.input.read_until(SEP, &mut self.token)?;
        if n == 0 {
            return Ok(None);
        }
        if self.token.last() != Some(&SEP) {
            return Err(io::Error::other("unterminated field at end of stream"));
        }
        self.token.pop();
        let text = std::str::from_utf8(&self.token)
            .map_err(|e| io::Error::other(format!("field is not valid UTF-8: {e}")))?;
        Ok(Some(text.to_string()))
    }

    /// Like `read_token`, but end of input is malformed (`what` names the
    /// missing field for the diagnostic).
    fn require_token(&mut self, what: &str) -> io::Result<String> {
        self.read_token()?
            .ok_or_else(|| io::Error::other(format!("truncated record: missing {what}")))
    }

    fn read_event(&mut self) -> io::Result<Option<RawEvent>> {
        // End of input is clean only here, before a record starts.
        let Some(kind_token) = self.read_token()? else {
            return Ok(None);
        };
        let kind = OpKind::from_wire(&kind_token)
            .ok_or_else(|| io::Error::other(format!("unknown operation kind {kind_token:?}")))?;

        let conn = self.require_token("connection token")?;
        let desc = self.require_token("description")?;

        let duration_token = self.require_token("duration")?;
        let duration_ns: u64 = duration_token
            .parse()
            .map_err(|_| io::Error::other(format!("invalid duration {duration_token:?}")))?;
        if duration_ns == 0 {
            return Err(io::Error::other("invalid duration: must be positive"));
        }

        let mut frames = Vec::new();
        loop {
            let file = self.require_token("frame file")?;
            if file.is_empty() {
                break;
            }
            let line_token = self.require_token("frame line number")?;
            let line: u32 = line_token
                .parse()
                .map_err(|_| io::Error::other(format!("invalid line number {line_token:?}")))?;
            frames.push(format!("{file}:{line}"));
        }

        let desc = match kind.desc_literal() {
            Some(literal) => literal.to_string(),
            None => desc,
        };

        Ok(Some(RawEvent {
            kind,
            conn,
            desc,
            duration_ns,
            frames,
        }))
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = io::Result<RawEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse_all(bytes: &[u8]) -> Vec<io::Result<RawEvent>> {
        RecordReader::new(Cursor::new(bytes.to_vec())).collect()
    }

    fn sample_event() -> (OpKind, &'static str, &'static str, u64, Vec<Frame>) {
        (
            OpKind::Exec,
            "0x1",
            "UPDATE t SET a=1",
            5_000_000_000,
            vec![Frame::new("app.c", 42)],
        )
    }

    #[test]
    fn test_write_record_exact_layout() {
        let (kind, conn, desc, dur, frames) = sample_event();
        let mut buf = Vec::new();
        write_record(&mut buf, kind, conn, desc, dur, &frames);
        assert_eq!(
            buf,
            b"Exec\x000x1\x00UPDATE t SET a=1\x005000000000\x00app.c\x0042\x00\x00"
        );
    }

    #[test]
    fn test_field_count_matches_frame_count() {
        let mut buf = Vec::new();
        let frames = vec![Frame::new("a.c", 1), Frame::new("b.c", 2)];
        write_record(&mut buf, OpKind::Query, "0x2", "SELECT 1", 100, &frames);
        // 4 header fields + 2 per frame + the empty list terminator.
        let seps = buf.iter().filter(|&&b| b == 0).count();
        assert_eq!(seps, 4 + 2 * frames.len() + 1);
    }

    #[test]
    fn test_round_trip_single_record() {
        let (kind, conn, desc, dur, frames) = sample_event();
        let mut buf = Vec::new();
        write_record(&mut buf, kind, conn, desc, dur, &frames);

        let events: Vec<_> = parse_all(&buf).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, OpKind::Exec);
        assert_eq!(events[0].conn, "0x1");
        assert_eq!(events[0].desc, "UPDATE t SET a=1");
        assert_eq!(events[0].duration_ns, 5_000_000_000);
        assert_eq!(events[0].frames, vec!["app.c:42"]);
    }

    #[test]
    fn test_round_trip_multiple_records_preserves_order() {
        let mut buf = Vec::new();
        write_record(
            &mut buf,
            OpKind::Query,
            "0x1",
            "SELECT 1",
            1_000_000_000,
            &[Frame::new("x.c", 10)],
        );
        write_record(&mut buf, OpKind::Begin, "0x1", "", 2_000_000_000, &[]);
        write_record(
            &mut buf,
            OpKind::Close,
            "0x2",
            "",
            3_000_000_000,
            &[Frame::new("y.c", 7), Frame::new("main.c", 99)],
        );

        let events: Vec<_> = parse_all(&buf).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, OpKind::Query);
        assert_eq!(events[1].kind, OpKind::Begin);
        assert_eq!(events[2].frames, vec!["y.c:7", "main.c:99"]);
    }

    #[test]
    fn test_desc_rewritten_for_transaction_kinds() {
        let mut buf = Vec::new();
        write_record(&mut buf, OpKind::Commit, "0x1", "", 1, &[]);
        write_record(&mut buf, OpKind::Begin, "0x1", "", 1, &[]);
        write_record(&mut buf, OpKind::Rollback, "0x1", "", 1, &[]);

        let events: Vec<_> = parse_all(&buf).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(events[0].desc, "COMMIT");
        assert_eq!(events[1].desc, "BEGIN");
        assert_eq!(events[2].desc, "ROLLBACK");
    }

    #[test]
    fn test_empty_stream_yields_no_events() {
        assert!(parse_all(b"").is_empty());
    }

    #[test]
    fn test_record_with_no_frames() {
        let mut buf = Vec::new();
        write_record(&mut buf, OpKind::Open, "0x1", "", 7, &[]);
        let events: Vec<_> = parse_all(&buf).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(events.len(), 1);
        assert!(events[0].frames.is_empty());
    }

    #[test]
    fn test_truncated_record_is_fatal() {
        // Record cut off after the desc field.
        let results = parse_all(b"Exec\x000x1\x00SELECT 1\x00");
        assert_eq!(results.len(), 1);
        let err = results[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("duration"), "{err}");
    }

    #[test]
    fn test_unterminated_final_field_is_fatal() {
        let results = parse_all(b"Exec\x000x1\x00SELECT 1\x00100");
        assert!(results[0].is_err());
    }

    #[test]
    fn test_non_numeric_duration_is_fatal() {
        let results = parse_all(b"Exec\x000x1\x00SELECT 1\x00abc\x00\x00");
        let err = results[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("invalid duration"), "{err}");
    }

    #[test]
    fn test_zero_duration_is_fatal() {
        let results = parse_all(b"Exec\x000x1\x00SELECT 1\x000\x00\x00");
        assert!(results[0].is_err());
    }

    #[test]
    fn test_negative_duration_is_fatal() {
        let results = parse_all(b"Exec\x000x1\x00SELECT 1\x00-5\x00\x00");
        assert!(results[0].is_err());
    }

    #[test]
    fn test_non_numeric_line_number_is_fatal() {
        let results = parse_all(b"Exec\x000x1\x00SELECT 1\x00100\x00app.c\x00xyz\x00\x00");
        let err = results[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("line number"), "{err}");
    }

    #[test]
    fn test_missing_line_number_is_fatal() {
        let results = parse_all(b"Exec\x000x1\x00SELECT 1\x00100\x00app.c\x00");
        assert!(results[0].is_err());
    }

    #[test]
    fn test_unknown_kind_is_fatal() {
        let results = parse_all(b"Prepare\x000x1\x00\x00100\x00\x00");
        let err = results[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("unknown operation kind"), "{err}");
    }

    #[test]
    fn test_iterator_stops_after_first_error() {
        let mut buf = Vec::new();
        write_record(&mut buf, OpKind::Open, "0x1", "", 7, &[]);
        buf.extend_from_slice(b"garbage");
        let results = parse_all(&buf);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_round_trip_through_gzip() {
        use flate2::Compression;
        use flate2::read::GzDecoder;
        use flate2::write::GzEncoder;
        use std::io::{BufReader, Write};

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut record = Vec::new();
        write_record(
            &mut record,
            OpKind::Query,
            "0xbeef",
            "SELECT * FROM t",
            250_000_000,
            &[Frame::new("handler.rs", 31)],
        );
        encoder.write_all(&record).unwrap();
        let compressed = encoder.finish().unwrap();

        let reader = RecordReader::new(BufReader::new(GzDecoder::new(Cursor::new(compressed))));
        let events: Vec<_> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].desc, "SELECT * FROM t");
        assert_eq!(events[0].frames, vec!["handler.rs:31"]);
    }
}
