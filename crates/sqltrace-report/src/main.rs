//! sqltrace-report — offline aggregator for sqltrace capture files.
//!
//! Reads one gzip-compressed capture (as produced by the tracer's HTTP
//! endpoint), filters call-trace frames by regex, groups events by call
//! site, computes per-group duration statistics and prints one table row
//! per group, or the same data as JSON with `--json`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use comfy_table::presets::ASCII_FULL;
use comfy_table::{ColumnConstraint, ContentArrangement, Table, Width};
use flate2::read::GzDecoder;
use serde::Serialize;

use sqltrace_core::group::{FrameFilter, GroupOptions, GroupedInfo, Grouper, sort_groups};
use sqltrace_core::stats::SortKey;
use sqltrace_core::wire::RecordReader;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "sqltrace-report",
    about = "Aggregate a sqltrace capture into per-call-site duration statistics"
)]
struct Cli {
    /// Path to the gzip-compressed capture file
    file: PathBuf,

    /// Group key components, joined with `+`: topct or fullct, plus
    /// optional kind and desc
    #[arg(long, default_value = "topct+desc")]
    group: String,

    /// Statistic to sort by: count, min, max, sum, avg, std, p1, p50 or p99
    #[arg(long, default_value = "sum")]
    sort: String,

    /// Regex every call-trace frame must match
    #[arg(long, default_value = ".*")]
    match_ct: String,

    /// Regex matching call-trace frames to discard
    #[arg(long, default_value = "^$")]
    inv_match_ct: String,

    /// Maximum column width for the table
    #[arg(long)]
    col: Option<u16>,

    /// Show only the file name of each call-trace frame
    #[arg(long)]
    short_ct: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    let options = GroupOptions::parse(&cli.group).unwrap_or_else(|e| {
        eprintln!("Invalid group option: {e}");
        process::exit(1);
    });
    let sort = SortKey::parse(&cli.sort).unwrap_or_else(|e| {
        eprintln!("Invalid sort option: {e}");
        process::exit(1);
    });
    let filter = FrameFilter::new(&cli.match_ct, &cli.inv_match_ct).unwrap_or_else(|e| {
        eprintln!("Invalid calltrace regex: {e}");
        process::exit(1);
    });

    let file = File::open(&cli.file).unwrap_or_else(|e| {
        eprintln!("Could not open file \"{}\": {e}", cli.file.display());
        process::exit(1);
    });
    let reader = RecordReader::new(BufReader::new(GzDecoder::new(file)));

    // Filter and group in one pass; events whose every frame is filtered
    // away are dropped entirely.
    let mut grouper = Grouper::new(options);
    for result in reader {
        let mut event = result.unwrap_or_else(|e| {
            eprintln!("Invalid capture data: {e}");
            process::exit(1);
        });
        if !filter.retain(&mut event) {
            continue;
        }
        grouper.add(&event);
    }

    let mut groups = grouper.finish();
    sort_groups(&mut groups, sort);

    if cli.json {
        print_json(&groups, options.full_calltrace, cli.short_ct);
    } else {
        print_table(&groups, options.full_calltrace, cli.short_ct, cli.col);
    }
}

// ── Formatting helpers ───────────────────────────────────────────────────────

/// Reduces a `file:line` frame to its final path component.
fn short_frame(frame: &str) -> String {
    Path::new(frame)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| frame.to_string())
}

/// The frames a report row shows: the whole representative trace under
/// `fullct`, the top frame alone under `topct`.
fn visible_frames(group: &GroupedInfo, full_calltrace: bool, short_ct: bool) -> Vec<String> {
    let frames: &[String] = if full_calltrace {
        &group.calltrace
    } else {
        &group.calltrace[..1]
    };
    frames
        .iter()
        .map(|f| {
            if short_ct {
                short_frame(f)
            } else {
                f.clone()
            }
        })
        .collect()
}

fn format_calltrace(group: &GroupedInfo, full_calltrace: bool, short_ct: bool) -> String {
    let frames = visible_frames(group, full_calltrace, short_ct);
    if full_calltrace {
        frames
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{i:02}:{f}"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        frames.join("\n")
    }
}

fn format_kinds(group: &GroupedInfo) -> String {
    group.kinds.iter().copied().collect::<Vec<_>>().join(",")
}

fn format_descs(group: &GroupedInfo) -> String {
    group.descs.iter().cloned().collect::<Vec<_>>().join("\n")
}

// ── Table output ─────────────────────────────────────────────────────────────

const HEADERS: [&str; 12] = [
    "COUNT", "MIN", "MAX", "SUM", "AVG", "P1", "P50", "P99", "STD", "K", "CALLTRACE", "DESC",
];

fn table_row(group: &GroupedInfo, full_calltrace: bool, short_ct: bool) -> Vec<String> {
    let s = &group.stat;
    vec![
        s.count.to_string(),
        format!("{:.3}", s.min),
        format!("{:.3}", s.max),
        format!("{:.3}", s.sum),
        format!("{:.3}", s.avg),
        format!("{:.3}", s.p1),
        format!("{:.3}", s.p50),
        format!("{:.3}", s.p99),
        format!("{:.3}", s.std),
        format_kinds(group),
        format_calltrace(group, full_calltrace, short_ct),
        format_descs(group),
    ]
}

fn print_table(groups: &[GroupedInfo], full_calltrace: bool, short_ct: bool, col: Option<u16>) {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(HEADERS.to_vec());
    if let Some(width) = col {
        table.set_constraints(
            HEADERS
                .iter()
                .map(|_| ColumnConstraint::UpperBoundary(Width::Fixed(width))),
        );
    }
    for group in groups {
        table.add_row(table_row(group, full_calltrace, short_ct));
    }
    println!("{table}");
}

// ── JSON output ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GroupJson {
    count: usize,
    min: f64,
    max: f64,
    sum: f64,
    avg: f64,
    p1: f64,
    p50: f64,
    p99: f64,
    std: f64,
    kinds: Vec<String>,
    calltrace: Vec<String>,
    desc: Vec<String>,
}

fn group_json(group: &GroupedInfo, full_calltrace: bool, short_ct: bool) -> GroupJson {
    let s = &group.stat;
    GroupJson {
        count: s.count,
        min: s.min,
        max: s.max,
        sum: s.sum,
        avg: s.avg,
        p1: s.p1,
        p50: s.p50,
        p99: s.p99,
        std: s.std,
        kinds: group.kinds.iter().map(|k| k.to_string()).collect(),
        calltrace: visible_frames(group, full_calltrace, short_ct),
        desc: group.descs.iter().cloned().collect(),
    }
}

fn print_json(groups: &[GroupedInfo], full_calltrace: bool, short_ct: bool) {
    let rows: Vec<GroupJson> = groups
        .iter()
        .map(|g| group_json(g, full_calltrace, short_ct))
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows).unwrap());
}
