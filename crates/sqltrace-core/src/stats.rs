//! Descriptive statistics over duration samples.
//!
//! Statistics are computed in a second pass over materialized samples:
//! percentiles need sorted access anyway, so a streaming algorithm would buy
//! nothing. Mean and variance use the naive two-pass form; samples are
//! durations in the sub-second to seconds range, where cancellation is not
//! a concern.

/// Summary statistics for one group's duration samples, in seconds.
///
/// `var` is the population variance (`Σ(x−mean)² / n`), not the sample
/// form. An empty sample yields the all-zero default; such groups are never
/// reported.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stat {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub avg: f64,
    pub var: f64,
    pub std: f64,
    pub p1: f64,
    pub p50: f64,
    pub p99: f64,
}

impl Stat {
    /// Computes the full bundle from an unsorted sample.
    pub fn from_samples(samples: &[f64]) -> Stat {
        if samples.is_empty() {
            return Stat::default();
        }

        let mut s = Stat {
            count: samples.len(),
            min: samples[0],
            max: samples[0],
            ..Stat::default()
        };
        for &v in samples {
            if v < s.min {
                s.min = v;
            }
            if v > s.max {
                s.max = v;
            }
            s.sum += v;
        }
        s.avg = s.sum / s.count as f64;
        for &v in samples {
            s.var += (v - s.avg) * (v - s.avg);
        }
        s.var /= s.count as f64;
        s.std = s.var.sqrt();

        // Percentiles read a sorted copy, never the accumulation order.
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        s.p1 = sorted[percentile_rank(s.count, 1)];
        s.p50 = sorted[percentile_rank(s.count, 50)];
        s.p99 = sorted[percentile_rank(s.count, 99)];

        s
    }
}

/// Rank rule: `max(0, ⌊len·n/100⌋ − 1)`, an index into the sorted sample.
fn percentile_rank(len: usize, n: usize) -> usize {
    (len * n / 100).saturating_sub(1)
}

/// The statistic a report is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Count,
    Min,
    Max,
    Sum,
    Avg,
    Std,
    P1,
    P50,
    P99,
}

impl SortKey {
    /// Parses a CLI sort name (case-insensitive).
    pub fn parse(s: &str) -> Result<SortKey, String> {
        match s.to_ascii_lowercase().as_str() {
            "count" => Ok(SortKey::Count),
            "min" => Ok(SortKey::Min),
            "max" => Ok(SortKey::Max),
            "sum" => Ok(SortKey::Sum),
            "avg" => Ok(SortKey::Avg),
            "std" => Ok(SortKey::Std),
            "p1" => Ok(SortKey::P1),
            "p50" => Ok(SortKey::P50),
            "p99" => Ok(SortKey::P99),
            other => Err(format!(
                "invalid sort statistic {other:?} (expected count, min, max, sum, avg, std, p1, p50 or p99)"
            )),
        }
    }

    /// Extracts the selected statistic as an order key.
    pub fn value(self, stat: &Stat) -> f64 {
        match self {
            SortKey::Count => stat.count as f64,
            SortKey::Min => stat.min,
            SortKey::Max => stat.max,
            SortKey::Sum => stat.sum,
            SortKey::Avg => stat.avg,
            SortKey::Std => stat.std,
            SortKey::P1 => stat.p1,
            SortKey::P50 => stat.p50,
            SortKey::P99 => stat.p99,
        }
    }
}
