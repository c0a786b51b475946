//! Frame filtering, group keys and per-group accumulation.
//!
//! Events flow through two stages before statistics:
//!
//! 1. **Filter** — each `file:line` frame must match the keep regex and must
//!    not match the drop regex; events with no surviving frames are dropped
//!    entirely.
//! 2. **Group** — surviving events are coalesced under a key built from the
//!    top frame (`topct`) or the whole call trace (`fullct`), optionally
//!    combined with the operation kind and/or the description.
//!
//! Groups remember the call trace of the first event seen for their key (the
//! representative trace), the set of kind prefixes, the set of non-empty
//! descriptions, and every duration in seconds.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;

use crate::record::RawEvent;
use crate::stats::{SortKey, Stat};

/// Key components cannot contain NUL (the wire format forbids it inside
/// fields), so NUL-joining components can never collide.
const KEY_SEP: &str = "\0";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which event attributes participate in the group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupOptions {
    /// `true` = key on the whole call trace (`fullct`); `false` = key on the
    /// top frame only (`topct`).
    pub full_calltrace: bool,
    pub by_kind: bool,
    pub by_desc: bool,
}

impl GroupOptions {
    /// Parses a `+`-joined option string such as `"topct+desc"`.
    ///
    /// Exactly one of `topct`/`fullct` is required and they are mutually
    /// exclusive; `kind` and `desc` are optional.
    pub fn parse(s: &str) -> Result<GroupOptions, String> {
        let mut scope: Option<bool> = None;
        let mut by_kind = false;
        let mut by_desc = false;

        for part in s.split('+') {
            match part.to_ascii_lowercase().as_str() {
                "topct" | "fullct" => {
                    let full = part.eq_ignore_ascii_case("fullct");
                    if let Some(prev) = scope
                        && prev != full
                    {
                        return Err(
                            "topct and fullct cannot be chosen at the same time".to_string()
                        );
                    }
                    scope = Some(full);
                }
                "kind" => by_kind = true,
                "desc" => by_desc = true,
                other => return Err(format!("unknown group component {other:?}")),
            }
        }

        let Some(full_calltrace) = scope else {
            return Err("group options must include topct or fullct".to_string());
        };
        Ok(GroupOptions {
            full_calltrace,
            by_kind,
            by_desc,
        })
    }
}

// ---------------------------------------------------------------------------
// Frame filter
// ---------------------------------------------------------------------------

/// Keep/drop regex pair applied to every `file:line` frame.
pub struct FrameFilter {
    keep: Regex,
    drop: Regex,
}

impl FrameFilter {
    /// Compiles the filter. The defaults `.*` / `^$` keep everything.
    pub fn new(keep: &str, drop: &str) -> Result<FrameFilter, regex::Error> {
        Ok(FrameFilter {
            keep: Regex::new(keep)?,
            drop: Regex::new(drop)?,
        })
    }

    /// Filters the event's frames in place. Returns `false` when no frame
    /// survives, in which case the event must not be grouped.
    pub fn retain(&self, event: &mut RawEvent) -> bool {
        event
            .frames
            .retain(|f| self.keep.is_match(f) && !self.drop.is_match(f));
        !event.frames.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

/// Accumulated state for one group key, plus the statistics bundle filled in
/// by [`Grouper::finish`].
#[derive(Debug, Clone)]
pub struct GroupedInfo {
    /// Call trace of the first event seen for this key. Under `fullct` all
    /// members share it; under `topct` only the top frame is shared.
    pub calltrace: Vec<String>,
    /// Two-character kind prefixes observed, sorted.
    pub kinds: BTreeSet<&'static str>,
    /// Non-empty descriptions observed, deduplicated and sorted.
    pub descs: BTreeSet<String>,
    /// Every duration in seconds, in arrival order.
    pub durations: Vec<f64>,
    pub stat: Stat,
}

/// Coalesces filtered events into [`GroupedInfo`] entries, preserving first
/// insertion order for deterministic tie-breaks in the final sort.
pub struct Grouper {
    options: GroupOptions,
    index: HashMap<String, usize>,
    groups: Vec<GroupedInfo>,
}

impl Grouper {
    pub fn new(options: GroupOptions) -> Self {
        Self {
            options,
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn key_for(&self, event: &RawEvent) -> String {
        let mut parts: Vec<&str> = if self.options.full_calltrace {
            event.frames.iter().map(String::as_str).collect()
        } else {
            vec![event.frames[0].as_str()]
        };
        if self.options.by_kind {
            parts.push(event.kind.as_str());
        }
        if self.options.by_desc {
            parts.push(&event.desc);
        }
        parts.join(KEY_SEP)
    }

    /// Folds one event in. Events must already be filtered: at least one
    /// frame is required.
    pub fn add(&mut self, event: &RawEvent) {
        debug_assert!(!event.frames.is_empty());

        let key = self.key_for(event);
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.groups.push(GroupedInfo {
                    calltrace: event.frames.clone(),
                    kinds: BTreeSet::new(),
                    descs: BTreeSet::new(),
                    durations: Vec::new(),
                    stat: Stat::default(),
                });
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };

        let group = &mut self.groups[idx];
        group.kinds.insert(event.kind.prefix());
        if !event.desc.is_empty() {
            group.descs.insert(event.desc.clone());
        }
        group.durations.push(event.duration_secs());
    }

    /// Computes each group's statistics and returns the groups in first
    /// insertion order.
    pub fn finish(mut self) -> Vec<GroupedInfo> {
        for group in &mut self.groups {
            group.stat = Stat::from_samples(&group.durations);
        }
        self.groups
    }
}

/// Sorts groups in descending order of the chosen statistic. The sort is
/// stable, so equal keys keep their insertion order.
pub fn sort_groups(groups: &mut [GroupedInfo], key: SortKey) {
    groups.sort_by(|a, b| key.value(&b.stat).total_cmp(&key.value(&a.stat)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::OpKind;

    fn event(kind: OpKind, desc: &str, secs: f64, frames: &[&str]) -> RawEvent {
        RawEvent {
            kind,
            conn: "0x1".into(),
            desc: desc.into(),
            duration_ns: (secs * 1_000_000_000.0) as u64,
            frames: frames.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_group_options() {
        let opts = GroupOptions::parse("topct+desc").unwrap();
        assert!(!opts.full_calltrace);
        assert!(!opts.by_kind);
        assert!(opts.by_desc);

        let opts = GroupOptions::parse("fullct+kind+desc").unwrap();
        assert!(opts.full_calltrace);
        assert!(opts.by_kind);
        assert!(opts.by_desc);

        let opts = GroupOptions::parse("TOPCT").unwrap();
        assert!(!opts.full_calltrace);
    }

    #[test]
    fn test_parse_rejects_conflicting_scopes() {
        assert!(GroupOptions::parse("topct+fullct").is_err());
        assert!(GroupOptions::parse("fullct+topct").is_err());
    }

    #[test]
    fn test_parse_requires_a_scope() {
        assert!(GroupOptions::parse("kind+desc").is_err());
        assert!(GroupOptions::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_component() {
        assert!(GroupOptions::parse("topct+conn").is_err());
    }

    #[test]
    fn test_filter_keeps_matching_frames() {
        let filter = FrameFilter::new("^app/", "^$").unwrap();
        let mut e = event(
            OpKind::Query,
            "SELECT 1",
            1.0,
            &["vendor/a.c:1", "app/b.c:2"],
        );
        assert!(filter.retain(&mut e));
        assert_eq!(e.frames, vec!["app/b.c:2"]);
    }

    #[test]
    fn test_filter_inverse_match_drops_frames() {
        let filter = FrameFilter::new(".*", "vendor").unwrap();
        let mut e = event(
            OpKind::Query,
            "SELECT 1",
            1.0,
            &["vendor/a.c:1", "app/b.c:2"],
        );
        assert!(filter.retain(&mut e));
        assert_eq!(e.frames, vec!["app/b.c:2"]);
    }

    #[test]
    fn test_filter_drops_event_with_no_surviving_frames() {
        let filter = FrameFilter::new("^app/", "^$").unwrap();
        let mut e = event(OpKind::Query, "SELECT 1", 1.0, &["vendor/a.c:1"]);
        assert!(!filter.retain(&mut e));
    }

    #[test]
    fn test_default_filter_keeps_everything() {
        let filter = FrameFilter::new(".*", "^$").unwrap();
        let mut e = event(OpKind::Query, "SELECT 1", 1.0, &["a.c:1", "b.c:2"]);
        assert!(filter.retain(&mut e));
        assert_eq!(e.frames.len(), 2);
    }

    #[test]
    fn test_grouping_by_top_frame() {
        let opts = GroupOptions::parse("topct").unwrap();
        let mut grouper = Grouper::new(opts);
        grouper.add(&event(OpKind::Query, "SELECT a", 1.0, &["x.c:10", "m.c:1"]));
        grouper.add(&event(OpKind::Query, "SELECT b", 3.0, &["x.c:10", "n.c:2"]));
        grouper.add(&event(OpKind::Query, "SELECT c", 2.0, &["y.c:7"]));

        let groups = grouper.finish();
        assert_eq!(groups.len(), 2);

        let first = &groups[0];
        assert_eq!(first.calltrace[0], "x.c:10");
        assert_eq!(first.stat.count, 2);
        assert_eq!(first.stat.min, 1.0);
        assert_eq!(first.stat.max, 3.0);
        assert_eq!(first.stat.sum, 4.0);
        assert_eq!(first.stat.avg, 2.0);
        assert_eq!(first.stat.std, 1.0);

        let second = &groups[1];
        assert_eq!(second.calltrace, vec!["y.c:7"]);
        assert_eq!(second.stat.count, 1);
    }

    #[test]
    fn test_full_calltrace_separates_distinct_stacks() {
        let opts = GroupOptions::parse("fullct").unwrap();
        let mut grouper = Grouper::new(opts);
        grouper.add(&event(OpKind::Query, "", 1.0, &["x.c:10", "a.c:1"]));
        grouper.add(&event(OpKind::Query, "", 1.0, &["x.c:10", "b.c:2"]));
        assert_eq!(grouper.finish().len(), 2);
    }

    #[test]
    fn test_kind_component_separates_groups() {
        let opts = GroupOptions::parse("topct+kind").unwrap();
        let mut grouper = Grouper::new(opts);
        grouper.add(&event(OpKind::Exec, "UPDATE t", 1.0, &["x.c:10"]));
        grouper.add(&event(OpKind::Query, "SELECT 1", 1.0, &["x.c:10"]));
        assert_eq!(grouper.finish().len(), 2);
    }

    #[test]
    fn test_desc_component_separates_groups() {
        let opts = GroupOptions::parse("topct+desc").unwrap();
        let mut grouper = Grouper::new(opts);
        grouper.add(&event(OpKind::Query, "SELECT a", 1.0, &["x.c:10"]));
        grouper.add(&event(OpKind::Query, "SELECT b", 1.0, &["x.c:10"]));
        assert_eq!(grouper.finish().len(), 2);
    }

    #[test]
    fn test_kind_and_desc_sets_accumulate() {
        let opts = GroupOptions::parse("topct").unwrap();
        let mut grouper = Grouper::new(opts);
        grouper.add(&event(OpKind::Exec, "UPDATE t", 1.0, &["x.c:10"]));
        grouper.add(&event(OpKind::Query, "SELECT 1", 2.0, &["x.c:10"]));
        grouper.add(&event(OpKind::Commit, "COMMIT", 0.5, &["x.c:10"]));

        let groups = grouper.finish();
        assert_eq!(groups.len(), 1);
        let kinds: Vec<_> = groups[0].kinds.iter().copied().collect();
        assert_eq!(kinds, vec!["Co", "Ex", "Qu"]);
        let descs: Vec<_> = groups[0].descs.iter().cloned().collect();
        assert_eq!(descs, vec!["COMMIT", "SELECT 1", "UPDATE t"]);
    }

    #[test]
    fn test_empty_desc_not_collected() {
        let opts = GroupOptions::parse("topct").unwrap();
        let mut grouper = Grouper::new(opts);
        grouper.add(&event(OpKind::Open, "", 1.0, &["x.c:10"]));
        let groups = grouper.finish();
        assert!(groups[0].descs.is_empty());
    }

    #[test]
    fn test_representative_calltrace_is_first_seen() {
        let opts = GroupOptions::parse("topct").unwrap();
        let mut grouper = Grouper::new(opts);
        grouper.add(&event(OpKind::Query, "", 1.0, &["x.c:10", "first.c:1"]));
        grouper.add(&event(OpKind::Query, "", 2.0, &["x.c:10", "second.c:2"]));
        let groups = grouper.finish();
        assert_eq!(groups[0].calltrace, vec!["x.c:10", "first.c:1"]);
    }

    #[test]
    fn test_sort_descending_by_sum() {
        let opts = GroupOptions::parse("topct").unwrap();
        let mut grouper = Grouper::new(opts);
        grouper.add(&event(OpKind::Query, "", 1.0, &["small.c:1"]));
        grouper.add(&event(OpKind::Query, "", 5.0, &["big.c:1"]));

        let mut groups = grouper.finish();
        sort_groups(&mut groups, SortKey::Sum);
        assert_eq!(groups[0].calltrace, vec!["big.c:1"]);
        assert_eq!(groups[1].calltrace, vec!["small.c:1"]);
    }

    #[test]
    fn test_sort_ties_keep_insertion_order() {
        let opts = GroupOptions::parse("topct").unwrap();
        let mut grouper = Grouper::new(opts);
        grouper.add(&event(OpKind::Query, "", 2.0, &["a.c:1"]));
        grouper.add(&event(OpKind::Query, "", 2.0, &["b.c:1"]));
        grouper.add(&event(OpKind::Query, "", 2.0, &["c.c:1"]));

        let mut groups = grouper.finish();
        sort_groups(&mut groups, SortKey::Sum);
        assert_eq!(groups[0].calltrace, vec!["a.c:1"]);
        assert_eq!(groups[1].calltrace, vec!["b.c:1"]);
        assert_eq!(groups[2].calltrace, vec!["c.c:1"]);
    }

    #[test]
    fn test_sort_by_count() {
        let opts = GroupOptions::parse("topct").unwrap();
        let mut grouper = Grouper::new(opts);
        grouper.add(&event(OpKind::Query, "", 10.0, &["once.c:1"]));
        grouper.add(&event(OpKind::Query, "", 1.0, &["thrice.c:1"]));
        grouper.add(&event(OpKind::Query, "", 1.0, &["thrice.c:1"]));
        grouper.add(&event(OpKind::Query, "", 1.0, &["thrice.c:1"]));

        let mut groups = grouper.finish();
        sort_groups(&mut groups, SortKey::Count);
        assert_eq!(groups[0].calltrace, vec!["thrice.c:1"]);
    }
}
