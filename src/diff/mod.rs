//! Running-configuration comparison for the `compare` operation.
//!
//! The [`DiffEngine`] fetches both devices' running configurations, drops
//! lines matching the [`IgnoreList`] and computes an order-preserving
//! line diff (matched common lines, lines only on one device). Lines unique
//! to one side that closely resemble a line on the other are then paired as
//! device-specific variations.
//!
//! # Example
//!
//! ```rust
//! use junos_push::diff::{DiffEngine, IgnoreList};
//!
//! let engine = DiffEngine::new(IgnoreList::new(&["last-changed".to_string()]).unwrap());
//! let a = vec!["set vlans v10 vlan-id 10".to_string()];
//! let b = vec!["set vlans v10 vlan-id 10".to_string(), "## last-changed 2024".to_string()];
//! assert!(engine.diff_lines("r1", &a, "r2", &b).identical);
//! ```

mod word_diff;

pub use word_diff::{lines_are_similar, pair_similar_lines, WordDiff};

use crate::device::DeviceSession;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Ignore List
// ============================================================================

#[derive(Debug, Clone)]
enum IgnorePattern {
    Substring(String),
    Regex(Regex),
}

/// Lines to drop before comparing.
///
/// A pattern matches as a plain substring; a pattern written `/.../` is a
/// regular expression.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreList {
    /// Compile patterns. Fails on an invalid `/regex/`.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| {
                if p.len() > 2 && p.starts_with('/') && p.ends_with('/') {
                    Regex::new(&p[1..p.len() - 1])
                        .map(IgnorePattern::Regex)
                        .map_err(|e| Error::Config(format!("Invalid ignore pattern {}: {}", p, e)))
                } else {
                    Ok(IgnorePattern::Substring(p.to_string()))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `line` should be ignored.
    pub fn is_ignored(&self, line: &str) -> bool {
        let line = line.trim();
        self.patterns.iter().any(|pattern| match pattern {
            IgnorePattern::Substring(s) => line.contains(s.as_str()),
            IgnorePattern::Regex(re) => re.is_match(line),
        })
    }

    /// Keep the lines that are not ignored; returns them with the drop count.
    pub fn filter<'a>(&self, lines: &'a [String]) -> (Vec<&'a str>, usize) {
        let kept: Vec<&str> = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !self.is_ignored(l))
            .collect();
        let dropped = lines.iter().filter(|l| !l.trim().is_empty()).count() - kept.len();
        (kept, dropped)
    }
}

// ============================================================================
// Diff Result
// ============================================================================

/// Which device a differing line lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Only on the first device (a deletion going from A to B)
    OnlyA,
    /// Only on the second device (an insertion going from A to B)
    OnlyB,
}

/// One line of the diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    /// Line content
    pub content: String,
    /// Side the line is on
    pub change: ChangeType,
    /// 1-based position in the filtered configuration of its device
    pub line_number: usize,
}

/// A pair of lines that differ only in device-specific values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarPair {
    /// Line on the first device
    pub a: String,
    /// Line on the second device
    pub b: String,
}

impl SimilarPair {
    /// Word-level highlighting of the pair.
    pub fn word_diff(&self, use_color: bool) -> WordDiff {
        WordDiff::word_level(&self.a, &self.b, use_color)
    }
}

/// Counts describing a comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareSummary {
    /// Lines compared on the first device
    pub total_a: usize,
    /// Lines compared on the second device
    pub total_b: usize,
    /// Lines common to both
    pub identical: usize,
    /// Lines only on the first device, excluding similar pairs
    pub unique_a: usize,
    /// Lines only on the second device, excluding similar pairs
    pub unique_b: usize,
    /// Device-specific variation pairs
    pub similar_pairs: usize,
    /// Lines dropped by the ignore list on the first device
    pub ignored_a: usize,
    /// Lines dropped by the ignore list on the second device
    pub ignored_b: usize,
}

/// Difference between two devices' running configurations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDiff {
    /// First device
    pub host_a: String,
    /// Second device
    pub host_b: String,
    /// Differing lines in diff order; empty when identical
    pub lines: Vec<DiffLine>,
    /// Whether both configurations match after filtering
    pub identical: bool,
    /// Device-specific variations
    pub similar: Vec<SimilarPair>,
    /// Lines truly unique to the first device
    pub unique_a: Vec<String>,
    /// Lines truly unique to the second device
    pub unique_b: Vec<String>,
    /// Counts
    pub summary: CompareSummary,
}

impl ConfigDiff {
    /// Synchronization hints for each side holding unique lines.
    pub fn sync_hints(&self) -> Vec<String> {
        let mut hints = Vec::new();
        if !self.unique_a.is_empty() {
            hints.push(format!(
                "Apply {} line(s) from {} to {}",
                self.unique_a.len(),
                self.host_a,
                self.host_b
            ));
        }
        if !self.unique_b.is_empty() {
            hints.push(format!(
                "Apply {} line(s) from {} to {}",
                self.unique_b.len(),
                self.host_b,
                self.host_a
            ));
        }
        if !self.similar.is_empty() {
            hints.push(format!(
                "Review {} device-specific variation(s) (addresses, names)",
                self.similar.len()
            ));
        }
        hints
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Compares the running configurations of a device pair.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    ignore: IgnoreList,
}

impl DiffEngine {
    /// Create an engine with an ignore list.
    pub fn new(ignore: IgnoreList) -> Self {
        Self { ignore }
    }

    /// The ignore list in use.
    pub fn ignore_list(&self) -> &IgnoreList {
        &self.ignore
    }

    /// Fetch both running configurations and diff them.
    ///
    /// All or nothing: if either fetch fails or times out the whole
    /// comparison fails with [`Error::Comparison`]. Neither device is
    /// modified.
    pub async fn compare(
        &self,
        session_a: &mut dyn DeviceSession,
        session_b: &mut dyn DeviceSession,
        timeout: Duration,
    ) -> Result<ConfigDiff> {
        let host_a = session_a.target().host.clone();
        let host_b = session_b.target().host.clone();

        let (a, b) = futures::join!(
            fetch_for_compare(session_a, timeout),
            fetch_for_compare(session_b, timeout)
        );
        let a = a?;
        let b = b?;

        debug!(
            host_a = %host_a,
            host_b = %host_b,
            lines_a = a.len(),
            lines_b = b.len(),
            "Fetched running configurations"
        );

        Ok(self.diff_lines(&host_a, &a, &host_b, &b))
    }

    /// Diff two already-fetched configurations.
    pub fn diff_lines(&self, host_a: &str, a: &[String], host_b: &str, b: &[String]) -> ConfigDiff {
        let (kept_a, ignored_a) = self.ignore.filter(a);
        let (kept_b, ignored_b) = self.ignore.filter(b);

        let text_diff = TextDiff::from_slices(&kept_a, &kept_b);
        let mut lines = Vec::new();
        let mut identical = 0;

        for change in text_diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Equal => identical += 1,
                ChangeTag::Delete => lines.push(DiffLine {
                    content: change.value().to_string(),
                    change: ChangeType::OnlyA,
                    line_number: change.old_index().map(|i| i + 1).unwrap_or_default(),
                }),
                ChangeTag::Insert => lines.push(DiffLine {
                    content: change.value().to_string(),
                    change: ChangeType::OnlyB,
                    line_number: change.new_index().map(|i| i + 1).unwrap_or_default(),
                }),
            }
        }

        let only_a: Vec<&str> = lines
            .iter()
            .filter(|l| l.change == ChangeType::OnlyA)
            .map(|l| l.content.as_str())
            .collect();
        let only_b: Vec<&str> = lines
            .iter()
            .filter(|l| l.change == ChangeType::OnlyB)
            .map(|l| l.content.as_str())
            .collect();

        let (pairs, unique_a, unique_b) = pair_similar_lines(&only_a, &only_b);

        let similar: Vec<SimilarPair> = pairs
            .into_iter()
            .map(|(a, b)| SimilarPair {
                a: a.to_string(),
                b: b.to_string(),
            })
            .collect();
        let unique_a: Vec<String> = unique_a.into_iter().map(String::from).collect();
        let unique_b: Vec<String> = unique_b.into_iter().map(String::from).collect();

        let summary = CompareSummary {
            total_a: kept_a.len(),
            total_b: kept_b.len(),
            identical,
            unique_a: unique_a.len(),
            unique_b: unique_b.len(),
            similar_pairs: similar.len(),
            ignored_a,
            ignored_b,
        };

        ConfigDiff {
            host_a: host_a.to_string(),
            host_b: host_b.to_string(),
            identical: lines.is_empty(),
            lines,
            similar,
            unique_a,
            unique_b,
            summary,
        }
    }
}

async fn fetch_for_compare(session: &mut dyn DeviceSession, timeout: Duration) -> Result<Vec<String>> {
    let host = session.target().host.clone();
    match tokio::time::timeout(timeout, session.fetch_running_config()).await {
        Ok(Ok(lines)) => Ok(lines),
        Ok(Err(e)) => Err(Error::Comparison(format!(
            "could not fetch configuration from {}: {}",
            host, e
        ))),
        Err(_) => Err(Error::Comparison(format!(
            "timed out fetching configuration from {} after {}s",
            host,
            timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(String::from).collect()
    }

    #[test]
    fn test_ignore_list_substring_and_regex() {
        let ignore = IgnoreList::new(&[
            "last-changed".to_string(),
            "/^set system host-name /".to_string(),
        ])
        .unwrap();
        assert_eq!(ignore.len(), 2);
        assert!(ignore.is_ignored("## last-changed 2024-01-01"));
        assert!(ignore.is_ignored("set system host-name core-a"));
        assert!(!ignore.is_ignored("set vlans v10 vlan-id 10"));
    }

    #[test]
    fn test_ignore_list_invalid_regex() {
        assert!(IgnoreList::new(&["/([/".to_string()]).is_err());
    }

    #[test]
    fn test_identical_after_filtering() {
        let engine = DiffEngine::new(IgnoreList::new(&["serial-number".to_string()]).unwrap());
        let diff = engine.diff_lines(
            "r1",
            &lines("set vlans v10 vlan-id 10\nset chassis serial-number AAA"),
            "r2",
            &lines("set vlans v10 vlan-id 10\nset chassis serial-number BBB"),
        );
        assert!(diff.identical);
        assert!(diff.lines.is_empty());
        assert_eq!(diff.summary.ignored_a, 1);
        assert_eq!(diff.summary.identical, 1);
        assert!(diff.sync_hints().is_empty());
    }

    #[test]
    fn test_order_preserving_diff() {
        let engine = DiffEngine::default();
        // Same lines, different order: a set difference would call this equal.
        let diff = engine.diff_lines(
            "r1",
            &lines("set a 1\nset b 2"),
            "r2",
            &lines("set b 2\nset a 1"),
        );
        assert!(!diff.identical);
        assert_eq!(diff.summary.identical, 1);
    }

    #[test]
    fn test_similar_and_unique_lines() {
        let engine = DiffEngine::default();
        let diff = engine.diff_lines(
            "r1",
            &lines("set system host-name core-a\nset vlans v10 vlan-id 10\nset snmp community public"),
            "r2",
            &lines("set system host-name core-b\nset vlans v10 vlan-id 10"),
        );
        assert!(!diff.identical);
        assert_eq!(
            diff.similar,
            vec![SimilarPair {
                a: "set system host-name core-a".into(),
                b: "set system host-name core-b".into(),
            }]
        );
        assert_eq!(diff.unique_a, vec!["set snmp community public".to_string()]);
        assert!(diff.unique_b.is_empty());
        assert_eq!(diff.summary.similar_pairs, 1);
        assert_eq!(diff.sync_hints()[0], "Apply 1 line(s) from r1 to r2");
    }
}
