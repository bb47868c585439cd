//! Word-level highlighting of device-specific variations.
//!
//! When a line exists on only one device but a close relative exists on the
//! other (same statement, different address or description), the two are
//! paired and the differing words highlighted.

use colored::Colorize;
use similar::{ChangeTag, TextDiff};

/// Word diff result containing highlighted lines for both devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordDiff {
    /// First device's line with its differing words highlighted
    pub a_highlighted: String,
    /// Second device's line with its differing words highlighted
    pub b_highlighted: String,
    /// Whether any differences were found
    pub has_changes: bool,
}

impl WordDiff {
    /// Diff two lines on word boundaries.
    ///
    /// Without color, removed words render as `[-word]` and added words as
    /// `[+word]`.
    pub fn word_level(a: &str, b: &str, use_color: bool) -> Self {
        if a == b {
            return Self {
                a_highlighted: a.to_string(),
                b_highlighted: b.to_string(),
                has_changes: false,
            };
        }

        let diff = TextDiff::from_words(a, b);
        let mut a_parts = Vec::new();
        let mut b_parts = Vec::new();

        for change in diff.iter_all_changes() {
            let value = change.value();
            match change.tag() {
                ChangeTag::Delete if use_color => {
                    a_parts.push(value.on_red().white().bold().to_string())
                }
                ChangeTag::Delete => a_parts.push(format!("[-{}]", value)),
                ChangeTag::Insert if use_color => {
                    b_parts.push(value.on_green().white().bold().to_string())
                }
                ChangeTag::Insert => b_parts.push(format!("[+{}]", value)),
                ChangeTag::Equal => {
                    a_parts.push(value.to_string());
                    b_parts.push(value.to_string());
                }
            }
        }

        Self {
            a_highlighted: a_parts.concat(),
            b_highlighted: b_parts.concat(),
            has_changes: true,
        }
    }
}

/// Check if two lines are variations of the same statement
/// (at least 40% of the longer line is a shared prefix plus suffix)
pub fn lines_are_similar(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }

    let max_len = a.chars().count().max(b.chars().count());
    common_chars_count(a, b) >= max_len * 2 / 5
}

/// Pair lines unique to one device with their closest relative on the other.
///
/// Each line is used at most once. Returns the pairs plus the lines of each
/// side that found no partner, all in input order.
pub fn pair_similar_lines<'a>(
    only_a: &[&'a str],
    only_b: &[&'a str],
) -> (Vec<(&'a str, &'a str)>, Vec<&'a str>, Vec<&'a str>) {
    let mut pairs = Vec::new();
    let mut unmatched_a = Vec::new();
    let mut used_b = vec![false; only_b.len()];

    for &a in only_a {
        let best = only_b
            .iter()
            .enumerate()
            .filter(|(i, b)| !used_b[*i] && lines_are_similar(a, b))
            .max_by_key(|(i, b)| (common_chars_count(a, b), std::cmp::Reverse(*i)));

        match best {
            Some((i, &b)) => {
                used_b[i] = true;
                pairs.push((a, b));
            }
            None => unmatched_a.push(a),
        }
    }

    let unmatched_b = only_b
        .iter()
        .zip(used_b)
        .filter(|(_, used)| !used)
        .map(|(&b, _)| b)
        .collect();

    (pairs, unmatched_a, unmatched_b)
}

/// Shared prefix plus shared suffix length, never counting a char twice.
fn common_chars_count(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let prefix = a_chars
        .iter()
        .zip(b_chars.iter())
        .take_while(|(x, y)| x == y)
        .count();

    let suffix = a_chars
        .iter()
        .rev()
        .zip(b_chars.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let min_len = a_chars.len().min(b_chars.len());
    if prefix + suffix <= min_len {
        prefix + suffix
    } else {
        min_len
    }
}
