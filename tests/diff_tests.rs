//! Tests for running-configuration comparison.

mod common;

use common::*;
use junos_push::diff::{lines_are_similar, ChangeType, DiffEngine, IgnoreList, WordDiff};
use junos_push::device::DeviceTransport;
use junos_push::error::Error;
use pretty_assertions::assert_eq;
use std::time::Duration;

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_one_sided_lines_carry_line_numbers() {
    let engine = DiffEngine::default();
    let diff = engine.diff_lines(
        "r1",
        &lines(&["set a 1", "set b 2", "set c 3"]),
        "r2",
        &lines(&["set a 1", "set c 3", "set d 4"]),
    );

    let only_a: Vec<_> = diff
        .lines
        .iter()
        .filter(|l| l.change == ChangeType::OnlyA)
        .map(|l| (l.content.as_str(), l.line_number))
        .collect();
    let only_b: Vec<_> = diff
        .lines
        .iter()
        .filter(|l| l.change == ChangeType::OnlyB)
        .map(|l| (l.content.as_str(), l.line_number))
        .collect();

    assert_eq!(only_a, vec![("set b 2", 2)]);
    assert_eq!(only_b, vec![("set d 4", 3)]);
    assert_eq!(diff.summary.identical, 2);
}

#[test]
fn test_sync_hints_name_both_directions() {
    let engine = DiffEngine::default();
    let diff = engine.diff_lines(
        "r1",
        &lines(&["set snmp community public", "set vlans v10 vlan-id 10"]),
        "r2",
        &lines(&["set vlans v10 vlan-id 10", "set protocols lldp interface all"]),
    );

    let hints = diff.sync_hints();
    assert!(hints.contains(&"Apply 1 line(s) from r1 to r2".to_string()));
    assert!(hints.contains(&"Apply 1 line(s) from r2 to r1".to_string()));
}

#[test]
fn test_regex_ignore_pattern() {
    let ignore = IgnoreList::new(&["/^set system (host-name|serial)/".to_string()]).unwrap();
    let engine = DiffEngine::new(ignore);
    let diff = engine.diff_lines(
        "r1",
        &lines(&["set system host-name a", "set vlans v10 vlan-id 10"]),
        "r2",
        &lines(&["set system host-name b", "set vlans v10 vlan-id 10"]),
    );
    assert!(diff.identical);
    assert_eq!(diff.summary.ignored_a, 1);
    assert_eq!(diff.summary.ignored_b, 1);
}

#[test]
fn test_blank_lines_are_not_compared() {
    let engine = DiffEngine::default();
    let diff = engine.diff_lines(
        "r1",
        &lines(&["set a 1", "", "  "]),
        "r2",
        &lines(&["set a 1"]),
    );
    assert!(diff.identical);
    assert_eq!(diff.summary.total_a, 1);
}

#[test]
fn test_similarity_threshold() {
    assert!(lines_are_similar(
        "set interfaces ge-0/0/1 unit 0 family inet address 10.0.0.1/24",
        "set interfaces ge-0/0/1 unit 0 family inet address 10.0.0.2/24"
    ));
    assert!(!lines_are_similar("set snmp community public", "delete vlans"));
    assert!(!lines_are_similar("", "set a"));
}

#[test]
fn test_word_diff_marks_changed_words() {
    let diff = WordDiff::word_level(
        "set system host-name core-a",
        "set system host-name core-b",
        false,
    );
    assert!(diff.has_changes);
    assert!(diff.a_highlighted.contains("[-core-a]"));
    assert!(diff.b_highlighted.contains("[+core-b]"));
    assert!(diff.a_highlighted.starts_with("set system host-name "));
}

#[tokio::test]
async fn test_compare_sessions() {
    let transport = MockTransport::with_devices(
        MockDevice::new(NODE1).with_running(&["set a 1", "set b 2"]),
        MockDevice::new(NODE2).with_running(&["set a 1"]),
    );
    let group = group();
    let timeout = Duration::from_secs(5);
    let mut a = transport.connect(group.node1(), timeout).await.unwrap();
    let mut b = transport.connect(group.node2(), timeout).await.unwrap();

    let diff = DiffEngine::default()
        .compare(a.as_mut(), b.as_mut(), timeout)
        .await
        .unwrap();

    assert_eq!(diff.host_a, NODE1);
    assert_eq!(diff.host_b, NODE2);
    assert_eq!(diff.unique_a, vec!["set b 2"]);
    assert!(diff.unique_b.is_empty());
}

#[tokio::test]
async fn test_compare_fetch_failure_is_comparison_error() {
    let node1 = MockDevice::new(NODE1);
    node1.set(&node1.fail_fetch);
    let transport = MockTransport::with_devices(node1, MockDevice::new(NODE2));
    let group = group();
    let timeout = Duration::from_secs(5);
    let mut a = transport.connect(group.node1(), timeout).await.unwrap();
    let mut b = transport.connect(group.node2(), timeout).await.unwrap();

    let err = DiffEngine::default()
        .compare(a.as_mut(), b.as_mut(), timeout)
        .await
        .unwrap_err();

    match err {
        Error::Comparison(message) => assert!(message.contains(NODE1)),
        other => panic!("expected comparison error, got {:?}", other),
    }
}
