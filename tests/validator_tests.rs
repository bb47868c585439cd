//! Configuration file validation tests, including property-based checks.

use junos_push::error::Error;
use junos_push::validator::{invert, ConfigValidator, StatementKind};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn problems(content: &str) -> Vec<String> {
    match ConfigValidator::new().validate(content) {
        Err(Error::Validation { problems, .. }) => problems,
        other => panic!("expected validation error, got {:?}", other.map(|v| v.statements)),
    }
}

#[test]
fn test_mixed_file() {
    let content = "\
# vlans for the access layer
set vlans users vlan-id 10   # inline note
set vlans voice vlan-id 20

delete vlans guest
";
    let validated = ConfigValidator::new().validate(content).unwrap();
    assert_eq!(validated.stats.total_lines, 5);
    assert_eq!(validated.stats.set_commands, 2);
    assert_eq!(validated.stats.delete_commands, 1);
    assert_eq!(validated.stats.comment_lines, 1);
    assert_eq!(validated.stats.blank_lines, 1);
    assert_eq!(validated.stats.unique_hierarchies, 1);
    assert_eq!(validated.statements[0].text, "set vlans users vlan-id 10");
    assert_eq!(validated.statements[0].line_number, 2);
    assert_eq!(validated.statements[2].kind, StatementKind::Delete);
}

#[test]
fn test_hash_inside_quotes_is_kept() {
    let validated = ConfigValidator::new()
        .validate("set system login message \"room #4\"\n")
        .unwrap();
    assert_eq!(
        validated.statements[0].text,
        "set system login message \"room #4\""
    );
}

#[test]
fn test_crlf_input() {
    let validated = ConfigValidator::new()
        .validate("set vlans v10 vlan-id 10\r\nset vlans v20 vlan-id 20\r\n")
        .unwrap();
    assert_eq!(validated.statements.len(), 2);
    assert!(validated.warnings.is_empty());
}

#[test]
fn test_all_errors_reported_in_line_order() {
    let found = problems(
        "set vlans v10 vlan-id 10\nshow vlans\nset vlans\nset system login message \"open\ndelete\n",
    );
    assert_eq!(found.len(), 4);
    assert!(found[0].contains("Line 2: Invalid command 'show'"));
    assert!(found[1].contains("Line 3: Set command too short"));
    assert!(found[2].contains("Line 4: Unmatched quotes"));
    assert!(found[3].contains("Line 5: Incomplete delete command"));
}

#[test]
fn test_unmatched_brackets() {
    let found = problems("set policy-options prefix-list mgmt [ 10.0.0.0/8\n");
    assert_eq!(found, vec!["Line 1: Unmatched brackets in configuration"]);
}

#[test]
fn test_warnings_do_not_fail() {
    let validated = ConfigValidator::new()
        .validate("set frobnicate foo bar\nset system host-name a..b \n")
        .unwrap();
    let warnings = validated.warnings.join("\n");
    assert!(warnings.contains("Unrecognized configuration hierarchy 'frobnicate'"));
    assert!(warnings.contains("Double dots"));
    assert!(warnings.contains("Trailing whitespace"));
}

#[test]
fn test_conflicting_delete_warns() {
    let validated = ConfigValidator::new()
        .validate("set vlans v10 vlan-id 10\ndelete vlans v10\n")
        .unwrap();
    assert!(validated
        .warnings
        .iter()
        .any(|w| w.starts_with("Line 2: delete of 'vlans v10' overlaps set on line 1")));
}

#[test]
fn test_latin1_file_is_decoded() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"set system location building \"Caf\xe9\"\n")
        .unwrap();
    let validated = ConfigValidator::new().validate_file(file.path()).unwrap();
    assert!(validated.statements[0].text.contains("Caf\u{e9}"));
}

#[test]
fn test_missing_file() {
    let err = ConfigValidator::new()
        .validate_file(std::path::Path::new("/nonexistent/change.set"))
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_invert_preserves_order() {
    let validated = ConfigValidator::new()
        .validate("set vlans a vlan-id 1\ndelete vlans b\n")
        .unwrap();
    let inverted = invert(&validated.statements);
    assert_eq!(inverted[0].text, "delete vlans a vlan-id 1");
    assert_eq!(inverted[1].text, "set vlans b");
    assert_eq!(inverted[1].line_number, 2);
}

// ============================================================================
// Properties
// ============================================================================

fn line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "set (vlans|interfaces|system) [a-z]{1,8} [a-z0-9]{1,8}",
        "delete (vlans|interfaces) [a-z]{1,8}",
        "# [a-z ]{0,20}",
        Just(String::new()),
    ]
}

proptest! {
    #[test]
    fn prop_every_line_is_accounted_for(lines in prop::collection::vec(line_strategy(), 1..40)) {
        prop_assume!(lines.iter().any(|l| l.starts_with("set") || l.starts_with("delete")));
        let content: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        let validated = ConfigValidator::new().validate(&content).unwrap();
        let stats = &validated.stats;

        prop_assert_eq!(stats.total_lines, lines.len());
        prop_assert_eq!(
            stats.total_lines,
            stats.set_commands + stats.delete_commands + stats.comment_lines + stats.blank_lines
        );
        prop_assert_eq!(validated.statements.len(), stats.statement_count());
    }

    #[test]
    fn prop_statements_keep_file_order(lines in prop::collection::vec(line_strategy(), 1..40)) {
        prop_assume!(lines.iter().any(|l| l.starts_with("set") || l.starts_with("delete")));
        let validated = ConfigValidator::new().validate(&lines.join("\n")).unwrap();
        let numbers: Vec<usize> = validated.statements.iter().map(|s| s.line_number).collect();
        let mut sorted = numbers.clone();
        sorted.sort_unstable();
        prop_assert_eq!(numbers, sorted);
    }

    #[test]
    fn prop_whitespace_is_normalized(
        words in prop::collection::vec("[a-z0-9]{1,6}", 2..6),
        pad in "[ \t]{1,3}",
    ) {
        let line = format!("set vlans{}{}", pad, words.join(pad.as_str()));
        let validated = ConfigValidator::new().validate(&line).unwrap();
        prop_assert_eq!(&validated.statements[0].text, &format!("set vlans {}", words.join(" ")));
    }

    #[test]
    fn prop_invert_twice_is_identity(lines in prop::collection::vec(line_strategy(), 1..20)) {
        prop_assume!(lines.iter().any(|l| l.starts_with("set") || l.starts_with("delete")));
        let validated = ConfigValidator::new().validate(&lines.join("\n")).unwrap();
        let twice = invert(&invert(&validated.statements));
        let texts: Vec<&str> = twice.iter().map(|s| s.text.as_str()).collect();
        let expected: Vec<&str> = validated.statements.iter().map(|s| s.text.as_str()).collect();
        prop_assert_eq!(texts, expected);
    }
}
