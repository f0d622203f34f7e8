use std::cmp::Ordering;

use super::*;

#[test]
fn range_membership_is_inclusive() {
    assert!(matches("1.5", "1.0-2.0"));
    assert!(matches("1.0", "1.0-2.0"));
    assert!(matches("2.0", "1.0-2.0"));
    assert!(!matches("2.1", "1.0-2.0"));
    assert!(!matches("0.9", "1.0-2.0"));
}

#[test]
fn wildcard_version_matches_overlapping_term() {
    assert!(matches("1.*", "1.3"));
    assert!(!matches("1.*", "2.0"));
}

#[test]
fn wildcard_term_expands_to_low_and_high_bounds() {
    assert!(matches("2.1.4", "2.1.*"));
    assert!(matches("2.1", "2.1.*"));
    assert!(!matches("2.2.0", "2.1.*"));
}

#[test]
fn comma_list_matches_any_member() {
    assert!(matches("9.9", "1.0,2.0,9.9"));
    assert!(matches("2.0", "1.0, 2.0 ,9.9"));
    assert!(!matches("3.0", "1.0,2.0,9.9"));
}

#[test]
fn all_keyword_matches_everything() {
    assert!(matches("7.3.1", "all"));
    assert!(matches("0.1", "1.0,all"));
}

#[test]
fn malformed_expressions_never_match() {
    assert!(!matches("1.0", ""));
    assert!(!matches("1.0", ",,"));
    assert!(!matches("", "1.0"));
    assert!(!matches("1.0", "1.*-2.*"));
    assert!(!matches("1.0", "1.0-2.0-3.0"));
}

#[test]
fn compare_pads_missing_segments_with_zero() {
    assert_eq!(compare_versions("2.0", "2.0.0"), Ordering::Equal);
    assert_eq!(compare_versions("2.0.1", "2.0"), Ordering::Greater);
    assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
}

#[test]
fn compare_uses_lexical_suffix_after_numeric_prefix() {
    assert_eq!(compare_versions("2.0rc1", "2.0rc2"), Ordering::Less);
    assert_eq!(compare_versions("2.0beta", "2.0rc"), Ordering::Less);
    assert_eq!(compare_versions("2.0a", "2.0"), Ordering::Greater);
}

#[test]
fn compare_uses_semver_precedence_for_strict_versions() {
    assert_eq!(compare_versions("2.1.0-rc.1", "2.1.0"), Ordering::Less);
    assert_eq!(compare_versions("2.1.0-rc.2", "2.1.0-rc.10"), Ordering::Less);
    assert!(matches("2.1.0-rc.1", "2.1.0-rc.1"));
}

#[test]
fn best_upper_bound_picks_highest_not_above_ceiling() {
    let expressions = ["1.0,1.1", "2.0-2.5", "3.0"];
    assert_eq!(
        best_upper_bound(&expressions, "2.9").as_deref(),
        Some("2.0")
    );
    assert_eq!(best_upper_bound(&expressions, "1.0").as_deref(), Some("1.0"));
    assert_eq!(best_upper_bound(&expressions, "0.5"), None);
}

#[test]
fn best_upper_bound_keeps_first_of_equal_candidates() {
    let expressions = ["2.0.0", "2.0"];
    assert_eq!(best_upper_bound(&expressions, "3").as_deref(), Some("2.0.0"));
}

#[test]
fn best_upper_bound_uses_wildcard_lower_bound() {
    assert_eq!(best_upper_bound(&["2.1.*"], "2.1.4").as_deref(), Some("2.1.0"));
}

#[test]
fn version_term_parse_classifies_terms() {
    assert_eq!(VersionTerm::parse("ALL"), Some(VersionTerm::Any));
    assert_eq!(
        VersionTerm::parse(" 1.0 - 2.0 "),
        Some(VersionTerm::Range {
            lower: "1.0".to_string(),
            upper: "2.0".to_string()
        })
    );
    assert_eq!(
        VersionTerm::parse("2.0rc1"),
        Some(VersionTerm::Exact("2.0rc1".to_string()))
    );
    assert_eq!(VersionTerm::parse("  "), None);
}
