use std::cmp::Ordering;

use crate::compare::compare_versions;
use crate::range::{parse_expression, VersionTerm};

/// Tests `version` against a comma-separated expression of exact versions,
/// `lo-hi` ranges and `*` wildcards. A wildcard version matches when its
/// expansion overlaps any term. Malformed input never matches.
pub fn matches(version: &str, expression: &str) -> bool {
    let terms = parse_expression(expression);
    if terms.is_empty() {
        return false;
    }
    let Some(candidate) = VersionTerm::parse(version) else {
        return false;
    };

    terms.iter().any(|term| match &candidate {
        VersionTerm::Exact(version) => term.contains(version),
        other => term.overlaps(other),
    })
}

/// Picks the highest version named by any term of `expressions` that does not
/// exceed `ceiling`. Ranges and wildcards contribute their lower bound, and
/// the first of equal candidates wins.
pub fn best_upper_bound<S: AsRef<str>>(expressions: &[S], ceiling: &str) -> Option<String> {
    let mut best: Option<String> = None;

    for term in expressions
        .iter()
        .flat_map(|expression| parse_expression(expression.as_ref()))
    {
        let candidate = match term {
            VersionTerm::Any => continue,
            VersionTerm::Exact(version) => version,
            VersionTerm::Range { lower, .. } => lower,
        };
        if compare_versions(&candidate, ceiling) == Ordering::Greater {
            continue;
        }
        let improves = best
            .as_deref()
            .map(|current| compare_versions(&candidate, current) == Ordering::Greater)
            .unwrap_or(true);
        if improves {
            best = Some(candidate);
        }
    }

    best
}
