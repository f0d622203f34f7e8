use std::cmp::Ordering;

use crate::compare::{compare_versions, normalize_version};

const WILDCARD_LOW: &str = "0";
const WILDCARD_HIGH: &str = "999";

/// One term of a comma-separated version expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionTerm {
    Any,
    Exact(String),
    Range { lower: String, upper: String },
}

impl VersionTerm {
    /// Parses a single term. Returns `None` for malformed terms.
    pub fn parse(raw: &str) -> Option<Self> {
        let term = normalize_version(raw);
        if term.is_empty() {
            return None;
        }
        if term == "all" || term == "*" {
            return Some(Self::Any);
        }

        if let Some((lower, upper)) = split_range(&term) {
            if lower.contains('*') || upper.contains('*') {
                return None;
            }
            return Some(Self::Range {
                lower: lower.to_string(),
                upper: upper.to_string(),
            });
        }

        if term.contains('*') {
            return Some(Self::Range {
                lower: term.replace('*', WILDCARD_LOW),
                upper: term.replace('*', WILDCARD_HIGH),
            });
        }

        Some(Self::Exact(term))
    }

    pub fn bounds(&self) -> Option<(&str, &str)> {
        match self {
            Self::Any => None,
            Self::Exact(version) => Some((version, version)),
            Self::Range { lower, upper } => Some((lower, upper)),
        }
    }

    pub fn contains(&self, version: &str) -> bool {
        match self.bounds() {
            None => true,
            Some((lower, upper)) => {
                compare_versions(version, lower) != Ordering::Less
                    && compare_versions(version, upper) != Ordering::Greater
            }
        }
    }

    /// True when both terms admit at least one common version.
    pub fn overlaps(&self, other: &Self) -> bool {
        let (Some((lower, upper)), Some((other_lower, other_upper))) =
            (self.bounds(), other.bounds())
        else {
            return true;
        };
        compare_versions(lower, other_upper) != Ordering::Greater
            && compare_versions(other_lower, upper) != Ordering::Greater
    }
}

/// Splits `lo-hi` when both sides look like versions, so that pre-release
/// suffixes such as `2.1.0-rc.1` stay exact terms.
fn split_range(term: &str) -> Option<(&str, &str)> {
    let (lower, upper) = term.split_once('-')?;
    let starts_numeric = |side: &str| side.chars().next().is_some_and(|ch| ch.is_ascii_digit() || ch == '*');
    if !(starts_numeric(lower) && starts_numeric(upper)) {
        return None;
    }
    if upper.contains('-') {
        return None;
    }
    Some((lower, upper))
}

pub fn parse_expression(expression: &str) -> Vec<VersionTerm> {
    expression.split(',').filter_map(VersionTerm::parse).collect()
}
