use std::cmp::Ordering;

use semver::Version;

/// Compares two product versions.
///
/// Strict semantic versions use semver precedence. Anything else is compared
/// segment by segment on `.`: the leading digits numerically, then the rest of
/// the segment lexically, with the shorter version padded by `0` segments.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = normalize_version(left);
    let right = normalize_version(right);

    if let (Ok(left), Ok(right)) = (Version::parse(&left), Version::parse(&right)) {
        return left.cmp(&right);
    }

    let left_segments = left.split('.').collect::<Vec<_>>();
    let right_segments = right.split('.').collect::<Vec<_>>();
    let width = left_segments.len().max(right_segments.len());

    for index in 0..width {
        let left_segment = left_segments.get(index).copied().unwrap_or("0");
        let right_segment = right_segments.get(index).copied().unwrap_or("0");
        let ordering = compare_segments(left_segment, right_segment);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

pub(crate) fn normalize_version(version: &str) -> String {
    version
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn compare_segments(left: &str, right: &str) -> Ordering {
    let (left_number, left_rest) = split_numeric_prefix(left);
    let (right_number, right_rest) = split_numeric_prefix(right);

    left_number
        .cmp(&right_number)
        .then_with(|| left_rest.cmp(right_rest))
}

fn split_numeric_prefix(segment: &str) -> (u64, &str) {
    let digits = segment
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map(|(index, _)| index)
        .unwrap_or(segment.len());
    let (number, rest) = segment.split_at(digits);
    // Overlong digit runs saturate instead of failing the comparison.
    let number = if number.is_empty() {
        0
    } else {
        number.parse::<u64>().unwrap_or(u64::MAX)
    };
    (number, rest)
}
