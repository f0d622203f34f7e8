mod compare;
mod range;
mod select;

pub use compare::compare_versions;
pub use range::{parse_expression, VersionTerm};
pub use select::{best_upper_bound, matches};

#[cfg(test)]
mod tests;
