//! Decides which identifiers still need a price.

use std::collections::{BTreeSet, HashSet};

/// Returns the identifiers referenced by transactions that have no cached
/// price, in ascending order.
pub fn missing_identifiers(
    transaction_identifiers: &HashSet<String>,
    cached_identifiers: &HashSet<String>,
) -> Vec<String> {
    transaction_identifiers
        .difference(cached_identifiers)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
