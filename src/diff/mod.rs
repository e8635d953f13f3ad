//! Deterministic entry diffing.
//!
//! The dispatcher feeds the result into per-handler attribute gating, so the
//! outcome must be a pure function of the two entries: same inputs, same
//! sorted name list, no environmental influence.

use std::collections::BTreeSet;

use crate::model::Entry;

/// Names of the attributes whose value multiset differs between `old` and
/// `new`. Either side may be absent (treated as the empty entry).
/// Absent/present transitions count as changes.
pub fn changed_attributes(
    old: Option<&Entry>,
    new: Option<&Entry>,
) -> Vec<String> {
    let empty = Entry::new();
    let old = old.unwrap_or(&empty);
    let new = new.unwrap_or(&empty);

    let mut names: BTreeSet<&str> = BTreeSet::new();
    names.extend(old.attributes().map(|a| a.name()));
    names.extend(new.attributes().map(|a| a.name()));

    names
        .into_iter()
        .filter(|&name| {
            let old_values = old.attribute(name).map(|a| a.sorted_values());
            let new_values = new.attribute(name).map(|a| a.sorted_values());
            old_values != new_values
        })
        .map(|name| name.to_string())
        .collect()
}
