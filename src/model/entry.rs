use std::collections::BTreeMap;
use std::collections::BTreeSet;

use super::Dn;

/// A named attribute: ordered list of opaque byte-string values.
///
/// Names are ASCII case-insensitive and canonicalized to lower-case on
/// ingest. Insertion order of values is preserved but carries no meaning;
/// octet-identical duplicates are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    values: Vec<Vec<u8>>,
}

impl Attribute {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    /// Appends a value unless an octet-identical one is already present.
    pub fn push_value(
        &mut self,
        value: Vec<u8>,
    ) {
        if !self.values.iter().any(|v| *v == value) {
            self.values.push(value);
        }
    }

    /// Values as a sorted multiset for order-insensitive comparison.
    pub fn sorted_values(&self) -> Vec<&[u8]> {
        let mut values: Vec<&[u8]> = self.values.iter().map(|v| v.as_slice()).collect();
        values.sort_unstable();
        values
    }
}

/// A shadow copy of one directory entry plus the bookkeeping the pipeline
/// needs: which handlers have successfully processed this state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Entry {
    attributes: BTreeMap<String, Attribute>,
    modules: BTreeSet<String>,
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute(
        &self,
        name: &str,
    ) -> Option<&Attribute> {
        self.attributes.get(&name.to_ascii_lowercase())
    }

    /// Adds a value under `name`, creating the attribute on first use.
    pub fn add_value(
        &mut self,
        name: &str,
        value: Vec<u8>,
    ) {
        let key = name.to_ascii_lowercase();
        self.attributes
            .entry(key.clone())
            .or_insert_with(|| Attribute::new(&key))
            .push_value(value);
    }

    pub fn set_attribute(
        &mut self,
        attribute: Attribute,
    ) {
        self.attributes.insert(attribute.name().to_string(), attribute);
    }

    // - module-present set

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|s| s.as_str())
    }

    pub fn module_present(
        &self,
        name: &str,
    ) -> bool {
        self.modules.contains(name)
    }

    pub fn module_add(
        &mut self,
        name: &str,
    ) {
        self.modules.insert(name.to_string());
    }

    pub fn module_remove(
        &mut self,
        name: &str,
    ) {
        self.modules.remove(name);
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

/// Convenience constructor used pervasively in tests.
pub fn entry_with(attrs: &[(&str, &[&str])]) -> Entry {
    let mut entry = Entry::new();
    for (name, values) in attrs {
        for value in *values {
            entry.add_value(name, value.as_bytes().to_vec());
        }
    }
    entry
}

/// A cached record: the entry body keyed by its DN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub dn: Dn,
    pub entry: Entry,
}
