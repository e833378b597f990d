//! Secondary (reverse) index: attribute value back to keys.

use crate::error::StorageError;
use crate::types::{Record, Scalar, ScalarKind};
use std::collections::HashMap;

/// Index entries for one attribute.
#[derive(Debug, Clone)]
struct AttributeIndex {
    /// Kind fixed by the first write of this attribute on the node.
    kind: ScalarKind,
    /// Keys per value, in insertion order, without duplicates.
    values: HashMap<Scalar, Vec<String>>,
}

/// Reverse index over every attribute a node has seen.
///
/// Callers keep it consistent with the primary table: a key is listed
/// under `(attribute, value)` only while its record holds that value.
#[derive(Debug, Clone, Default)]
pub struct SecondaryIndex {
    attributes: HashMap<String, AttributeIndex>,
}

impl SecondaryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declared kind of an attribute, if it has been written before.
    pub fn kind_of(&self, attribute: &str) -> Option<ScalarKind> {
        self.attributes.get(attribute).map(|a| a.kind)
    }

    /// Check every attribute of `record` against its declared kind.
    ///
    /// Never mutates, so a failing record leaves the index untouched.
    pub fn validate(&self, record: &Record) -> Result<(), StorageError> {
        for (attribute, value) in record.iter() {
            if let Some(declared) = self.kind_of(attribute) {
                let actual = value.kind();
                if actual != declared {
                    return Err(StorageError::TypeMismatch {
                        attribute: attribute.clone(),
                        declared,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    /// Index `key` under every attribute of `record`.
    ///
    /// The record must already have passed [`validate`](Self::validate).
    /// Re-indexing the same `(attribute, value)` for a key is a no-op.
    pub fn insert(&mut self, key: &str, record: &Record) {
        for (attribute, value) in record.iter() {
            let entry = self
                .attributes
                .entry(attribute.clone())
                .or_insert_with(|| AttributeIndex {
                    kind: value.kind(),
                    values: HashMap::new(),
                });
            debug_assert_eq!(entry.kind, value.kind());

            let keys = entry.values.entry(value.clone()).or_default();
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }

    /// Drop `key` from the entries of `record` that `replacement` does not
    /// carry over unchanged.
    ///
    /// With no replacement every entry of `record` is dropped.
    pub fn remove(&mut self, key: &str, record: &Record, replacement: Option<&Record>) {
        for (attribute, value) in record.iter() {
            if replacement.and_then(|r| r.get(attribute)) == Some(value) {
                continue;
            }
            self.remove_entry(key, attribute, value);
        }
    }

    /// Drop `key` from every entry that lists it, whatever the value.
    ///
    /// Returns how many entries were cleaned.
    pub fn scrub(&mut self, key: &str) -> usize {
        let mut cleaned = 0;
        for index in self.attributes.values_mut() {
            index.values.retain(|_, keys| {
                let before = keys.len();
                keys.retain(|k| k != key);
                cleaned += before - keys.len();
                !keys.is_empty()
            });
        }
        cleaned
    }

    /// Keys indexed under `(attribute, value)`, in insertion order.
    pub fn lookup(&self, attribute: &str, value: &Scalar) -> &[String] {
        self.attributes
            .get(attribute)
            .and_then(|index| index.values.get(value))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of `(attribute, value, key)` entries.
    pub fn entry_count(&self) -> usize {
        self.attributes
            .values()
            .flat_map(|index| index.values.values())
            .map(Vec::len)
            .sum()
    }

    /// Attributes with a declared kind, in no particular order.
    pub fn declared(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Drop the declared kind of `attribute` if no key is indexed under it.
    ///
    /// Returns whether the declaration was dropped.
    pub fn forget(&mut self, attribute: &str) -> bool {
        let unused = self
            .attributes
            .get(attribute)
            .is_some_and(|index| index.values.is_empty());
        if unused {
            self.attributes.remove(attribute);
        }
        unused
    }

    fn remove_entry(&mut self, key: &str, attribute: &str, value: &Scalar) {
        if let Some(index) = self.attributes.get_mut(attribute) {
            if let Some(keys) = index.values.get_mut(value) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    index.values.remove(value);
                }
            }
        }
    }
}
