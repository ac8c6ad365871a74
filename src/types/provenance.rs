//! Pass-through key/value table of the original metadata.

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Deserialize, Serialize};

/// Original metadata flattened to `Element[id].Field` keys.
///
/// Insertion order is preserved and the first value seen for a key wins, so a
/// duplicated element never overwrites what was read before it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvenanceTable {
    entries: IndexMap<String, String>,
}

impl ProvenanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the key is already present. Returns whether the value was kept.
    pub fn insert_first(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        match self.entries.entry(key.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_value_wins_and_order_is_kept() {
        let mut table = ProvenanceTable::new();
        assert!(table.insert_first("Slide[0].Description", "first"));
        assert!(table.insert_first("Acquisition[1].MaxX", "4"));
        assert!(!table.insert_first("Slide[0].Description", "second"));

        assert_eq!(table.get("Slide[0].Description"), Some("first"));
        let keys: Vec<_> = table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["Slide[0].Description", "Acquisition[1].MaxX"]);
        assert_eq!(
            table.to_json().unwrap(),
            r#"{"Slide[0].Description":"first","Acquisition[1].MaxX":"4"}"#
        );
    }
}
