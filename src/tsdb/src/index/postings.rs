use std::collections::BTreeMap;

use crate::labels::Labels;

/// The label pair every series is listed under.
pub const ALL_POSTINGS_KEY: (&str, &str) = ("", "");

/// MemPostings holds the postings lists of a block in memory, ordered by label name and then
/// label value.
#[derive(Debug, Default)]
pub struct MemPostings {
    m: BTreeMap<String, BTreeMap<String, Vec<u64>>>,
}

impl MemPostings {
    pub fn new() -> Self {
        Self::default()
    }

    /// add lists series `id` under each of its labels and under the all-postings key.
    /// Ids are expected in increasing order.
    pub fn add(&mut self, id: u64, labels: &Labels) {
        for l in labels {
            self.add_for(id, l.name.as_str(), l.value.as_str());
        }
        self.add_for(id, ALL_POSTINGS_KEY.0, ALL_POSTINGS_KEY.1);
    }

    fn add_for(&mut self, id: u64, name: &str, value: &str) {
        let list = self
            .m
            .entry(name.to_string())
            .or_default()
            .entry(value.to_string())
            .or_default();
        list.push(id);

        // Repair order if ids arrive out of order.
        let n = list.len();
        if n > 1 && list[n - 2] > id {
            list.sort_unstable();
            list.dedup();
        }
    }

    pub fn get(&self, name: &str, value: &str) -> &[u64] {
        self.m
            .get(name)
            .and_then(|values| values.get(value))
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// sorted_keys returns every label pair, by name and then value.
    pub fn sorted_keys(&self) -> Vec<(&str, &str)> {
        self.iter().map(|(name, value, _)| (name, value)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[u64])> {
        self.m.iter().flat_map(|(name, values)| {
            values
                .iter()
                .map(move |(value, list)| (name.as_str(), value.as_str(), list.as_slice()))
        })
    }

    pub fn len(&self) -> usize {
        self.m.values().map(|values| values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }
}
