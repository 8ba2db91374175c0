use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::models::{EndpointKey, EndpointStat};

/// In-memory view of the stat store, ordered by key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatTable {
    rows: BTreeMap<EndpointKey, EndpointStat>,
}

impl StatTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &EndpointKey) -> Option<&EndpointStat> {
        self.rows.get(key)
    }

    /// Replace the row for `key`, returning the previous value
    pub fn insert(&mut self, key: EndpointKey, stat: EndpointStat) -> Option<EndpointStat> {
        self.rows.insert(key, stat)
    }

    /// Read the current row (if any), combine it with `incoming` and store the result.
    ///
    /// Sequential calls for the same key each see the previous call's result.
    pub fn upsert<F>(&mut self, key: EndpointKey, incoming: &EndpointStat, merge: F) -> EndpointStat
    where
        F: FnOnce(Option<&EndpointStat>, &EndpointStat) -> EndpointStat,
    {
        match self.rows.entry(key) {
            btree_map::Entry::Occupied(mut entry) => {
                let merged = merge(Some(entry.get()), incoming);
                entry.insert(merged);
                merged
            }
            btree_map::Entry::Vacant(entry) => *entry.insert(merge(None, incoming)),
        }
    }

    pub fn iter(&self) -> btree_map::Iter<'_, EndpointKey, EndpointStat> {
        self.rows.iter()
    }
}

impl<'a> IntoIterator for &'a StatTable {
    type Item = (&'a EndpointKey, &'a EndpointStat);
    type IntoIter = btree_map::Iter<'a, EndpointKey, EndpointStat>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl FromIterator<(EndpointKey, EndpointStat)> for StatTable {
    fn from_iter<I: IntoIterator<Item = (EndpointKey, EndpointStat)>>(iter: I) -> Self {
        StatTable {
            rows: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_upsert_sequential_calls_do_not_lose_updates() {
        let mut table = StatTable::new();
        let key = EndpointKey::new("1.1.1.1", 80, Some("vmess"));
        let now = Utc::now();

        for alive in [true, false, true, true] {
            table.upsert(
                key.clone(),
                &EndpointStat::observation(alive, now),
                EndpointStat::merge_increment,
            );
        }

        let stat = table.get(&key).unwrap();
        assert_eq!(stat.pass, 3);
        assert_eq!(stat.fail, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_upsert_passes_existing_row_to_merge() {
        let mut table = StatTable::new();
        let key = EndpointKey::new("2.2.2.2", 443, Some("ss"));
        table.insert(
            key.clone(),
            EndpointStat {
                pass: 7,
                ..EndpointStat::default()
            },
        );

        let result = table.upsert(key, &EndpointStat::default(), |current, _| {
            let mut next = *current.expect("row should exist");
            next.fail = 99;
            next
        });
        assert_eq!(result.pass, 7);
        assert_eq!(result.fail, 99);
    }

    #[test]
    fn test_iteration_is_key_ordered() {
        let table: StatTable = vec![
            (EndpointKey::new("b", 1, None), EndpointStat::default()),
            (EndpointKey::new("a", 2, None), EndpointStat::default()),
            (EndpointKey::new("a", 1, None), EndpointStat::default()),
        ]
        .into_iter()
        .collect();

        let keys: Vec<String> = table.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["a,1,unknown", "a,2,unknown", "b,1,unknown"]);
    }
}
