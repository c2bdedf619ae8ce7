//! Per-field value lookup: one `value -> records` map per indexed ordinal.
//!
//! Only ordinals named by a non-OTHER relation are indexed. Postings keep
//! insertion order so every traversal over them is reproducible.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;

use crate::kb::{Record, RecordId};
use crate::relation::{Relation, RelationKind};

/// Which side of the relation list an index serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbSide {
    Kb1,
    Kb2,
}

impl KbSide {
    pub(crate) fn ordinal(self, relation: &Relation) -> usize {
        match self {
            KbSide::Kb1 => relation.kb1_field,
            KbSide::Kb2 => relation.kb2_field,
        }
    }
}

/// Field-indexed record lookup for one KB.
#[derive(Debug)]
pub struct FieldIndex {
    /// One slot per ordinal; `None` for unindexed fields.
    slots: Vec<Option<HashMap<String, IndexSet<RecordId>>>>,
}

impl FieldIndex {
    /// Index `records` over every non-OTHER relation ordinal of `side`,
    /// skipping values in the union of those relations' blacklists.
    pub fn build(
        records: &[Record],
        field_count: usize,
        relations: &[Relation],
        side: KbSide,
    ) -> FieldIndex {
        let mut blacklists: HashMap<usize, HashSet<String>> = HashMap::new();
        let mut slots: Vec<Option<HashMap<String, IndexSet<RecordId>>>> =
            (0..field_count).map(|_| None).collect();
        for relation in relations {
            if relation.kind == RelationKind::Other {
                continue;
            }
            let ordinal = side.ordinal(relation);
            blacklists
                .entry(ordinal)
                .or_default()
                .extend(relation.blacklist.iter().cloned());
            slots[ordinal].get_or_insert_with(HashMap::new);
        }

        for (id, record) in records.iter().enumerate() {
            for (ordinal, slot) in slots.iter_mut().enumerate() {
                let Some(map) = slot else { continue };
                for value in record.values(ordinal) {
                    if blacklists[&ordinal].contains(value) {
                        continue;
                    }
                    map.entry(value.clone()).or_default().insert(id);
                }
            }
        }
        FieldIndex { slots }
    }

    /// Records holding `value` at `ordinal`, in insertion order. `None` when
    /// the value is unseen or the ordinal unindexed.
    pub fn postings(&self, ordinal: usize, value: &str) -> Option<&IndexSet<RecordId>> {
        self.slots[ordinal].as_ref()?.get(value)
    }

    /// Insert a record under `value`; used by the matcher to keep the KB₁
    /// index in step with accumulated pairings.
    pub fn insert(&mut self, ordinal: usize, value: &str, id: RecordId) {
        self.slots[ordinal]
            .get_or_insert_with(HashMap::new)
            .entry(value.to_string())
            .or_default()
            .insert(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::Record;
    use crate::relation::Relation;

    fn record(line: &str, field_count: usize) -> Record {
        Record::parse(line, "|", field_count).unwrap()
    }

    #[test]
    fn test_build_indexes_unique_and_name_only() {
        let records = vec![record("u1\tn1\tx", 3), record("u2\tn1|n2\ty", 3)];
        let relations = vec![
            Relation::new(0, 0, RelationKind::Unique),
            Relation::new(1, 1, RelationKind::Name),
            Relation::new(2, 2, RelationKind::Other),
        ];
        let index = FieldIndex::build(&records, 3, &relations, KbSide::Kb1);

        assert_eq!(
            index.postings(0, "u1").unwrap().iter().copied().collect::<Vec<_>>(),
            [0]
        );
        assert_eq!(
            index.postings(1, "n1").unwrap().iter().copied().collect::<Vec<_>>(),
            [0, 1]
        );
        // OTHER fields are not indexed
        assert!(index.postings(2, "x").is_none());
    }

    #[test]
    fn test_blacklisted_values_skipped() {
        let records = vec![record("bad", 1), record("good", 1)];
        let mut relation = Relation::new(0, 0, RelationKind::Unique);
        relation.blacklist.insert("bad".to_string());
        let index = FieldIndex::build(&records, 1, &[relation], KbSide::Kb1);

        assert!(index.postings(0, "bad").is_none());
        assert!(index.postings(0, "good").is_some());
    }

    #[test]
    fn test_kb2_side_uses_kb2_ordinal() {
        let records = vec![record("a\tb", 2)];
        let relations = vec![Relation::new(0, 1, RelationKind::Unique)];
        let index = FieldIndex::build(&records, 2, &relations, KbSide::Kb2);

        assert!(index.postings(1, "b").is_some());
        assert!(index.postings(0, "a").is_none());
    }

    #[test]
    fn test_insert_appends_in_order() {
        let records = vec![record("v", 1), record("v", 1)];
        let relations = vec![Relation::new(0, 0, RelationKind::Unique)];
        let mut index = FieldIndex::build(&records, 1, &relations, KbSide::Kb1);

        index.insert(0, "w", 1);
        index.insert(0, "v", 0); // already present, no duplicate
        assert_eq!(
            index.postings(0, "v").unwrap().iter().copied().collect::<Vec<_>>(),
            [0, 1]
        );
        assert_eq!(
            index.postings(0, "w").unwrap().iter().copied().collect::<Vec<_>>(),
            [1]
        );
    }
}
