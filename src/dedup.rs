//! Intra-KB deduplication over shared unique identifiers.
//!
//! Records naming the same entity are linked transitively through any of the
//! identifier fields (Wikipedia URL, Freebase URL, ...). The collector walks
//! that identifier-sharing graph breadth-first and attributes each identifier
//! to at most one cluster: the first value seen for a field wins, and any
//! record whose identifiers contradict an attribution gets those identifiers
//! quarantined in a blacklist for the rest of the pass. Clusters are then
//! fused into a single record.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};

use crate::index::{FieldIndex, KbSide};
use crate::kb::{Kb, Record, RecordId};
use crate::relation::{Relation, RelationKind};

/// A quarantined identifier: (field ordinal, value).
pub type IdPair = (usize, String);

#[derive(Debug)]
pub struct DedupSummary {
    /// Records folded away by cluster fusion.
    pub removed: usize,
}

/// Deduplicate `kb` in place over `id_fields` (unqualified names; those not
/// in the schema are ignored). `blacklist` accumulates quarantined
/// identifiers and is left populated for cross-KB feedback.
pub fn deduplicate(
    kb: &mut Kb,
    id_fields: &[String],
    blacklist: &mut HashSet<IdPair>,
) -> DedupSummary {
    let relations = id_relations(kb, id_fields);
    let ordinals: Vec<usize> = relations.iter().map(|r| r.kb1_field).collect();
    let index = FieldIndex::build(
        &kb.records,
        kb.schema.field_count(),
        &relations,
        KbSide::Kb1,
    );
    tracing::debug!(kb = kb.name(), id_fields = ordinals.len(), "dedup index built");

    let mut new_records: Vec<Record> = Vec::new();
    for seed in 0..kb.records.len() {
        if kb.records[seed].state.used {
            continue;
        }

        let mut collected: IndexMap<usize, IndexSet<String>> =
            ordinals.iter().map(|&o| (o, IndexSet::new())).collect();
        collect_cluster(&mut collected, seed, &kb.records, &index, blacklist);

        // Everything reachable through the attributed identifiers, in
        // attribution order.
        let mut members: IndexSet<RecordId> = IndexSet::new();
        for (&ordinal, values) in &collected {
            for value in values {
                if let Some(postings) = index.postings(ordinal, value) {
                    members.extend(postings.iter().copied());
                }
            }
        }

        if members.len() > 1 {
            new_records.push(fuse(kb, members));
        } else {
            new_records.push(kb.records[seed].clone());
        }
    }

    let removed = kb.records.len() - new_records.len();
    kb.records = new_records;

    let mut quarantined: Vec<&IdPair> = blacklist.iter().collect();
    quarantined.sort();
    tracing::info!(
        kb = kb.name(),
        removed,
        blacklist_len = blacklist.len(),
        "deduplication complete"
    );
    tracing::debug!(kb = kb.name(), ?quarantined, "quarantined identifiers");

    DedupSummary { removed }
}

/// Synthesise UNIQUE relations over the identifier fields present in the
/// schema. The kb2 side is unused for intra-KB work and pinned to 0.
fn id_relations(kb: &Kb, id_fields: &[String]) -> Vec<Relation> {
    let mut relations = Vec::new();
    for field_name in id_fields {
        let qualified = format!("{}.{}", kb.name(), field_name);
        if let Some(ordinal) = kb.schema.ordinal_of(&qualified) {
            relations.push(Relation::new(ordinal, 0, RelationKind::Unique));
        }
    }
    relations
}

/// All (ordinal, value) identifier pairs of `record`, minus quarantined ones.
fn record_ids(
    record: &Record,
    ordinals: impl Iterator<Item = usize>,
    blacklist: &HashSet<IdPair>,
) -> Vec<IdPair> {
    let mut pairs = Vec::new();
    for ordinal in ordinals {
        for value in record.values(ordinal) {
            if !blacklist.contains(&(ordinal, value.clone())) {
                pairs.push((ordinal, value.clone()));
            }
        }
    }
    pairs
}

/// Breadth-first attribution of identifiers to the seed's cluster.
///
/// The queue carries (record, arriving identifier); a record is skipped when
/// its arriving identifier was quarantined after it was enqueued. Per popped
/// record, identifiers are staged and only committed if the record produced
/// no conflict: a value for a field that already has a different attribution
/// voids the whole record's staging and quarantines every identifier it
/// shares with the cluster.
fn collect_cluster(
    collected: &mut IndexMap<usize, IndexSet<String>>,
    seed: RecordId,
    records: &[Record],
    index: &FieldIndex,
    blacklist: &mut HashSet<IdPair>,
) {
    let mut fifo: VecDeque<(RecordId, Option<IdPair>)> = VecDeque::new();
    fifo.push_back((seed, None));
    while let Some((record, arrived_via)) = fifo.pop_front() {
        if let Some(tag) = &arrived_via {
            if blacklist.contains(tag) {
                continue;
            }
        }
        let cur_ids = record_ids(&records[record], collected.keys().copied(), blacklist);
        let mut staged_values: Vec<IdPair> = Vec::new();
        let mut staged_records: Vec<(RecordId, IdPair)> = Vec::new();
        for (ordinal, value) in &cur_ids {
            // the blacklist can grow within this very loop
            if blacklist.contains(&(*ordinal, value.clone())) {
                continue;
            }
            if collected[ordinal].contains(value) {
                continue;
            }
            if !collected[ordinal].is_empty() {
                // conflict: quarantine every attribution this record shares
                // with the cluster and void its staging
                for (o, v) in &cur_ids {
                    if collected[o].contains(v) {
                        collected[o].shift_remove(v);
                        blacklist.insert((*o, v.clone()));
                    }
                }
                staged_values.clear();
                staged_records.clear();
            } else {
                staged_values.push((*ordinal, value.clone()));
                if let Some(postings) = index.postings(*ordinal, value) {
                    for &reached in postings {
                        staged_records.push((reached, (*ordinal, value.clone())));
                    }
                }
            }
        }
        for (ordinal, value) in staged_values {
            collected[&ordinal].insert(value);
        }
        fifo.extend(
            staged_records
                .into_iter()
                .map(|(reached, tag)| (reached, Some(tag))),
        );
    }
}

/// Fuse a cluster into one record.
///
/// The member with the most non-empty cells becomes the base (stable order on
/// ties), every member is consumed, cell values are appended in member order
/// and deduplicated preserving first occurrence, and single-valued fields are
/// truncated to their first value.
fn fuse(kb: &mut Kb, members: IndexSet<RecordId>) -> Record {
    let mut members: Vec<RecordId> = members.into_iter().collect();
    members.sort_by_key(|&id| std::cmp::Reverse(kb.records[id].non_empty_fields()));

    let mut fused = kb.records[members[0]].clone();
    for &member in &members {
        kb.records[member].state.used = true;
        for ordinal in 0..kb.schema.field_count() {
            let values = kb.records[member].cells[ordinal].clone();
            fused.cells[ordinal].extend(values);
        }
    }
    for cell in &mut fused.cells {
        let mut seen = HashSet::new();
        cell.retain(|v| seen.insert(v.clone()));
    }
    for field in kb.schema.fields() {
        if !field.multi_valued {
            fused.cells[field.ordinal].truncate(1);
        }
    }
    fused
}

/// Fold the dedup blacklist back into every UNIQUE cross-KB relation whose
/// ordinal on the deduplicated side matches, so rebuilding that side's index
/// keeps the quarantined identifiers out.
pub fn apply_blacklist(relations: &mut [Relation], blacklist: &HashSet<IdPair>, side: KbSide) {
    let mut by_ordinal: HashMap<usize, Vec<&String>> = HashMap::new();
    for (ordinal, value) in blacklist {
        by_ordinal.entry(*ordinal).or_default().push(value);
    }
    for relation in relations.iter_mut() {
        if relation.kind != RelationKind::Unique {
            continue;
        }
        if let Some(values) = by_ordinal.get(&side.ordinal(relation)) {
            relation
                .blacklist
                .extend(values.iter().map(|v| (*v).clone()));
        }
    }
}
