//! Cross-KB matching: at most one KB₂ partner per KB₁ record.
//!
//! Phase A pairs on unique-identifier equality; phase B scores name-based
//! candidates. Both phases run a conflict guard that simulates the fusion of
//! the pair and rejects it when the result would collide with identifiers
//! already attributed across KB₁. Accepted pairings are written back into
//! KB₁'s index so later guards see them.

use std::collections::BTreeSet;

use indexmap::IndexSet;

use crate::index::FieldIndex;
use crate::kb::{Kb, Record, RecordId};
use crate::relation::{Relation, RelationKind};

/// Candidate score assigned when the pair's first unique identifiers
/// disagree; low enough that no accumulation of hits recovers it.
const UNIQUE_DISAGREEMENT: i32 = -1000;
/// Candidate score assigned when the conflict guard rejects the pair.
const UNIQUE_CONFLICT: i32 = -999;

/// Run both matching phases over every KB₁ record in file order.
///
/// `on_record` is called once per KB₁ record, before it is processed; the
/// caller uses it to drive progress reporting.
pub fn match_kbs(
    kb1: &mut Kb,
    kb2: &mut Kb,
    index_kb1: &mut FieldIndex,
    index_kb2: &FieldIndex,
    relations: &[Relation],
    threshold: i32,
    mut on_record: impl FnMut(),
) {
    // partitioned once; the per-record loops only ever see their own kind
    let unique: Vec<&Relation> = by_kind(relations, RelationKind::Unique);
    let name: Vec<&Relation> = by_kind(relations, RelationKind::Name);
    let other: Vec<&Relation> = by_kind(relations, RelationKind::Other);

    for e1 in 0..kb1.records.len() {
        on_record();

        // Phase A: unique-identifier equality
        if let Some(m) = match_by_unique(&kb1.records[e1], &kb2.records, index_kb2, &unique) {
            if check_unique(e1, &kb2.records[m], index_kb1, &unique) {
                kb1.records[e1].state.matched = Some(m);
                kb1.records[e1].state.used = true;
                kb2.records[m].state.used = true;
                update_unique_in_index(e1, &kb1.records, &kb2.records, index_kb1, &unique);
            } else {
                let (kb1_ids, kb2_ids) =
                    conflict_id_sets(e1, &kb1.records, &kb2.records[m], index_kb1, &unique);
                tracing::warn!(
                    ?kb1_ids,
                    ?kb2_ids,
                    "unique match rejected: fusing would duplicate identifiers across the first KB"
                );
            }
            continue;
        }

        // Phase B: name-based candidate scoring
        let candidates = match_by_name(&kb1.records[e1], &mut kb2.records, index_kb2, &name);
        if candidates.is_empty() {
            continue;
        }

        for &c in &candidates {
            for relation in &unique {
                let first = kb1.records[e1].values(relation.kb1_field);
                let second = kb2.records[c].values(relation.kb2_field);
                if !first.is_empty() && !second.is_empty() && first[0] != second[0] {
                    kb2.records[c].state.weight = UNIQUE_DISAGREEMENT;
                    break;
                }
            }
            if !check_unique(e1, &kb2.records[c], index_kb1, &unique) {
                kb2.records[c].state.weight = UNIQUE_CONFLICT;
            }
            // name hits were already counted during candidate collection
            if kb2.records[c].state.weight < threshold {
                continue;
            }
            for relation in &other {
                let mut hits = 0;
                for i in kb1.records[e1].values(relation.kb1_field) {
                    for j in kb2.records[c].values(relation.kb2_field) {
                        if other_values_equal(i, j) {
                            hits += 1;
                        }
                    }
                }
                kb2.records[c].state.weight += hits;
            }
        }

        // first candidate wins ties
        let mut best = candidates[0];
        for &c in &candidates {
            if kb2.records[c].state.weight > kb2.records[best].state.weight {
                best = c;
            }
        }
        if kb2.records[best].state.weight >= threshold {
            kb1.records[e1].state.matched = Some(best);
            kb1.records[e1].state.used = true;
            kb2.records[best].state.used = true;
        }

        for &c in &candidates {
            kb2.records[c].state.weight = 0;
        }
        update_unique_in_index(e1, &kb1.records, &kb2.records, index_kb1, &unique);
    }
}

fn by_kind(relations: &[Relation], kind: RelationKind) -> Vec<&Relation> {
    relations.iter().filter(|r| r.kind == kind).collect()
}

/// First non-consumed KB₂ record sharing a unique identifier with `e1`.
fn match_by_unique(
    e1: &Record,
    kb2_records: &[Record],
    index_kb2: &FieldIndex,
    unique: &[&Relation],
) -> Option<RecordId> {
    for relation in unique {
        for value in e1.values(relation.kb1_field) {
            let Some(postings) = index_kb2.postings(relation.kb2_field, value) else {
                continue;
            };
            for &m in postings {
                if !kb2_records[m].state.used {
                    return Some(m);
                }
            }
        }
    }
    None
}

/// Collect non-consumed KB₂ records sharing a name value with `e1`,
/// incrementing each candidate's weight once per hit. Insertion order of the
/// returned list is the tie-break order.
fn match_by_name(
    e1: &Record,
    kb2_records: &mut [Record],
    index_kb2: &FieldIndex,
    name: &[&Relation],
) -> Vec<RecordId> {
    let mut candidates: IndexSet<RecordId> = IndexSet::new();
    for relation in name {
        for value in e1.values(relation.kb1_field) {
            let Some(postings) = index_kb2.postings(relation.kb2_field, value) else {
                continue;
            };
            for &c in postings {
                if !kb2_records[c].state.used {
                    kb2_records[c].state.weight += 1;
                    candidates.insert(c);
                }
            }
        }
    }
    candidates.into_iter().collect()
}

/// Would fusing `e1` with `m` keep every unique identifier attributed to at
/// most one KB₁ record? Each of `m`'s identifiers must resolve in KB₁'s
/// index to nothing or to `e1` alone.
fn check_unique(
    e1: RecordId,
    m: &Record,
    index_kb1: &FieldIndex,
    unique: &[&Relation],
) -> bool {
    for relation in unique {
        for value in m.values(relation.kb2_field) {
            if let Some(found) = index_kb1.postings(relation.kb1_field, value) {
                if found.len() > 1 || (found.len() == 1 && !found.contains(&e1)) {
                    return false;
                }
            }
        }
    }
    true
}

/// Identifier sets for the conflict diagnostic: everything `e1` and the
/// colliding KB₁ records carry on the unique fields, and everything `m`
/// carries. Sorted for a stable log line.
fn conflict_id_sets(
    e1: RecordId,
    kb1_records: &[Record],
    m: &Record,
    index_kb1: &FieldIndex,
    unique: &[&Relation],
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut kb1_ids = BTreeSet::new();
    let mut kb2_ids = BTreeSet::new();
    for relation in unique {
        kb1_ids.extend(kb1_records[e1].values(relation.kb1_field).iter().cloned());
        let values = m.values(relation.kb2_field);
        kb2_ids.extend(values.iter().cloned());
        for value in values {
            let Some(found) = index_kb1.postings(relation.kb1_field, value) else {
                continue;
            };
            if found.len() > 1 || (found.len() == 1 && !found.contains(&e1)) {
                for &collider in found {
                    for r in unique {
                        kb1_ids.extend(kb1_records[collider].values(r.kb1_field).iter().cloned());
                    }
                }
            }
        }
    }
    (kb1_ids, kb2_ids)
}

/// After a pairing, insert `e1` into KB₁'s index under every unique
/// identifier its partner carries (minus blacklisted values) so later
/// conflict guards account for the accumulated pair.
fn update_unique_in_index(
    e1: RecordId,
    kb1_records: &[Record],
    kb2_records: &[Record],
    index_kb1: &mut FieldIndex,
    unique: &[&Relation],
) {
    let Some(m) = kb1_records[e1].state.matched else {
        return;
    };
    for relation in unique {
        for value in kb2_records[m].values(relation.kb2_field) {
            if relation.blacklist.contains(value) {
                continue;
            }
            index_kb1.insert(relation.kb1_field, value, e1);
        }
    }
}

/// OTHER-relation value equality: two parseable numbers compare rounded to
/// one decimal, two non-numbers compare as strings, a mixed pair is never
/// equal.
fn other_values_equal(a: &str, b: &str) -> bool {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => round_tenth(x) == round_tenth(y),
        (Err(_), Err(_)) => a == b,
        _ => false,
    }
}

fn round_tenth(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
