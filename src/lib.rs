//! # kbmerge - Knowledge Base merging
//!
//! Merge two tabular knowledge bases (flat records with multi-valued,
//! tab-separated fields) into one consolidated KB.
//!
//! ## Features
//!
//! - **Intra-KB deduplication**: records naming the same entity are linked
//!   transitively through shared unique identifiers, fused into one record,
//!   and contradictory identifiers are quarantined in a blacklist
//! - **Cross-KB matching**: identifier equality first, then name-based
//!   candidate scoring with auxiliary-attribute tie points and a conflict
//!   guard that keeps identifiers one-to-one across the merge
//! - **Declarative output**: token-list templates decide the merged layout,
//!   including generated `prefix:sha224` record ids
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::collections::HashSet;
//! use std::path::Path;
//!
//! use kbmerge::{deduplicate, match_kbs, parse_relations, FieldIndex, Kb, KbSide, Schema};
//!
//! # fn main() -> anyhow::Result<()> {
//! let schema1 = Schema::load(Path::new("first.tsv.fields"), "first.tsv")?;
//! let mut kb1 = Kb::load(Path::new("first.tsv"), schema1, "|")?;
//! let schema2 = Schema::load(Path::new("second.tsv.fields"), "second.tsv")?;
//! let mut kb2 = Kb::load(Path::new("second.tsv"), schema2, "|")?;
//!
//! let relations = parse_relations(Path::new("rel.conf"), &kb1.schema, &kb2.schema)?;
//!
//! let mut blacklist = HashSet::new();
//! let id_fields = vec!["WIKIPEDIA URL".to_string()];
//! deduplicate(&mut kb1, &id_fields, &mut blacklist);
//!
//! let mut index_kb1 =
//!     FieldIndex::build(&kb1.records, kb1.schema.field_count(), &relations, KbSide::Kb1);
//! let index_kb2 =
//!     FieldIndex::build(&kb2.records, kb2.schema.field_count(), &relations, KbSide::Kb2);
//! match_kbs(&mut kb1, &mut kb2, &mut index_kb1, &index_kb2, &relations, 2, || {});
//! # Ok(())
//! # }
//! ```
//!
pub mod config;
pub mod dedup;
pub mod idgen;
pub mod index;
pub mod kb;
pub mod matcher;
pub mod output;
pub mod relation;
pub mod schema;

pub use dedup::{apply_blacklist, deduplicate, DedupSummary};
pub use idgen::{generate_id, IdGenerator};
pub use index::{FieldIndex, KbSide};
pub use kb::{fix_freebase_url, Kb, KbError, Record, RecordId, RecordState};
pub use matcher::match_kbs;
pub use output::{parse_tokens, render, OutputError, OutputSpec, RenderStats, Token};
pub use relation::{parse_relations, Relation, RelationError, RelationKind};
pub use schema::{FieldDef, Schema, SchemaError};

/// Identifier fields used for deduplication when `--id_fields` is not given.
pub const DEFAULT_ID_FIELDS: &[&str] = &[
    "ID",
    "WIKIDATA URL",
    "WIKIPEDIA URL",
    "FREEBASE URL",
    "DBPEDIA URL",
    "ULAN ID",
    "GEONAMES ID",
];
