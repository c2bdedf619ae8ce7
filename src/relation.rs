//! Cross-KB field pairings parsed from the relation config.
//!
//! The config is three section headers (`UNIQUE:`, `NAME:`, `OTHER:`) each
//! followed by tab-indented `lhs=rhs` pairs of qualified field names. Pairs
//! written KB₂-first are swapped so `kb1_field` always belongs to the first
//! KB.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::schema::Schema;

#[derive(Error, Debug)]
pub enum RelationError {
    #[error("cannot open relation config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid relation config {path}:{line}: {text:?}")]
    Malformed {
        path: PathBuf,
        line: usize,
        text: String,
    },
    #[error("unknown field {name:?} in relation config {path}")]
    UnknownField { path: PathBuf, name: String },
}

/// How a pairing contributes to matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Identifier equality implies entity identity (subject to blacklist).
    Unique,
    /// Surface-form equality contributes one point of candidate score.
    Name,
    /// Auxiliary attribute; scored only for candidates above threshold.
    Other,
}

/// One field pairing between the KBs.
#[derive(Debug, Clone)]
pub struct Relation {
    pub kb1_field: usize,
    pub kb2_field: usize,
    pub kind: RelationKind,
    /// Values observed to alias across distinct entities; ignored by
    /// indexing and matching through this relation. Grows during dedup.
    pub blacklist: HashSet<String>,
}

impl Relation {
    pub fn new(kb1_field: usize, kb2_field: usize, kind: RelationKind) -> Relation {
        Relation {
            kb1_field,
            kb2_field,
            kind,
            blacklist: HashSet::new(),
        }
    }
}

/// Read and parse the relation config from disk.
pub fn parse_relations(
    path: &Path,
    kb1: &Schema,
    kb2: &Schema,
) -> Result<Vec<Relation>, RelationError> {
    let text = std::fs::read_to_string(path).map_err(|source| RelationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_relations_str(&text, kb1, kb2, path)
}

fn parse_relations_str(
    text: &str,
    kb1: &Schema,
    kb2: &Schema,
    path: &Path,
) -> Result<Vec<Relation>, RelationError> {
    let mut relations = Vec::new();
    let mut kind: Option<RelationKind> = None;
    for (line_no, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        } else if line.starts_with("UNIQUE:") {
            kind = Some(RelationKind::Unique);
        } else if line.starts_with("NAME:") {
            kind = Some(RelationKind::Name);
        } else if line.starts_with("OTHER:") {
            kind = Some(RelationKind::Other);
        } else if let Some(pair) = line.strip_prefix('\t') {
            let pair = pair.trim();
            let (Some(kind), Some((mut first, mut second))) = (kind, pair.split_once('='))
            else {
                return Err(RelationError::Malformed {
                    path: path.to_path_buf(),
                    line: line_no + 1,
                    text: line.to_string(),
                });
            };
            if first.starts_with(kb2.kb_name()) {
                std::mem::swap(&mut first, &mut second);
            }
            let kb1_field =
                kb1.ordinal_of(first)
                    .ok_or_else(|| RelationError::UnknownField {
                        path: path.to_path_buf(),
                        name: first.to_string(),
                    })?;
            let kb2_field =
                kb2.ordinal_of(second)
                    .ok_or_else(|| RelationError::UnknownField {
                        path: path.to_path_buf(),
                        name: second.to_string(),
                    })?;
            relations.push(Relation::new(kb1_field, kb2_field, kind));
        } else {
            return Err(RelationError::Malformed {
                path: path.to_path_buf(),
                line: line_no + 1,
                text: line.to_string(),
            });
        }
    }
    Ok(relations)
}
