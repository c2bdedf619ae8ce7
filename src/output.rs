//! Declarative output rendering.
//!
//! Two token-list configs drive the merged output: one template for matched
//! KB₁ records, one (`other_output`) for unmatched KB₁ records. Unmatched
//! KB₂ records either go raw into a separate file or through the matched
//! template with the KB₁ side blank. Tokens are resolved against the schemas
//! once, up front; the per-record loop only sees ordinals.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::idgen::IdGenerator;
use crate::kb::{Kb, Record};
use crate::relation::Relation;
use crate::schema::Schema;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("cannot open output config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown field {name:?} in output config {path}")]
    UnknownField { path: PathBuf, name: String },
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// One line of an output config, as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `ID`: a freshly generated identifier.
    Id,
    /// `None`: an empty cell.
    Empty,
    /// `"..."`: the literal text, quotes stripped.
    Literal(String),
    /// A qualified field name, or a `|`-joined union of them.
    Field(String),
}

/// Parse an output config into tokens; blank lines are skipped.
pub fn parse_tokens(text: &str) -> Vec<Token> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line {
            "ID" => Token::Id,
            "None" => Token::Empty,
            _ if line.starts_with('"') => Token::Literal(line.trim_matches('"').to_string()),
            _ => Token::Field(line.to_string()),
        })
        .collect()
}

/// A token resolved to ordinals.
#[derive(Debug, Clone)]
enum Slot {
    Id,
    Empty,
    Literal(String),
    Kb1Field { ordinal: usize, multi: bool },
    Kb2Field { ordinal: usize, multi: bool },
    /// Union of KB₁ fields; only valid in the `other_output` template.
    Kb1Union(Vec<usize>),
}

/// Both templates, resolved and ready to render.
#[derive(Debug)]
pub struct OutputSpec {
    matched: Vec<Slot>,
    other: Vec<Slot>,
}

impl OutputSpec {
    /// Load and resolve both templates. Unknown fields are fatal here, not
    /// at render time.
    pub fn load(
        matched_path: &Path,
        other_path: &Path,
        kb1: &Schema,
        kb2: &Schema,
    ) -> Result<OutputSpec, OutputError> {
        let matched_text = read(matched_path)?;
        let other_text = read(other_path)?;
        Ok(OutputSpec {
            matched: resolve_matched(&parse_tokens(&matched_text), kb1, kb2, matched_path)?,
            other: resolve_other(&parse_tokens(&other_text), kb1, other_path)?,
        })
    }
}

fn read(path: &Path) -> Result<String, OutputError> {
    std::fs::read_to_string(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Matched-template fields belong to whichever KB their qualified name
/// prefixes; KB₁ is checked first.
fn resolve_matched(
    tokens: &[Token],
    kb1: &Schema,
    kb2: &Schema,
    path: &Path,
) -> Result<Vec<Slot>, OutputError> {
    tokens
        .iter()
        .map(|token| match token {
            Token::Id => Ok(Slot::Id),
            Token::Empty => Ok(Slot::Empty),
            Token::Literal(text) => Ok(Slot::Literal(text.clone())),
            Token::Field(name) if name.starts_with(kb1.kb_name()) => {
                let field = kb1.get(name).ok_or_else(|| OutputError::UnknownField {
                    path: path.to_path_buf(),
                    name: name.clone(),
                })?;
                Ok(Slot::Kb1Field {
                    ordinal: field.ordinal,
                    multi: field.multi_valued,
                })
            }
            Token::Field(name) => {
                let field = kb2.get(name).ok_or_else(|| OutputError::UnknownField {
                    path: path.to_path_buf(),
                    name: name.clone(),
                })?;
                Ok(Slot::Kb2Field {
                    ordinal: field.ordinal,
                    multi: field.multi_valued,
                })
            }
        })
        .collect()
}

/// `other_output` fields are KB₁-only and may be `|`-joined unions.
fn resolve_other(tokens: &[Token], kb1: &Schema, path: &Path) -> Result<Vec<Slot>, OutputError> {
    tokens
        .iter()
        .map(|token| match token {
            Token::Id => Ok(Slot::Id),
            Token::Empty => Ok(Slot::Empty),
            Token::Literal(text) => Ok(Slot::Literal(text.clone())),
            Token::Field(name) => {
                let ordinals = name
                    .split('|')
                    .map(|part| {
                        kb1.ordinal_of(part).ok_or_else(|| OutputError::UnknownField {
                            path: path.to_path_buf(),
                            name: part.to_string(),
                        })
                    })
                    .collect::<Result<Vec<usize>, OutputError>>()?;
                Ok(Slot::Kb1Union(ordinals))
            }
        })
        .collect()
}

/// Counts reported after rendering.
#[derive(Debug, Default)]
pub struct RenderStats {
    pub kb1_matched: usize,
    pub kb1_unmatched: usize,
    pub kb2_unmatched: usize,
}

/// Render the merged output: every KB₁ record through its template, then the
/// unmatched KB₂ remainder (raw into `second_output` when given, through the
/// matched template otherwise).
pub fn render<W: Write, W2: Write>(
    spec: &OutputSpec,
    id_prefix: &str,
    kb1: &Kb,
    kb2: &Kb,
    relations: &[Relation],
    mut output: W,
    second_output: Option<W2>,
) -> Result<RenderStats, OutputError> {
    let mut ids = IdGenerator::new(id_prefix);
    let mut stats = RenderStats::default();

    for record in &kb1.records {
        let cells = if record.state.used {
            stats.kb1_matched += 1;
            if record.state.matched.is_none() {
                // every used record carries a match pointer; only an engine
                // bug gets us here, so render the partner side empty
                tracing::error!("record marked used has no match; rendering without partner");
            }
            render_matched(&spec.matched, record, kb2, relations, &mut ids)
        } else {
            stats.kb1_unmatched += 1;
            render_other(&spec.other, record, &mut ids)
        };
        write_cells(&mut output, &cells)?;
    }

    match second_output {
        Some(mut second) => {
            for record in &kb2.records {
                if record.state.used {
                    continue;
                }
                stats.kb2_unmatched += 1;
                let cells: Vec<String> =
                    record.cells.iter().map(|cell| cell.join("|")).collect();
                writeln!(second, "{}", cells.join("\t"))?;
            }
            tracing::info!(
                count = stats.kb2_unmatched,
                "unmatched second-KB records written to the separate file"
            );
        }
        None => {
            for record in &kb2.records {
                if record.state.used {
                    continue;
                }
                stats.kb2_unmatched += 1;
                let cells = render_second_fallback(&spec.matched, record, &mut ids);
                write_cells(&mut output, &cells)?;
            }
        }
    }

    Ok(stats)
}

fn write_cells<W: Write>(output: &mut W, cells: &[String]) -> Result<(), OutputError> {
    writeln!(output, "{}", cells.join("\t"))?;
    Ok(())
}

/// One matched KB₁ record through the matched template.
fn render_matched(
    slots: &[Slot],
    record: &Record,
    kb2: &Kb,
    relations: &[Relation],
    ids: &mut IdGenerator,
) -> Vec<String> {
    let matched = record.state.matched;
    slots
        .iter()
        .map(|slot| match slot {
            Slot::Id => ids.next_id(),
            Slot::Empty => String::new(),
            Slot::Literal(text) => text.clone(),
            Slot::Kb1Field { ordinal, multi } => {
                let mut possible: Vec<String> = record.values(*ordinal).to_vec();
                if *multi || possible.is_empty() {
                    if let Some(m) = matched {
                        for relation in relations {
                            if relation.kb1_field == *ordinal {
                                possible.extend(
                                    kb2.records[m].values(relation.kb2_field).iter().cloned(),
                                );
                            }
                        }
                    }
                }
                finish_cell(possible, *multi)
            }
            Slot::Kb2Field { ordinal, multi } => {
                let mut possible: Vec<String> = match matched {
                    Some(m) => kb2.records[m].values(*ordinal).to_vec(),
                    None => Vec::new(),
                };
                if *multi || possible.is_empty() {
                    for relation in relations {
                        if relation.kb2_field == *ordinal {
                            possible.extend(record.values(relation.kb1_field).iter().cloned());
                        }
                    }
                }
                finish_cell(possible, *multi)
            }
            // union slots never resolve into the matched template
            Slot::Kb1Union(ordinals) => {
                let mut possible = Vec::new();
                for &ordinal in ordinals {
                    possible.extend(record.values(ordinal).iter().cloned());
                }
                finish_cell(possible, true)
            }
        })
        .collect()
}

/// One unmatched KB₁ record through the `other_output` template.
fn render_other(slots: &[Slot], record: &Record, ids: &mut IdGenerator) -> Vec<String> {
    slots
        .iter()
        .map(|slot| match slot {
            Slot::Id => ids.next_id(),
            Slot::Empty => String::new(),
            Slot::Literal(text) => text.clone(),
            Slot::Kb1Union(ordinals) => {
                let mut possible = Vec::new();
                for &ordinal in ordinals {
                    possible.extend(record.values(ordinal).iter().cloned());
                }
                dedup_preserving(&mut possible);
                possible.join("|")
            }
            // resolve_other only produces unions for field tokens
            Slot::Kb1Field { ordinal, .. } | Slot::Kb2Field { ordinal, .. } => {
                record.values(*ordinal).join("|")
            }
        })
        .collect()
}

/// One unmatched KB₂ record through the matched template: KB₁ positions stay
/// blank, no relation supplementing, no truncation.
fn render_second_fallback(slots: &[Slot], record: &Record, ids: &mut IdGenerator) -> Vec<String> {
    slots
        .iter()
        .map(|slot| match slot {
            Slot::Id => ids.next_id(),
            Slot::Empty => String::new(),
            Slot::Literal(text) => text.clone(),
            Slot::Kb1Field { .. } | Slot::Kb1Union(_) => String::new(),
            Slot::Kb2Field { ordinal, .. } => record.values(*ordinal).join("|"),
        })
        .collect()
}

/// Deduplicate (first occurrence wins, keeping the order stable across
/// runs), truncate single-valued cells, serialise.
fn finish_cell(mut possible: Vec<String>, multi: bool) -> String {
    dedup_preserving(&mut possible);
    if !multi && possible.len() > 1 {
        possible.truncate(1);
    }
    possible.join("|")
}

fn dedup_preserving(values: &mut Vec<String>) {
    let mut seen = HashSet::new();
    values.retain(|v| seen.insert(v.clone()));
}
