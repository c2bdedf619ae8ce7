//! In-memory KB: parsed records plus per-record match state.
//!
//! A record's parsed cells are immutable after load; everything dedup and
//! matching mutate (`used`, `matched`, `weight`) lives in [`RecordState`] so
//! the two never alias.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::schema::Schema;

/// Index into a KB's record vector. Records are addressed by id so indexes
/// and match pointers survive being stored outside the vector; dedup
/// replaces the vector wholesale and ids are reassigned with it.
pub type RecordId = usize;

#[derive(Error, Debug)]
pub enum KbError {
    #[error("cannot open KB file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "record at {path}:{line} has {got} columns, schema expects {expected}; cells: {cells:?}"
    )]
    ColumnCount {
        path: PathBuf,
        line: usize,
        expected: usize,
        got: usize,
        cells: Vec<String>,
    },
}

/// Mutable per-record state written during dedup and matching.
#[derive(Debug, Clone, Default)]
pub struct RecordState {
    /// Partner record in the other KB, if matched.
    pub matched: Option<RecordId>,
    /// Consumed by a match or a dedup cluster; never a candidate again.
    pub used: bool,
    /// Candidate score, transient to one matching iteration.
    pub weight: i32,
}

/// One KB line: a fixed-width array of value sets.
///
/// Each cell holds non-empty trimmed strings, deduplicated preserving first
/// occurrence. Insertion order is the stable iteration order everything
/// downstream (indexing, candidate collection, output) relies on.
#[derive(Debug, Clone)]
pub struct Record {
    pub cells: Vec<Vec<String>>,
    pub state: RecordState,
}

impl Record {
    /// Split a raw line into cells on tab, then each cell into values on the
    /// KB's separator. A column count differing from the schema is fatal.
    pub fn parse(line: &str, separator: &str, field_count: usize) -> Result<Record, ArityMismatch> {
        let raw_cells: Vec<&str> = line.split('\t').collect();
        if raw_cells.len() != field_count {
            return Err(ArityMismatch {
                got: raw_cells.len(),
                cells: raw_cells.into_iter().map(str::to_string).collect(),
            });
        }
        let cells = raw_cells
            .into_iter()
            .map(|cell| {
                let mut values: Vec<String> = Vec::new();
                for part in cell.split(separator) {
                    let part = part.trim();
                    if part.is_empty() {
                        continue;
                    }
                    if !values.iter().any(|v| v == part) {
                        values.push(part.to_string());
                    }
                }
                values
            })
            .collect();
        Ok(Record {
            cells,
            state: RecordState::default(),
        })
    }

    pub fn values(&self, ordinal: usize) -> &[String] {
        &self.cells[ordinal]
    }

    /// Number of cells holding at least one value. Orders fusion bases.
    pub fn non_empty_fields(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }
}

/// Arity-mismatch detail from [`Record::parse`]; the caller turns it into a
/// [`KbError::ColumnCount`] with file context.
#[derive(Debug)]
pub struct ArityMismatch {
    pub got: usize,
    pub cells: Vec<String>,
}

/// A loaded KB: schema plus records in file order.
#[derive(Debug)]
pub struct Kb {
    pub schema: Schema,
    pub records: Vec<Record>,
}

impl Kb {
    /// Load records from `path` against `schema`, applying the Freebase URL
    /// canonicalisation when the schema carries a `FREEBASE URL` field.
    pub fn load(path: &Path, schema: Schema, separator: &str) -> Result<Kb, KbError> {
        let text = std::fs::read_to_string(path).map_err(|source| KbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let freebase_ordinal = schema.ordinal_of(&format!("{}.FREEBASE URL", schema.kb_name()));
        let field_count = schema.field_count();

        let mut records = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let mut record =
                Record::parse(line, separator, field_count).map_err(|parsed| {
                    KbError::ColumnCount {
                        path: path.to_path_buf(),
                        line: line_no + 1,
                        expected: field_count,
                        got: parsed.got,
                        cells: parsed.cells,
                    }
                })?;
            if let Some(ordinal) = freebase_ordinal {
                for value in &mut record.cells[ordinal] {
                    *value = fix_freebase_url(value);
                }
            }
            records.push(record);
        }
        tracing::debug!(
            kb = schema.kb_name(),
            records = records.len(),
            "KB loaded"
        );
        Ok(Kb { schema, records })
    }

    pub fn name(&self) -> &str {
        self.schema.kb_name()
    }
}

/// Canonicalise a Freebase URL to the `http://www.freebase.com/...` form.
///
/// The guard is a substring test, not a prefix test: a value that contains
/// `http://www.freebase.com/` anywhere is left alone, while any other
/// occurrence of `freebase.com/` is rewritten from that point on. This
/// mirrors long-standing KB data expectations; do not tighten it.
pub fn fix_freebase_url(url: &str) -> String {
    if let Some(pos) = url.find("freebase.com/") {
        if !url.contains("http://www.freebase.com/") {
            return format!("http://www.{}", &url[pos..]);
        }
    }
    url.to_string()
}
