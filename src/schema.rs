//! Per-KB field schemas loaded from line-oriented `.fields` configs.
//!
//! Each non-blank line names one column; the ` (MULTIPLE VALUES)` suffix
//! marks it multi-valued. Fields are addressed by ordinal everywhere after
//! load; qualified names (`<kb_name>.<field_name>`) only matter while
//! resolving relation and output configs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

const MULTI_SUFFIX: &str = " (MULTIPLE VALUES)";

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("cannot open fields config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One column of a KB.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Qualified name: `<kb_name>.<field_name>`.
    pub name: String,
    /// 0-based column position; the canonical handle for the field.
    pub ordinal: usize,
    pub multi_valued: bool,
}

/// Ordered field descriptors for one KB, with qualified-name lookup.
#[derive(Debug, Clone)]
pub struct Schema {
    kb_name: String,
    fields: Vec<FieldDef>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// Read a fields config from disk. `kb_name` is the KB path exactly as
    /// given on the command line; it becomes the qualified-name prefix.
    pub fn load(path: &Path, kb_name: &str) -> Result<Schema, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Schema::parse(kb_name, &text))
    }

    /// Parse fields config text. Blank lines are skipped; ordinals count
    /// non-blank lines only.
    pub fn parse(kb_name: &str, text: &str) -> Schema {
        let mut fields = Vec::new();
        let mut by_name = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let ordinal = fields.len();
            let (field_name, multi_valued) = match line.strip_suffix(MULTI_SUFFIX) {
                Some(stripped) => (stripped, true),
                None => (line, false),
            };
            let name = format!("{kb_name}.{field_name}");
            by_name.insert(name.clone(), ordinal);
            fields.push(FieldDef {
                name,
                ordinal,
                multi_valued,
            });
        }
        Schema {
            kb_name: kb_name.to_string(),
            fields,
            by_name,
        }
    }

    pub fn kb_name(&self) -> &str {
        &self.kb_name
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Look up a field by qualified name.
    pub fn get(&self, qualified: &str) -> Option<&FieldDef> {
        self.by_name.get(qualified).map(|&ord| &self.fields[ord])
    }

    pub fn ordinal_of(&self, qualified: &str) -> Option<usize> {
        self.by_name.get(qualified).copied()
    }

    pub fn contains(&self, qualified: &str) -> bool {
        self.by_name.contains_key(qualified)
    }

    /// Fields in ordinal order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter()
    }

    pub fn is_multi_valued(&self, ordinal: usize) -> bool {
        self.fields[ordinal].multi_valued
    }
}
