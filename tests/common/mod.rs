//! Common test fixtures and helpers
//!
//! Usage in test files:
//! ```ignore
//! mod common;
//! use common::MergeFixture;
//! ```

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

/// Temp directory with the standard merge fixture: two four-column KBs
/// (`first.tsv`, `second.tsv`), their fields configs, a relation config and
/// both output templates.
///
/// Columns: `ID`, `NAME` (multi-valued), `WIKIPEDIA URL`, `LATITUDE`.
/// Relations: Wikipedia URL is UNIQUE, NAME is NAME, LATITUDE is OTHER.
pub struct MergeFixture {
    /// Temp directory (kept alive to prevent cleanup)
    pub dir: TempDir,
}

const FIELDS: &str = "ID\nNAME (MULTIPLE VALUES)\nWIKIPEDIA URL\nLATITUDE\n";

const REL_CONF: &str = "UNIQUE:\n\
\tfirst.tsv.WIKIPEDIA URL=second.tsv.WIKIPEDIA URL\n\
NAME:\n\
\tfirst.tsv.NAME=second.tsv.NAME\n\
OTHER:\n\
\tfirst.tsv.LATITUDE=second.tsv.LATITUDE\n";

const OUTPUT_CONF: &str = "ID\nfirst.tsv.NAME\nfirst.tsv.WIKIPEDIA URL\nsecond.tsv.ID\n";

const OTHER_OUTPUT_CONF: &str = "ID\nfirst.tsv.NAME\nNone\nNone\n";

impl MergeFixture {
    /// Build the fixture with the given KB record lines.
    pub fn new(first_records: &str, second_records: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let fixture = MergeFixture { dir };
        fixture.write("first.tsv", first_records);
        fixture.write("second.tsv", second_records);
        fixture.write("first.tsv.fields", FIELDS);
        fixture.write("second.tsv.fields", FIELDS);
        fixture.write("rel.conf", REL_CONF);
        fixture.write("output.conf", OUTPUT_CONF);
        fixture.write("other_output.conf", OTHER_OUTPUT_CONF);
        fixture
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).expect("Failed to write fixture file");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.dir.path().join(name)).expect("Failed to read fixture file")
    }

    /// Baseline arguments for a run inside the fixture directory.
    pub fn base_args(&self) -> Vec<&'static str> {
        vec![
            "--first",
            "first.tsv",
            "--second",
            "second.tsv",
            "--rel_conf",
            "rel.conf",
            "--output_conf",
            "output.conf",
            "--other_output_conf",
            "other_output.conf",
            "--output",
            "merged.tsv",
        ]
    }
}
