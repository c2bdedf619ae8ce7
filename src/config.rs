//! Configuration file support for kbmerge
//!
//! Config files are loaded in order (later overrides earlier):
//! 1. `~/.config/kbmerge/config.toml` (user defaults)
//! 2. `.kbmerge.toml` in the working directory (project overrides)
//!
//! CLI flags override all config file values.

use serde::Deserialize;
use std::path::Path;

/// Configuration options loaded from config files
///
/// # Example
///
/// ```toml
/// # ~/.config/kbmerge/config.toml or .kbmerge.toml
/// first_sep = "|"       # Multi-value separator of the first KB
/// second_sep = ";"      # Multi-value separator of the second KB
/// id_prefix = "kb"      # Prefix for generated ids
/// id_fields = ["ID", "WIKIDATA URL"]
/// quiet = false         # Suppress progress output
/// verbose = false       # Enable verbose logging
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default first-KB separator (overridden by --first_sep)
    pub first_sep: Option<String>,
    /// Default second-KB separator (overridden by --second_sep)
    pub second_sep: Option<String>,
    /// Default id prefix (overridden by --id_prefix)
    pub id_prefix: Option<String>,
    /// Default identifier fields for dedup (overridden by --id_fields)
    pub id_fields: Option<Vec<String>>,
    /// Enable quiet mode by default
    pub quiet: Option<bool>,
    /// Enable verbose mode by default
    pub verbose: Option<bool>,
}

impl Config {
    /// Load configuration from user and project config files
    pub fn load(working_dir: &Path) -> Self {
        let user_config = dirs::config_dir()
            .map(|d| d.join("kbmerge/config.toml"))
            .and_then(|p| Self::load_file(&p))
            .unwrap_or_default();

        let project_config =
            Self::load_file(&working_dir.join(".kbmerge.toml")).unwrap_or_default();

        // Project overrides user
        let merged = user_config.override_with(project_config);
        tracing::debug!(
            first_sep = ?merged.first_sep,
            second_sep = ?merged.second_sep,
            id_prefix = ?merged.id_prefix,
            id_fields = ?merged.id_fields,
            quiet = ?merged.quiet,
            verbose = ?merged.verbose,
            "Effective config after merge"
        );
        merged
    }

    /// Load configuration from a specific file
    fn load_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                return None;
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to parse config {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge: values present in `other` win
    fn override_with(self, other: Config) -> Config {
        Config {
            first_sep: other.first_sep.or(self.first_sep),
            second_sep: other.second_sep.or(self.second_sep),
            id_prefix: other.id_prefix.or(self.id_prefix),
            id_fields: other.id_fields.or(self.id_fields),
            quiet: other.quiet.or(self.quiet),
            verbose: other.verbose.or(self.verbose),
        }
    }
}
