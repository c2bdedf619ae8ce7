//! CLI implementation for kbmerge

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use kbmerge::config::Config;
use kbmerge::dedup::{apply_blacklist, deduplicate};
use kbmerge::index::{FieldIndex, KbSide};
use kbmerge::kb::Kb;
use kbmerge::matcher::match_kbs;
use kbmerge::output::{render, OutputSpec};
use kbmerge::relation::{parse_relations, Relation};
use kbmerge::schema::Schema;
use kbmerge::DEFAULT_ID_FIELDS;

#[derive(Parser)]
#[command(name = "kbmerge")]
#[command(about = "Merge two tabular knowledge bases")]
#[command(version)]
pub struct Cli {
    /// First KB (also the default prefix for its fields config)
    #[arg(long)]
    pub first: PathBuf,

    /// Second KB (also the default prefix for its fields config)
    #[arg(long)]
    pub second: PathBuf,

    /// Fields list of the first KB (default "<first>.fields")
    #[arg(long = "first_fields")]
    pub first_fields: Option<PathBuf>,

    /// Fields list of the second KB (default "<second>.fields")
    #[arg(long = "second_fields")]
    pub second_fields: Option<PathBuf>,

    /// Relation config pairing fields across the KBs
    #[arg(long = "rel_conf")]
    pub rel_conf: PathBuf,

    /// Output template for matched records
    #[arg(long = "output_conf")]
    pub output_conf: PathBuf,

    /// Output template for unmatched first-KB records
    #[arg(long = "other_output_conf")]
    pub other_output_conf: PathBuf,

    /// Multi-value separator in the first KB
    #[arg(long = "first_sep", default_value = "|")]
    pub first_sep: String,

    /// Multi-value separator in the second KB
    #[arg(long = "second_sep", default_value = "|")]
    pub second_sep: String,

    /// Prefix for generated ids
    #[arg(long = "id_prefix", default_value = "")]
    pub id_prefix: String,

    /// Deduplicate the first KB before matching
    #[arg(long = "deduplicate_kb1")]
    pub deduplicate_kb1: bool,

    /// Deduplicate the second KB before matching
    #[arg(long = "deduplicate_kb2")]
    pub deduplicate_kb2: bool,

    /// Unqualified names of identifier fields used for deduplication
    #[arg(long = "id_fields", num_args = 1..)]
    pub id_fields: Option<Vec<String>>,

    /// Merged output path
    #[arg(long)]
    pub output: PathBuf,

    /// Write unmatched second-KB records here instead of the merged output
    #[arg(long = "second_output")]
    pub second_output: Option<PathBuf>,

    /// Matching threshold (historical spelling kept for script compatibility)
    #[arg(long)]
    pub treshold: i32,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Show debug info
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run_with(mut cli: Cli) -> Result<()> {
    let config = Config::load(Path::new("."));
    apply_config_defaults(&mut cli, &config);

    let id_fields: Vec<String> = cli
        .id_fields
        .clone()
        .unwrap_or_else(|| DEFAULT_ID_FIELDS.iter().map(|s| s.to_string()).collect());

    let mut kb1 = load_kb(&cli.first, cli.first_fields.as_deref(), &cli.first_sep)?;
    let mut kb2 = load_kb(&cli.second, cli.second_fields.as_deref(), &cli.second_sep)?;

    let mut relations = parse_relations(&cli.rel_conf, &kb1.schema, &kb2.schema)
        .context("parsing relation config")?;

    if cli.deduplicate_kb1 {
        dedup_kb(&mut kb1, &id_fields, &mut relations, KbSide::Kb1, cli.quiet);
    }
    if cli.deduplicate_kb2 {
        dedup_kb(&mut kb2, &id_fields, &mut relations, KbSide::Kb2, cli.quiet);
    }

    let begin = Instant::now();
    let mut index_kb1 = FieldIndex::build(
        &kb1.records,
        kb1.schema.field_count(),
        &relations,
        KbSide::Kb1,
    );
    let index_kb2 = FieldIndex::build(
        &kb2.records,
        kb2.schema.field_count(),
        &relations,
        KbSide::Kb2,
    );
    tracing::info!(elapsed = ?begin.elapsed(), "indexes built");

    let begin = Instant::now();
    let progress = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(kb1.records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {msg}")
                .unwrap_or_else(|e| {
                    tracing::warn!("Progress template error: {}, using default", e);
                    ProgressStyle::default_bar()
                }),
        );
        pb.set_message("matching");
        pb
    };
    match_kbs(
        &mut kb1,
        &mut kb2,
        &mut index_kb1,
        &index_kb2,
        &relations,
        cli.treshold,
        || progress.inc(1),
    );
    progress.finish_and_clear();
    tracing::info!(elapsed = ?begin.elapsed(), "matching complete");

    let spec = OutputSpec::load(
        &cli.output_conf,
        &cli.other_output_conf,
        &kb1.schema,
        &kb2.schema,
    )
    .context("loading output templates")?;

    let begin = Instant::now();
    let mut output = BufWriter::new(create_file(&cli.output)?);
    let mut second_output = match &cli.second_output {
        Some(path) => Some(BufWriter::new(create_file(path)?)),
        None => None,
    };
    let stats = render(
        &spec,
        &cli.id_prefix,
        &kb1,
        &kb2,
        &relations,
        &mut output,
        second_output.as_mut(),
    )?;
    output
        .flush()
        .with_context(|| format!("writing {}", cli.output.display()))?;
    if let Some(second) = &mut second_output {
        second.flush().context("writing the second output file")?;
    }
    tracing::info!(elapsed = ?begin.elapsed(), output = %cli.output.display(), "output written");

    println!("Matched entities: {}", stats.kb1_matched.to_string().green());
    println!(
        "Unmatched entities from the first KB: {}",
        stats.kb1_unmatched.to_string().yellow()
    );
    println!(
        "Unmatched entities from the second KB: {}",
        stats.kb2_unmatched.to_string().yellow()
    );
    Ok(())
}

/// Load one KB: fields config (defaulting to `<kb>.fields` next to the data
/// file) and the records themselves.
fn load_kb(kb_path: &Path, fields_path: Option<&Path>, separator: &str) -> Result<Kb> {
    let kb_name = kb_path.display().to_string();
    let default_fields;
    let fields_path = match fields_path {
        Some(p) => p,
        None => {
            default_fields = PathBuf::from(format!("{kb_name}.fields"));
            &default_fields
        }
    };

    let begin = Instant::now();
    let schema = Schema::load(fields_path, &kb_name)
        .with_context(|| format!("loading schema for {kb_name}"))?;
    let kb = Kb::load(kb_path, schema, separator)
        .with_context(|| format!("loading KB {kb_name}"))?;
    tracing::info!(
        kb = %kb_name,
        records = kb.records.len(),
        fields = kb.schema.field_count(),
        elapsed = ?begin.elapsed(),
        "KB loaded"
    );
    Ok(kb)
}

/// Deduplicate one KB and feed the grown blacklist back into the unique
/// relations of its side, so index rebuilds keep quarantined ids out.
fn dedup_kb(
    kb: &mut Kb,
    id_fields: &[String],
    relations: &mut [Relation],
    side: KbSide,
    quiet: bool,
) {
    let begin = Instant::now();
    let mut blacklist = HashSet::new();
    let summary = deduplicate(kb, id_fields, &mut blacklist);
    apply_blacklist(relations, &blacklist, side);
    tracing::info!(
        kb = kb.name(),
        removed = summary.removed,
        blacklisted = blacklist.len(),
        elapsed = ?begin.elapsed(),
        "KB deduplicated"
    );
    if !quiet {
        println!(
            "Deduplication removed {} records from {}",
            summary.removed.to_string().bold(),
            kb.name()
        );
    }
}

fn create_file(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("cannot create output file {}", path.display()))
}

/// Apply config file defaults to CLI options
/// CLI flags always override config values
fn apply_config_defaults(cli: &mut Cli, config: &Config) {
    // Only apply config where the CLI still holds its built-in default
    // (we can't detect if the user explicitly passed the default, so this is imperfect)
    if cli.first_sep == "|" {
        if let Some(sep) = &config.first_sep {
            cli.first_sep = sep.clone();
        }
    }
    if cli.second_sep == "|" {
        if let Some(sep) = &config.second_sep {
            cli.second_sep = sep.clone();
        }
    }
    if cli.id_prefix.is_empty() {
        if let Some(prefix) = &config.id_prefix {
            cli.id_prefix = prefix.clone();
        }
    }
    if cli.id_fields.is_none() {
        cli.id_fields = config.id_fields.clone();
    }
    if !cli.quiet {
        if let Some(true) = config.quiet {
            cli.quiet = true;
        }
    }
    if !cli.verbose {
        if let Some(true) = config.verbose {
            cli.verbose = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_cli() -> Cli {
        Cli::parse_from([
            "kbmerge",
            "--first",
            "a.tsv",
            "--second",
            "b.tsv",
            "--rel_conf",
            "rel.conf",
            "--output_conf",
            "out.conf",
            "--other_output_conf",
            "other.conf",
            "--output",
            "merged.tsv",
            "--treshold",
            "2",
        ])
    }

    #[test]
    fn test_config_defaults_fill_unset_flags() {
        let mut cli = minimal_cli();
        let config: Config =
            toml::from_str("first_sep = \";\"\nid_prefix = \"kb\"\nquiet = true").unwrap();
        apply_config_defaults(&mut cli, &config);
        assert_eq!(cli.first_sep, ";");
        assert_eq!(cli.id_prefix, "kb");
        assert!(cli.quiet);
        // untouched by the config
        assert_eq!(cli.second_sep, "|");
        assert!(!cli.verbose);
    }

    #[test]
    fn test_explicit_flags_win_over_config() {
        let mut cli = Cli::parse_from([
            "kbmerge",
            "--first",
            "a.tsv",
            "--second",
            "b.tsv",
            "--rel_conf",
            "rel.conf",
            "--output_conf",
            "out.conf",
            "--other_output_conf",
            "other.conf",
            "--output",
            "merged.tsv",
            "--treshold",
            "2",
            "--first_sep",
            ",",
            "--id_fields",
            "ID",
            "CUSTOM URL",
        ]);
        let config: Config =
            toml::from_str("first_sep = \";\"\nid_fields = [\"OTHER\"]").unwrap();
        apply_config_defaults(&mut cli, &config);
        assert_eq!(cli.first_sep, ",");
        assert_eq!(
            cli.id_fields,
            Some(vec!["ID".to_string(), "CUSTOM URL".to_string()])
        );
    }

    #[test]
    fn test_treshold_spelling_accepted() {
        let cli = minimal_cli();
        assert_eq!(cli.treshold, 2);
    }
}
