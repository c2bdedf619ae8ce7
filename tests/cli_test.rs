//! CLI integration tests
//!
//! End-to-end tests for the kbmerge command-line interface: fixture KBs go
//! through the full load → dedup → index → match → render pipeline and the
//! output files are checked byte for byte.

use assert_cmd::Command;
use predicates::prelude::*;

mod common;
use common::MergeFixture;

/// Get a Command for the kbmerge binary
fn kbmerge() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("kbmerge").expect("Failed to find kbmerge binary")
}

#[test]
fn test_help_output() {
    kbmerge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Merge two tabular knowledge bases"));
}

#[test]
fn test_version_output() {
    kbmerge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("kbmerge"));
}

#[test]
fn test_missing_treshold_is_usage_error() {
    let fixture = MergeFixture::new("", "");
    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--treshold"));
}

#[test]
fn test_unique_id_match_end_to_end() {
    let fixture = MergeFixture::new(
        "1\tPrague|Praha\thttp://en.wikipedia.org/wiki/Prague\t50.08\n",
        "A\tPraha\thttp://en.wikipedia.org/wiki/Prague\t50.1\n",
    );
    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .args(["--treshold", "1", "--id_prefix", "g", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Matched entities: 1"))
        .stdout(predicate::str::contains(
            "Unmatched entities from the second KB: 0",
        ));

    // multi-valued NAME merges both sides; single-valued columns keep one value
    assert_eq!(
        fixture.read("merged.tsv"),
        "g:e25388fde8\tPrague|Praha\thttp://en.wikipedia.org/wiki/Prague\tA\n"
    );
}

#[test]
fn test_name_and_other_scoring_match() {
    // two alias hits + one rounded-latitude hit = weight 3
    let fixture = MergeFixture::new(
        "1\tBerlin|Berlín\t\t52.52\n",
        "B\tBerlin|Berlín\t\t52.5\n",
    );
    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .args(["--treshold", "2", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Matched entities: 1"));
}

#[test]
fn test_threshold_rejects_and_renders_both_sides() {
    let fixture = MergeFixture::new(
        "1\tBerlin|Berlín\t\t52.52\n",
        "B\tBerlin|Berlín\t\t52.5\n",
    );
    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .args(["--treshold", "4", "--id_prefix", "g", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Matched entities: 0"));

    // unmatched KB1 record through the other template, then the unmatched
    // KB2 record through the matched template with the KB1 side blank
    assert_eq!(
        fixture.read("merged.tsv"),
        "g:e25388fde8\tBerlin|Berlín\t\t\ng:58b2aaa0bf\t\t\tB\n"
    );
}

#[test]
fn test_second_output_gets_raw_records() {
    let fixture = MergeFixture::new(
        "1\tBerlin\t\t52.52\n",
        "B\tMünchen|Munich\t\t48.1\n",
    );
    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .args(["--treshold", "1", "--second_output", "rest.tsv", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Unmatched entities from the second KB: 1",
        ));

    // raw serialisation, untouched by the templates
    assert_eq!(fixture.read("rest.tsv"), "B\tMünchen|Munich\t\t48.1\n");
    // and the merged file holds only the KB1 line
    assert_eq!(fixture.read("merged.tsv").lines().count(), 1);
}

#[test]
fn test_deduplicate_kb1_fuses_shared_url() {
    // two records linked by the same Wikipedia URL fuse before matching;
    // an empty second KB leaves the fused record in the unmatched branch
    let fixture = MergeFixture::new(
        "\tPrague\thttp://en.wikipedia.org/wiki/Prague\t50.08\n\
         \tPraha\thttp://en.wikipedia.org/wiki/Prague\t\n",
        "",
    );
    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .args(["--treshold", "1", "--id_prefix", "g", "--deduplicate_kb1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deduplication removed 1 records"))
        .stdout(predicate::str::contains(
            "Unmatched entities from the first KB: 1",
        ));

    assert_eq!(fixture.read("merged.tsv"), "g:e25388fde8\tPrague|Praha\t\t\n");
}

#[test]
fn test_freebase_urls_canonicalised_before_matching() {
    let fixture = MergeFixture::new("", "");
    fixture.write("first.tsv.fields", "ID\nFREEBASE URL\n");
    fixture.write("second.tsv.fields", "ID\nFREEBASE URL\n");
    fixture.write("first.tsv", "x\tm.123/freebase.com/type/X\n");
    fixture.write("second.tsv", "y\thttp://www.freebase.com/type/X\n");
    fixture.write(
        "rel.conf",
        "UNIQUE:\n\tfirst.tsv.FREEBASE URL=second.tsv.FREEBASE URL\n",
    );
    fixture.write("output.conf", "ID\nfirst.tsv.FREEBASE URL\nsecond.tsv.ID\n");
    fixture.write("other_output.conf", "ID\nNone\nNone\n");

    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .args(["--treshold", "1", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Matched entities: 1"));

    assert!(fixture
        .read("merged.tsv")
        .contains("http://www.freebase.com/type/X"));
}

#[test]
fn test_runs_are_byte_identical() {
    let first = "1\tBern|Berne\t\t46.9\n2\tBasel\t\t47.6\n";
    let second = "A\tBern\t\t46.9\nB\tBasel\t\t40.0\n";
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let fixture = MergeFixture::new(first, second);
        kbmerge()
            .current_dir(fixture.dir.path())
            .args(fixture.base_args())
            .args(["--treshold", "1", "--id_prefix", "g", "--quiet"])
            .assert()
            .success();
        outputs.push(fixture.read("merged.tsv"));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_config_file_supplies_id_prefix() {
    let fixture = MergeFixture::new("1\tPrague\t\t\n", "");
    fixture.write(".kbmerge.toml", "id_prefix = \"cfg\"\n");
    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .args(["--treshold", "1", "--quiet"])
        .assert()
        .success();
    assert!(fixture.read("merged.tsv").starts_with("cfg:"));
}

#[test]
fn test_missing_kb_file_fails_naming_it() {
    let fixture = MergeFixture::new("", "");
    kbmerge()
        .current_dir(fixture.dir.path())
        .args([
            "--first",
            "missing.tsv",
            "--first_fields",
            "first.tsv.fields",
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
            "--treshold",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.tsv"));
}

#[test]
fn test_column_count_mismatch_is_fatal() {
    let fixture = MergeFixture::new("only\ttwo\n", "");
    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .args(["--treshold", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("columns"))
        .stderr(predicate::str::contains("first.tsv:1"));
}

#[test]
fn test_malformed_relation_config_is_fatal() {
    let fixture = MergeFixture::new("", "");
    fixture.write("rel.conf", "UNIQUE:\nnot indented\n");
    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .args(["--treshold", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rel.conf"));
}

#[test]
fn test_custom_separator() {
    let fixture = MergeFixture::new("1\tBerlin;Berlín\t\t\n", "B\tBerlin|Berlín\t\t\n");
    kbmerge()
        .current_dir(fixture.dir.path())
        .args(fixture.base_args())
        .args(["--treshold", "2", "--first_sep", ";", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Matched entities: 1"));
}
