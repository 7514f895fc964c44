// piiscan - tests/e2e_scan.rs
//
// End-to-end tests for the scan pipeline.
//
// These tests exercise the real filesystem, the real format registry,
// real pattern compilation, and real writers. No mocks, no stubs. Only
// the pattern engine is enabled so no network or model files are needed.

use piiscan::app::config::{self, CliOptions};
use piiscan::app::{context, scan};
use piiscan::core::model::OutputFormat;
use std::fs;
use std::path::{Path, PathBuf};

// =============================================================================
// Helpers
// =============================================================================

struct Run {
    summary: piiscan::core::stats::Summary,
    findings_path: PathBuf,
}

/// Run a regex-only scan of `root`, writing findings into `out_dir`.
fn run_scan(root: &Path, out_dir: &Path, configure: impl FnOnce(&mut CliOptions)) -> Run {
    let mut cli = CliOptions {
        root: root.to_path_buf(),
        regex: true,
        output_dir: Some(out_dir.to_path_buf()),
        quiet: true,
        ..Default::default()
    };
    configure(&mut cli);
    let format = cli.format.unwrap_or(OutputFormat::Csv);

    let config = config::build(cli).expect("config should build");
    let findings_path = out_dir.join(format!("findings.{}", format.extension()));
    let ctx = context::build(config, findings_path.clone()).expect("context should build");
    let (scan_result, summary) = scan::run(&ctx);
    scan_result.expect("scan should complete");
    Run {
        summary: summary.expect("summary should finalise"),
        findings_path,
    }
}

fn read_csv_rows(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("findings file exists")
        .lines()
        .skip(1) // header
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Scenario: email + IBAN in plain text
// =============================================================================

#[test]
fn e2e_email_and_iban_in_plain_text() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a.txt"),
        "Contact u@example.com; IBAN DE89370400440532013000.",
    )
    .unwrap();

    let run = run_scan(dir.path(), out.path(), |_| {});
    let rows = read_csv_rows(&run.findings_path);
    let file = dir.path().canonicalize().unwrap().join("a.txt");

    assert_eq!(
        rows,
        vec![
            format!("u@example.com,{},email,,regex", file.display()),
            format!("DE89370400440532013000,{},iban,,regex", file.display()),
        ]
    );
    assert_eq!(run.summary.files_analyzed, 1);
    assert_eq!(run.summary.matches, 2);
    assert_eq!(run.summary.errors_total, 0);
}

// =============================================================================
// Scenario: whitelist drop
// =============================================================================

#[test]
fn e2e_whitelist_drops_matching_surface_form() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a.txt"),
        "Contact u@example.com; IBAN DE89370400440532013000.",
    )
    .unwrap();
    let whitelist = out.path().join("whitelist.txt");
    fs::write(&whitelist, "u@example.com\n").unwrap();

    let run = run_scan(dir.path(), out.path(), |cli| {
        cli.whitelist = Some(whitelist.clone());
    });
    let rows = read_csv_rows(&run.findings_path);

    assert_eq!(rows.len(), 1, "only the IBAN survives: {rows:?}");
    assert!(rows[0].starts_with("DE89370400440532013000,"));
    assert_eq!(run.summary.matches, 1);
    assert_eq!(run.summary.whitelisted, 1);
}

/// Whitelist idempotence: adding an entry removes exactly the rows with
/// that surface text and changes no other row.
#[test]
fn e2e_whitelist_idempotence() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a.txt"),
        "one@example.com two@example.com three@example.com",
    )
    .unwrap();

    let out_full = tempfile::tempdir().unwrap();
    let full = run_scan(dir.path(), out_full.path(), |_| {});
    let full_rows = read_csv_rows(&full.findings_path);

    let out_filtered = tempfile::tempdir().unwrap();
    let whitelist = out_filtered.path().join("wl.txt");
    fs::write(&whitelist, "two@example.com\n").unwrap();
    let filtered = run_scan(dir.path(), out_filtered.path(), |cli| {
        cli.whitelist = Some(whitelist.clone());
    });
    let filtered_rows = read_csv_rows(&filtered.findings_path);

    let expected: Vec<&String> = full_rows
        .iter()
        .filter(|r| !r.starts_with("two@example.com,"))
        .collect();
    assert_eq!(filtered_rows.iter().collect::<Vec<_>>(), expected);
    assert_eq!(filtered.summary.whitelisted, 1);
}

// =============================================================================
// Scenario: Luhn filter
// =============================================================================

#[test]
fn e2e_luhn_filter_on_credit_cards() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("cards.txt"),
        "good 4111-1111-1111-1111 bad 4111-1111-1111-1112",
    )
    .unwrap();

    let run = run_scan(dir.path(), out.path(), |_| {});
    let rows = read_csv_rows(&run.findings_path);

    assert_eq!(rows.len(), 1, "only the Luhn-valid card: {rows:?}");
    assert!(rows[0].starts_with("4111-1111-1111-1111,"));
    assert!(rows[0].contains(",credit_card,"));
}

// =============================================================================
// Scenario: oversize file
// =============================================================================

#[test]
fn e2e_oversize_file_counted_not_scanned() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let big = "pad u@example.com ".repeat(120_000); // > 2 MB
    fs::write(dir.path().join("big.txt"), big).unwrap();

    let run = run_scan(dir.path(), out.path(), |cli| {
        cli.max_file_size_mb = Some(1);
    });

    assert_eq!(run.summary.matches, 0);
    assert_eq!(run.summary.files_analyzed, 0);
    assert_eq!(run.summary.errors.get("file_too_large"), Some(&1));
}

// =============================================================================
// Scenario: missing model is fatal without a fallback engine
// =============================================================================

#[test]
fn e2e_ner_without_model_and_no_other_engine_is_exit_4() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let config = config::build(CliOptions {
        root: dir.path().to_path_buf(),
        ner: true,
        output_dir: Some(out.path().to_path_buf()),
        quiet: true,
        ..Default::default()
    })
    .unwrap();

    let findings = out.path().join("findings.csv");
    let err = context::build(config, findings.clone()).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(!findings.exists(), "no findings file on engine-setup abort");
}

// =============================================================================
// Stop count
// =============================================================================

#[test]
fn e2e_stop_count_bounds_files_and_findings() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    for i in 0..5 {
        fs::write(
            dir.path().join(format!("f{i}.txt")),
            format!("mail{i}@example.com"),
        )
        .unwrap();
    }

    let run = run_scan(dir.path(), out.path(), |cli| {
        cli.stop_count = Some(2);
    });
    let rows = read_csv_rows(&run.findings_path);

    assert_eq!(run.summary.files_analyzed, 2);
    let extension_total: u64 = run.summary.extensions.values().sum();
    assert_eq!(extension_total, 2, "at most N files in the histogram");

    let mut files: Vec<&str> = rows.iter().map(|r| r.split(',').nth(1).unwrap()).collect();
    files.dedup();
    assert!(files.len() <= 2, "at most N distinct file paths in findings");
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn e2e_single_threaded_runs_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("b.txt"), "b@example.com and 10.0.0.1").unwrap();
    fs::write(dir.path().join("a.txt"), "a@example.com").unwrap();
    fs::write(dir.path().join("sub/c.csv"), "c@example.com,x\n").unwrap();

    let out1 = tempfile::tempdir().unwrap();
    let out2 = tempfile::tempdir().unwrap();
    let first = run_scan(dir.path(), out1.path(), |_| {});
    let second = run_scan(dir.path(), out2.path(), |_| {});

    assert_eq!(
        fs::read(&first.findings_path).unwrap(),
        fs::read(&second.findings_path).unwrap(),
        "same inputs, same single-worker config, byte-identical CSV"
    );
}

// =============================================================================
// Traversal containment
// =============================================================================

#[cfg(unix)]
#[test]
fn e2e_no_finding_resolves_outside_root() {
    let outside = tempfile::tempdir().unwrap();
    fs::write(outside.path().join("secret.txt"), "leak@example.com").unwrap();

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("inside.txt"), "ok@example.com").unwrap();
    std::os::unix::fs::symlink(
        outside.path().join("secret.txt"),
        dir.path().join("link.txt"),
    )
    .unwrap();

    let out = tempfile::tempdir().unwrap();
    let run = run_scan(dir.path(), out.path(), |_| {});
    let rows = read_csv_rows(&run.findings_path);
    let root = dir.path().canonicalize().unwrap();

    assert!(!rows.is_empty());
    for row in &rows {
        let file = row.split(',').nth(1).unwrap();
        assert!(
            Path::new(file).starts_with(&root),
            "finding path '{file}' must stay under the root"
        );
    }
    assert!(
        !rows.iter().any(|r| r.contains("leak@example.com")),
        "content behind the symlink must not be scanned"
    );
}

// =============================================================================
// Counting identity
// =============================================================================

#[test]
fn e2e_counting_identity() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    // Duplicate surface forms in one file plus a whitelisted one.
    fs::write(
        dir.path().join("a.txt"),
        "dup@example.com again dup@example.com and skip@example.com",
    )
    .unwrap();
    let whitelist = out.path().join("wl.txt");
    fs::write(&whitelist, "skip@example.com\n").unwrap();

    let run = run_scan(dir.path(), out.path(), |cli| {
        cli.whitelist = Some(whitelist.clone());
    });
    let s = &run.summary;

    assert_eq!(
        s.findings_detected,
        s.matches + s.whitelisted + s.deduplicated,
        "findings_admitted == written + whitelisted + deduplicated"
    );
    assert_eq!(s.matches, 1);
    assert_eq!(s.whitelisted, 1);
    assert_eq!(s.deduplicated, 1);
}

// =============================================================================
// Writer finalisation
// =============================================================================

#[test]
fn e2e_json_document_is_valid_after_termination() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "j@example.com").unwrap();

    let run = run_scan(dir.path(), out.path(), |cli| {
        cli.format = Some(OutputFormat::Json);
    });

    let document: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&run.findings_path).unwrap())
            .expect("output must parse as its declared format");
    assert_eq!(document["findings"][0]["match"], "j@example.com");
    assert_eq!(document["statistics"]["matches"], 1);
    assert_eq!(document["metadata"]["application"], "piiscan");
}

#[test]
fn e2e_xlsx_document_is_valid_after_termination() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "x@example.com").unwrap();

    let run = run_scan(dir.path(), out.path(), |cli| {
        cli.format = Some(OutputFormat::Xlsx);
    });

    let file = fs::File::open(&run.findings_path).unwrap();
    let mut archive = zip::ZipArchive::new(file).expect("output must be a valid ZIP container");
    let mut sheet = String::new();
    std::io::Read::read_to_string(
        &mut archive.by_name("xl/worksheets/sheet1.xml").unwrap(),
        &mut sheet,
    )
    .unwrap();
    assert!(sheet.contains("x@example.com"));
}

// =============================================================================
// Mixed formats through the registry
// =============================================================================

#[test]
fn e2e_formats_resolve_through_registry() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("t.txt"), "t@example.com").unwrap();
    fs::write(dir.path().join("d.csv"), "name,mail\nAnna,c@example.com\n").unwrap();
    fs::write(dir.path().join("j.json"), r#"{"mail": "js@example.com"}"#).unwrap();
    fs::write(
        dir.path().join("h.html"),
        "<p>h@example.com</p><script>no@example.com</script>",
    )
    .unwrap();

    let run = run_scan(dir.path(), out.path(), |_| {});
    let rows = read_csv_rows(&run.findings_path);
    let matches: Vec<&str> = rows.iter().map(|r| r.split(',').next().unwrap()).collect();

    assert!(matches.contains(&"t@example.com"));
    assert!(matches.contains(&"c@example.com"));
    assert!(matches.contains(&"js@example.com"));
    assert!(matches.contains(&"h@example.com"));
    assert!(
        !matches.contains(&"no@example.com"),
        "script content is not visible text"
    );
    assert_eq!(run.summary.files_analyzed, 4);
}

// =============================================================================
// Magic detection
// =============================================================================

#[test]
fn e2e_magic_detection_admits_extensionless_text() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("NOTES"), "m@example.com in a bare file").unwrap();

    let without = run_scan(dir.path(), out.path(), |_| {});
    assert_eq!(without.summary.matches, 0, "no extension, no extractor");
    assert_eq!(
        without.summary.errors.get("unsupported_format"),
        Some(&1)
    );

    let out2 = tempfile::tempdir().unwrap();
    let with = run_scan(dir.path(), out2.path(), |cli| {
        cli.use_magic_detection = true;
    });
    assert_eq!(with.summary.matches, 1, "text/* sentinel admits the file");
}
