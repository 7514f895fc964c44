// piiscan - core/discovery.rs
//
// Recursive directory traversal and candidate-file validation.
//
// The walk is deterministic: entries are visited depth-first in sorted
// filename order so two runs over the same tree admit files in the same
// sequence. Symbolic links are never followed.
//
// Per-file failures (permission denied, oversize, unknown format, path
// traversal) are counted in statistics and the walk continues; only a
// failure to open the root itself is fatal.

use crate::core::model::CandidateFile;
use crate::core::stats::Statistics;
use crate::extract::{FormatRegistry, TextExtractor};
use crate::util::error::{ErrorKind, Result, ScanError};
use std::path::{Path, PathBuf};

// =============================================================================
// Configuration
// =============================================================================

/// Options for one traversal.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// File-size ceiling in bytes.
    pub max_file_size: u64,

    /// Terminate cleanly once this many files have been admitted.
    pub stop_count: Option<u64>,

    /// Sniff content when the extension alone yields no extractor.
    pub use_magic_detection: bool,
}

// =============================================================================
// Traversal
// =============================================================================

/// Walk `root` and invoke `on_file` for every admitted file.
///
/// Validation order per file: (a) the canonicalised path stays under the
/// canonicalised root, (b) size is within the ceiling, (c) an extractor
/// exists, (d) the file is regular and readable. Each failure increments
/// the matching error-kind counter and skips the file.
///
/// `on_file` failures are fatal and abort the traversal (they indicate a
/// writer failure, not a per-file condition).
pub fn scan_tree<F>(
    root: &Path,
    registry: &FormatRegistry,
    options: &ScanOptions,
    stats: &Statistics,
    mut on_file: F,
) -> Result<()>
where
    F: FnMut(CandidateFile, &dyn TextExtractor) -> Result<()>,
{
    if !root.exists() {
        return Err(ScanError::RootNotFound {
            path: root.to_path_buf(),
        }
        .into());
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory {
            path: root.to_path_buf(),
        }
        .into());
    }
    let canonical_root = root.canonicalize().map_err(|e| ScanError::RootUnreadable {
        path: root.to_path_buf(),
        source: e,
    })?;

    tracing::debug!(
        root = %canonical_root.display(),
        max_file_size = options.max_file_size,
        stop_count = ?options.stop_count,
        magic = options.use_magic_detection,
        "Traversal starting"
    );

    let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();

    for entry_result in walker {
        if let Some(stop) = options.stop_count {
            if stats.analyzed_count() >= stop {
                tracing::info!(stop_count = stop, "Stop count reached, ending traversal");
                break;
            }
        }

        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                // Inaccessible entry: non-fatal, counted.
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("<unknown>"));
                tracing::debug!(path = %path.display(), error = %e, "Cannot access entry");
                stats.record_error(ErrorKind::PermissionDenied, &path);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            // Directories drive recursion; symlinks are not followed.
            continue;
        }
        let path = entry.path();
        stats.record_discovered();

        // (a) Containment: the canonical path must stay under the root.
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Cannot canonicalise");
                stats.record_error(ErrorKind::PermissionDenied, path);
                continue;
            }
        };
        if !canonical.starts_with(&canonical_root) {
            tracing::warn!(
                path = %path.display(),
                resolved = %canonical.display(),
                "Path escapes scan root, skipped"
            );
            stats.record_error(ErrorKind::PathTraversal, path);
            continue;
        }

        // (b) Size ceiling.
        let size = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Cannot read metadata");
                stats.record_error(ErrorKind::PermissionDenied, path);
                continue;
            }
        };
        if size > options.max_file_size {
            tracing::debug!(
                path = %path.display(),
                size,
                limit = options.max_file_size,
                "File exceeds size ceiling, skipped"
            );
            stats.record_error(ErrorKind::FileTooLarge, path);
            continue;
        }

        // (c) An extractor must exist for the extension or sniffed MIME.
        let extension = file_extension(path);
        let Some((extractor, mime)) =
            registry.resolve(&extension, path, options.use_magic_detection)
        else {
            tracing::debug!(path = %path.display(), extension, "No extractor, skipped");
            stats.record_error(ErrorKind::UnsupportedFormat, path);
            continue;
        };

        // (d) Regular and readable.
        if let Err(e) = std::fs::File::open(path) {
            tracing::debug!(path = %path.display(), error = %e, "Cannot open file");
            stats.record_error(ErrorKind::PermissionDenied, path);
            continue;
        }

        stats.record_analyzed(&extension);
        let candidate = CandidateFile {
            path: canonical,
            size,
            extension,
            mime,
        };
        tracing::debug!(
            path = %candidate.path.display(),
            extractor = extractor.name(),
            "File admitted"
        );
        on_file(candidate, extractor)?;
    }

    tracing::debug!("Traversal complete");
    Ok(())
}

/// Lower-cased extension with leading dot; empty string if none.
fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn options() -> ScanOptions {
        ScanOptions {
            max_file_size: 10 * 1024 * 1024,
            stop_count: None,
            use_magic_detection: false,
        }
    }

    fn collect_admitted(root: &Path, options: &ScanOptions) -> (Vec<PathBuf>, Statistics) {
        let registry = FormatRegistry::with_default_extractors();
        let stats = Statistics::new();
        let mut admitted = Vec::new();
        scan_tree(root, &registry, options, &stats, |candidate, _| {
            admitted.push(candidate.path);
            Ok(())
        })
        .unwrap();
        (admitted, stats)
    }

    #[test]
    fn test_sorted_depth_first_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::create_dir(root.join("aa")).unwrap();
        fs::write(root.join("aa/z.txt"), "z").unwrap();

        let (admitted, _) = collect_admitted(root, &options());
        let names: Vec<String> = admitted
            .iter()
            .map(|p| {
                p.strip_prefix(root.canonicalize().unwrap())
                    .unwrap()
                    .display()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.txt", "aa/z.txt", "b.txt"]);
    }

    #[test]
    fn test_unsupported_extension_counted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("prog.exe"), "MZ").unwrap();
        fs::write(dir.path().join("ok.txt"), "ok").unwrap();

        let (admitted, stats) = collect_admitted(dir.path(), &options());
        assert_eq!(admitted.len(), 1);
        assert_eq!(stats.error_count(ErrorKind::UnsupportedFormat), 1);
    }

    #[test]
    fn test_oversize_counted_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.txt"), vec![b'x'; 2_048]).unwrap();

        let opts = ScanOptions {
            max_file_size: 1_024,
            ..options()
        };
        let (admitted, stats) = collect_admitted(dir.path(), &opts);
        assert!(admitted.is_empty());
        assert_eq!(stats.error_count(ErrorKind::FileTooLarge), 1);
    }

    #[test]
    fn test_stop_count_bounds_admissions() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let opts = ScanOptions {
            stop_count: Some(2),
            ..options()
        };
        let (admitted, stats) = collect_admitted(dir.path(), &opts);
        assert_eq!(admitted.len(), 2);
        assert_eq!(stats.analyzed_count(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_not_followed() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "leak@example.com").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            dir.path().join("link.txt"),
        )
        .unwrap();

        let (admitted, _) = collect_admitted(dir.path(), &options());
        assert!(
            admitted.is_empty(),
            "symlinks are not followed, got {admitted:?}"
        );
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let registry = FormatRegistry::with_default_extractors();
        let stats = Statistics::new();
        let result = scan_tree(
            Path::new("/nonexistent/piiscan-test-root"),
            &registry,
            &options(),
            &stats,
            |_, _| Ok(()),
        );
        assert!(matches!(
            result,
            Err(crate::util::error::PiiScanError::Scan(
                ScanError::RootNotFound { .. }
            ))
        ));
    }

    #[test]
    fn test_root_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();
        let registry = FormatRegistry::with_default_extractors();
        let stats = Statistics::new();
        let result = scan_tree(&file, &registry, &options(), &stats, |_, _| Ok(()));
        assert!(matches!(
            result,
            Err(crate::util::error::PiiScanError::Scan(
                ScanError::NotADirectory { .. }
            ))
        ));
    }
}
