//! File scanning and change aggregation.
//!
//! The scanner walks each configured root in deterministic lexicographic
//! order and yields regular text files matching the configured extensions.
//! The aggregator runs the rewriting engine over every candidate, writes
//! changed content back immediately, and folds the per-file verdicts into a
//! single "any change occurred" answer.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::rewrite::{self, CompiledRules};

/// Directories never scanned, at any depth.
const ALWAYS_SKIP_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    "target",
    ".git",
    ".svn",
    ".hg",
];

/// Walk one root, collecting candidate files in lexicographic order.
///
/// Symlinks are not followed (loop safety) and unreadable directories are
/// skipped rather than aborting the scan.
pub fn scan_root(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if root.is_file() {
        if matches_extension(root, extensions) {
            files.push(root.to_path_buf());
        }
        return files;
    }
    walk(root, extensions, &mut files);
    files
}

fn walk(dir: &Path, extensions: &[String], files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            let name = entry.file_name().to_string_lossy().to_string();
            if ALWAYS_SKIP_DIRS.contains(&name.as_str()) {
                continue;
            }
            walk(&path, extensions, files);
        } else if matches_extension(&path, extensions) {
            files.push(path);
        }
    }
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed == ext))
}

/// The outcome of applying the rule set across every configured root.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub files_scanned: usize,
    /// Root-relative paths of files whose content changed, in scan order.
    pub changed_files: Vec<String>,
    pub warnings: Vec<String>,
}

impl UpdateReport {
    pub fn has_changes(&self) -> bool {
        !self.changed_files.is_empty()
    }
}

/// Run the engine over every candidate file under every configured root.
///
/// When `write` is set, changed content is written back immediately; a
/// write failure aborts the run before any publish step. Missing roots are
/// warnings, not failures.
pub fn apply_rules(
    config: &RunConfig,
    rules: &CompiledRules,
    repo_dir: &Path,
    write: bool,
) -> Result<UpdateReport> {
    let mut report = UpdateReport {
        files_scanned: 0,
        changed_files: Vec::new(),
        warnings: Vec::new(),
    };

    for root in &config.paths {
        let root_path = repo_dir.join(root);
        if !root_path.exists() {
            let warning = format!("Path not found: {}", root);
            crate::log_status!("scan", "{}", warning);
            report.warnings.push(warning);
            continue;
        }

        for file in scan_root(&root_path, &config.extensions) {
            let rel_path = file
                .strip_prefix(repo_dir)
                .unwrap_or(&file)
                .to_string_lossy()
                .to_string();

            if !rules.applies_to(&rel_path) {
                continue;
            }

            // Binary or otherwise unreadable files are excluded, not fatal.
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            report.files_scanned += 1;

            let (rewritten, changed) = rewrite::rewrite(&content, rules, &rel_path);
            if !changed {
                continue;
            }

            if write {
                std::fs::write(&file, &rewritten).map_err(|e| {
                    Error::internal_io(e.to_string(), Some(format!("write {}", rel_path)))
                })?;
            }
            report.changed_files.push(rel_path);
        }
    }

    Ok(report)
}
