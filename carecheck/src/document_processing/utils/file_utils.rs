// File utilities for document processing

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::document_processing::SourceFile;

/// Expand the given paths into a list of files.
///
/// Files are kept as given; directories are walked recursively and their
/// files appended in name order. Hidden files inside directories are skipped.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            anyhow::bail!("No such file or directory: {}", path.display());
        }

        for entry in WalkDir::new(path)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }

    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Read a file from disk as an upload. No media type is declared, so the
/// extension decides the decoder.
pub fn read_source_file(path: impl AsRef<Path>) -> Result<SourceFile> {
    let path = path.as_ref();
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string());

    Ok(SourceFile::new(name, None, bytes))
}
