//! Host file system access for documents submitted without inline content.

use crate::error::{StoreError, StoreResult};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Read a document's text.
///
/// `relative_path` is joined onto `base` when one is given; absolute paths are
/// read as they are. Failures are document-level errors.
pub fn read_document(base: Option<&Path>, relative_path: &Path) -> StoreResult<String> {
    let path = match base {
        Some(base) if relative_path.is_relative() => base.join(relative_path),
        _ => relative_path.to_path_buf(),
    };
    std::fs::read_to_string(&path).map_err(|source| StoreError::FileRead { path, source })
}

/// Collect documents under `root` whose extension is in `extensions`.
///
/// Directories named in `skip_dirs` are never entered. Returned paths are
/// relative to `root`, sorted, and use `/` separators so they are stable
/// document identifiers across platforms.
pub fn scan_workspace(
    root: &Path,
    extensions: &[String],
    skip_dirs: &[String],
) -> StoreResult<Vec<String>> {
    let mut documents = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !skip_dirs
                    .iter()
                    .any(|skip| entry.file_name().to_str() == Some(skip.as_str()))
        });

    for entry in walker {
        let entry = entry.map_err(|e| StoreError::FileRead {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("file system loop")),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches_extension = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)));
        if !matches_extension {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            documents.push(to_document_path(relative));
        }
    }

    documents.sort();
    tracing::debug!("found {} documents under {}", documents.len(), root.display());
    Ok(documents)
}

/// Relative path rendered with `/` separators.
pub fn to_document_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a user-supplied path to one relative to `root` when it lies inside it.
pub fn relative_to_root(root: &Path, path: &Path) -> PathBuf {
    let absolute = if path.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    };
    match absolute.strip_prefix(root) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}
