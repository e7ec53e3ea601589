//! Output destinations.
//!
//! Commands never touch the source dataset. They write a fresh copy into a
//! directory that must be new or empty, or a single file that must not exist
//! yet. The checks here run before any work is done.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{CorpusError, CorpusResult};

/// A document rewritten line by line, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenDocument {
    pub file_name: String,
    pub lines: Vec<String>,
}

impl RewrittenDocument {
    /// File content; every line, the last one included, ends with `\n`.
    pub fn content(&self) -> String {
        let mut content = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            content.push_str(line);
            content.push('\n');
        }
        content
    }
}

/// Create `dir` if needed and fail if it already has entries.
pub fn prepare_output_dir(dir: &Path) -> CorpusResult<()> {
    if dir.is_file() {
        return Err(CorpusError::DestinationConflict(dir.to_path_buf()));
    }
    if dir.exists() {
        if fs::read_dir(dir)?.next().is_some() {
            return Err(CorpusError::DestinationNotEmpty(dir.to_path_buf()));
        }
    } else {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Fail if `path` already exists.
pub fn ensure_new_file(path: &Path) -> CorpusResult<()> {
    if path.exists() {
        return Err(CorpusError::DestinationConflict(path.to_path_buf()));
    }
    Ok(())
}

/// Write one file per document into `dir`, keeping file names.
pub fn write_documents(dir: &Path, documents: &[RewrittenDocument]) -> CorpusResult<()> {
    for document in documents {
        let path = dir.join(&document.file_name);
        debug!("writing {}", path.display());
        fs::write(path, document.content())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_output_dir_creates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out").join("nested");
        prepare_output_dir(&out).unwrap();
        assert!(out.is_dir());
        // Still empty, so a second check passes.
        prepare_output_dir(&out).unwrap();
    }

    #[test]
    fn test_prepare_output_dir_rejects_non_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old.txt"), "x").unwrap();
        assert!(matches!(
            prepare_output_dir(dir.path()),
            Err(CorpusError::DestinationNotEmpty(_))
        ));

        let file = dir.path().join("old.txt");
        assert!(matches!(
            prepare_output_dir(&file),
            Err(CorpusError::DestinationConflict(_))
        ));
    }

    #[test]
    fn test_ensure_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spans.json");
        ensure_new_file(&path).unwrap();
        fs::write(&path, "[]").unwrap();
        assert!(matches!(
            ensure_new_file(&path),
            Err(CorpusError::DestinationConflict(_))
        ));
    }

    #[test]
    fn test_write_documents_terminates_every_line() {
        let dir = TempDir::new().unwrap();
        let docs = vec![RewrittenDocument {
            file_name: "news_1.txt".to_string(),
            lines: vec!["first".to_string(), String::new(), "last".to_string()],
        }];
        write_documents(dir.path(), &docs).unwrap();
        let written = fs::read_to_string(dir.path().join("news_1.txt")).unwrap();
        assert_eq!(written, "first\n\nlast\n");
    }
}
