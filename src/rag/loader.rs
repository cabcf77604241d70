// Document loading from the filesystem
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::errors::{DocError, Result};
use crate::rag::chunker::document_id;

/// File extensions treated as text documents
const TEXT_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// A loaded document ready for ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Content-derived id
    pub id: String,
    /// File name the text came from
    pub source: String,
    pub path: PathBuf,
    pub text: String,
}

impl SourceDocument {
    pub fn from_text(source: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: document_id(&text),
            source: source.into(),
            path: PathBuf::new(),
            text,
        }
    }
}

/// Load a file, or every text file below a directory
///
/// Directory entries are visited in sorted order so ingestion (and with it
/// chunk insertion order) is reproducible.
pub fn load_path(path: &Path) -> Result<Vec<SourceDocument>> {
    let mut documents = Vec::new();
    collect(path, &mut documents)?;
    Ok(documents)
}

/// Load several paths, dropping documents already seen (same content)
pub fn load_paths(paths: &[PathBuf]) -> Result<Vec<SourceDocument>> {
    let mut documents: Vec<SourceDocument> = Vec::new();
    for path in paths {
        for document in load_path(path)? {
            if !documents.iter().any(|d| d.id == document.id) {
                documents.push(document);
            }
        }
    }
    Ok(documents)
}

fn collect(path: &Path, out: &mut Vec<SourceDocument>) -> Result<()> {
    let metadata = fs::metadata(path)
        .map_err(|e| DocError::Ingest(format!("Cannot read {}: {}", path.display(), e)))?;

    if !metadata.is_dir() {
        if !is_text_file(path) {
            return Err(DocError::Ingest(format!(
                "Unsupported document type: {}",
                path.display()
            )));
        }
        return read_document(path, out);
    }

    // Symlinked directories are not descended into
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry
            .map_err(|e| DocError::Ingest(format!("Cannot walk {}: {}", path.display(), e)))?;
        let is_file = if entry.path_is_symlink() {
            entry.path().is_file()
        } else {
            entry.file_type().is_file()
        };
        if is_file && is_text_file(entry.path()) {
            read_document(entry.path(), out)?;
        }
    }
    Ok(())
}

fn read_document(path: &Path, out: &mut Vec<SourceDocument>) -> Result<()> {
    let text = fs::read_to_string(path)
        .map_err(|e| DocError::Ingest(format!("Cannot read {}: {}", path.display(), e)))?;

    if text.trim().is_empty() {
        return Ok(());
    }

    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    out.push(SourceDocument {
        id: document_id(&text),
        source,
        path: path.to_path_buf(),
        text,
    });
    Ok(())
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
