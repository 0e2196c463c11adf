//! Document loading for the ingestion pipeline.
//!
//! Plain text and Markdown are read as-is, every CSV row becomes its own
//! document of `column: value` lines, and PDFs go through text extraction.

use std::path::Path;
use walkdir::WalkDir;

use crate::error::{QaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Csv,
    Pdf,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" => Some(Self::Text),
            "csv" => Some(Self::Csv),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Path of the file the document came from.
    pub source: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct LoadedCorpus {
    pub documents: Vec<SourceDocument>,
    /// Files that could not be loaded.
    pub failed: Vec<String>,
}

/// Load one file; unsupported extensions yield no documents.
pub fn load_file(path: &Path) -> Result<Vec<SourceDocument>> {
    let format = match path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(DocumentFormat::from_extension)
    {
        Some(format) => format,
        None => return Ok(Vec::new()),
    };
    let source = path.display().to_string();

    let texts = match format {
        DocumentFormat::Text => vec![std::fs::read_to_string(path)?],
        DocumentFormat::Csv => load_csv_rows(path)?,
        DocumentFormat::Pdf => vec![load_pdf(path)?],
    };

    Ok(texts
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .map(|text| SourceDocument {
            source: source.clone(),
            text,
        })
        .collect())
}

/// Walk a directory tree and load every supported file.
pub fn load_directory(dir: &Path) -> LoadedCorpus {
    let mut corpus = LoadedCorpus::default();
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "Data directory does not exist");
        return corpus;
    }

    let mut files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();

    for path in files {
        match load_file(&path) {
            Ok(docs) => corpus.documents.extend(docs),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping file that failed to load");
                corpus.failed.push(path.display().to_string());
            }
        }
    }

    corpus
}

fn load_csv_rows(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let lines: Vec<String> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| format!("{}: {}", h.trim(), v.trim()))
            .collect();
        rows.push(lines.join("\n"));
    }
    Ok(rows)
}

fn load_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| QaError::Ingestion(format!("PDF extraction failed for {}: {}", path.display(), e)))?;

    Ok(text
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension("MD"), Some(DocumentFormat::Text));
        assert_eq!(DocumentFormat::from_extension("csv"), Some(DocumentFormat::Csv));
        assert_eq!(DocumentFormat::from_extension("pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("docx"), None);
    }

    #[test]
    fn test_csv_row_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.csv");
        std::fs::write(&path, "hotel_name,view\nSt Regis Dubai,Palm\nPremier Inn,Expo\n").unwrap();

        let docs = load_file(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "hotel_name: St Regis Dubai\nview: Palm");
        assert_eq!(docs[1].source, path.display().to_string());
    }

    #[test]
    fn test_directory_walk_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("profiles")).unwrap();
        std::fs::write(dir.path().join("profiles/st_regis.md"), "# St Regis\nButler service.").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "Spa opens at 9am.").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join("broken.pdf"), "not a pdf").unwrap();

        let corpus = load_directory(dir.path());
        assert_eq!(corpus.documents.len(), 2);
        assert_eq!(corpus.failed.len(), 1);
        assert!(corpus.failed[0].ends_with("broken.pdf"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let corpus = load_directory(Path::new("/nonexistent/data"));
        assert!(corpus.documents.is_empty());
        assert!(corpus.failed.is_empty());
    }
}
