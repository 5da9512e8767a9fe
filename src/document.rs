use anyhow::{Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text;
use std::fs;
use std::path::{Path, PathBuf};

/// Represents a loaded document with its text and origin
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The actual text content of the document
    pub content: String,
    /// URL or file name the content was loaded from
    pub source: String,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Document {
            content: content.into(),
            source: source.into(),
        }
    }

    /// Create a new document from a file path
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let file_name = path
            .file_name()
            .context("Invalid file name")?
            .to_str()
            .context("Invalid file name encoding")?
            .to_string();

        let mime = from_path(path).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        let content = read_document_content(path, &mime_type)?;

        Ok(Document {
            content,
            source: file_name,
        })
    }
}

/// Somewhere documents can be loaded from when an index has to be built
#[allow(async_fn_in_trait)]
pub trait DocumentSource {
    async fn load(&self) -> Result<Vec<Document>>;
}

/// A single local text or PDF file
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }
}

impl DocumentSource for FileSource {
    async fn load(&self) -> Result<Vec<Document>> {
        if !self.path.exists() {
            return Err(anyhow::anyhow!("File not found: {}", self.path.display()));
        }
        Ok(vec![Document::from_file(&self.path)?])
    }
}

/// Read content from a document based on its MIME type
pub fn read_document_content<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<String> {
    let path = file_path.as_ref();

    match mime_type {
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", path.display());
            let content = extract_text(path)
                .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?;

            // PDF extraction can sometimes include excessive whitespace
            let cleaned_content = normalize_whitespace(&content);

            if cleaned_content.is_empty() {
                warn!("Extracted PDF content is empty or contains only whitespace");
            }

            Ok(cleaned_content)
        }

        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", path.display());
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read text file: {}", path.display()))?;
            Ok(content)
        }

        _ => Err(anyhow::anyhow!(
            "Unsupported document format: {}. Only text and PDF files are supported.",
            mime_type
        )),
    }
}

/// Collapse repeated spaces and cap newline runs at one paragraph break
pub fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    normalized.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_normalize_whitespace() {
        let text = "This  has   multiple    spaces.\n\n\nAnd multiple newlines.\r\nAnd Windows line endings.";
        let expected =
            "This has multiple spaces.\n\nAnd multiple newlines.\nAnd Windows line endings.";
        assert_eq!(normalize_whitespace(text), expected);
    }

    #[tokio::test]
    async fn test_file_source_loads_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "Tracing overview.\n\nRuns and spans.").unwrap();

        let docs = FileSource::new(&path).load().await.unwrap();

        assert_eq!(
            docs,
            vec![Document::new("Tracing overview.\n\nRuns and spans.", "notes.txt")]
        );
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();

        let err = FileSource::new(dir.path().join("absent.txt"))
            .load()
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("File not found"));
    }

    #[test]
    fn test_unsupported_format() {
        let err = read_document_content("image.png", "image/png").unwrap_err();
        assert!(err.to_string().contains("Unsupported document format: image/png"));
    }
}
