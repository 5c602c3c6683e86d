//! Document corpus: the immutable set of text blobs for one extraction request.
//!
//! File decoding (PDF, images) happens upstream; this module only receives
//! text. Each document is classified into a broad `MimeClass` so extractors
//! and prompts can tell a spreadsheet dump from a memo or OCR output.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::extraction::error::ExtractionError;

/// Broad shape of a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MimeClass {
    Tabular,
    Narrative,
    ImageDerived,
}

impl MimeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tabular => "tabular",
            Self::Narrative => "narrative",
            Self::ImageDerived => "image-derived",
        }
    }
}

/// Extensions that only ever arrive here as spreadsheet dumps.
const TABULAR_EXTENSIONS: &[&str] = &["csv", "tsv", "xls", "xlsx", "ods"];

/// Extensions that only ever arrive here as OCR output.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "heic"];

/// Minimum delimited lines before plain text is treated as tabular.
const MIN_TABULAR_LINES: usize = 3;

/// Share of noise characters above which text looks like raw OCR.
const OCR_NOISE_RATIO: f64 = 0.15;

/// A raw input handed to the pipeline: a name and its decoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a UTF-8 text file from disk. Invalid sequences are replaced.
    pub fn read(path: &Path) -> Result<Self, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

/// One document of the corpus. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentText {
    pub id: String,
    pub source_name: String,
    pub mime_class: MimeClass,
    pub content: String,
}

impl DocumentText {
    pub fn new(source_name: impl Into<String>, content: impl Into<String>) -> Self {
        let source_name = source_name.into();
        let content = content.into();
        let mime_class = classify(&source_name, &content);
        Self {
            id: Uuid::new_v4().to_string(),
            source_name,
            mime_class,
            content,
        }
    }
}

/// Ordered, shared, read-only collection of documents.
///
/// Cloning is cheap: all clones share the same documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentCorpus {
    documents: Arc<[DocumentText]>,
}

impl DocumentCorpus {
    /// Build a corpus from raw files, skipping blank ones.
    pub fn from_files(files: Vec<SourceFile>) -> Self {
        let documents: Vec<DocumentText> = files
            .into_iter()
            .filter(|f| !f.content.trim().is_empty())
            .map(|f| DocumentText::new(f.name, f.content))
            .collect();
        Self {
            documents: documents.into(),
        }
    }

    pub fn documents(&self) -> &[DocumentText] {
        &self.documents
    }

    /// Shared handle to the documents, for handing across threads.
    pub fn shared(&self) -> Arc<[DocumentText]> {
        Arc::clone(&self.documents)
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// All document contents joined in corpus order.
    pub fn concatenated(&self) -> String {
        self.documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every line of every document, in corpus order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().flat_map(|d| d.content.lines())
    }
}

/// Classify a document from its name and content shape.
pub fn classify(source_name: &str, content: &str) -> MimeClass {
    let extension = Path::new(source_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if TABULAR_EXTENSIONS.contains(&extension.as_str()) {
        return MimeClass::Tabular;
    }
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return MimeClass::ImageDerived;
    }

    let delimited_lines = content
        .lines()
        .filter(|l| l.matches(',').count() >= 2 || l.contains('\t'))
        .count();
    if delimited_lines >= MIN_TABULAR_LINES {
        return MimeClass::Tabular;
    }

    if noise_ratio(content) > OCR_NOISE_RATIO {
        return MimeClass::ImageDerived;
    }

    MimeClass::Narrative
}

/// Share of characters that are neither alphanumeric, whitespace nor common
/// punctuation. Stray glyphs are typical of OCR.
fn noise_ratio(content: &str) -> f64 {
    let total = content.chars().count();
    if total == 0 {
        return 0.0;
    }
    let noise = content
        .chars()
        .filter(|c| {
            !c.is_alphanumeric()
                && !c.is_whitespace()
                && !",.;:%$€£¥()-/'\"&+".contains(*c)
        })
        .count();
    noise as f64 / total as f64
}
