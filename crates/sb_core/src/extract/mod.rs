//! Source document to raw text.
//!
//! Plain text and Markdown are read verbatim. PDF (per page) and DOCX (per paragraph)
//! are read unit by unit; a unit that cannot be read becomes [`ExtractedUnit::Empty`]
//! with the reason instead of failing the whole document.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

mod docx;
mod pdf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" => Ok(Self::PlainText),
            "md" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            _ => Err(AppError::new(
                "EXTRACT_UNSUPPORTED_FORMAT",
                "Unsupported file type",
            )
            .with_details(format!("ext=.{ext}; path={}", path.display()))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractedUnit {
    Text { text: String },
    Empty { reason: String },
}

impl ExtractedUnit {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn empty(reason: impl Into<String>) -> Self {
        Self::Empty {
            reason: reason.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Empty { .. } => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub format: DocumentFormat,
    /// Pages, paragraphs, or a single unit for plain text; in source order.
    pub units: Vec<ExtractedUnit>,
}

impl ExtractedDocument {
    pub fn text(&self) -> String {
        self.units
            .iter()
            .map(ExtractedUnit::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn skipped_units(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u, ExtractedUnit::Empty { .. }))
            .count()
    }
}

pub fn extract_file(path: &Path) -> Result<ExtractedDocument, AppError> {
    let format = DocumentFormat::from_path(path)?;
    let units = match format {
        DocumentFormat::PlainText | DocumentFormat::Markdown => {
            let bytes = fs::read(path).map_err(|e| {
                AppError::io("EXTRACT_READ_FAILED", "Failed to read document", path, e)
            })?;
            vec![ExtractedUnit::text(String::from_utf8_lossy(&bytes).into_owned())]
        }
        DocumentFormat::Pdf => pdf::extract_pages(path)?,
        DocumentFormat::Docx => docx::extract_paragraphs(path)?,
    };

    let doc = ExtractedDocument { format, units };
    let skipped = doc.skipped_units();
    if skipped > 0 {
        tracing::warn!(
            path = %path.display(),
            skipped,
            units = doc.units.len(),
            "some document units could not be extracted"
        );
    }
    Ok(doc)
}
