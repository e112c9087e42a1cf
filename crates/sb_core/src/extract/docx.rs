use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::AppError;

use super::ExtractedUnit;

const DOCUMENT_XML: &str = "word/document.xml";

/// One unit per `<w:p>` paragraph of the main document part, in source order.
pub(super) fn extract_paragraphs(path: &Path) -> Result<Vec<ExtractedUnit>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io("EXTRACT_READ_FAILED", "Failed to open DOCX", path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        AppError::new("EXTRACT_FAILED", "Failed to read DOCX as ZIP")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_XML)
        .map_err(|e| {
            AppError::new("EXTRACT_FAILED", "DOCX is missing its main document part")
                .with_details(format!(
                    "path={}; part={DOCUMENT_XML}; err={}",
                    path.display(),
                    e
                ))
        })?
        .read_to_string(&mut xml)
        .map_err(|e| {
            AppError::new("EXTRACT_FAILED", "Failed to read DOCX document part")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;

    Ok(paragraphs_from_xml(&xml))
}

struct OpenParagraph {
    text: String,
    failure: Option<String>,
}

impl OpenParagraph {
    fn new() -> Self {
        Self {
            text: String::new(),
            failure: None,
        }
    }

    fn finish(self) -> ExtractedUnit {
        match self.failure {
            Some(reason) => ExtractedUnit::empty(reason),
            None => ExtractedUnit::text(self.text),
        }
    }
}

pub(super) fn paragraphs_from_xml(xml: &str) -> Vec<ExtractedUnit> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut units = Vec::new();
    // Text boxes nest paragraphs inside paragraphs.
    let mut open: Vec<OpenParagraph> = Vec::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => open.push(OpenParagraph::new()),
                b"w:t" => in_run_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:p" => units.push(ExtractedUnit::text("")),
                b"w:tab" => {
                    if let Some(p) = open.last_mut() {
                        p.text.push('\t');
                    }
                }
                b"w:br" | b"w:cr" => {
                    if let Some(p) = open.last_mut() {
                        p.text.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if !in_run_text {
                    continue;
                }
                if let Some(p) = open.last_mut() {
                    match t.unescape() {
                        Ok(s) => p.text.push_str(&s),
                        Err(e) => {
                            if p.failure.is_none() {
                                p.failure = Some(format!("paragraph {}: {e}", units.len()));
                            }
                        }
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => {
                    if let Some(p) = open.pop() {
                        let unit = p.finish();
                        if let ExtractedUnit::Empty { reason } = &unit {
                            tracing::warn!(reason = %reason, "skipping unreadable DOCX paragraph");
                        }
                        units.push(unit);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                // The rest of the part cannot be tokenized; keep what was read.
                let reason = format!(
                    "malformed document XML at byte {}: {e}",
                    reader.buffer_position()
                );
                tracing::warn!(reason = %reason, "stopping DOCX extraction early");
                units.push(ExtractedUnit::empty(reason));
                break;
            }
            _ => {}
        }
    }

    units
}
