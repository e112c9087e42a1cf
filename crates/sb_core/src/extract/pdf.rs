use std::path::Path;

use lopdf::Document;

use crate::error::AppError;

use super::ExtractedUnit;

/// One unit per page, in page-number order.
pub(super) fn extract_pages(path: &Path) -> Result<Vec<ExtractedUnit>, AppError> {
    let doc = Document::load(path).map_err(|e| {
        AppError::new("EXTRACT_FAILED", "Failed to load PDF")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;

    // get_pages is a BTreeMap keyed by page number.
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    Ok(read_pages(path, &pages, |page| doc.extract_text(&[page])))
}

/// Read each page in order; a page whose text cannot be read becomes an empty unit.
fn read_pages<E, F>(path: &Path, pages: &[u32], mut read: F) -> Vec<ExtractedUnit>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Result<String, E>,
{
    let mut units = Vec::with_capacity(pages.len());
    for &page_num in pages {
        match read(page_num) {
            Ok(text) => units.push(ExtractedUnit::text(text)),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    page = page_num,
                    err = %e,
                    "skipping unreadable PDF page"
                );
                units.push(ExtractedUnit::empty(format!("page {page_num}: {e}")));
            }
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use tempfile::tempdir;

    fn write_single_page_pdf(path: &Path, line: &str) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn extracts_one_unit_per_page() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("cells.pdf");
        write_single_page_pdf(&p, "Hello Cells");

        let units = extract_pages(&p).expect("extract");
        assert_eq!(units.len(), 1);
        assert!(units[0].as_str().contains("Hello Cells"));
    }

    #[test]
    fn unreadable_page_becomes_empty_unit() {
        let units = read_pages(Path::new("scan.pdf"), &[1, 2, 3], |page| {
            if page == 2 {
                Err("invalid content stream")
            } else {
                Ok(format!("page {page} text"))
            }
        });
        assert_eq!(
            units,
            vec![
                ExtractedUnit::text("page 1 text"),
                ExtractedUnit::empty("page 2: invalid content stream"),
                ExtractedUnit::text("page 3 text"),
            ]
        );
    }

    #[test]
    fn unreadable_container_is_fatal() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("broken.pdf");
        std::fs::write(&p, b"definitely not a pdf").unwrap();
        let err = extract_pages(&p).unwrap_err();
        assert_eq!(err.code, "EXTRACT_FAILED");
    }
}
