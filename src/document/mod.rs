// Document loading
// Reads a PDF into per-page text with the document info dictionary as metadata


use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lopdf::Object;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

/// A loaded source document. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub source: PathBuf,
    pub pages: Vec<Page>,
}

/// Text and raw metadata of a single page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    pub text: String,
    /// Raw metadata; may contain nested values until sanitized
    pub metadata: Map<String, Value>,
}

impl Document {
    /// Full document text, pages separated by newlines
    #[inline]
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// Load a PDF from disk, one [`Page`] per PDF page.
///
/// Pages whose text cannot be extracted are kept with empty text so page
/// numbers stay aligned with the file.
#[inline]
pub fn load_pdf(path: &Path) -> Result<Document> {
    debug!("Loading PDF {}", path.display());

    let pdf = lopdf::Document::load(path)
        .with_context(|| format!("Failed to load PDF: {}", path.display()))?;

    let info = document_info(&pdf);
    let pages = pdf.get_pages();
    let total_pages = pages.len();

    let mut loaded = Vec::with_capacity(total_pages);
    for &number in pages.keys() {
        let text = match pdf.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to extract text from page {}: {}", number, e);
                String::new()
            }
        };

        let mut metadata = info.clone();
        metadata.insert("source".to_string(), json!(path.display().to_string()));
        metadata.insert("page".to_string(), json!(number));
        metadata.insert("total_pages".to_string(), json!(total_pages));

        loaded.push(Page {
            number,
            text,
            metadata,
        });
    }

    let document = Document {
        source: path.to_path_buf(),
        pages: loaded,
    };

    info!(
        "Loaded {} ({} pages, {} chars)",
        path.display(),
        total_pages,
        document.pages.iter().map(|p| p.text.chars().count()).sum::<usize>()
    );

    Ok(document)
}

/// Find the first PDF in a directory, by file name order
#[inline]
pub fn find_pdf(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut pdfs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }

    pdfs.sort();
    Ok(pdfs.into_iter().next())
}

/// Entries of the trailer's `/Info` dictionary as JSON
fn document_info(pdf: &lopdf::Document) -> Map<String, Value> {
    let info = pdf
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| match obj {
            Object::Reference(id) => pdf.get_object(*id).ok(),
            other => Some(other),
        })
        .and_then(|obj| obj.as_dict().ok());

    let Some(info) = info else {
        return Map::new();
    };

    info.iter()
        .map(|(key, value)| {
            (
                String::from_utf8_lossy(key).into_owned(),
                object_to_json(pdf, value, 0),
            )
        })
        .collect()
}

const MAX_OBJECT_DEPTH: usize = 4;

fn object_to_json(pdf: &lopdf::Document, object: &Object, depth: usize) -> Value {
    if depth > MAX_OBJECT_DEPTH {
        return Value::Null;
    }

    match object {
        Object::Null | Object::Stream(_) => Value::Null,
        Object::Boolean(b) => json!(b),
        Object::Integer(i) => json!(i),
        Object::Real(r) => json!(f64::from(*r)),
        Object::Name(name) => json!(String::from_utf8_lossy(name)),
        Object::String(bytes, _) => json!(decode_pdf_string(bytes)),
        Object::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| object_to_json(pdf, item, depth + 1))
                .collect(),
        ),
        Object::Dictionary(dict) => Value::Object(
            dict.iter()
                .map(|(k, v)| {
                    (
                        String::from_utf8_lossy(k).into_owned(),
                        object_to_json(pdf, v, depth + 1),
                    )
                })
                .collect(),
        ),
        Object::Reference(id) => pdf
            .get_object(*id)
            .map_or(Value::Null, |obj| object_to_json(pdf, obj, depth + 1)),
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise byte-wise
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|&b| char::from(b)).collect()
}
