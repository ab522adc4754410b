//! Raw document → plain text.
//!
//! PDF and DOCX parsing are CPU-bound and run inside `spawn_blocking`.
//! DOCX text is the paragraph text of `word/document.xml`.
//! Plain text and Markdown are decoded as UTF-8 (lossily, so a stray byte
//! never rejects an otherwise readable essay).

use std::io::{Cursor, Read};

use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("could not extract text from '{file_name}': unsupported format")]
    Unsupported { file_name: String },

    #[error("could not extract text from '{file_name}': {reason}")]
    Failed { file_name: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentKind {
    /// Detects the format from the file extension, falling back to the PDF magic bytes.
    pub fn detect(file_name: &str, bytes: &[u8]) -> Option<Self> {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => Some(DocumentKind::Pdf),
            Some("docx") => Some(DocumentKind::Docx),
            Some("txt") | Some("md") | Some("markdown") => Some(DocumentKind::PlainText),
            _ if bytes.starts_with(b"%PDF") => Some(DocumentKind::Pdf),
            _ => None,
        }
    }
}

pub async fn extract_text(file_name: &str, bytes: Bytes) -> Result<String, ExtractError> {
    let kind = DocumentKind::detect(file_name, &bytes).ok_or_else(|| ExtractError::Unsupported {
        file_name: file_name.to_string(),
    })?;

    let text = match kind {
        DocumentKind::PlainText => String::from_utf8_lossy(&bytes).into_owned(),
        DocumentKind::Pdf => {
            let name = file_name.to_string();
            tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_from_mem(&bytes).map_err(|e| e.to_string())
            })
            .await
            .map_err(|e| ExtractError::Failed {
                file_name: name.clone(),
                reason: format!("extraction task failed: {e}"),
            })?
            .map_err(|reason| ExtractError::Failed {
                file_name: name,
                reason,
            })?
        }
        DocumentKind::Docx => {
            let name = file_name.to_string();
            tokio::task::spawn_blocking(move || docx_text(&bytes))
                .await
                .map_err(|e| ExtractError::Failed {
                    file_name: name.clone(),
                    reason: format!("extraction task failed: {e}"),
                })?
                .map_err(|reason| ExtractError::Failed {
                    file_name: name,
                    reason,
                })?
        }
    };

    debug!("Extracted {} chars from {file_name}", text.chars().count());
    Ok(text)
}

/// Paragraphs of the main document part, one per line. Tabs and breaks are kept.
fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a DOCX archive: {e}"))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format!("missing word/document.xml: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("unreadable word/document.xml: {e}"))?;

    let mut reader = Reader::from_str(&xml);
    let mut out = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:cr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| format!("bad text run: {e}"))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
    }
    Ok(out)
}
