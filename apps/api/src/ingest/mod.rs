//! Ingestion Pipeline — raw document → enriched, chunked entries in the Exemplar Store.
//!
//! Flow: extract_text → (optional) enrichment → split_text → store.add.
//!
//! A document lands all-or-nothing: `ExemplarStore::add` embeds first and then
//! writes every chunk in one transaction under the store's writer lock.

pub mod chunker;
pub mod extract;
pub mod handlers;
pub mod prompts;

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::ingest::chunker::{split_text, ChunkSettings};
use crate::ingest::extract::extract_text;
use crate::ingest::prompts::{enriched_text, ENRICHMENT_INPUT_LIMIT, ENRICHMENT_PROMPT_TEMPLATE};
use crate::llm_client::prompts::fill_slots;
use crate::llm_client::{LlmClient, LlmRequest};
use crate::store::{ChunkOffset, ExemplarStore, NewChunk};
use crate::text::truncate_chars;

/// A named document waiting to be ingested.
#[derive(Debug, Clone)]
pub struct IngestDocument {
    pub name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub chunking: ChunkSettings,
    /// Annotate the document with a model-written structural summary before chunking.
    pub enrich: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestResult {
    pub chunks_added: usize,
}

/// Per-document result of a batch ingest.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentOutcome>,
    pub total_chunks_added: usize,
}

pub async fn ingest_document(
    store: &ExemplarStore,
    llm: Option<&LlmClient>,
    options: IngestOptions,
    doc: IngestDocument,
) -> Result<IngestResult, AppError> {
    let raw = extract_text(&doc.name, doc.bytes)
        .await
        .map_err(|e| AppError::Ingest(e.to_string()))?;
    ingest_text(store, llm, options, &doc.name, &raw).await
}

/// Ingests already-extracted text. Used for uploads and synthetic essays alike.
pub async fn ingest_text(
    store: &ExemplarStore,
    llm: Option<&LlmClient>,
    options: IngestOptions,
    name: &str,
    raw: &str,
) -> Result<IngestResult, AppError> {
    if raw.trim().is_empty() {
        info!("{name}: no text extracted, nothing to index");
        return Ok(IngestResult { chunks_added: 0 });
    }

    let text = match (options.enrich, llm) {
        (true, Some(llm)) => enrich(llm, name, raw).await,
        (true, None) => {
            warn!("{name}: no model credential, indexing raw text without enrichment");
            raw.to_string()
        }
        (false, _) => raw.to_string(),
    };

    let chunks: Vec<NewChunk> = split_text(&text, options.chunking)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, span)| NewChunk {
            text: span.text.to_string(),
            source_document: name.to_string(),
            offset: ChunkOffset {
                start_index: span.start_index,
                chunk_index,
            },
        })
        .collect();

    if chunks.is_empty() {
        return Ok(IngestResult { chunks_added: 0 });
    }

    let chunks_added = store.add(chunks).await?;
    info!("{name}: {chunks_added} chunks indexed");
    Ok(IngestResult { chunks_added })
}

/// Any enrichment failure degrades to the raw text.
async fn enrich(llm: &LlmClient, name: &str, raw: &str) -> String {
    let prompt = fill_slots(
        ENRICHMENT_PROMPT_TEMPLATE,
        &[("essay", truncate_chars(raw, ENRICHMENT_INPUT_LIMIT))],
    );
    match llm.call(&LlmRequest::new(prompt)).await {
        Ok(annotation) if !annotation.trim().is_empty() => enriched_text(&annotation, raw),
        Ok(_) => {
            warn!("{name}: enrichment returned nothing, using raw text");
            raw.to_string()
        }
        Err(e) => {
            warn!("{name}: enrichment failed ({e}), using raw text");
            raw.to_string()
        }
    }
}

/// Ingests each document independently; one failure never aborts the rest.
pub async fn ingest_batch(
    store: &ExemplarStore,
    llm: Option<&LlmClient>,
    options: IngestOptions,
    docs: Vec<IngestDocument>,
) -> BatchReport {
    let mut documents = Vec::with_capacity(docs.len());
    let mut total_chunks_added = 0;

    for doc in docs {
        let name = doc.name.clone();
        match ingest_document(store, llm, options, doc).await {
            Ok(result) => {
                total_chunks_added += result.chunks_added;
                documents.push(DocumentOutcome {
                    document: name,
                    chunks_added: Some(result.chunks_added),
                    error: None,
                });
            }
            Err(e) => {
                warn!("Ingest of {name} failed: {e}");
                documents.push(DocumentOutcome {
                    document: name,
                    chunks_added: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    BatchReport {
        documents,
        total_chunks_added,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm_client::testing::{client_for, ScriptedProvider};
    use crate::llm_client::ProviderError;
    use crate::store::test_support::open_temp_store;

    fn options(enrich: bool) -> IngestOptions {
        IngestOptions {
            chunking: ChunkSettings::default(),
            enrich,
        }
    }

    fn doc(name: &str, text: &str) -> IngestDocument {
        IngestDocument {
            name: name.to_string(),
            bytes: Bytes::from(text.to_string()),
        }
    }

    #[tokio::test]
    async fn test_chunks_round_trip_without_fabrication() {
        let (_dir, store) = open_temp_store().await;
        let text = "The first lecture on game theory changed how I read the news. ".repeat(40);

        let result = ingest_document(&store, None, options(false), doc("essay.txt", &text))
            .await
            .unwrap();
        assert!(result.chunks_added > 1);

        let stored = store.get_all().await.unwrap();
        assert_eq!(stored.len(), result.chunks_added);
        for (i, chunk) in stored.iter().enumerate() {
            assert_eq!(chunk.offset.chunk_index, i);
            assert_eq!(chunk.source_document, "essay.txt");
            let start = crate::text::byte_offset(&text, chunk.offset.start_index);
            assert!(text[start..].starts_with(&chunk.text));
        }
    }

    #[tokio::test]
    async fn test_blank_document_adds_nothing() {
        let (_dir, store) = open_temp_store().await;
        let result = ingest_document(&store, None, options(true), doc("empty.txt", "   \n"))
            .await
            .unwrap();
        assert_eq!(result, IngestResult { chunks_added: 0 });
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enrichment_prefixes_annotation() {
        let (_dir, store) = open_temp_store().await;
        let provider = Arc::new(ScriptedProvider::always("Hook then evidence."));
        let client = client_for(provider.clone());

        ingest_document(&store, Some(&client), options(true), doc("a.md", "Short essay."))
            .await
            .unwrap();
        let stored = store.get_all().await.unwrap();
        assert!(stored[0].text.starts_with("[AI ANALYSIS: Hook then evidence.]"));
        assert!(stored[0].text.ends_with("Short essay."));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_enrichment_failure_falls_back_to_raw_text() {
        let (_dir, store) = open_temp_store().await;
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Fatal(
            "403 permission denied".to_string(),
        ))]));
        let client = client_for(provider);

        ingest_document(&store, Some(&client), options(true), doc("a.txt", "Raw essay."))
            .await
            .unwrap();
        assert_eq!(store.get_all().await.unwrap()[0].text, "Raw essay.");
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let (_dir, store) = open_temp_store().await;
        let report = ingest_batch(
            &store,
            None,
            options(false),
            vec![
                doc("good.txt", "A real essay about chemistry."),
                IngestDocument {
                    name: "bad.docx".to_string(),
                    bytes: Bytes::from_static(b"PK\x03\x04"),
                },
                doc("also-good.txt", "Another essay about law."),
            ],
        )
        .await;

        assert_eq!(report.total_chunks_added, 2);
        assert!(report.documents[1].error.is_some());
        assert_eq!(report.documents[2].chunks_added, Some(1));
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
