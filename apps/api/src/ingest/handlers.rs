use axum::extract::{Multipart, State};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::errors::AppError;
use crate::ingest::extract::extract_text;
use crate::ingest::{ingest_batch, BatchReport, IngestDocument, IngestOptions};
use crate::state::AppState;
use crate::text::char_len;

/// Uploaded files plus the optional `enrich` flag from a multipart body.
struct UploadForm {
    files: Vec<IngestDocument>,
    enrich: bool,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut files = Vec::new();
    let mut enrich = true;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        if field_name == "enrich" {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(e.to_string()))?;
            enrich = !matches!(value.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no");
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes: Bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("could not read '{file_name}': {e}")))?;
        files.push(IngestDocument {
            name: file_name,
            bytes,
        });
    }

    if files.is_empty() {
        return Err(AppError::Validation("no files in upload".to_string()));
    }
    Ok(UploadForm { files, enrich })
}

#[derive(Serialize)]
pub struct IngestResponse {
    #[serde(flatten)]
    pub report: BatchReport,
    pub exemplar_count: usize,
}

/// POST /api/v1/ingest
pub async fn handle_ingest(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<IngestResponse>, AppError> {
    let form = read_upload_form(multipart).await?;
    let ctx = &state.ctx;
    let store = ctx.store().await?;
    let options = IngestOptions {
        chunking: ctx.config.chunk_settings(),
        enrich: form.enrich,
    };

    let report = ingest_batch(store, ctx.optional_llm(), options, form.files).await;
    if report.documents.iter().all(|d| d.error.is_some()) {
        let reasons: Vec<String> = report
            .documents
            .iter()
            .filter_map(|d| d.error.clone())
            .collect();
        return Err(AppError::Ingest(reasons.join("; ")));
    }

    let exemplar_count = store.count().await?;
    Ok(Json(IngestResponse {
        report,
        exemplar_count,
    }))
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub exemplar_count: usize,
    pub blueprint_revision: Option<u64>,
    pub model_configured: bool,
}

/// GET /api/v1/stats
pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let ctx = &state.ctx;
    Ok(Json(StatsResponse {
        exemplar_count: ctx.exemplar_count().await?,
        blueprint_revision: ctx.blueprints.load().await.map(|bp| bp.metadata.revision),
        model_configured: ctx.optional_llm().is_some(),
    }))
}

/// DELETE /api/v1/corpus
pub async fn handle_reset_corpus(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.ctx.store().await?.reset().await?;
    info!("Corpus reset via API");
    Ok(Json(serde_json::json!({ "exemplar_count": 0 })))
}

#[derive(Serialize)]
pub struct ParsedCv {
    pub file_name: String,
    pub text: String,
    pub char_count: usize,
}

/// POST /api/v1/parse-cv
pub async fn handle_parse_cv(multipart: Multipart) -> Result<Json<ParsedCv>, AppError> {
    let mut form = read_upload_form(multipart).await?;
    let file = form.files.remove(0);
    let text = extract_text(&file.name, file.bytes)
        .await
        .map_err(|e| AppError::Ingest(e.to_string()))?;
    let text = text.trim().to_string();
    Ok(Json(ParsedCv {
        file_name: file.name,
        char_count: char_len(&text),
        text,
    }))
}
