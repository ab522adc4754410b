//! Axum route handlers for the Generation API.

use std::time::Duration;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::generation::generator::GeneratedEssay;
use crate::generation::pipeline::{draft_statement, StatementDraft};
use crate::generation::profile::UserProfile;
use crate::generation::synthetic::{
    clone_for_subjects, synthetic_document_name, SyntheticOutcome, DEFAULT_SUBJECTS,
};
use crate::ingest::{ingest_text, IngestOptions};
use crate::quality::QualityReport;
use crate::render::{render, ExportFormat};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct QualityRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub essay: Option<GeneratedEssay>,
}

#[derive(Debug, Deserialize)]
pub struct SyntheticRequest {
    pub exemplar: String,
    #[serde(default)]
    pub subjects: Option<Vec<String>>,
    /// Index each successful clone into the corpus.
    #[serde(default)]
    pub ingest: bool,
}

#[derive(Debug, Serialize)]
pub struct SyntheticResponse {
    pub outcomes: Vec<SyntheticOutcome>,
    pub chunks_added: usize,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub essay: GeneratedEssay,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub format: ExportFormat,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/generate
///
/// Full pipeline: retrieve exemplars, apply the blueprint, generate and gate.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(profile): Json<UserProfile>,
) -> Result<Json<StatementDraft>, AppError> {
    let draft = draft_statement(&state.ctx, &profile).await?;
    Ok(Json(draft))
}

/// POST /api/v1/quality
///
/// Lints arbitrary text, or the three answers of an essay joined together.
pub async fn handle_quality(
    State(state): State<AppState>,
    Json(request): Json<QualityRequest>,
) -> Result<Json<QualityReport>, AppError> {
    let text = match (request.essay, request.text) {
        (Some(essay), _) => essay.combined_text(),
        (None, Some(text)) => text,
        (None, None) => {
            return Err(AppError::Validation(
                "provide either text or essay".to_string(),
            ))
        }
    };
    Ok(Json(state.ctx.gate.evaluate(&text)))
}

/// POST /api/v1/synthetic
///
/// Clones one exemplar across subjects. Per-subject failures are reported in
/// the response, never as an error status.
pub async fn handle_synthetic(
    State(state): State<AppState>,
    Json(request): Json<SyntheticRequest>,
) -> Result<Json<SyntheticResponse>, AppError> {
    if request.exemplar.trim().is_empty() {
        return Err(AppError::Validation("exemplar cannot be empty".to_string()));
    }
    let ctx = &state.ctx;
    let llm = ctx.llm()?;

    let subjects: Vec<String> = match request.subjects {
        Some(subjects) => subjects
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => DEFAULT_SUBJECTS.iter().map(|s| s.to_string()).collect(),
    };
    if subjects.is_empty() {
        return Err(AppError::Validation("subjects cannot be empty".to_string()));
    }

    let pause = Duration::from_secs(ctx.config.synthetic_pause_secs);
    let outcomes = clone_for_subjects(llm, &request.exemplar, &subjects, pause).await;

    let mut chunks_added = 0;
    if request.ingest {
        let store = ctx.store().await?;
        let options = IngestOptions {
            chunking: ctx.config.chunk_settings(),
            enrich: false,
        };
        for outcome in &outcomes {
            let Some(essay) = &outcome.essay else {
                continue;
            };
            let name = synthetic_document_name(&outcome.subject);
            match ingest_text(store, None, options, &name, essay).await {
                Ok(result) => chunks_added += result.chunks_added,
                Err(e) => warn!("Could not index {name}: {e}"),
            }
        }
        info!("Synthetic clones indexed: {chunks_added} chunks");
    }

    Ok(Json(SyntheticResponse {
        outcomes,
        chunks_added,
    }))
}

/// POST /api/v1/export
///
/// Returns the statement as a DOCX (default) or Markdown attachment.
pub async fn handle_export(Json(request): Json<ExportRequest>) -> Result<Response, AppError> {
    let format = request.format;
    let body = render(&request.essay, request.title.as_deref(), format)?;
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", format.file_name()),
            ),
        ],
        body,
    )
        .into_response())
}
