//! Axum route handlers for the Style Blueprint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::blueprint::analyzer::analyze_corpus;
use crate::blueprint::StyleBlueprint;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BlueprintResponse {
    pub blueprint: StyleBlueprint,
    /// False when no analysis has been saved and the built-in default is shown.
    pub analyzed: bool,
}

/// POST /api/v1/analyze
///
/// Re-derives the blueprint from the whole corpus and replaces the saved file.
pub async fn handle_analyze(
    State(state): State<AppState>,
) -> Result<Json<BlueprintResponse>, AppError> {
    let ctx = &state.ctx;
    if ctx.exemplar_count().await? == 0 {
        return Err(AppError::EmptyCorpus);
    }
    let blueprint = analyze_corpus(
        ctx.store().await?,
        ctx.optional_llm(),
        &ctx.blueprints,
        ctx.config.analysis_char_budget,
    )
    .await?;
    Ok(Json(BlueprintResponse {
        blueprint,
        analyzed: true,
    }))
}

/// GET /api/v1/blueprint
pub async fn handle_get_blueprint(
    State(state): State<AppState>,
) -> Result<Json<BlueprintResponse>, AppError> {
    let response = match state.ctx.blueprints.load().await {
        Some(blueprint) => BlueprintResponse {
            blueprint,
            analyzed: true,
        },
        None => BlueprintResponse {
            blueprint: StyleBlueprint::default(),
            analyzed: false,
        },
    };
    Ok(Json(response))
}
