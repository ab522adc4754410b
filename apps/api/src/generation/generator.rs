//! Generation Stage — one bounded model call turned into a length-safe essay.
//!
//! Flow: banned terms + length targets → render template → LLM generate (JSON
//! schema, retry policy) → normalize → optional grammar pass → hard length cut.
//!
//! The hard cut always runs last, so the grammar pass can never push the
//! essay back over the limit.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::blueprint::StyleBlueprint;
use crate::errors::AppError;
use crate::generation::length::{enforce_length, section_targets, LengthPolicy};
use crate::generation::prompts::{
    banned_terms, essay_schema, GenerationSlots, PromptTemplate, GENERATION_SYSTEM,
    GRAMMAR_PROMPT_TEMPLATE, GRAMMAR_SYSTEM,
};
use crate::llm_client::prompts::fill_slots;
use crate::llm_client::{LlmClient, LlmRequest};
use crate::text::char_len;

const GENERATION_TEMPERATURE: f32 = 1.0;
const THINKING_BUDGET: u32 = 12_000;
const GRAMMAR_TEMPERATURE: f32 = 0.1;
/// A grammar pass that changes the length by more than this share is rewriting, not correcting.
const GRAMMAR_MAX_DRIFT: f64 = 0.10;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// The three UCAS answers. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedEssay {
    pub q1_answer: String,
    pub q2_answer: String,
    pub q3_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_log: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CharCounts {
    pub q1: usize,
    pub q2: usize,
    pub q3: usize,
    pub total: usize,
}

impl GeneratedEssay {
    #[cfg(test)]
    pub fn new(q1: impl Into<String>, q2: impl Into<String>, q3: impl Into<String>) -> Self {
        Self {
            q1_answer: q1.into(),
            q2_answer: q2.into(),
            q3_answer: q3.into(),
            analysis_log: None,
        }
    }

    pub fn char_counts(&self) -> CharCounts {
        let (q1, q2, q3) = (
            char_len(&self.q1_answer),
            char_len(&self.q2_answer),
            char_len(&self.q3_answer),
        );
        CharCounts {
            q1,
            q2,
            q3,
            total: q1 + q2 + q3,
        }
    }

    pub fn total_chars(&self) -> usize {
        self.char_counts().total
    }

    /// The three answers as one text, the form the quality gate scores.
    pub fn combined_text(&self) -> String {
        [
            self.q1_answer.trim(),
            self.q2_answer.trim(),
            self.q3_answer.trim(),
        ]
        .join("\n\n")
    }
}

/// Transient input to one generation call.
pub struct GenerationRequest<'a> {
    pub profile_string: &'a str,
    pub exemplar_text: &'a str,
    pub blueprint: &'a StyleBlueprint,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub total_char_target: usize,
    pub length: LengthPolicy,
    pub grammar_pass: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            total_char_target: 3900,
            length: LengthPolicy::default(),
            grammar_pass: false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generation
// ────────────────────────────────────────────────────────────────────────────

pub async fn generate(
    llm: &LlmClient,
    template: &PromptTemplate,
    request: &GenerationRequest<'_>,
    settings: GenerationSettings,
) -> Result<GeneratedEssay, AppError> {
    let targets = section_targets(
        request.blueprint.structure_proportions,
        settings.total_char_target,
    );
    let banned = banned_terms(request.blueprint).join(", ");
    let blueprint_text = request.blueprint.prompt_summary();
    let length_text = targets.prompt_text();

    let prompt = template.render(&GenerationSlots {
        exemplars: request.exemplar_text,
        profile: request.profile_string,
        blueprint: &blueprint_text,
        banned_terms: &banned,
        length_targets: &length_text,
    });

    let llm_request = LlmRequest::new(prompt)
        .with_system(GENERATION_SYSTEM)
        .with_schema(essay_schema())
        .with_temperature(GENERATION_TEMPERATURE)
        .with_thinking_budget(THINKING_BUDGET);

    let value = llm.call_json_value(&llm_request).await?;
    let mut essay = normalize_response(value)?;
    info!("Generated essay: {:?}", essay.char_counts());

    if settings.grammar_pass {
        essay = grammar_pass(llm, essay).await;
    }

    enforce_length(&mut essay, settings.length);
    Ok(essay)
}

/// Coerces the provider's JSON into a `GeneratedEssay`.
///
/// - an array yields its first element (empty array → `EmptyResponse`)
/// - list-valued sections are joined with single spaces
/// - other scalars are stringified
/// - a missing or null required key is a `Parse` error
pub fn normalize_response(value: Value) -> Result<GeneratedEssay, AppError> {
    let value = match value {
        Value::Array(items) => items.into_iter().next().ok_or(AppError::EmptyResponse)?,
        other => other,
    };
    let Value::Object(mut obj) = value else {
        return Err(AppError::Parse(
            "expected a JSON object with q1_answer, q2_answer, q3_answer".to_string(),
        ));
    };

    let mut required = |key: &str| -> Result<String, AppError> {
        obj.remove(key)
            .and_then(section_text)
            .ok_or_else(|| AppError::Parse(format!("missing required key '{key}'")))
    };
    let q1_answer = required("q1_answer")?;
    let q2_answer = required("q2_answer")?;
    let q3_answer = required("q3_answer")?;
    let analysis_log = obj.remove("analysis_log").and_then(section_text);

    Ok(GeneratedEssay {
        q1_answer,
        q2_answer,
        q3_answer,
        analysis_log,
    })
}

fn section_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(section_text)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        other => Some(other.to_string()),
    }
}

/// Grammar-only correction. Any failure, or a result that drifts too far in
/// length, returns the essay unchanged.
async fn grammar_pass(llm: &LlmClient, essay: GeneratedEssay) -> GeneratedEssay {
    let essay_json = match serde_json::to_string_pretty(&essay) {
        Ok(json) => json,
        Err(e) => {
            warn!("Grammar pass skipped: {e}");
            return essay;
        }
    };
    let request = LlmRequest::new(fill_slots(
        GRAMMAR_PROMPT_TEMPLATE,
        &[("essay_json", essay_json.as_str())],
    ))
    .with_system(GRAMMAR_SYSTEM)
    .with_schema(essay_schema())
    .with_temperature(GRAMMAR_TEMPERATURE);

    let corrected = match llm.call_json_value(&request).await {
        Ok(value) => normalize_response(value),
        Err(e) => Err(e.into()),
    };
    match corrected {
        Ok(mut corrected) => {
            let before = essay.total_chars() as f64;
            let after = corrected.total_chars() as f64;
            if before > 0.0 && ((after - before).abs() / before) > GRAMMAR_MAX_DRIFT {
                warn!("Grammar pass changed length from {before} to {after}, discarding");
                return essay;
            }
            corrected.analysis_log = essay.analysis_log;
            corrected
        }
        Err(e) => {
            warn!("Grammar pass failed, keeping uncorrected essay: {e}");
            essay
        }
    }
}
