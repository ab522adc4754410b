//! One request from applicant profile to gated draft.
//!
//! Flow: count → retrieve → load blueprint → generate → quality gate, with up
//! to `gate_regenerations` further attempts while the gate fails. The draft
//! returned is the highest-scoring attempt, together with its report.

use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::generation::generator::{generate, CharCounts, GeneratedEssay, GenerationRequest};
use crate::generation::profile::UserProfile;
use crate::generation::retrieval::retrieve_for_generation;
use crate::quality::QualityReport;
use crate::state::Context;

#[derive(Debug, Clone, Serialize)]
pub struct StatementDraft {
    pub essay: GeneratedEssay,
    pub quality: QualityReport,
    pub char_counts: CharCounts,
    pub broad_chunks: usize,
    pub targeted_chunks: usize,
    /// 0 when generation used the built-in default blueprint.
    pub blueprint_revision: u64,
    pub attempts: u32,
}

pub async fn draft_statement(
    ctx: &Context,
    profile: &UserProfile,
) -> Result<StatementDraft, AppError> {
    profile.validate()?;

    if ctx.exemplar_count().await? == 0 {
        return Err(AppError::EmptyCorpus);
    }
    let llm = ctx.llm()?;
    let store = ctx.store().await?;

    let retrieved = retrieve_for_generation(store, profile, ctx.config.retrieval_settings()).await?;
    let exemplar_text = retrieved.exemplar_text(ctx.config.exemplar_char_budget);
    let blueprint = ctx.blueprints.load_or_default().await;
    let profile_string = profile.to_prompt_string(ctx.config.cv_char_limit);

    let request = GenerationRequest {
        profile_string: &profile_string,
        exemplar_text: &exemplar_text,
        blueprint: &blueprint,
    };
    let settings = ctx.config.generation_settings();
    let max_attempts = ctx.config.gate_regenerations + 1;

    let mut best: Option<(GeneratedEssay, QualityReport)> = None;
    let mut attempts = 0;
    while attempts < max_attempts {
        attempts += 1;
        let essay = generate(llm, &ctx.template, &request, settings).await?;
        let report = ctx.gate.evaluate(&essay.combined_text());
        info!(
            "Draft attempt {attempts}/{max_attempts}: score {} (passed: {})",
            report.score, report.passed
        );

        let passed = report.passed;
        let better = best
            .as_ref()
            .map_or(true, |(_, current)| is_better(&report, current));
        if better {
            best = Some((essay, report));
        }
        if passed {
            break;
        }
        if attempts < max_attempts {
            warn!("Draft failed the quality gate, regenerating");
        }
    }

    let (essay, quality) = best.ok_or(AppError::EmptyResponse)?;
    Ok(StatementDraft {
        char_counts: essay.char_counts(),
        essay,
        quality,
        broad_chunks: retrieved.broad.len(),
        targeted_chunks: retrieved.targeted.len(),
        blueprint_revision: blueprint.metadata.revision,
        attempts,
    })
}

/// A passing report beats a failing one; otherwise the higher score wins.
fn is_better(candidate: &QualityReport, current: &QualityReport) -> bool {
    (candidate.passed, candidate.score) > (current.passed, current.score)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::ingest::{ingest_document, IngestDocument, IngestOptions};
    use crate::llm_client::testing::{client_for, ScriptedProvider};
    use crate::state::test_support::context_with;

    fn profile() -> UserProfile {
        UserProfile {
            target_course: "Economics".into(),
            motivation_text: "I want to understand why forecasts fail.".into(),
            super_curriculars: "Read Keynes and Minsky".into(),
            work_experience: "Summer at Barclays".into(),
            cv_text: None,
        }
    }

    fn section(len: usize, sentence: &str) -> String {
        sentence.repeat(len / sentence.len() + 1)[..len].to_string()
    }

    fn failing_essay() -> String {
        // Short and banned-word heavy: fails the gate.
        json!({
            "q1_answer": "I delve into markets.",
            "q2_answer": "A tapestry of ideas.",
            "q3_answer": "Pivotal moments."
        })
        .to_string()
    }

    fn long_essay() -> String {
        let s = "At the Bank of England I initially failed, found my mistake and revised the model with Dr Okafor. ";
        json!({
            "q1_answer": section(1200, s),
            "q2_answer": section(1500, s),
            "q3_answer": section(1600, s),
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_empty_corpus_then_ingest_then_generate() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::always(long_essay()));
        let ctx = context_with(dir.path(), Some(client_for(provider.clone())));

        let err = draft_statement(&ctx, &profile()).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyCorpus));
        assert_eq!(provider.calls(), 0);

        let essay = "Forecasting failed in 2008 because the models assumed house prices only rise. ".repeat(30);
        let ingested = ingest_document(
            ctx.store().await.unwrap(),
            None,
            IngestOptions {
                chunking: ctx.config.chunk_settings(),
                enrich: false,
            },
            IngestDocument {
                name: "exemplar.txt".into(),
                bytes: Bytes::from(essay),
            },
        )
        .await
        .unwrap();
        assert!(ingested.chunks_added > 0);

        let draft = draft_statement(&ctx, &profile()).await.unwrap();
        assert!(draft.char_counts.total <= 4000, "total {}", draft.char_counts.total);
        assert_eq!(draft.broad_chunks, ingested.chunks_added);
        assert_eq!(draft.blueprint_revision, 0);
        assert!(provider.prompts()[0].contains("Target Course: Economics"));
        assert!(provider.prompts()[0].contains("Forecasting failed in 2008"));
    }

    #[tokio::test]
    async fn test_failed_gate_regenerates_and_keeps_best() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(failing_essay()),
            Ok(long_essay()),
        ]));
        let ctx = context_with(dir.path(), Some(client_for(provider.clone())));
        ctx.store()
            .await
            .unwrap()
            .add(vec![crate::store::test_support::chunk("An exemplar.", "a", 0)])
            .await
            .unwrap();

        let draft = draft_statement(&ctx, &profile()).await.unwrap();
        assert_eq!(draft.attempts, 2);
        assert_eq!(provider.calls(), 2);
        assert!(!draft.essay.q1_answer.contains("delve"));
    }

    #[tokio::test]
    async fn test_missing_credential_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_with(dir.path(), None);
        ctx.store()
            .await
            .unwrap()
            .add(vec![crate::store::test_support::chunk("An exemplar.", "a", 0)])
            .await
            .unwrap();
        let err = draft_statement(&ctx, &profile()).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_passing_report_beats_higher_failing_score() {
        let report = |passed, score| QualityReport {
            passed,
            issues: vec![],
            score,
            metrics: Default::default(),
        };
        assert!(is_better(&report(true, 60), &report(false, 95)));
        assert!(is_better(&report(false, 70), &report(false, 40)));
        assert!(!is_better(&report(false, 40), &report(false, 40)));
    }
}
