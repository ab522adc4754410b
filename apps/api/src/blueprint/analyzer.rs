//! Corpus Analyzer — summarizes the entire exemplar store into a Style Blueprint.
//!
//! Flow: count → read every chunk → bounded corpus → one low-temperature model
//! call → strict parse → stamp metadata → atomic save.
//!
//! A failed analysis never touches the existing blueprint file.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::blueprint::prompts::{analysis_schema, ANALYSIS_PROMPT_TEMPLATE, ESSAY_BOUNDARY};
use crate::blueprint::{
    BlueprintMetadata, BlueprintRepository, SectionTones, StructureProportions, StyleBlueprint,
    SCHEMA_VERSION,
};
use crate::errors::AppError;
use crate::llm_client::prompts::{fill_slots, JSON_ONLY_SYSTEM};
use crate::llm_client::{LlmClient, LlmRequest};
use crate::store::{ExemplarChunk, ExemplarStore};
use crate::text::{char_len, truncate_chars};

const ANALYSIS_TEMPERATURE: f32 = 0.2;

/// Runs a full corpus analysis and persists the resulting blueprint.
pub async fn analyze_corpus(
    store: &ExemplarStore,
    llm: Option<&LlmClient>,
    repo: &BlueprintRepository,
    char_budget: usize,
) -> Result<StyleBlueprint, AppError> {
    if store.count().await? == 0 {
        return Err(AppError::EmptyCorpus);
    }
    let llm = llm.ok_or_else(|| {
        AppError::Configuration("GEMINI_API_KEY is not set; corpus analysis needs a model".into())
    })?;

    let chunks = store.get_all().await?;
    let (corpus, included) = build_corpus(&chunks, char_budget);
    info!(
        "Analyzing {included} of {} chunks ({} chars)",
        chunks.len(),
        char_len(&corpus)
    );

    let chunk_count = included.to_string();
    let prompt = fill_slots(
        ANALYSIS_PROMPT_TEMPLATE,
        &[
            ("chunk_count", chunk_count.as_str()),
            ("excerpts", corpus.as_str()),
        ],
    );
    let request = LlmRequest::new(prompt)
        .with_system(JSON_ONLY_SYSTEM)
        .with_schema(analysis_schema())
        .with_temperature(ANALYSIS_TEMPERATURE);

    let value = llm.call_json_value(&request).await?;
    let mut blueprint = parse_blueprint(value)?;

    let previous_revision = repo
        .load()
        .await
        .map(|bp| bp.metadata.revision)
        .unwrap_or(0);
    blueprint.schema_version = SCHEMA_VERSION;
    blueprint.metadata = BlueprintMetadata {
        revision: previous_revision + 1,
        analyzed_chunk_count: included,
        analysis_timestamp: Utc::now().to_rfc3339(),
        model_version: llm.model_id().to_string(),
    };

    repo.save(&blueprint)
        .await
        .map_err(|e| AppError::BlueprintWrite(format!("{e:#}")))?;
    Ok(blueprint)
}

/// Joins chunks with boundary markers up to `budget` characters.
/// Returns the corpus and how many chunks contributed to it.
fn build_corpus(chunks: &[ExemplarChunk], budget: usize) -> (String, usize) {
    let mut corpus = String::new();
    let mut used = 0usize;
    let mut included = 0usize;

    for chunk in chunks {
        if used >= budget {
            break;
        }
        if included > 0 {
            corpus.push_str(ESSAY_BOUNDARY);
            used += char_len(ESSAY_BOUNDARY);
            if used >= budget {
                break;
            }
        }
        corpus.push_str(&chunk.text);
        used += char_len(&chunk.text);
        included += 1;
    }

    let corpus = truncate_chars(&corpus, budget).to_string();
    (corpus, included)
}

/// Model output as the analysis schema requires it. No field is defaulted:
/// a missing or null required key is a parse error, never a guessed value.
#[derive(Deserialize)]
struct AnalysisOutput {
    structure_proportions: StructureProportions,
    vocabulary_bank: Vec<String>,
    sentence_templates: Vec<String>,
    narrative_archetypes: Option<Vec<String>>,
    section_tones: Option<AnalysisTones>,
    style_rules: Vec<String>,
    anti_patterns: Vec<String>,
}

#[derive(Deserialize)]
struct AnalysisTones {
    q1: Option<String>,
    q2: Option<String>,
    q3: Option<String>,
}

fn parse_blueprint(value: Value) -> Result<StyleBlueprint, AppError> {
    let output: AnalysisOutput = serde_json::from_value(value).map_err(|e| {
        AppError::Parse(format!("analysis output does not match the blueprint schema: {e}"))
    })?;

    let p = output.structure_proportions;
    let shares = [p.q1, p.q2, p.q3];
    if shares.iter().any(|v| !v.is_finite() || *v < 0.0) || shares.iter().sum::<f64>() <= 0.0 {
        return Err(AppError::Parse(format!(
            "structure proportions are unusable: {shares:?}"
        )));
    }

    let tones = output.section_tones.map_or_else(SectionTones::default, |t| SectionTones {
        q1: t.q1.unwrap_or_default(),
        q2: t.q2.unwrap_or_default(),
        q3: t.q3.unwrap_or_default(),
    });

    Ok(StyleBlueprint {
        schema_version: SCHEMA_VERSION,
        structure_proportions: p,
        vocabulary_bank: output.vocabulary_bank,
        sentence_templates: output.sentence_templates,
        narrative_archetypes: output.narrative_archetypes.unwrap_or_default(),
        section_tones: tones,
        style_rules: output.style_rules,
        anti_patterns: output.anti_patterns,
        metadata: BlueprintMetadata::default(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm_client::testing::{client_for, ScriptedProvider};
    use crate::store::test_support::{chunk, open_temp_store};

    const MODEL_BLUEPRINT: &str = r#"{
        "structure_proportions": {"q1": 25, "q2": 35, "q3": 40},
        "vocabulary_bank": ["scrutinised"],
        "sentence_templates": ["I expected [X]; the data showed [Y]."],
        "style_rules": ["Start with I"],
        "anti_patterns": ["Never summarise a lesson"]
    }"#;

    #[tokio::test]
    async fn test_empty_store_leaves_blueprint_untouched() {
        let (dir, store) = open_temp_store().await;
        let path = dir.path().join("style_blueprint.json");
        std::fs::write(&path, r#"{"schema_version": 1, "metadata": {"revision": 7}}"#).unwrap();
        let before = std::fs::read(&path).unwrap();

        let provider = Arc::new(ScriptedProvider::always(MODEL_BLUEPRINT));
        let client = client_for(provider.clone());
        let repo = BlueprintRepository::new(&path);

        let err = analyze_corpus(&store, Some(&client), &repo, 25_000)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyCorpus));
        assert_eq!(provider.calls(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_credential_is_configuration_error() {
        let (dir, store) = open_temp_store().await;
        store.add(vec![chunk("Some essay.", "a", 0)]).await.unwrap();
        let repo = BlueprintRepository::new(dir.path().join("bp.json"));

        let err = analyze_corpus(&store, None, &repo, 25_000)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_successful_analysis_increments_revision() {
        let (dir, store) = open_temp_store().await;
        store
            .add(vec![chunk("First essay.", "a", 0), chunk("Second essay.", "b", 0)])
            .await
            .unwrap();
        let provider = Arc::new(ScriptedProvider::always(MODEL_BLUEPRINT));
        let client = client_for(provider.clone());
        let repo = BlueprintRepository::new(dir.path().join("bp.json"));

        let first = analyze_corpus(&store, Some(&client), &repo, 25_000)
            .await
            .unwrap();
        assert_eq!(first.metadata.revision, 1);
        assert_eq!(first.metadata.analyzed_chunk_count, 2);
        assert_eq!(first.metadata.model_version, "scripted-test-model");
        assert_eq!(first.structure_proportions.q2, 35.0);

        let second = analyze_corpus(&store, Some(&client), &repo, 25_000)
            .await
            .unwrap();
        assert_eq!(second.metadata.revision, 2);
        assert_eq!(repo.load().await.unwrap().metadata.revision, 2);

        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("===ESSAY BOUNDARY==="));
    }

    #[tokio::test]
    async fn test_malformed_output_is_parse_error_and_not_saved() {
        let (dir, store) = open_temp_store().await;
        store.add(vec![chunk("Essay.", "a", 0)]).await.unwrap();
        let provider = Arc::new(ScriptedProvider::always("Here is my analysis of the essays."));
        let client = client_for(provider);
        let repo = BlueprintRepository::new(dir.path().join("bp.json"));

        let err = analyze_corpus(&store, Some(&client), &repo, 25_000)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
        assert!(!dir.path().join("bp.json").exists());
    }

    #[tokio::test]
    async fn test_incomplete_output_keeps_previous_blueprint() {
        let (dir, store) = open_temp_store().await;
        store.add(vec![chunk("Essay.", "a", 0)]).await.unwrap();
        let repo = BlueprintRepository::new(dir.path().join("bp.json"));

        let mut previous = StyleBlueprint::default();
        previous.structure_proportions.q1 = 35.0;
        previous.vocabulary_bank = vec!["scrutinised".to_string()];
        previous.metadata.revision = 4;
        repo.save(&previous).await.unwrap();
        let before = std::fs::read(dir.path().join("bp.json")).unwrap();

        let incomplete = [
            r#"{"structure_proportions": null}"#,
            r#"{"structure_proportions": {"q1": 20, "q2": 30}, "vocabulary_bank": [],
                "sentence_templates": [], "style_rules": [], "anti_patterns": []}"#,
            r#"{"structure_proportions": {"q1": 20, "q2": 30, "q3": 50},
                "vocabulary_bank": ["x"], "sentence_templates": [], "style_rules": []}"#,
            r#"{"structure_proportions": {"q1": 0, "q2": 0, "q3": 0}, "vocabulary_bank": [],
                "sentence_templates": [], "style_rules": [], "anti_patterns": []}"#,
        ];
        for output in incomplete {
            let client = client_for(Arc::new(ScriptedProvider::always(output)));
            let err = analyze_corpus(&store, Some(&client), &repo, 25_000)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Parse(_)), "{output}: {err:?}");
        }

        assert_eq!(std::fs::read(dir.path().join("bp.json")).unwrap(), before);
        let kept = repo.load().await.unwrap();
        assert_eq!(kept.metadata.revision, 4);
        assert_eq!(kept.vocabulary_bank, vec!["scrutinised"]);
    }

    #[tokio::test]
    async fn test_unwritable_blueprint_path_is_typed_error() {
        let (dir, store) = open_temp_store().await;
        store.add(vec![chunk("Essay.", "a", 0)]).await.unwrap();
        // A regular file where the blueprint directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let repo = BlueprintRepository::new(blocker.join("bp.json"));
        let client = client_for(Arc::new(ScriptedProvider::always(MODEL_BLUEPRINT)));

        let err = analyze_corpus(&store, Some(&client), &repo, 25_000)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BlueprintWrite(_)), "{err:?}");
    }

    #[test]
    fn test_corpus_respects_budget() {
        let chunks: Vec<ExemplarChunk> = (0..10)
            .map(|i| ExemplarChunk {
                id: uuid::Uuid::new_v4(),
                text: "x".repeat(100),
                source_document: format!("doc{i}"),
                embedding: Vec::new(),
                offset: crate::store::ChunkOffset {
                    start_index: 0,
                    chunk_index: 0,
                },
            })
            .collect();
        let (corpus, included) = build_corpus(&chunks, 250);
        assert_eq!(char_len(&corpus), 250);
        assert_eq!(included, 3);
    }
}
