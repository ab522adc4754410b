//! Synthetic Cloner — rewrites one strong exemplar for other subjects while
//! keeping its sentence structure, to widen a thin corpus.
//!
//! Calls run one at a time with a pause between them to stay under provider
//! rate limits. A failed subject is recorded and the loop moves on.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::generation::prompts::{CLONE_PROMPT_TEMPLATE, CLONE_SYSTEM};
use crate::llm_client::prompts::fill_slots;
use crate::llm_client::{LlmClient, LlmRequest};

const CLONE_TEMPERATURE: f32 = 0.6;

pub const DEFAULT_SUBJECTS: [&str; 8] = [
    "Computer Science",
    "Law",
    "Medicine",
    "Mechanical Engineering",
    "Physics",
    "Mathematics",
    "Economics",
    "PPE",
];

#[derive(Debug, Clone, Serialize)]
pub struct SyntheticOutcome {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub essay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn clone_for_subjects(
    llm: &LlmClient,
    exemplar: &str,
    subjects: &[String],
    pause: Duration,
) -> Vec<SyntheticOutcome> {
    let mut outcomes = Vec::with_capacity(subjects.len());

    for (i, subject) in subjects.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        info!("Cloning exemplar for {subject}");

        let prompt = fill_slots(
            CLONE_PROMPT_TEMPLATE,
            &[("subject", subject.as_str()), ("exemplar", exemplar)],
        );
        let request = LlmRequest::new(prompt)
            .with_system(CLONE_SYSTEM)
            .with_temperature(CLONE_TEMPERATURE);

        let outcome = match llm.call(&request).await {
            Ok(text) if !text.trim().is_empty() => SyntheticOutcome {
                subject: subject.clone(),
                essay: Some(text.trim().to_string()),
                error: None,
            },
            Ok(_) => SyntheticOutcome {
                subject: subject.clone(),
                essay: None,
                error: Some("model returned an empty essay".to_string()),
            },
            Err(e) => {
                warn!("Clone for {subject} failed: {e}");
                SyntheticOutcome {
                    subject: subject.clone(),
                    essay: None,
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    outcomes
}

/// Document name used when a synthetic essay is ingested.
pub fn synthetic_document_name(subject: &str) -> String {
    let mut slug = String::with_capacity(subject.len());
    for c in subject.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    format!("synthetic_{}.txt", slug.trim_end_matches('_'))
}
