// All LLM prompt constants for the Generation module.
// Reuses cross-cutting fragments from llm_client::prompts.

use std::path::Path;

use anyhow::Context;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::blueprint::StyleBlueprint;
use crate::llm_client::prompts::{fill_slots, HUMAN_VOICE_INSTRUCTION};
use crate::quality::lexicon::{BANNED_PHRASES, BANNED_WORDS, PROMPT_ONLY_BANNED};

/// Slots every generation template is expected to contain.
pub const TEMPLATE_SLOTS: [&str; 5] = [
    "exemplars",
    "profile",
    "blueprint",
    "banned_terms",
    "length_targets",
];

pub const GENERATION_SYSTEM: &str = "You are a ghostwriter for UCAS personal statements. \
    You mirror the sentence structure of the exemplars you are given, never their content. \
    You MUST respond with valid JSON only.";

/// Built-in generation template. Replaceable at startup via `PROMPT_TEMPLATE_PATH`.
pub const DEFAULT_GENERATION_TEMPLATE: &str = r#"INPUT 1: EXEMPLARS (adhere to this voice and sentence structure)
{exemplars}

INPUT 2: APPLICANT NOTES (the only source of facts)
{profile}

INPUT 3: STYLE BLUEPRINT
{blueprint}

RULES:
1. No meta-commentary. Never explain what an experience taught you; tell what happened.
2. Do not open sentences with "My passion", "My interest" or "My EPQ". Start with I.
3. No lists of three. Say "X and Y".
4. Include at least one setback: something that failed, the mistake, and what you revised.
5. Name things. Books, authors, institutions, tools and places, spelled properly.

LENGTH (characters including spaces, per section):
{length_targets}

BANNED (never use these words or phrases, in any form):
{banned_terms}

OUTPUT: a JSON object with keys q1_answer (motivation), q2_answer (academic preparation)
and q3_answer (activities outside the classroom). Plain text inside each value, no markdown.
"#;

/// Sent as the user turn; the template carries the material.
pub const GENERATION_USER_SUFFIX: &str =
    "Write the statement now. Follow the structural mirroring rules.";

pub const GRAMMAR_SYSTEM: &str = "You are a copy editor. Fix spelling, grammar and punctuation only. \
    Do not change word choice, sentence order, tone or content. \
    Use British English spelling. You MUST respond with valid JSON only.";

/// Replace `{essay_json}` before sending.
pub const GRAMMAR_PROMPT_TEMPLATE: &str = r#"Correct grammar and spelling in each field of this JSON object.
Return the same keys. Leave every sentence that is already correct exactly as it is.

{essay_json}
"#;

pub const CLONE_SYSTEM: &str = "You are a structure cloner for UCAS personal statements. \
    Respond with the essay text only, no headings and no markdown.";

/// Replace `{subject}` and `{exemplar}` before sending.
pub const CLONE_PROMPT_TEMPLATE: &str = r#"Rewrite this exemplar essay for a student applying to {subject}.

RULES:
1. Keep the exact sentence structure: same sentence lengths, same paragraph breaks.
2. Keep the scene logic: constraint, then failure, then iteration, then result.
3. Keep the emotional arc: the same struggles and the same moments of growth.
4. Change only the content. Swap the concepts, projects and books for ones that fit {subject}.

EXEMPLAR ESSAY:
{exemplar}
"#;

/// Response schema shared by the generation and grammar calls.
pub fn essay_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "q1_answer": {"type": "STRING", "description": "Motivation"},
            "q2_answer": {"type": "STRING", "description": "Academic preparation"},
            "q3_answer": {"type": "STRING", "description": "Activities outside the classroom"},
            "analysis_log": {"type": "STRING", "description": "Optional planning notes"}
        },
        "required": ["q1_answer", "q2_answer", "q3_answer"]
    })
}

/// Static banned words and phrases plus the blueprint's anti-patterns,
/// deduplicated case-insensitively in first-seen order.
pub fn banned_terms(blueprint: &StyleBlueprint) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    BANNED_WORDS
        .iter()
        .chain(BANNED_PHRASES)
        .chain(PROMPT_ONLY_BANNED)
        .map(|s| s.to_string())
        .chain(blueprint.anti_patterns.iter().cloned())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}

/// Values for one rendering of the generation template.
pub struct GenerationSlots<'a> {
    pub exemplars: &'a str,
    pub profile: &'a str,
    pub blueprint: &'a str,
    pub banned_terms: &'a str,
    pub length_targets: &'a str,
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_GENERATION_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn from_text(text: impl Into<String>) -> Self {
        let template = Self { text: text.into() };
        let missing = template.missing_slots();
        if !missing.is_empty() {
            warn!("Generation template is missing slots: {}", missing.join(", "));
        }
        template
    }

    /// Loads the template file if one is configured, otherwise the built-in template.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading prompt template {}", path.display()))?;
                info!("Loaded generation template from {}", path.display());
                Ok(Self::from_text(text))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn missing_slots(&self) -> Vec<&'static str> {
        TEMPLATE_SLOTS
            .iter()
            .copied()
            .filter(|slot| !self.text.contains(&format!("{{{slot}}}")))
            .collect()
    }

    pub fn render(&self, slots: &GenerationSlots<'_>) -> String {
        let filled = fill_slots(
            &self.text,
            &[
                ("exemplars", slots.exemplars),
                ("profile", slots.profile),
                ("blueprint", slots.blueprint),
                ("banned_terms", slots.banned_terms),
                ("length_targets", slots.length_targets),
            ],
        );
        format!("{filled}\n{HUMAN_VOICE_INSTRUCTION}\n\n{GENERATION_USER_SUFFIX}")
    }
}
