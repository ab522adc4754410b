// Corpus analysis prompt and its structured-output schema.

use serde_json::{json, Value};

/// Separator between chunks in the analysis corpus.
pub const ESSAY_BOUNDARY: &str = "\n\n===ESSAY BOUNDARY===\n\n";

/// Analysis prompt. Replace `{chunk_count}` and `{excerpts}` before sending.
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze these {chunk_count} personal statement excerpts.
Reverse-engineer the writers' shared linguistic fingerprint.

Return a JSON object with this EXACT schema:
{
  "structure_proportions": {"q1": <percent>, "q2": <percent>, "q3": <percent>},
  "vocabulary_bank": ["50+ specific words these writers use. No generic words."],
  "sentence_templates": ["15+ fill-in structures, e.g. 'While I initially thought [X], I soon realised [Y]...'"],
  "narrative_archetypes": ["3 abstract storytelling arcs found in the essays"],
  "section_tones": {"q1": "...", "q2": "...", "q3": "..."},
  "style_rules": ["Rule 1: <strict writing rule>"],
  "anti_patterns": ["things these essays never do"]
}

q1 is the motivation section, q2 academic preparation, q3 activities outside the classroom.
The three percentages must sum to 100.

ESSAY EXCERPTS:
{excerpts}
"#;

/// Gemini response schema for the analysis call.
pub fn analysis_schema() -> Value {
    let string_list = json!({"type": "ARRAY", "items": {"type": "STRING"}});
    json!({
        "type": "OBJECT",
        "properties": {
            "structure_proportions": {
                "type": "OBJECT",
                "properties": {
                    "q1": {"type": "NUMBER"},
                    "q2": {"type": "NUMBER"},
                    "q3": {"type": "NUMBER"}
                },
                "required": ["q1", "q2", "q3"]
            },
            "vocabulary_bank": string_list,
            "sentence_templates": string_list,
            "narrative_archetypes": string_list,
            "section_tones": {
                "type": "OBJECT",
                "properties": {
                    "q1": {"type": "STRING"},
                    "q2": {"type": "STRING"},
                    "q3": {"type": "STRING"}
                }
            },
            "style_rules": string_list,
            "anti_patterns": string_list
        },
        "required": [
            "structure_proportions",
            "vocabulary_bank",
            "sentence_templates",
            "style_rules",
            "anti_patterns"
        ]
    })
}
