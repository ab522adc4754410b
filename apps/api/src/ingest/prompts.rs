// Ingestion-time enrichment prompt.

/// Replace `{essay}` before sending.
pub const ENRICHMENT_PROMPT_TEMPLATE: &str = r#"Analyze this UCAS personal statement.
Extract its structural blueprint (for example: Hook -> Academic Evidence -> Supercurricular -> Conclusion) and its key themes.
Output a brief five-sentence summary of why this essay works. Plain prose, no markdown.

ESSAY TEXT:
{essay}
"#;

/// Maximum essay characters sent for enrichment.
pub const ENRICHMENT_INPUT_LIMIT: usize = 8000;

/// Prepends the annotation to the original text. The original text is kept whole.
pub fn enriched_text(annotation: &str, original: &str) -> String {
    format!(
        "[AI ANALYSIS: {}]\n\n[ORIGINAL TEXT START]\n{original}",
        annotation.trim()
    )
}
