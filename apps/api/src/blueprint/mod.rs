//! Style Blueprint: the reusable style summary derived from the whole corpus.
//!
//! The blueprint is replaced wholesale on every analysis and persisted as one
//! JSON file. Files written by older releases used PascalCase keys
//! (`Structure_Blueprint`, `Style_Bible`, `_metadata`, ...) and sometimes a keyed
//! object for `Anti_Patterns`; both are read through `RawBlueprint` and always
//! written back in the canonical snake_case form.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod analyzer;
pub mod handlers;
pub mod prompts;

pub const SCHEMA_VERSION: u32 = 1;

/// Q1/Q2/Q3 share of the statement, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureProportions {
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,
}

impl Default for StructureProportions {
    fn default() -> Self {
        Self {
            q1: 20.0,
            q2: 25.0,
            q3: 55.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SectionTones {
    pub q1: String,
    pub q2: String,
    pub q3: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlueprintMetadata {
    /// Monotonically increasing per successful analysis; 0 for the built-in default.
    pub revision: u64,
    pub analyzed_chunk_count: usize,
    /// RFC 3339 timestamp of the analysis. Legacy files may hold free-form dates.
    pub analysis_timestamp: String,
    pub model_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBlueprint")]
pub struct StyleBlueprint {
    pub schema_version: u32,
    pub structure_proportions: StructureProportions,
    pub vocabulary_bank: Vec<String>,
    pub sentence_templates: Vec<String>,
    pub narrative_archetypes: Vec<String>,
    pub section_tones: SectionTones,
    pub style_rules: Vec<String>,
    pub anti_patterns: Vec<String>,
    pub metadata: BlueprintMetadata,
}

impl Default for StyleBlueprint {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            structure_proportions: StructureProportions::default(),
            vocabulary_bank: Vec::new(),
            sentence_templates: Vec::new(),
            narrative_archetypes: Vec::new(),
            section_tones: SectionTones::default(),
            style_rules: Vec::new(),
            anti_patterns: Vec::new(),
            metadata: BlueprintMetadata::default(),
        }
    }
}

impl StyleBlueprint {
    /// The blueprint rendered as prompt context. Lists are capped so a large
    /// analysis cannot crowd the exemplars out of the prompt.
    pub fn prompt_summary(&self) -> String {
        let p = &self.structure_proportions;
        let mut out = format!(
            "Structure: Q1 {:.0}%, Q2 {:.0}%, Q3 {:.0}%\n",
            p.q1, p.q2, p.q3
        );
        push_list(&mut out, "Vocabulary", &self.vocabulary_bank, 15);
        push_list(&mut out, "Sentence templates", &self.sentence_templates, 5);
        push_list(&mut out, "Narrative arcs", &self.narrative_archetypes, 3);
        push_list(&mut out, "Style rules", &self.style_rules, 10);

        let tones = &self.section_tones;
        for (label, tone) in [("Q1", &tones.q1), ("Q2", &tones.q2), ("Q3", &tones.q3)] {
            if !tone.is_empty() {
                out.push_str(&format!("{label} tone: {tone}\n"));
            }
        }
        out
    }
}

fn push_list(out: &mut String, label: &str, items: &[String], cap: usize) {
    if items.is_empty() {
        return;
    }
    let shown: Vec<&str> = items.iter().take(cap).map(String::as_str).collect();
    out.push_str(&format!("{label}: {}\n", shown.join("; ")));
}

// ────────────────────────────────────────────────────────────────────────────
// Compatibility shim
// ────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawBlueprint {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    #[serde(default, alias = "Structure_Blueprint")]
    structure_proportions: Option<RawProportions>,
    #[serde(default, alias = "Vocabulary_Bank")]
    vocabulary_bank: Vec<String>,
    #[serde(default, alias = "Sentence_Templates")]
    sentence_templates: Vec<String>,
    #[serde(default, alias = "Narrative_Archetypes")]
    narrative_archetypes: Vec<String>,
    #[serde(default, alias = "Section_Tone")]
    section_tones: RawTones,
    #[serde(default, alias = "Style_Bible")]
    style_rules: Vec<String>,
    #[serde(default, alias = "Anti_Patterns")]
    anti_patterns: Option<RawAntiPatterns>,
    #[serde(default, alias = "_metadata")]
    metadata: RawMetadata,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Deserialize)]
struct RawProportions {
    #[serde(alias = "Q1_percentage")]
    q1: Option<f64>,
    #[serde(alias = "Q2_percentage")]
    q2: Option<f64>,
    #[serde(alias = "Q3_percentage")]
    q3: Option<f64>,
}

#[derive(Default, Deserialize)]
struct RawTones {
    #[serde(default, alias = "Q1_tone")]
    q1: String,
    #[serde(default, alias = "Q2_tone")]
    q2: String,
    #[serde(default, alias = "Q3_tone")]
    q3: String,
}

/// Anti-patterns arrive either as a plain list or keyed by category.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAntiPatterns {
    List(Vec<String>),
    Keyed(BTreeMap<String, Vec<String>>),
}

#[derive(Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    revision: u64,
    #[serde(default, alias = "analyzed_chunks")]
    analyzed_chunk_count: usize,
    #[serde(default, alias = "analysis_date")]
    analysis_timestamp: String,
    #[serde(default, alias = "model_used")]
    model_version: String,
}

impl From<RawBlueprint> for StyleBlueprint {
    fn from(raw: RawBlueprint) -> Self {
        let defaults = StructureProportions::default();
        let structure_proportions = raw
            .structure_proportions
            .map(|p| StructureProportions {
                q1: p.q1.unwrap_or(defaults.q1),
                q2: p.q2.unwrap_or(defaults.q2),
                q3: p.q3.unwrap_or(defaults.q3),
            })
            .unwrap_or(defaults);

        let anti_patterns = match raw.anti_patterns {
            Some(RawAntiPatterns::List(items)) => items,
            Some(RawAntiPatterns::Keyed(groups)) => groups.into_values().flatten().collect(),
            None => Vec::new(),
        };

        StyleBlueprint {
            schema_version: raw.schema_version,
            structure_proportions,
            vocabulary_bank: raw.vocabulary_bank,
            sentence_templates: raw.sentence_templates,
            narrative_archetypes: raw.narrative_archetypes,
            section_tones: SectionTones {
                q1: raw.section_tones.q1,
                q2: raw.section_tones.q2,
                q3: raw.section_tones.q3,
            },
            style_rules: raw.style_rules,
            anti_patterns,
            metadata: BlueprintMetadata {
                revision: raw.metadata.revision,
                analyzed_chunk_count: raw.metadata.analyzed_chunk_count,
                analysis_timestamp: raw.metadata.analysis_timestamp,
                model_version: raw.metadata.model_version,
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Persistence
// ────────────────────────────────────────────────────────────────────────────

/// Reads and atomically replaces the blueprint file.
#[derive(Debug, Clone)]
pub struct BlueprintRepository {
    path: PathBuf,
}

impl BlueprintRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `None` when the file is missing, unreadable or not a blueprint object.
    pub async fn load(&self) -> Option<StyleBlueprint> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read blueprint at {}: {e}", self.path.display());
                return None;
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Blueprint at {} is not valid JSON: {e}", self.path.display());
                return None;
            }
        };
        if !value.is_object() {
            warn!(
                "Blueprint at {} is not a JSON object, ignoring",
                self.path.display()
            );
            return None;
        }
        match serde_json::from_value(value) {
            Ok(blueprint) => Some(blueprint),
            Err(e) => {
                warn!("Blueprint at {} has an unexpected shape: {e}", self.path.display());
                None
            }
        }
    }

    pub async fn load_or_default(&self) -> StyleBlueprint {
        match self.load().await {
            Some(blueprint) => blueprint,
            None => {
                info!("No usable blueprint, falling back to default proportions");
                StyleBlueprint::default()
            }
        }
    }

    /// Writes to a temp file in the same directory, fsyncs, then renames over the
    /// target, so readers see either the old blueprint or the new one.
    pub async fn save(&self, blueprint: &StyleBlueprint) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(blueprint)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating blueprint directory {}", dir.display()))?;

            let mut tmp = tempfile::NamedTempFile::new_in(&dir)
                .context("creating temporary blueprint file")?;
            tmp.write_all(&json)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path)
                .with_context(|| format!("replacing blueprint at {}", path.display()))?;
            Ok(())
        })
        .await
        .context("blueprint writer task panicked")??;

        info!(
            "Blueprint revision {} saved to {}",
            blueprint.metadata.revision,
            self.path.display()
        );
        Ok(())
    }
}
