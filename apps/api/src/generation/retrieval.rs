//! Two-stage nearest-neighbour search over the exemplar store.
//!
//! Broad retrieval samples the general register of the corpus with a fixed
//! query; targeted retrieval finds exemplars close to this applicant's course
//! and motivation. Both clamp `k` to the corpus size.

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::profile::UserProfile;
use crate::store::{ExemplarChunk, ExemplarStore};
use crate::text::{char_len, truncate_chars};

pub const BROAD_QUERY: &str = "personal statement motivation academic";
pub const EXEMPLAR_SEPARATOR: &str = "\n\n---EXEMPLAR---\n\n";
/// Characters of motivation text used in the targeted query.
const MOTIVATION_QUERY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct RetrievalSettings {
    pub broad_cap: usize,
    pub targeted_cap: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            broad_cap: 50,
            targeted_cap: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedContext {
    pub broad: Vec<ExemplarChunk>,
    pub targeted: Vec<ExemplarChunk>,
}

impl RetrievedContext {
    /// Targeted chunks first, then broad chunks not already included, joined
    /// with exemplar separators and cut to `char_budget` characters.
    pub fn exemplar_text(&self, char_budget: usize) -> String {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut out = String::new();
        let mut used = 0usize;

        for chunk in self.targeted.iter().chain(&self.broad) {
            if !seen.insert(chunk.id) {
                continue;
            }
            if used >= char_budget {
                break;
            }
            if !out.is_empty() {
                out.push_str(EXEMPLAR_SEPARATOR);
                used += char_len(EXEMPLAR_SEPARATOR);
            }
            out.push_str(&chunk.text);
            used += char_len(&chunk.text);
        }

        truncate_chars(&out, char_budget).to_string()
    }
}

pub fn targeted_query(profile: &UserProfile) -> String {
    format!(
        "{} {}",
        profile.target_course.trim(),
        truncate_chars(profile.motivation_text.trim(), MOTIVATION_QUERY_CHARS)
    )
}

pub async fn retrieve_for_generation(
    store: &ExemplarStore,
    profile: &UserProfile,
    settings: RetrievalSettings,
) -> Result<RetrievedContext, AppError> {
    let count = store.count().await?;
    if count == 0 {
        return Err(AppError::EmptyCorpus);
    }

    let broad = store
        .search(BROAD_QUERY, count.min(settings.broad_cap))
        .await?;
    let targeted = store
        .search(&targeted_query(profile), count.min(settings.targeted_cap))
        .await?;

    info!(
        "Retrieved {} broad and {} targeted exemplar chunks from {count}",
        broad.len(),
        targeted.len()
    );
    Ok(RetrievedContext { broad, targeted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{chunk, open_temp_store};

    fn profile() -> UserProfile {
        UserProfile {
            target_course: "Law".into(),
            motivation_text: "Contract disputes in small claims court".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_store_is_empty_corpus_error() {
        let (_dir, store) = open_temp_store().await;
        let err = retrieve_for_generation(&store, &profile(), RetrievalSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyCorpus));
    }

    #[tokio::test]
    async fn test_caps_are_clamped_to_corpus_size() {
        let (_dir, store) = open_temp_store().await;
        store
            .add(vec![
                chunk("Contract law and small claims court", "a", 0),
                chunk("Enzyme kinetics", "b", 0),
                chunk("A personal statement about academic motivation", "c", 0),
            ])
            .await
            .unwrap();

        let ctx = retrieve_for_generation(&store, &profile(), RetrievalSettings::default())
            .await
            .unwrap();
        assert_eq!(ctx.broad.len(), 3);
        assert_eq!(ctx.targeted.len(), 3);
        assert_eq!(ctx.targeted[0].text, "Contract law and small claims court");

        let narrow = retrieve_for_generation(
            &store,
            &profile(),
            RetrievalSettings {
                broad_cap: 1,
                targeted_cap: 2,
            },
        )
        .await
        .unwrap();
        assert_eq!(narrow.broad.len(), 1);
        assert_eq!(narrow.targeted.len(), 2);
    }

    #[tokio::test]
    async fn test_exemplar_text_dedups_and_respects_budget() {
        let (_dir, store) = open_temp_store().await;
        store
            .add(vec![chunk("alpha", "a", 0), chunk("beta", "b", 0)])
            .await
            .unwrap();
        let ctx = retrieve_for_generation(&store, &profile(), RetrievalSettings::default())
            .await
            .unwrap();

        let text = ctx.exemplar_text(10_000);
        assert_eq!(text.matches("---EXEMPLAR---").count(), 1);
        assert!(text.contains("alpha") && text.contains("beta"));
        assert_eq!(char_len(&ctx.exemplar_text(3)), 3);
    }

    #[test]
    fn test_targeted_query_truncates_motivation() {
        let mut p = profile();
        p.motivation_text = "m".repeat(900);
        let q = targeted_query(&p);
        assert_eq!(q.len(), "Law ".len() + 500);
    }
}
