//! Length policy: per-section character targets and the hard ceiling.
//!
//! UCAS counts characters including spaces, so everything here counts `char`s.

use serde::Serialize;

use crate::blueprint::StructureProportions;
use crate::generation::generator::GeneratedEssay;
use crate::text::{char_len, truncate_chars};

/// Width of each section's target range around its centre.
const RANGE_TOLERANCE: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LengthRange {
    pub target: usize,
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionTargets {
    pub q1: LengthRange,
    pub q2: LengthRange,
    pub q3: LengthRange,
}

impl SectionTargets {
    pub fn prompt_text(&self) -> String {
        [("Q1 (Motivation)", self.q1), ("Q2 (Academics)", self.q2), ("Q3 (Activities)", self.q3)]
            .iter()
            .map(|(label, r)| format!("- {label}: {} - {} characters", r.min, r.max))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Clamps negative or non-finite shares to zero and rescales to sum to 100.
/// All-zero input yields the default 20/25/55 split.
pub fn normalize_proportions(p: StructureProportions) -> StructureProportions {
    let clean = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
    let (q1, q2, q3) = (clean(p.q1), clean(p.q2), clean(p.q3));
    let sum = q1 + q2 + q3;
    if sum <= 0.0 {
        return StructureProportions::default();
    }
    StructureProportions {
        q1: q1 * 100.0 / sum,
        q2: q2 * 100.0 / sum,
        q3: q3 * 100.0 / sum,
    }
}

pub fn section_targets(p: StructureProportions, total_target: usize) -> SectionTargets {
    let p = normalize_proportions(p);
    let range = |share: f64| {
        let target = (total_target as f64 * share / 100.0).round();
        LengthRange {
            target: target as usize,
            min: (target * (1.0 - RANGE_TOLERANCE)).round() as usize,
            max: (target * (1.0 + RANGE_TOLERANCE)).round() as usize,
        }
    };
    SectionTargets {
        q1: range(p.q1),
        q2: range(p.q2),
        q3: range(p.q3),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LengthPolicy {
    /// Essays longer than this in total are cut.
    pub hard_upper_bound: usize,
    /// Total the cut aims for.
    pub truncation_target: usize,
}

impl Default for LengthPolicy {
    fn default() -> Self {
        Self {
            hard_upper_bound: 4200,
            truncation_target: 3950,
        }
    }
}

/// Cuts every section proportionally when the essay exceeds the hard bound.
/// Returns whether anything was cut.
pub fn enforce_length(essay: &mut GeneratedEssay, policy: LengthPolicy) -> bool {
    let total = essay.total_chars();
    if total <= policy.hard_upper_bound {
        return false;
    }

    for section in [&mut essay.q1_answer, &mut essay.q2_answer, &mut essay.q3_answer] {
        let len = char_len(section);
        let allotment = len * policy.truncation_target / total;
        if len > allotment {
            *section = cut_section(section, allotment);
        }
    }
    tracing::info!(
        "Essay cut from {total} to {} characters",
        essay.total_chars()
    );
    true
}

/// Cuts at the last sentence end inside the allotment if that keeps at least
/// half of it; otherwise a hard cut.
fn cut_section(text: &str, allotment: usize) -> String {
    let prefix = truncate_chars(text, allotment);
    let sentence_end = prefix
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(b, c)| b + c.len_utf8())
        .last();

    match sentence_end {
        Some(end) if char_len(&prefix[..end]) * 2 >= allotment => {
            prefix[..end].trim_end().to_string()
        }
        _ => prefix.trim_end().to_string(),
    }
}
