//! Quality Gate — deterministic linter run on every generated essay before display.
//!
//! Scoring starts at 100 and every check deducts independently. Any banned
//! word or phrase fails the gate whatever the score. The gate never errors:
//! degenerate input produces a failing report, not an `Err`.

pub mod lexicon;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::quality::lexicon::{
    BANNED_PHRASES, BANNED_WORDS, LIST_CONNECTIVES, STRUGGLE_MARKERS,
};
use crate::text::char_len;

const BANNED_WORD_PENALTY: i32 = 5;
const BANNED_PHRASE_PENALTY: i32 = 10;
const LIST_LIKE_PENALTY: i32 = 15;
const MAX_LIST_CONNECTIVES: usize = 2;
const NO_STRUGGLE_PENALTY: i32 = 20;
const MIN_STRUGGLE_MARKERS: usize = 3;
const LOW_DENSITY_PENALTY: i32 = 10;
const MIN_PROPER_NOUNS: usize = 10;
const OVER_LIMIT_PENALTY: i32 = 50;
const TOO_SHORT_PENALTY: i32 = 10;
const PASS_SCORE: i32 = 60;

static BANNED_WORD_RES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    BANNED_WORDS
        .iter()
        .map(|w| {
            let re = Regex::new(&format!(r"(?i)\b{}\w*", regex::escape(w))).unwrap();
            (*w, re)
        })
        .collect()
});

static BANNED_PHRASE_RES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    BANNED_PHRASES
        .iter()
        .map(|p| (*p, Regex::new(&format!("(?i){}", regex::escape(p))).unwrap()))
        .collect()
});

/// Character bounds checked by the gate.
#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    /// UCAS publication limit. Exceeding it is a severe penalty.
    pub char_ceiling: usize,
    pub char_floor: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            char_ceiling: 4000,
            char_floor: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub char_count: usize,
    pub banned_word_hits: usize,
    pub banned_phrase_hits: usize,
    pub list_connectives: usize,
    pub struggle_markers: usize,
    pub proper_nouns: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub passed: bool,
    pub issues: Vec<String>,
    /// Clamped to 0..=100.
    pub score: u32,
    pub metrics: QualityMetrics,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, text: &str) -> QualityReport {
        if text.trim().is_empty() {
            return QualityReport {
                passed: false,
                issues: vec!["empty essay".to_string()],
                score: 0,
                metrics: QualityMetrics::default(),
            };
        }

        let mut issues = Vec::new();
        let mut score: i32 = 100;
        let mut banned_hit = false;
        let mut metrics = QualityMetrics {
            char_count: char_len(text),
            ..Default::default()
        };

        for (word, re) in BANNED_WORD_RES.iter() {
            let hits = re.find_iter(text).count();
            if hits > 0 {
                banned_hit = true;
                metrics.banned_word_hits += hits;
                score -= BANNED_WORD_PENALTY * hits as i32;
                issues.push(format!("Contains banned word: '{word}' ({hits}x)"));
            }
        }

        for (phrase, re) in BANNED_PHRASE_RES.iter() {
            let hits = re.find_iter(text).count();
            if hits > 0 {
                banned_hit = true;
                metrics.banned_phrase_hits += hits;
                score -= BANNED_PHRASE_PENALTY * hits as i32;
                issues.push(format!("Contains banned phrase: '{phrase}' ({hits}x)"));
            }
        }

        metrics.list_connectives = LIST_CONNECTIVES
            .iter()
            .map(|c| text.matches(c).count())
            .sum();
        if metrics.list_connectives > MAX_LIST_CONNECTIVES {
            score -= LIST_LIKE_PENALTY;
            issues.push(format!(
                "Too list-like ({} list transitions)",
                metrics.list_connectives
            ));
        }

        let lowered = text.to_lowercase();
        metrics.struggle_markers = STRUGGLE_MARKERS
            .iter()
            .filter(|m| lowered.contains(*m))
            .count();
        if metrics.struggle_markers < MIN_STRUGGLE_MARKERS {
            score -= NO_STRUGGLE_PENALTY;
            issues.push(format!(
                "Lacks narrative struggle (only {} markers)",
                metrics.struggle_markers
            ));
        }

        metrics.proper_nouns = count_proper_nouns(text);
        if metrics.proper_nouns < MIN_PROPER_NOUNS {
            score -= LOW_DENSITY_PENALTY;
            issues.push(format!(
                "Low technical density ({} proper nouns)",
                metrics.proper_nouns
            ));
        }

        if metrics.char_count > self.thresholds.char_ceiling {
            score -= OVER_LIMIT_PENALTY;
            issues.push(format!(
                "Over limit ({} chars, limit {})",
                metrics.char_count, self.thresholds.char_ceiling
            ));
        } else if metrics.char_count < self.thresholds.char_floor {
            score -= TOO_SHORT_PENALTY;
            issues.push(format!(
                "Too short ({} chars, minimum {})",
                metrics.char_count, self.thresholds.char_floor
            ));
        }

        QualityReport {
            passed: score >= PASS_SCORE && !banned_hit,
            issues,
            score: score.clamp(0, 100) as u32,
            metrics,
        }
    }
}

/// Capitalized tokens that do not open a sentence.
fn count_proper_nouns(text: &str) -> usize {
    let mut previous: Option<&str> = None;
    let mut count = 0;
    for token in text.split_whitespace() {
        let sentence_start = match previous {
            None => true,
            Some(prev) => prev.ends_with(&['.', '!', '?'][..]),
        };
        let word = token.trim_start_matches(|c: char| !c.is_alphanumeric());
        if !sentence_start && word.chars().next().is_some_and(char::is_uppercase) {
            count += 1;
        }
        previous = Some(token);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_CORE: &str = "Reading Piketty and Keynes at Harrow Library, I initially misread a table. \
        The mistake was mine: I failed to adjust for inflation, so I revised the model \
        in Python with help from Dr Patel at Imperial College London and the Bank of England archive. ";

    /// `core` followed by neutral sentences until it reaches `min_chars`.
    /// The filler adds no markers, names or connectives.
    fn padded(core: &str, min_chars: usize) -> String {
        let filler = "I checked each figure against the source and wrote down what changed. ";
        let mut essay = core.to_string();
        while char_len(&essay) < min_chars {
            essay.push_str(filler);
        }
        essay
    }

    /// A statement that satisfies every check: struggle markers, names,
    /// few connectives, and a length between floor and ceiling.
    fn clean_essay() -> String {
        padded(CLEAN_CORE, 3400)
    }

    #[test]
    fn test_clean_text_scores_one_hundred() {
        let report = QualityGate::default().evaluate(&clean_essay());
        assert_eq!(report.issues, Vec::<String>::new());
        assert_eq!(report.score, 100);
        assert!(report.passed);
    }

    #[test]
    fn test_delve_fails_the_gate() {
        let text = format!("{} I delve into data.", clean_essay());
        let report = QualityGate::default().evaluate(&text);
        assert!(!report.passed);
        assert_eq!(report.score, 95);
        assert!(report.issues.iter().any(|i| i.contains("'delve'")));
    }

    #[test]
    fn test_inflections_and_case_are_caught() {
        let report = QualityGate::default().evaluate("Delves into the Realms of the Tapestry.");
        assert_eq!(report.metrics.banned_word_hits, 3);
        assert!(!report.passed);
    }

    #[test]
    fn test_banned_phrase_costs_ten_per_occurrence() {
        let text = format!("{} In conclusion, I believe that it works.", clean_essay());
        let report = QualityGate::default().evaluate(&text);
        assert_eq!(report.metrics.banned_phrase_hits, 2);
        assert_eq!(report.score, 80);
        assert!(!report.passed);
    }

    #[test]
    fn test_list_connectives_penalized_above_two() {
        let text = format!(
            "{} Additionally, I ran. Furthermore, I swam. In addition I cycled.",
            clean_essay()
        );
        let report = QualityGate::default().evaluate(&text);
        assert_eq!(report.metrics.list_connectives, 3);
        assert_eq!(report.score, 85);
        assert!(report.passed);
    }

    #[test]
    fn test_over_limit_is_severe() {
        let mut text = clean_essay();
        while char_len(&text) <= 4000 {
            text.push_str("I checked each figure again. ");
        }
        let report = QualityGate::default().evaluate(&text);
        assert_eq!(report.score, 50);
        assert!(!report.passed);
    }

    #[test]
    fn test_missing_struggle_costs_twenty() {
        let core = "Reading Piketty and Keynes at Harrow Library, I studied a table. \
            The table was mine: I adjusted it for inflation, so I rebuilt the model \
            in Python with help from Dr Patel at Imperial College London and the Bank of England archive. ";
        let report = QualityGate::default().evaluate(&padded(core, 3400));
        assert_eq!(report.metrics.struggle_markers, 0);
        assert_eq!(report.issues, vec!["Lacks narrative struggle (only 0 markers)"]);
        assert_eq!(report.score, 80);
        assert!(report.passed);
    }

    #[test]
    fn test_low_name_density_costs_ten() {
        let core = "At the local library my first reading initially misread a table. \
            That mistake was mine. The model failed to adjust for inflation, \
            so the revised version went back to the archive. ";
        let report = QualityGate::default().evaluate(&padded(core, 3400));
        assert_eq!(report.metrics.proper_nouns, 0);
        assert_eq!(report.issues, vec!["Low technical density (0 proper nouns)"]);
        assert_eq!(report.score, 90);
        assert!(report.passed);
    }

    #[test]
    fn test_under_floor_costs_ten() {
        let text = padded(CLEAN_CORE, 2500);
        let chars = char_len(&text);
        assert!(chars < 3000);
        let report = QualityGate::default().evaluate(&text);
        assert_eq!(
            report.issues,
            vec![format!("Too short ({chars} chars, minimum 3000)")]
        );
        assert_eq!(report.score, 90);
        assert!(report.passed);
    }

    #[test]
    fn test_empty_text_fails_without_error() {
        let report = QualityGate::default().evaluate("   ");
        assert!(!report.passed);
        assert_eq!(report.issues, vec!["empty essay"]);
        assert_eq!(report.score, 0);
    }

    #[test]
    fn test_score_is_clamped_at_zero() {
        let text = "delve ".repeat(40);
        let report = QualityGate::default().evaluate(&text);
        assert_eq!(report.score, 0);
    }

    #[test]
    fn test_proper_nouns_skip_sentence_starts() {
        assert_eq!(count_proper_nouns("The cat. The Dog met Alice!"), 2);
        assert_eq!(count_proper_nouns("(Keynes) and \"Hayek\""), 1);
    }
}
