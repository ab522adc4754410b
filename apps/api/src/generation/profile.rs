use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::text::truncate_chars;

/// Applicant input collected by the form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub target_course: String,
    #[serde(alias = "motivation")]
    pub motivation_text: String,
    #[serde(default)]
    pub super_curriculars: String,
    #[serde(default)]
    pub work_experience: String,
    #[serde(default)]
    pub cv_text: Option<String>,
}

impl UserProfile {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.target_course.trim().is_empty() {
            return Err(AppError::Validation("target_course is required".into()));
        }
        if self.motivation_text.trim().is_empty() {
            return Err(AppError::Validation("motivation_text is required".into()));
        }
        Ok(())
    }

    /// The profile as the labelled block the generation prompt expects.
    /// CV text is cut to `cv_char_limit` characters.
    pub fn to_prompt_string(&self, cv_char_limit: usize) -> String {
        let mut out = format!(
            "Target Course: {}\nMotivation: {}\nSuper-Curriculars: {}\nWork Experience: {}",
            self.target_course.trim(),
            self.motivation_text.trim(),
            self.super_curriculars.trim(),
            self.work_experience.trim(),
        );
        if let Some(cv) = self.cv_text.as_deref().map(str::trim).filter(|cv| !cv.is_empty()) {
            out.push_str("\nCV/Resume Details: ");
            out.push_str(truncate_chars(cv, cv_char_limit));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            target_course: "Economics".into(),
            motivation_text: "Why do markets overshoot?".into(),
            super_curriculars: "Read Minsky".into(),
            work_experience: "Two weeks at a credit union".into(),
            cv_text: None,
        }
    }

    #[test]
    fn test_profile_string_labels_every_field() {
        let s = profile().to_prompt_string(2000);
        assert!(s.contains("Target Course: Economics"));
        assert!(s.contains("Work Experience: Two weeks at a credit union"));
        assert!(!s.contains("CV/Resume Details"));
    }

    #[test]
    fn test_cv_is_truncated() {
        let mut p = profile();
        p.cv_text = Some("c".repeat(5000));
        let s = p.to_prompt_string(2000);
        let cv = s.split("CV/Resume Details: ").nth(1).unwrap();
        assert_eq!(cv.len(), 2000);
    }

    #[test]
    fn test_missing_course_is_rejected() {
        let mut p = profile();
        p.target_course = " ".into();
        assert!(matches!(p.validate(), Err(AppError::Validation(_))));
    }
}
