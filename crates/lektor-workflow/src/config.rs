use std::path::Path;

use serde::Deserialize;

use crate::busy::Operation;
use crate::criteria::{extract_quoted_items, ALL_CRITERIA};
use crate::error::WorkflowError;

/// Criterion names that are configuration rather than code.
///
/// Can be overridden with a JSON file (see [`WorkflowConfig::from_env`]); any field left
/// out of the file keeps its default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CriteriaCatalog {
    /// Used instead of extracted criteria when a rules document yields none.
    pub fallback_categories: Vec<String>,
    /// Always offered after the extracted criteria, unless an extracted name collides.
    pub system_criteria: Vec<String>,
    /// Rules text installed by "skip to default". Must not contain `- "..."` items.
    pub placeholder_rules: String,
    /// Display name installed by "skip to default" and when extraction returns none.
    pub default_display_name: String,
}

impl Default for CriteriaCatalog {
    fn default() -> Self {
        Self {
            fallback_categories: vec![
                "Citation style".to_string(),
                "Length and structure".to_string(),
                "Scientific novelty".to_string(),
            ],
            system_criteria: vec![
                "General academic style".to_string(),
                "Logical structure and coherence".to_string(),
                "Spelling and grammar".to_string(),
                "Literature grounding".to_string(),
            ],
            placeholder_rules: "publisher_info:\n  name: General academic review\n".to_string(),
            default_display_name: "General academic review".to_string(),
        }
    }
}

impl CriteriaCatalog {
    pub fn from_file(path: &Path) -> Result<Self, WorkflowError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let catalog: Self = serde_json::from_str(&raw).map_err(|e| {
            WorkflowError::Config(format!("invalid criteria file {}: {e}", path.display()))
        })?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.fallback_categories.iter().all(|c| c.trim().is_empty()) {
            return Err(WorkflowError::Config(
                "fallback_categories must contain at least one name".to_string(),
            ));
        }
        let all_names = self
            .fallback_categories
            .iter()
            .chain(self.system_criteria.iter());
        for name in all_names {
            if name.trim() == ALL_CRITERIA {
                return Err(WorkflowError::Config(format!(
                    "\"{ALL_CRITERIA}\" is reserved and cannot be a configured criterion"
                )));
            }
        }
        if self.placeholder_rules.trim().is_empty() {
            return Err(WorkflowError::Config(
                "placeholder_rules must not be empty".to_string(),
            ));
        }
        let quoted = extract_quoted_items(&self.placeholder_rules);
        if !quoted.is_empty() {
            return Err(WorkflowError::Config(format!(
                "placeholder_rules must not list criteria, found {quoted:?}"
            )));
        }
        Ok(())
    }
}

/// Generic messages shown when a failed request carries no server detail.
#[derive(Debug, Clone)]
pub struct FallbackMessages {
    pub extract: String,
    pub analyze: String,
    pub save: String,
    pub list: String,
    pub load: String,
}

impl Default for FallbackMessages {
    fn default() -> Self {
        Self {
            extract: "An error occurred while extracting the rules.".to_string(),
            analyze: "An error occurred during the analysis.".to_string(),
            save: "The guideline could not be saved.".to_string(),
            list: "The saved guidelines could not be loaded.".to_string(),
            load: "The guideline could not be loaded.".to_string(),
        }
    }
}

impl FallbackMessages {
    pub fn for_operation(&self, operation: Operation) -> &str {
        match operation {
            Operation::Extract => &self.extract,
            Operation::Analyze => &self.analyze,
            Operation::SaveGuideline => &self.save,
            Operation::ListGuidelines => &self.list,
            Operation::LoadGuideline => &self.load,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Closed set of report languages, sent verbatim to the analysis service.
    pub languages: Vec<String>,
    pub default_language: String,
    pub catalog: CriteriaCatalog,
    pub messages: FallbackMessages,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            languages: vec!["hu".to_string(), "en".to_string(), "de".to_string()],
            default_language: "hu".to_string(),
            catalog: CriteriaCatalog::default(),
            messages: FallbackMessages::default(),
        }
    }
}

impl WorkflowConfig {
    /// Optional:
    /// - `LEKTOR_LANGUAGES` (comma-separated, default "hu,en,de")
    /// - `LEKTOR_DEFAULT_LANGUAGE` (default: first configured language)
    /// - `LEKTOR_CRITERIA_FILE` (JSON overriding the criteria catalog)
    pub fn from_env() -> Result<Self, WorkflowError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("LEKTOR_LANGUAGES") {
            config.languages = parse_languages(&raw);
            if let Some(first) = config.languages.first() {
                config.default_language = first.clone();
            }
        }
        if let Ok(lang) = std::env::var("LEKTOR_DEFAULT_LANGUAGE") {
            config.default_language = lang.trim().to_string();
        }
        if let Ok(path) = std::env::var("LEKTOR_CRITERIA_FILE") {
            config.catalog = CriteriaCatalog::from_file(Path::new(&path))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.languages.is_empty() {
            return Err(WorkflowError::Config(
                "at least one report language must be configured".to_string(),
            ));
        }
        if !self.supports_language(&self.default_language) {
            return Err(WorkflowError::Config(format!(
                "default language {:?} is not one of {:?}",
                self.default_language, self.languages
            )));
        }
        self.catalog.validate()
    }

    pub fn supports_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l == language)
    }
}

fn parse_languages(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for lang in raw.split(',').map(str::trim).filter(|l| !l.is_empty()) {
        if !out.iter().any(|l| l == lang) {
            out.push(lang.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        WorkflowConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn parse_languages_trims_and_dedups() {
        assert_eq!(parse_languages(" hu, en ,,hu,de "), vec!["hu", "en", "de"]);
        assert!(parse_languages(" , ").is_empty());
    }

    #[test]
    fn default_language_must_be_configured() {
        let config = WorkflowConfig {
            default_language: "fr".to_string(),
            ..WorkflowConfig::default()
        };
        assert!(matches!(config.validate(), Err(WorkflowError::Config(_))));
    }

    #[test]
    fn catalog_rejects_reserved_sentinel() {
        let catalog = CriteriaCatalog {
            system_criteria: vec![ALL_CRITERIA.to_string()],
            ..CriteriaCatalog::default()
        };
        assert!(matches!(catalog.validate(), Err(WorkflowError::Config(_))));
    }

    #[test]
    fn catalog_rejects_padded_sentinel() {
        let catalog = CriteriaCatalog {
            fallback_categories: vec![format!(" {ALL_CRITERIA} "), "X".to_string()],
            ..CriteriaCatalog::default()
        };
        assert!(matches!(catalog.validate(), Err(WorkflowError::Config(_))));
    }

    #[test]
    fn catalog_rejects_placeholder_with_criteria() {
        let catalog = CriteriaCatalog {
            placeholder_rules: "criteria:\n  - \"Custom\"\n".to_string(),
            ..CriteriaCatalog::default()
        };
        assert!(matches!(catalog.validate(), Err(WorkflowError::Config(_))));
    }

    #[test]
    fn catalog_file_keeps_defaults_for_missing_fields() {
        let dir = std::env::temp_dir().join(format!("lektor-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("criteria.json");
        std::fs::write(&path, r#"{"fallback_categories": ["Idézés módja", "Terjedelem"]}"#)
            .expect("write file");

        let catalog = CriteriaCatalog::from_file(&path).expect("valid catalog");
        assert_eq!(catalog.fallback_categories, vec!["Idézés módja", "Terjedelem"]);
        assert_eq!(catalog.system_criteria, CriteriaCatalog::default().system_criteria);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
