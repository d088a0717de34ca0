/// Criterion derivation for rules documents.
///
/// The extraction service returns loosely structured YAML. Rather than parsing it, the
/// selectable criteria are harvested from inline-quoted list items (`- "..."`), which is
/// how the service writes its evaluation criteria. Everything here is pure: the same
/// text always produces the same ordered set.
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::Serialize;

use crate::config::CriteriaCatalog;

/// Selection meaning "evaluate every criterion". Sent to the analysis service verbatim.
pub const ALL_CRITERIA: &str = "All criteria";

static QUOTED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"-\s"([^"]+)""#).expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Criterion {
    pub name: String,
    /// `true` for configured criteria, `false` for ones found in the rules document.
    pub is_system: bool,
}

impl Criterion {
    fn extracted(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_system: false,
        }
    }

    fn system(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_system: true,
        }
    }
}

/// Raw output of [`derive`], before the empty-document fallback is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    /// Document-specific criteria in first-seen order.
    pub extracted: Vec<Criterion>,
    /// Configured system criteria whose names do not collide with an extracted one.
    pub system_defaults: Vec<Criterion>,
}

/// Collect the values of `- "<value>"` items, deduplicated in first-seen order.
///
/// Values are trimmed; blank values and the [`ALL_CRITERIA`] sentinel are dropped so the
/// sentinel can never appear twice in a derived set.
pub fn extract_quoted_items(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in QUOTED_ITEM_RE.captures_iter(raw) {
        let value = caps[1].trim();
        if value.is_empty() || value == ALL_CRITERIA {
            continue;
        }
        if !out.iter().any(|seen| seen == value) {
            out.push(value.to_string());
        }
    }
    out
}

pub fn derive(raw: &str, catalog: &CriteriaCatalog) -> Derivation {
    let extracted: Vec<Criterion> = extract_quoted_items(raw)
        .iter()
        .map(|name| Criterion::extracted(name))
        .collect();

    let system_defaults = catalog
        .system_criteria
        .iter()
        .filter(|name| !extracted.iter().any(|c| &c.name == *name))
        .map(|name| Criterion::system(name))
        .collect();

    Derivation {
        extracted,
        system_defaults,
    }
}

/// The selectable criteria of a session, without the sentinel.
///
/// Ordering: extracted criteria in first-seen order, then the non-colliding system
/// criteria in catalog order. When nothing was extracted the configured fallback
/// categories are used instead, so the list is never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriterionSet {
    entries: Vec<Criterion>,
    used_fallback: bool,
}

impl CriterionSet {
    pub fn derive(raw: &str, catalog: &CriteriaCatalog) -> Self {
        Self::from_derivation(derive(raw, catalog), catalog)
    }

    pub fn from_derivation(derivation: Derivation, catalog: &CriteriaCatalog) -> Self {
        if derivation.extracted.is_empty() {
            let mut entries: Vec<Criterion> = Vec::new();
            for name in catalog.fallback_categories.iter().map(|n| n.trim()) {
                if !name.is_empty() && !entries.iter().any(|c| c.name == name) {
                    entries.push(Criterion::system(name));
                }
            }
            return Self {
                entries,
                used_fallback: true,
            };
        }

        let mut entries = derivation.extracted;
        entries.extend(derivation.system_defaults);
        Self {
            entries,
            used_fallback: false,
        }
    }

    /// Every selectable name, sentinel first.
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(ALL_CRITERIA)
            .chain(self.entries.iter().map(|c| c.name.as_str()))
            .collect()
    }

    pub fn entries(&self) -> &[Criterion] {
        &self.entries
    }

    pub fn extracted(&self) -> impl Iterator<Item = &Criterion> {
        self.entries.iter().filter(|c| !c.is_system)
    }

    pub fn system(&self) -> impl Iterator<Item = &Criterion> {
        self.entries.iter().filter(|c| c.is_system)
    }

    /// Whether `name` is a valid selection. The sentinel always is.
    pub fn contains(&self, name: &str) -> bool {
        name == ALL_CRITERIA || self.entries.iter().any(|c| c.name == name)
    }

    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
