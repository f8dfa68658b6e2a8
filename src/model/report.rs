use super::{Capability, ClassifiedType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewEntry {
    pub name: String,
    pub source: String,
}

/// Plain-data rendering of one classification record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub class_name: Option<String>,
    /// Omitted for definitions, which are the extension point themselves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_point: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub artifact: String,
    pub javadoc: Option<String>,
    pub source_file: Option<String>,
    pub line_number: Option<u32>,
    pub has_view: bool,
    pub views: Vec<ViewEntry>,
}

impl ClassSummary {
    pub fn from_record(record: &ClassifiedType, gav: &str) -> Self {
        let (extension_point, action) = match &record.capability {
            Capability::Extension {
                extension_point,
                definition,
                action,
            } => (
                (!definition).then(|| extension_point.clone()),
                action.clone(),
            ),
            Capability::Action => (None, record.implementation.clone()),
        };

        Self {
            class_name: record.implementation.clone(),
            extension_point,
            action,
            artifact: gav.to_string(),
            javadoc: record.documentation.clone(),
            source_file: record.source.as_ref().map(|s| s.file.clone()),
            line_number: record.source.as_ref().map(|s| s.line),
            has_view: record.has_view(),
            views: record
                .views
                .iter()
                .map(|(name, source)| ViewEntry {
                    name: name.clone(),
                    source: source.clone(),
                })
                .collect(),
        }
    }
}

/// An extension point with its definition and every known implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyReport {
    pub name: String,
    /// Class name of the definition relative to its package.
    pub short_name: Option<String>,
    pub definition: Option<ClassSummary>,
    pub implementations: Vec<ClassSummary>,
    /// Further types that claimed to define this extension point. Only
    /// populated when duplicate definitions are flagged instead of failing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicting_definitions: Vec<ClassSummary>,
}

impl FamilyReport {
    pub fn is_defined(&self) -> bool {
        self.definition.is_some()
    }

    pub fn is_conflicted(&self) -> bool {
        !self.conflicting_definitions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReport {
    pub gav: String,
    pub url: String,
    pub display_name: String,
    /// Extension implementations found in this module.
    pub extensions: Vec<ClassSummary>,
    /// Extension points defined in this module.
    pub extension_points: Vec<ClassSummary>,
    pub actions: Vec<ClassSummary>,
    /// Share of extensions and actions carrying a view; absent when the
    /// module has neither.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_score: Option<f64>,
    /// Definitions of the extension points this module participates in.
    pub uses: Vec<ClassSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Defined extension points grouped under the module that defines them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFamilies {
    pub gav: String,
    pub display_name: String,
    pub url_name: String,
    pub families: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub gav: String,
    pub reason: String,
}

/// Final snapshot of one run, handed to renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportModel {
    pub generated_at: DateTime<Utc>,
    /// Every family keyed by extension point name, defined or not.
    pub extension_points: BTreeMap<String, FamilyReport>,
    /// Every scanned module keyed by coordinate.
    pub artifacts: BTreeMap<String, ModuleReport>,
    pub families_by_module: Vec<ModuleFamilies>,
    pub failures: Vec<ScanFailure>,
}

impl ReportModel {
    /// Families that have a definition record.
    pub fn defined_extension_points(&self) -> impl Iterator<Item = &FamilyReport> {
        self.extension_points.values().filter(|f| f.is_defined())
    }

    pub fn family(&self, name: &str) -> Option<&FamilyReport> {
        self.extension_points.get(name)
    }

    pub fn module(&self, gav: &str) -> Option<&ModuleReport> {
        self.artifacts.get(gav)
    }

    pub fn implementation_count(&self) -> usize {
        self.extension_points
            .values()
            .map(|f| f.implementations.len())
            .sum()
    }

    pub fn action_count(&self) -> usize {
        self.artifacts.values().map(|m| m.actions.len()).sum()
    }
}

/// Fraction of records with a view, rounded to two decimals.
pub fn view_score(with_view: usize, total: usize) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let score = with_view as f64 / total as f64;
    Some((score * 100.0).round() / 100.0)
}
