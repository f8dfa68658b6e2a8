//! Merging of classification records into families and module summaries.
//!
//! A [`Family`] groups one extension point with its definition and its
//! implementations. Implementations are kept in a map ordered by module
//! (core first, then display name ignoring case) and class name (anonymous
//! last), so the order never depends on which module finished first.

use crate::error::AggregateError;
use crate::model::{
    view_score, ClassSummary, ClassifiedType, FamilyReport, Module, ModuleFamilies, ModuleId,
    ModuleReport, ModuleSortKey, ReportModel, ScanFailure,
};
use crate::scanner::ModuleScan;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, warn};

/// What to do when a second type claims to define an existing extension point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Abort the run.
    #[default]
    Fail,
    /// Keep the first definition and flag the family as conflicted.
    Flag,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(DuplicatePolicy::Fail),
            "flag" | "keep-first" => Ok(DuplicatePolicy::Flag),
            _ => Err(format!(
                "Unknown duplicate definition policy: {}. Use 'fail' or 'flag'",
                s
            )),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicatePolicy::Fail => write!(f, "fail"),
            DuplicatePolicy::Flag => write!(f, "flag"),
        }
    }
}

/// Qualified name ordering with anonymous (unnamed) classes last.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QualifiedNameKey(Option<String>);

impl Ord for QualifiedNameKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl PartialOrd for QualifiedNameKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Position of an implementation within its family. The trailing identity
/// makes two records equal only when they are the same type of the same
/// module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ImplementationKey {
    module: ModuleSortKey,
    qualified_name: QualifiedNameKey,
    identity: String,
}

#[derive(Debug)]
pub struct Family {
    name: String,
    definition: Option<ClassifiedType>,
    implementations: BTreeMap<ImplementationKey, ClassifiedType>,
    conflicts: Vec<ClassifiedType>,
}

impl Family {
    fn new(name: String) -> Self {
        Self {
            name,
            definition: None,
            implementations: BTreeMap::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> Option<&ClassifiedType> {
        self.definition.as_ref()
    }

    /// Implementations in report order.
    pub fn implementations(&self) -> impl Iterator<Item = &ClassifiedType> {
        self.implementations.values()
    }

    pub fn is_conflicted(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn short_name(&self) -> Option<&str> {
        self.definition.as_ref()?.class_name.as_deref()
    }
}

#[derive(Debug)]
struct ModuleEntry {
    module: Module,
    extensions: Vec<ClassifiedType>,
    actions: Vec<ClassifiedType>,
    failure: Option<String>,
}

/// Collects records from every module and produces the [`ReportModel`].
#[derive(Debug)]
pub struct Aggregator {
    policy: DuplicatePolicy,
    modules: BTreeMap<ModuleId, ModuleEntry>,
    families: BTreeMap<String, Family>,
}

impl Aggregator {
    pub fn new(modules: Vec<Module>, policy: DuplicatePolicy) -> Self {
        let modules = modules
            .into_iter()
            .map(|module| {
                (
                    module.id,
                    ModuleEntry {
                        module,
                        extensions: Vec::new(),
                        actions: Vec::new(),
                        failure: None,
                    },
                )
            })
            .collect();
        Self {
            policy,
            modules,
            families: BTreeMap::new(),
        }
    }

    pub fn family(&self, name: &str) -> Option<&Family> {
        self.families.get(name)
    }

    pub fn families(&self) -> impl Iterator<Item = &Family> {
        self.families.values()
    }

    /// Merges a module's records. A failed scan is recorded as such.
    pub fn merge(&mut self, scan: ModuleScan) -> Result<(), AggregateError> {
        if let Some(failure) = &scan.failure {
            self.record_failure(scan.module, format!("failed: {}", failure));
        }
        for record in scan.records {
            self.merge_record(record)?;
        }
        Ok(())
    }

    /// Marks a module as abandoned. Records merged earlier stay untouched.
    pub fn record_failure(&mut self, module: ModuleId, reason: String) {
        match self.modules.get_mut(&module) {
            Some(entry) => {
                warn!("Module {} abandoned: {}", entry.module.gav(), reason);
                entry.failure = Some(reason);
            }
            None => warn!("Failure reported for unknown module {:?}", module),
        }
    }

    fn merge_record(&mut self, record: ClassifiedType) -> Result<(), AggregateError> {
        let Some(entry) = self.modules.get_mut(&record.module) else {
            warn!("Dropping {} from unknown module {:?}", record, record.module);
            return Ok(());
        };

        let Some(point) = record.extension_point().map(str::to_string) else {
            entry.actions.push(record);
            return Ok(());
        };

        let family = self
            .families
            .entry(point.clone())
            .or_insert_with(|| Family::new(point.clone()));

        if record.is_definition() {
            if let Some(existing) = &family.definition {
                match self.policy {
                    DuplicatePolicy::Fail => {
                        error!("Extension point {} defined twice", point);
                        return Err(AggregateError::DuplicateDefinition {
                            family: point,
                            existing: existing.identity().to_string(),
                            incoming: record.identity().to_string(),
                        });
                    }
                    DuplicatePolicy::Flag => {
                        warn!(
                            "Extension point {} defined twice, keeping {} and flagging {}",
                            point,
                            existing.identity(),
                            record.identity()
                        );
                        family.conflicts.push(record.clone());
                    }
                }
            } else {
                debug!("Defined extension point {}", point);
                family.definition = Some(record.clone());
            }
        } else {
            let key = ImplementationKey {
                module: entry.module.sort_key(),
                qualified_name: QualifiedNameKey(record.implementation.clone()),
                identity: record.identity().to_string(),
            };
            match family.implementations.entry(key) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(record.clone());
                }
                btree_map::Entry::Occupied(_) => {
                    debug!("Skipping repeated implementation {}", record);
                    return Ok(());
                }
            }
        }

        entry.extensions.push(record);
        Ok(())
    }

    /// Freezes the aggregation into a report.
    pub fn finish(self) -> ReportModel {
        let gav_of = |id: ModuleId| {
            self.modules
                .get(&id)
                .map(|e| e.module.gav())
                .unwrap_or_default()
        };
        let summarize =
            |record: &ClassifiedType| ClassSummary::from_record(record, &gav_of(record.module));

        let extension_points: BTreeMap<String, FamilyReport> = self
            .families
            .values()
            .map(|family| {
                let report = FamilyReport {
                    name: family.name.clone(),
                    short_name: family.short_name().map(str::to_string),
                    definition: family.definition.as_ref().map(&summarize),
                    implementations: family.implementations().map(&summarize).collect(),
                    conflicting_definitions: family.conflicts.iter().map(&summarize).collect(),
                };
                (family.name.clone(), report)
            })
            .collect();

        let mut artifacts = BTreeMap::new();
        let mut failures = Vec::new();
        for entry in self.modules.values() {
            let gav = entry.module.gav();
            let (points, impls): (Vec<&ClassifiedType>, Vec<&ClassifiedType>) =
                entry.extensions.iter().partition(|r| r.is_definition());

            let with_view = impls.iter().filter(|r| r.has_view()).count()
                + entry.actions.iter().filter(|r| r.has_view()).count();
            let score = view_score(with_view, impls.len() + entry.actions.len());

            let used: BTreeSet<&str> = entry
                .extensions
                .iter()
                .filter_map(|r| r.extension_point())
                .collect();
            let uses = used
                .into_iter()
                .filter_map(|name| extension_points.get(name)?.definition.clone())
                .collect();

            if let Some(reason) = &entry.failure {
                failures.push(ScanFailure {
                    gav: gav.clone(),
                    reason: reason.clone(),
                });
            }

            artifacts.insert(
                gav.clone(),
                ModuleReport {
                    gav,
                    url: entry.module.url.clone(),
                    display_name: entry.module.display_name.clone(),
                    extensions: impls.iter().copied().map(&summarize).collect(),
                    extension_points: points.iter().copied().map(&summarize).collect(),
                    actions: entry.actions.iter().map(&summarize).collect(),
                    view_score: score,
                    uses,
                    failure: entry.failure.clone(),
                },
            );
        }

        ReportModel {
            generated_at: Utc::now(),
            families_by_module: self.group_by_defining_module(),
            extension_points,
            artifacts,
            failures,
        }
    }

    /// Defined families under the module holding their definition, modules
    /// in module order and families by short name.
    fn group_by_defining_module(&self) -> Vec<ModuleFamilies> {
        let mut groups: BTreeMap<ModuleSortKey, (&Module, Vec<&Family>)> = BTreeMap::new();
        for family in self.families.values() {
            let Some(definition) = &family.definition else {
                continue;
            };
            let Some(entry) = self.modules.get(&definition.module) else {
                continue;
            };
            groups
                .entry(entry.module.sort_key())
                .or_insert_with(|| (&entry.module, Vec::new()))
                .1
                .push(family);
        }

        groups
            .into_values()
            .map(|(module, mut families)| {
                families.sort_by(|a, b| {
                    a.short_name()
                        .cmp(&b.short_name())
                        .then_with(|| a.name.cmp(&b.name))
                });
                ModuleFamilies {
                    gav: module.gav(),
                    display_name: module.display_name.clone(),
                    url_name: module.url_name().to_string(),
                    families: families.iter().map(|f| f.name.clone()).collect(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrontEndError;
    use crate::model::{
        Capability, ModuleDescriptor, SourceLocation, TypeHandle, ViewMap,
        DEFAULT_CORE_DISPLAY_NAME,
    };

    fn modules() -> Vec<Module> {
        let descriptors = [
            ModuleDescriptor::core("2.400"),
            ModuleDescriptor::plugin("g:zeta:1", "", "zeta", None),
            ModuleDescriptor::plugin("g:alpha:1", "", "Alpha", None),
            ModuleDescriptor::plugin("g:beta:1", "", "beta", None),
        ];
        descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| Module::new(ModuleId(i), d, DEFAULT_CORE_DISPLAY_NAME).unwrap())
            .collect()
    }

    fn record(module: usize, name: Option<&str>, capability: Capability) -> ClassifiedType {
        let handle = name.map(str::to_string).unwrap_or_else(|| format!("p.Outer${}", module));
        ClassifiedType {
            module: ModuleId(module),
            handle: TypeHandle::new(handle),
            implementation: name.map(str::to_string),
            package: "p".to_string(),
            class_name: name.map(|n| n.trim_start_matches("p.").to_string()),
            top_level_class: "Outer".to_string(),
            documentation: None,
            source: Some(SourceLocation {
                file: "p/Outer.java".to_string(),
                line: 1,
            }),
            views: ViewMap::new(),
            capability,
        }
    }

    fn implementation(module: usize, name: Option<&str>, point: &str) -> ClassifiedType {
        record(
            module,
            name,
            Capability::Extension {
                extension_point: point.to_string(),
                definition: false,
                action: None,
            },
        )
    }

    fn definition(module: usize, name: &str) -> ClassifiedType {
        record(
            module,
            Some(name),
            Capability::Extension {
                extension_point: name.to_string(),
                definition: true,
                action: None,
            },
        )
    }

    fn with_view(mut r: ClassifiedType) -> ClassifiedType {
        r.views.insert("config".to_string(), "p/config.jelly".to_string());
        r
    }

    fn scan(module: usize, records: Vec<ClassifiedType>) -> ModuleScan {
        let mut scan = ModuleScan::empty(ModuleId(module));
        scan.records = records;
        scan
    }

    fn order(agg: &Aggregator, family: &str) -> Vec<(usize, Option<String>)> {
        agg.family(family)
            .unwrap()
            .implementations()
            .map(|r| (r.module.0, r.implementation.clone()))
            .collect()
    }

    #[test]
    fn test_definition_and_implementations_form_family() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(0, vec![definition(0, "p.Builder")])).unwrap();
        agg.merge(scan(2, vec![implementation(2, Some("p.Shell"), "p.Builder")]))
            .unwrap();

        let family = agg.family("p.Builder").unwrap();
        assert_eq!(family.definition().unwrap().identity(), "p.Builder");
        assert_eq!(family.short_name(), Some("Builder"));
        assert_eq!(family.implementations().count(), 1);
    }

    #[test]
    fn test_implementation_order_independent_of_arrival() {
        let batches = vec![
            (1, vec![implementation(1, Some("p.Z"), "p.EP")]),
            (2, vec![
                implementation(2, None, "p.EP"),
                implementation(2, Some("p.B"), "p.EP"),
                implementation(2, Some("p.A"), "p.EP"),
            ]),
            (3, vec![implementation(3, Some("p.A"), "p.EP")]),
            (0, vec![implementation(0, Some("p.Y"), "p.EP")]),
        ];
        let expected = vec![
            (0, Some("p.Y".to_string())),
            (2, Some("p.A".to_string())),
            (2, Some("p.B".to_string())),
            (2, None),
            (3, Some("p.A".to_string())),
            (1, Some("p.Z".to_string())),
        ];

        let mut forward = Aggregator::new(modules(), DuplicatePolicy::Fail);
        for (m, records) in batches.clone() {
            forward.merge(scan(m, records)).unwrap();
        }
        let mut backward = Aggregator::new(modules(), DuplicatePolicy::Fail);
        for (m, records) in batches.into_iter().rev() {
            backward.merge(scan(m, records)).unwrap();
        }

        assert_eq!(order(&forward, "p.EP"), expected);
        assert_eq!(order(&backward, "p.EP"), expected);
    }

    #[test]
    fn test_duplicate_implementation_is_collapsed() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(
            1,
            vec![
                implementation(1, Some("p.Impl"), "p.EP"),
                implementation(1, Some("p.Impl"), "p.EP"),
            ],
        ))
        .unwrap();
        assert_eq!(agg.family("p.EP").unwrap().implementations().count(), 1);

        let report = agg.finish();
        let zeta = report.module("g:zeta:1").unwrap();
        assert_eq!(zeta.extensions.len(), 1);
        assert_eq!(zeta.view_score, Some(0.0));
    }

    #[test]
    fn test_implementations_sorted_by_qualified_name() {
        let mut zed = implementation(1, Some("a.Zed"), "p.EP");
        zed.class_name = Some("Zed".to_string());
        let mut alpha = implementation(1, Some("b.Alpha"), "p.EP");
        alpha.class_name = Some("Alpha".to_string());

        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(1, vec![alpha, zed])).unwrap();
        assert_eq!(
            order(&agg, "p.EP"),
            vec![
                (1, Some("a.Zed".to_string())),
                (1, Some("b.Alpha".to_string())),
            ]
        );
    }

    #[test]
    fn test_same_class_in_two_modules_kept_separately() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(1, vec![implementation(1, Some("p.Impl"), "p.EP")]))
            .unwrap();
        agg.merge(scan(2, vec![implementation(2, Some("p.Impl"), "p.EP")]))
            .unwrap();
        assert_eq!(agg.family("p.EP").unwrap().implementations().count(), 2);
    }

    #[test]
    fn test_duplicate_definition_fails() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(0, vec![definition(0, "p.EP")])).unwrap();
        let err = agg.merge(scan(1, vec![definition(1, "p.EP")])).unwrap_err();
        assert_eq!(
            err,
            AggregateError::DuplicateDefinition {
                family: "p.EP".to_string(),
                existing: "p.EP".to_string(),
                incoming: "p.EP".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_definition_flagged() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Flag);
        agg.merge(scan(0, vec![definition(0, "p.EP")])).unwrap();
        agg.merge(scan(1, vec![definition(1, "p.EP")])).unwrap();

        let family = agg.family("p.EP").unwrap();
        assert!(family.is_conflicted());
        assert_eq!(family.definition().unwrap().module, ModuleId(0));

        let report = agg.finish();
        let family = report.family("p.EP").unwrap();
        assert!(family.is_conflicted());
        assert_eq!(family.conflicting_definitions[0].artifact, "g:zeta:1");
    }

    #[test]
    fn test_actions_stay_with_their_module() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(2, vec![record(2, Some("p.Act"), Capability::Action)]))
            .unwrap();
        assert_eq!(agg.families().count(), 0);

        let report = agg.finish();
        let module = report.module("g:alpha:1").unwrap();
        assert_eq!(module.actions.len(), 1);
        assert_eq!(module.actions[0].action.as_deref(), Some("p.Act"));
    }

    #[test]
    fn test_view_score() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(
            1,
            vec![
                with_view(implementation(1, Some("p.A"), "p.EP")),
                implementation(1, Some("p.B"), "p.EP"),
                implementation(1, Some("p.C"), "p.EP"),
                with_view(record(1, Some("p.Act"), Capability::Action)),
            ],
        ))
        .unwrap();

        let report = agg.finish();
        assert_eq!(report.module("g:zeta:1").unwrap().view_score, Some(0.5));
        assert_eq!(report.module("g:alpha:1").unwrap().view_score, None);
    }

    #[test]
    fn test_undefined_family_reported_but_not_defined() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(0, vec![definition(0, "p.Known")])).unwrap();
        agg.merge(scan(1, vec![implementation(1, Some("p.X"), "p.Unknown")]))
            .unwrap();

        let report = agg.finish();
        let unknown = report.family("p.Unknown").unwrap();
        assert!(!unknown.is_defined());
        assert_eq!(unknown.implementations.len(), 1);

        let defined: Vec<_> = report
            .defined_extension_points()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(defined, vec!["p.Known"]);
    }

    #[test]
    fn test_module_report_splits_points_and_uses() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(0, vec![definition(0, "p.EP")])).unwrap();
        agg.merge(scan(
            1,
            vec![
                definition(1, "p.Own"),
                implementation(1, Some("p.Impl"), "p.EP"),
                implementation(1, Some("p.Impl2"), "p.EP"),
            ],
        ))
        .unwrap();

        let report = agg.finish();
        let zeta = report.module("g:zeta:1").unwrap();
        assert_eq!(zeta.display_name, "zeta Plugin");
        assert_eq!(zeta.extensions.len(), 2);
        assert_eq!(zeta.extension_points.len(), 1);
        let uses: Vec<_> = zeta
            .uses
            .iter()
            .map(|u| u.class_name.as_deref().unwrap())
            .collect();
        assert_eq!(uses, vec!["p.EP", "p.Own"]);
    }

    #[test]
    fn test_failure_keeps_records_from_other_modules() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(2, vec![definition(2, "p.EP")])).unwrap();

        let mut failed = ModuleScan::empty(ModuleId(3));
        failed.failure = Some(FrontEndError::Internal("boom".to_string()));
        agg.merge(failed).unwrap();

        let report = agg.finish();
        assert!(report.family("p.EP").unwrap().is_defined());
        assert_eq!(report.module("g:alpha:1").unwrap().extension_points.len(), 1);

        let beta = report.module("g:beta:1").unwrap();
        assert!(beta.extensions.is_empty());
        assert!(beta.failure.as_deref().unwrap().contains("boom"));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].gav, "g:beta:1");
    }

    #[test]
    fn test_families_grouped_by_defining_module() {
        let mut agg = Aggregator::new(modules(), DuplicatePolicy::Fail);
        agg.merge(scan(1, vec![definition(1, "p.Zed"), definition(1, "p.Abc")]))
            .unwrap();
        agg.merge(scan(0, vec![definition(0, "p.Core")])).unwrap();
        agg.merge(scan(2, vec![implementation(2, Some("p.X"), "p.Undefined")]))
            .unwrap();

        let report = agg.finish();
        let groups: Vec<_> = report
            .families_by_module
            .iter()
            .map(|g| (g.url_name.as_str(), g.families.clone()))
            .collect();
        assert_eq!(
            groups,
            vec![
                ("jenkins-core", vec!["p.Core".to_string()]),
                ("zeta", vec!["p.Abc".to_string(), "p.Zed".to_string()]),
            ]
        );
    }

    #[test]
    fn test_duplicate_policy_from_str() {
        assert_eq!("fail".parse::<DuplicatePolicy>(), Ok(DuplicatePolicy::Fail));
        assert_eq!("FLAG".parse::<DuplicatePolicy>(), Ok(DuplicatePolicy::Flag));
        assert!("ignore".parse::<DuplicatePolicy>().is_err());
    }
}
