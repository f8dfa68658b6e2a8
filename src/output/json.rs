use crate::model::{FamilyReport, ModuleFamilies, ModuleReport, ReportModel, ScanFailure};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Published shape of a report. Families nobody defines are left out.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    extension_points: BTreeMap<&'a str, &'a FamilyReport>,
    artifacts: &'a BTreeMap<String, ModuleReport>,
    families_by_module: &'a [ModuleFamilies],
    failures: &'a [ScanFailure],
}

pub fn generate_json_string(report: &ReportModel) -> Result<String> {
    let view = JsonReport {
        generated_at: report.generated_at,
        extension_points: report
            .defined_extension_points()
            .map(|f| (f.name.as_str(), f))
            .collect(),
        artifacts: &report.artifacts,
        families_by_module: &report.families_by_module,
        failures: &report.failures,
    };
    Ok(serde_json::to_string_pretty(&view)?)
}

pub fn print_json(report: &ReportModel) -> Result<()> {
    println!("{}", generate_json_string(report)?);
    Ok(())
}
