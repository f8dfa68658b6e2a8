use crate::model::{FamilyReport, ModuleReport, ReportModel};
use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct FamilyRow {
    #[tabled(rename = "Extension Point")]
    name: String,
    #[tabled(rename = "Defined In")]
    defined_in: String,
    #[tabled(rename = "Implementations")]
    implementations: usize,
}

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "Module")]
    name: String,
    #[tabled(rename = "Coordinate")]
    gav: String,
    #[tabled(rename = "Extensions")]
    extensions: usize,
    #[tabled(rename = "Points")]
    extension_points: usize,
    #[tabled(rename = "Actions")]
    actions: usize,
    #[tabled(rename = "View Score")]
    view_score: String,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Module")]
    gav: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub fn print_cli_table(report: &ReportModel) -> Result<()> {
    println!("{}", render_tables(report));
    Ok(())
}

pub(crate) fn render_tables(report: &ReportModel) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!(
        "Index generated at: {}\n\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    let families: Vec<&FamilyReport> = report.defined_extension_points().collect();
    if families.is_empty() {
        out.push_str("No extension points found.\n");
    } else {
        out.push_str(&format!("Found {} extension points:\n\n", families.len()));
        let rows: Vec<FamilyRow> = families
            .iter()
            .map(|f| FamilyRow {
                name: truncate(&f.name, 60),
                defined_in: f
                    .definition
                    .as_ref()
                    .map(|d| d.artifact.clone())
                    .unwrap_or_else(|| "-".to_string()),
                implementations: f.implementations.len(),
            })
            .collect();
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        out.push('\n');
    }

    let undefined = report.extension_points.len() - families.len();
    if undefined > 0 {
        out.push_str(&format!(
            "\n{} extension points are implemented but never defined.\n",
            undefined
        ));
    }

    if !report.artifacts.is_empty() {
        out.push_str(&format!("\nScanned {} modules:\n\n", report.artifacts.len()));
        let mut modules: Vec<&ModuleReport> = report.artifacts.values().collect();
        modules.sort_by_key(|m| m.display_name.to_lowercase());
        let rows: Vec<ModuleRow> = modules
            .iter()
            .map(|m| ModuleRow {
                name: truncate(&m.display_name, 40),
                gav: truncate(&m.gav, 50),
                extensions: m.extensions.len(),
                extension_points: m.extension_points.len(),
                actions: m.actions.len(),
                view_score: format_view_score(m),
            })
            .collect();
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        out.push('\n');
    }

    if !report.failures.is_empty() {
        out.push_str(&format!(
            "\n\x1b[33m{} modules could not be scanned:\x1b[0m\n\n",
            report.failures.len()
        ));
        let rows: Vec<FailureRow> = report
            .failures
            .iter()
            .map(|f| FailureRow {
                gav: f.gav.clone(),
                reason: truncate(&f.reason, 70),
            })
            .collect();
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        out.push('\n');
    }

    out.push_str(&format!(
        "\nSummary: {} extension points, {} implementations, {} actions\n",
        families.len(),
        report.implementation_count(),
        report.action_count()
    ));
    out
}

fn format_view_score(module: &ModuleReport) -> String {
    if module.failure.is_some() {
        return "\x1b[31mfailed\x1b[0m".to_string();
    }
    match module.view_score {
        Some(score) => format!("{:.2}", score),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
