//! Run configuration.
//!
//! Defaults describe the three companies and the two inflation indices the
//! report is built from; a TOML file can override any of it.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

use crate::{
    extract::{CompanyProfile, MetricAnchor},
    inflation::{DiscountRule, IndexSpec, InflationFiles, SGS_BASE_URL},
    Result,
};

/// Where every component reads and writes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkspacePaths {
    /// Company workbooks.
    pub input_dir: PathBuf,
    /// Treated workbooks, inflation files and the consolidated report.
    pub output_dir: PathBuf,
    /// Where the finished report is copied for the user.
    pub delivery_dir: PathBuf,
}

impl Default for WorkspacePaths {
    fn default() -> Self {
        let home = env::var_os("HOME")
            .or_else(|| env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_default();
        Self {
            input_dir: PathBuf::from("reports"),
            output_dir: PathBuf::from("data_treated"),
            delivery_dir: home.join("Desktop"),
        }
    }
}

/// Placement of the report's pieces.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportLayout {
    pub workbook_name: String,
    pub table_sheet: String,
    pub inflation_sheet: String,
    /// 1-based row where the discounted rows start on the table sheet.
    pub discounted_start_row: u32,
    /// 1-based column where the quarterly inflation table starts on the inflation sheet.
    pub quarterly_inflation_column: u16,
    /// Adds a third sheet with the inflation CSV files' cells as written.
    pub raw_inflation_sheet: bool,
    pub raw_inflation_sheet_name: String,
    pub chart_workbook_name: String,
    /// SVG image with one panel per plotted metric.
    pub chart_image_name: String,
    /// Metrics plotted by the chart renderer, in order.
    pub chart_metrics: Vec<String>,
    /// Quarters before this year are left out of the charts.
    pub chart_from_year: i32,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            workbook_name: "Consolidado.xlsx".to_string(),
            table_sheet: "Consolidado".to_string(),
            inflation_sheet: "IPCA_IGPM".to_string(),
            discounted_start_row: 18,
            quarterly_inflation_column: 5,
            raw_inflation_sheet: true,
            raw_inflation_sheet_name: "IPCA_IGPM_CSV".to_string(),
            chart_workbook_name: "Consolidado_com_graficos.xlsx".to_string(),
            chart_image_name: "graficos_consolidado.svg".to_string(),
            chart_metrics: [
                "SSS",
                "SSR",
                "OC",
                "TXOcup",
                "InadimplenciaLiq",
                "SSS_Discounted",
                "SSR_Discounted",
            ]
            .map(String::from)
            .to_vec(),
            chart_from_year: 2020,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: WorkspacePaths,
    pub profiles: Vec<CompanyProfile>,
    pub sgs_base_url: String,
    /// Fetch fresh index series; when off, cached inflation files are used.
    pub fetch_inflation: bool,
    pub indices: Vec<IndexSpec>,
    pub discounts: Vec<DiscountRule>,
    pub inflation_files: InflationFiles,
    pub layout: ReportLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: WorkspacePaths::default(),
            profiles: default_profiles(),
            sgs_base_url: SGS_BASE_URL.to_string(),
            fetch_inflation: true,
            indices: vec![
                IndexSpec {
                    name: "IPCA".to_string(),
                    code: 433,
                },
                IndexSpec {
                    name: "IGPM".to_string(),
                    code: 189,
                },
            ],
            discounts: vec![
                DiscountRule {
                    metric: "SSS".to_string(),
                    index: "IPCA".to_string(),
                },
                DiscountRule {
                    metric: "SSR".to_string(),
                    index: "IGPM".to_string(),
                },
            ],
            inflation_files: InflationFiles::default(),
            layout: ReportLayout::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid configuration")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw)
    }
}

fn profile(
    company: &str,
    input_file: &str,
    treated_file: &str,
    sheet: &str,
    localize_decimals: bool,
    header_anchor: &str,
    metrics: &[(&str, &str)],
) -> CompanyProfile {
    CompanyProfile {
        company: company.to_string(),
        input_file: input_file.to_string(),
        treated_file: treated_file.to_string(),
        sheet: sheet.to_string(),
        localize_decimals,
        header_anchor: header_anchor.to_string(),
        metrics: metrics
            .iter()
            .map(|(metric, anchor)| MetricAnchor {
                metric: metric.to_string(),
                anchor: anchor.to_string(),
            })
            .collect(),
    }
}

pub fn default_profiles() -> Vec<CompanyProfile> {
    vec![
        profile(
            "Allos",
            "Allos Planilha 1T25.xlsx",
            "allos_data.xlsx",
            "Indicadores",
            false,
            "B17",
            &[
                ("SSS", "B22"),
                ("SSR", "B14"),
                ("OC", "B23"),
                ("TXOcup", "B25"),
                ("InadimplenciaLiq", "B24"),
            ],
        ),
        profile(
            "Iguatemi",
            "Iguatemi Planilha 1T25.xlsx",
            "iguatemi_data.xlsx",
            "Indicadores | Indicators",
            true,
            "B48",
            &[
                ("SSS", "B54"),
                ("SSR", "B17"),
                ("OC", "B19"),
                ("TXOcup", "B20"),
                ("InadimplenciaLiq", "B21"),
            ],
        ),
        profile(
            "Multiplan",
            "Multiplan Planilha 1T25.xlsx",
            "Multiplan_data.xlsx",
            "Indicadores | Indicators",
            true,
            "B6",
            &[
                ("SSS", "B37"),
                ("SSR", "B38"),
                ("OC", "B39"),
                ("TXOcup", "B43"),
                ("InadimplenciaLiq", "B45"),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_three_companies() {
        let config = PipelineConfig::default();
        let companies: Vec<_> = config.profiles.iter().map(|p| p.company.as_str()).collect();
        assert_eq!(companies, ["Allos", "Iguatemi", "Multiplan"]);
        assert!(config.profiles.iter().all(|p| p.metrics.len() == 5));
        assert_eq!(config.layout.discounted_start_row, 18);
    }

    #[test]
    fn toml_overrides_keep_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            fetch_inflation = false

            [paths]
            input_dir = "/tmp/in"

            [layout]
            discounted_start_row = 30
            "#,
        )
        .unwrap();
        assert!(!config.fetch_inflation);
        assert_eq!(config.paths.input_dir, PathBuf::from("/tmp/in"));
        assert_eq!(config.paths.output_dir, PathBuf::from("data_treated"));
        assert_eq!(config.layout.discounted_start_row, 30);
        assert_eq!(config.layout.workbook_name, "Consolidado.xlsx");
        assert_eq!(config.profiles.len(), 3);
    }

    #[test]
    fn profiles_can_be_replaced() {
        let config = PipelineConfig::from_toml(
            r#"
            [[profiles]]
            company = "Acme"
            input_file = "acme.xlsx"
            treated_file = "acme_data.xlsx"
            sheet = "KPIs"
            header_anchor = "A1"
            metrics = [{ metric = "SSS", anchor = "A2" }]
            "#,
        )
        .unwrap();
        assert_eq!(config.profiles.len(), 1);
        assert!(!config.profiles[0].localize_decimals);
        assert_eq!(config.profiles[0].metrics[0].anchor, "A2");
    }
}
