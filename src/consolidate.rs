//! Merges every company's rows onto one chronological quarter axis.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::{
    align::align,
    extract::{CellValue, ExtractedRow, ExtractedSource, HEADER_ROW_PREFIX},
    format::{clean_cell, fraction_to_percent},
    quarter::{normalize, sort_chronologically},
};

/// Header cells that never become a quarter column.
const MISSING_QUARTER_TOKENS: [&str; 3] = ["", "n/a", "n.d."];

pub const COMPANY_COLUMN: &str = "Company";
pub const METRIC_COLUMN: &str = "Metric";

/// One company's metric, keyed by canonical quarter. `None` marks a cell that did
/// not parse as a number.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub company: String,
    pub metric: String,
    pub values: HashMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub company: String,
    pub metric: String,
    /// One rendered cell per quarter of the table, empty when there is no value.
    pub cells: Vec<String>,
}

impl TableRow {
    pub fn to_record(&self) -> Vec<String> {
        [self.company.clone(), self.metric.clone()]
            .into_iter()
            .chain(self.cells.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnifiedTable {
    pub quarters: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl UnifiedTable {
    pub fn header(&self) -> Vec<String> {
        [COMPANY_COLUMN.to_string(), METRIC_COLUMN.to_string()]
            .into_iter()
            .chain(self.quarters.iter().cloned())
            .collect()
    }

    /// Header row followed by one record per row.
    pub fn to_records(&self) -> Vec<Vec<String>> {
        std::iter::once(self.header())
            .chain(self.rows.iter().map(TableRow::to_record))
            .collect()
    }

    pub fn rows_for<'a>(&'a self, metric: &'a str) -> impl Iterator<Item = &'a TableRow> + 'a {
        self.rows.iter().filter(move |r| r.metric == metric)
    }
}

/// `"SSS Allos"` -> (`"SSS"`, `"Allos"`). Without a space the whole label is the
/// metric and the company is empty.
pub fn split_row_label(label: &str) -> (String, String) {
    match label.split_once(' ') {
        Some((metric, company)) => (metric.to_string(), company.trim().to_string()),
        None => (label.to_string(), String::new()),
    }
}

/// Canonical quarter of every header cell. Only text is normalized; numbers and
/// blanks pass through as rendered.
pub fn header_quarters(header: &ExtractedRow) -> Vec<String> {
    header
        .values
        .iter()
        .map(|cell| match cell {
            CellValue::Text(s) => normalize(s),
            other => other.to_string(),
        })
        .collect()
}

/// Splits extracted sources into per-company quarter headers and aligned metric series.
pub fn collect_series(
    sources: &[ExtractedSource],
) -> (HashMap<String, Vec<String>>, Vec<MetricSeries>) {
    let headers: HashMap<String, Vec<String>> = sources
        .iter()
        .map(|s| {
            let company = s
                .header
                .label
                .strip_prefix(HEADER_ROW_PREFIX)
                .map_or(s.company.as_str(), str::trim)
                .to_string();
            (company, header_quarters(&s.header))
        })
        .collect();

    let series = sources
        .iter()
        .flat_map(|s| &s.metrics)
        .map(|row| {
            let (metric, company) = split_row_label(&row.label);
            let quarters: &[String] = match headers.get(&company) {
                Some(quarters) => quarters,
                None => {
                    warn!(%company, label = %row.label, "no quarter header for company");
                    &[]
                }
            };
            let values: Vec<Option<f64>> = row.values.iter().map(CellValue::to_number).collect();
            debug!(%company, %metric, "series aligned");
            MetricSeries {
                values: align(quarters, &values),
                company,
                metric,
            }
        })
        .collect();

    (headers, series)
}

/// Builds the unified table: the union of all quarters in chronological order, and
/// one row per series with a cell for every quarter.
pub fn consolidate(
    headers: &HashMap<String, Vec<String>>,
    series: &[MetricSeries],
) -> UnifiedTable {
    let union: BTreeSet<&String> = headers
        .values()
        .flatten()
        .filter(|q| !MISSING_QUARTER_TOKENS.contains(&q.trim()))
        .collect();
    let mut quarters: Vec<String> = union.into_iter().cloned().collect();
    sort_chronologically(&mut quarters);

    let rows = series
        .iter()
        .map(|s| TableRow {
            company: s.company.clone(),
            metric: s.metric.clone(),
            cells: quarters
                .iter()
                .map(|q| {
                    let cell = s.values.get(q).copied().flatten();
                    clean_cell(cell.map(fraction_to_percent).unwrap_or_default())
                })
                .collect(),
        })
        .collect();

    UnifiedTable { quarters, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(company: &str, metric: &str, values: &[(&str, Option<f64>)]) -> MetricSeries {
        MetricSeries {
            company: company.to_string(),
            metric: metric.to_string(),
            values: values.iter().map(|(q, v)| (q.to_string(), *v)).collect(),
        }
    }

    fn headers(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(c, qs)| (c.to_string(), qs.iter().map(|q| q.to_string()).collect()))
            .collect()
    }

    #[test]
    fn unions_quarters_and_blanks_the_gaps() {
        let headers = headers(&[("A", &["1Q24", "2Q24"][..]), ("B", &["2Q24", "3Q24"][..])]);
        let series = [
            series("A", "SSS", &[("1Q24", Some(0.01)), ("2Q24", Some(0.02))]),
            series("B", "SSS", &[("2Q24", Some(0.03)), ("3Q24", Some(0.04))]),
        ];
        let table = consolidate(&headers, &series);

        assert_eq!(table.quarters, ["1Q24", "2Q24", "3Q24"]);
        assert_eq!(table.rows[0].cells, ["1,00%", "2,00%", ""]);
        assert_eq!(table.rows[1].cells, ["", "3,00%", "4,00%"]);
    }

    #[test]
    fn missing_tokens_are_not_quarters() {
        let headers = headers(&[("A", &["", "n/a", "1Q24", "n.d."][..]), ("B", &["4Q23"][..])]);
        let table = consolidate(&headers, &[]);
        assert_eq!(table.quarters, ["4Q23", "1Q24"]);
    }

    #[test]
    fn unparsed_values_become_empty_cells() {
        let headers = headers(&[("A", &["1Q24", "2Q24"][..])]);
        let series = [series("A", "OC", &[("1Q24", None), ("2Q24", Some(0.5))])];
        let table = consolidate(&headers, &series);
        assert_eq!(table.rows[0].cells, ["", "50,00%"]);
    }

    #[test]
    fn records_start_with_the_header() {
        let headers = headers(&[("Allos", &["1Q25"][..])]);
        let series = [series("Allos", "SSS", &[("1Q25", Some(0.042))])];
        let records = consolidate(&headers, &series).to_records();
        assert_eq!(records[0], ["Company", "Metric", "1Q25"]);
        assert_eq!(records[1], ["Allos", "SSS", "4,20%"]);
    }

    #[test]
    fn splits_row_labels_at_the_first_space() {
        assert_eq!(
            split_row_label("SSS Allos"),
            ("SSS".to_string(), "Allos".to_string())
        );
        assert_eq!(
            split_row_label("InadimplenciaLiq Grupo Iguatemi"),
            ("InadimplenciaLiq".to_string(), "Grupo Iguatemi".to_string())
        );
        assert_eq!(split_row_label("SSS"), ("SSS".to_string(), String::new()));
    }

    #[test]
    fn collects_series_from_extracted_sources() {
        let source = ExtractedSource {
            company: "Allos".to_string(),
            header: ExtractedRow {
                label: "Quarters Allos".to_string(),
                values: vec![
                    CellValue::Text("1T24".to_string()),
                    CellValue::Text("2T24".to_string()),
                    CellValue::Empty,
                ],
            },
            metrics: vec![ExtractedRow {
                label: "SSS Allos".to_string(),
                values: vec![
                    CellValue::Text("0,05".to_string()),
                    CellValue::Text("n.d.".to_string()),
                    CellValue::Number(0.07),
                ],
            }],
        };
        let (headers, series) = collect_series(&[source]);
        assert_eq!(headers["Allos"], ["1Q24", "2Q24", ""]);
        assert_eq!(series[0].company, "Allos");
        assert_eq!(series[0].metric, "SSS");
        assert_eq!(series[0].values["1Q24"], Some(0.05));
        assert_eq!(series[0].values["2Q24"], None);

        let table = consolidate(&headers, &series);
        assert_eq!(table.quarters, ["1Q24", "2Q24"]);
        assert_eq!(table.rows[0].cells, ["5,00%", ""]);
    }
}
