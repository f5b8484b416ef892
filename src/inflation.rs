//! Inflation indices and inflation-discounted metrics.
//!
//! Monthly index variations (percent) are fetched from the central bank's time
//! series service, compounded into quarterly rates and used to deflate the
//! same-store metrics of the unified table.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use reqwest::blocking::Client;
use serde::Deserialize;
use time::{format_description::BorrowedFormatItem, macros::format_description, Date};
use tracing::{debug, info, warn};

use crate::{
    consolidate::{TableRow, UnifiedTable},
    error::EnrichmentError,
    format::{
        clean_cell, format_decimal, is_nan_sentinel, parse_decimal, parse_percent_points,
        points_to_percent, round_to,
    },
    quarter::QuarterLabel,
    Result,
};

pub const SGS_BASE_URL: &str = "https://api.bcb.gov.br";
pub const DISCOUNTED_SUFFIX: &str = "_Discounted";

const DATE_COLUMN: &str = "date";
const QUARTER_COLUMN: &str = "quarter";

static SGS_DATE_FMT: &[BorrowedFormatItem] = format_description!("[day]/[month]/[year]");
static FILE_DATE_FMT: &[BorrowedFormatItem] = format_description!("[year][month][day]");

/// A named index and its series code in the time series service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub code: u32,
}

/// Deflate `metric` rows with the `index` quarterly rate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiscountRule {
    pub metric: String,
    pub index: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InflationFiles {
    /// Monthly files are named `<prefix>_<YYYYMMDD>.csv`.
    pub monthly_prefix: String,
    pub quarterly_file: String,
}

impl Default for InflationFiles {
    fn default() -> Self {
        Self {
            monthly_prefix: "ipca_igpm".to_string(),
            quarterly_file: "ipca_igpm_trimestres.csv".to_string(),
        }
    }
}

impl InflationFiles {
    pub fn monthly_file_name(&self, date: Date) -> Result<String> {
        Ok(format!("{}_{}.csv", self.monthly_prefix, date.format(FILE_DATE_FMT)?))
    }

    /// Most recent monthly file in `dir`, by name.
    pub fn latest_monthly(&self, dir: &Path) -> Option<PathBuf> {
        let prefix = format!("{}_", self.monthly_prefix);
        let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| {
                        name.starts_with(&prefix)
                            && name.ends_with(".csv")
                            && name != self.quarterly_file
                    })
            })
            .collect();
        candidates.sort();
        candidates.pop()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: Date,
    /// Monthly variation in percent; `None` when the service returned garbage.
    pub value: Option<f64>,
}

/// Source of monthly index series.
pub trait IndexSeriesFetcher {
    /// Whole history of the series, in the order the source returns it.
    fn fetch(&self, code: u32) -> Result<Vec<Observation>>;
}

#[derive(Debug, Deserialize)]
pub struct SgsObservation {
    pub data: String,
    pub valor: String,
}

/// Fetches series from the central bank's SGS JSON endpoint.
#[derive(Debug, Clone)]
pub struct BcbSeriesFetcher {
    client: Client,
    base_url: String,
}

impl BcbSeriesFetcher {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn series_url(&self, code: u32) -> String {
        format!(
            "{}/dados/serie/bcdata.sgs.{code}/dados?formato=json",
            self.base_url.trim_end_matches('/')
        )
    }
}

impl Default for BcbSeriesFetcher {
    fn default() -> Self {
        Self::new(SGS_BASE_URL)
    }
}

impl IndexSeriesFetcher for BcbSeriesFetcher {
    fn fetch(&self, code: u32) -> Result<Vec<Observation>> {
        let url = self.series_url(code);
        debug!(%url, "fetching index series");
        let raw: Vec<SgsObservation> = self
            .client
            .get(&url)
            .send()?
            .error_for_status()?
            .json()
            .context("SGS response is not a list of observations")?;
        parse_observations(raw)
    }
}

/// Converts SGS records; values may use a comma separator.
pub fn parse_observations(raw: Vec<SgsObservation>) -> Result<Vec<Observation>> {
    raw.into_iter()
        .map(|o| {
            let date = Date::parse(o.data.trim(), &SGS_DATE_FMT)
                .with_context(|| format!("invalid observation date '{}'", o.data))?;
            Ok(Observation {
                date,
                value: parse_decimal(&o.valor),
            })
        })
        .collect()
}

/// `(∏(1 + r/100) - 1) * 100` over the values present, rounded to 2 places.
/// Missing values are skipped, not counted as zero.
pub fn compound<I: IntoIterator<Item = Option<f64>>>(rates: I) -> Option<f64> {
    let factors: Vec<f64> = rates.into_iter().flatten().map(|r| 1. + r / 100.).collect();
    if factors.is_empty() {
        return None;
    }
    let accumulated = (factors.iter().product::<f64>() - 1.) * 100.;
    Some(round_to(accumulated, 2))
}

/// `((1 + value/100) / (1 + inflation/100) - 1) * 100`, both in percent points.
pub fn discount(value: f64, inflation: f64) -> f64 {
    ((1. + value / 100.) / (1. + inflation / 100.) - 1.) * 100.
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyRow {
    pub date: Date,
    /// One value per index, in [`MonthlyInflation::indices`] order.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyInflation {
    pub indices: Vec<String>,
    pub rows: Vec<MonthlyRow>,
}

impl MonthlyInflation {
    /// Outer join of the series on date, sorted by date.
    pub fn merge(series: Vec<(String, Vec<Observation>)>) -> Self {
        let width = series.len();
        let mut by_date: BTreeMap<Date, Vec<Option<f64>>> = BTreeMap::new();
        for (i, (_, observations)) in series.iter().enumerate() {
            for o in observations {
                by_date.entry(o.date).or_insert_with(|| vec![None; width])[i] = o.value;
            }
        }
        Self {
            indices: series.into_iter().map(|(name, _)| name).collect(),
            rows: by_date
                .into_iter()
                .map(|(date, values)| MonthlyRow { date, values })
                .collect(),
        }
    }

    /// Compounds each index's months into quarterly accumulated rates.
    pub fn to_quarterly(&self) -> QuarterlyInflation {
        let mut by_quarter: BTreeMap<QuarterLabel, Vec<&MonthlyRow>> = BTreeMap::new();
        for row in &self.rows {
            by_quarter
                .entry(QuarterLabel::from_date(row.date))
                .or_default()
                .push(row);
        }
        let rows = by_quarter
            .into_iter()
            .map(|(quarter, months)| QuarterlyRow {
                quarter,
                rates: (0..self.indices.len())
                    .map(|i| compound(months.iter().map(|m| m.values.get(i).copied().flatten())))
                    .collect(),
            })
            .collect();
        QuarterlyInflation {
            indices: self.indices.clone(),
            rows,
        }
    }

    /// Dates as `dd/mm/yyyy`, values with two decimals and a dot, no quoting.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = WriterBuilder::new()
            .quote_style(QuoteStyle::Never)
            .from_path(&path)?;
        wtr.write_record(std::iter::once(DATE_COLUMN).chain(self.indices.iter().map(String::as_str)))?;
        for row in &self.rows {
            let mut record = vec![row.date.format(SGS_DATE_FMT)?];
            record.extend(
                row.values
                    .iter()
                    .map(|v| v.map(|v| format!("{v:.2}")).unwrap_or_default()),
            );
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().flexible(true).from_path(&path)?;
        let indices = rdr.headers()?.iter().skip(1).map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let raw_date = record.get(0).context("missing date field")?;
            let date = Date::parse(raw_date.trim(), &SGS_DATE_FMT)
                .with_context(|| format!("invalid date '{raw_date}'"))?;
            rows.push(MonthlyRow {
                date,
                values: record.iter().skip(1).map(parse_decimal).collect(),
            });
        }
        Ok(Self { indices, rows })
    }

    /// Table for the workbook, values with a comma separator.
    pub fn to_records(&self) -> Result<Vec<Vec<String>>> {
        let mut records = vec![std::iter::once(DATE_COLUMN.to_string())
            .chain(self.indices.iter().cloned())
            .collect::<Vec<_>>()];
        for row in &self.rows {
            let mut record = vec![row.date.format(SGS_DATE_FMT)?];
            record.extend(row.values.iter().map(|v| render_rate(*v)));
            records.push(record);
        }
        Ok(records)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuarterlyRow {
    pub quarter: QuarterLabel,
    /// Accumulated rate in percent per index, rounded to 2 places.
    pub rates: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuarterlyInflation {
    pub indices: Vec<String>,
    /// Chronological.
    pub rows: Vec<QuarterlyRow>,
}

impl QuarterlyInflation {
    /// Accumulated rate of `index` in `quarter`; the label may be in any source spelling.
    pub fn rate(&self, quarter: &str, index: &str) -> Option<f64> {
        let quarter = QuarterLabel::parse(quarter)?;
        let column = self.indices.iter().position(|i| i == index)?;
        self.rows
            .iter()
            .find(|r| r.quarter == quarter)
            .and_then(|r| r.rates.get(column).copied().flatten())
    }

    pub fn to_records(&self) -> Vec<Vec<String>> {
        let header = std::iter::once(QUARTER_COLUMN.to_string())
            .chain(self.indices.iter().cloned())
            .collect();
        std::iter::once(header)
            .chain(self.rows.iter().map(|row| {
                std::iter::once(row.quarter.to_string())
                    .chain(row.rates.iter().map(|r| render_rate(*r)))
                    .collect()
            }))
            .collect()
    }

    /// Rates with a comma separator; such fields get quoted.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = WriterBuilder::new().from_path(&path)?;
        for record in self.to_records() {
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().flexible(true).from_path(&path)?;
        let indices: Vec<String> = rdr.headers()?.iter().skip(1).map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let raw = record.get(0).unwrap_or_default();
            let Some(quarter) = QuarterLabel::parse(raw) else {
                warn!(quarter = raw, "skipping inflation row with unknown quarter");
                continue;
            };
            rows.push(QuarterlyRow {
                quarter,
                rates: (1..=indices.len())
                    .map(|i| record.get(i).and_then(parse_decimal))
                    .collect(),
            });
        }
        rows.sort_by_key(|r| r.quarter);
        Ok(Self { indices, rows })
    }
}

fn render_rate(rate: Option<f64>) -> String {
    rate.map(|r| format_decimal(r, 2)).unwrap_or_default()
}

/// Inflation tables plus the files they were written to or read from.
#[derive(Debug, Clone, PartialEq)]
pub struct InflationData {
    pub monthly: Option<MonthlyInflation>,
    pub quarterly: QuarterlyInflation,
    pub monthly_csv: Option<PathBuf>,
    pub quarterly_csv: PathBuf,
}

/// Fetches every index, writes the monthly and quarterly CSV files into `dir`.
pub fn refresh_inflation(
    fetcher: &dyn IndexSeriesFetcher,
    indices: &[IndexSpec],
    dir: &Path,
    files: &InflationFiles,
    today: Date,
) -> std::result::Result<InflationData, EnrichmentError> {
    let mut series = Vec::with_capacity(indices.len());
    for spec in indices {
        let observations = fetcher.fetch(spec.code).map_err(|cause| EnrichmentError::Fetch {
            name: spec.name.clone(),
            code: spec.code,
            cause,
        })?;
        info!(index = %spec.name, months = observations.len(), "index series fetched");
        series.push((spec.name.clone(), observations));
    }
    let monthly = MonthlyInflation::merge(series);
    let quarterly = monthly.to_quarterly();

    let store = || -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let monthly_csv = dir.join(files.monthly_file_name(today)?);
        monthly.write_csv(&monthly_csv)?;
        let quarterly_csv = dir.join(&files.quarterly_file);
        quarterly.write_csv(&quarterly_csv)?;
        Ok((monthly_csv, quarterly_csv))
    };
    let (monthly_csv, quarterly_csv) = store().map_err(EnrichmentError::Storage)?;
    info!(
        monthly = %monthly_csv.display(),
        quarterly = %quarterly_csv.display(),
        "inflation files written"
    );
    Ok(InflationData {
        monthly: Some(monthly),
        quarterly,
        monthly_csv: Some(monthly_csv),
        quarterly_csv,
    })
}

/// Reuses inflation files left by a previous run. The quarterly file is required,
/// the monthly one is optional.
pub fn load_cached_inflation(
    dir: &Path,
    files: &InflationFiles,
) -> std::result::Result<InflationData, EnrichmentError> {
    let quarterly_csv = dir.join(&files.quarterly_file);
    if !quarterly_csv.exists() {
        return Err(EnrichmentError::MissingInflationFile(quarterly_csv));
    }
    let quarterly = QuarterlyInflation::read_csv(&quarterly_csv).map_err(EnrichmentError::Storage)?;
    let monthly_csv = files.latest_monthly(dir);
    let monthly = match &monthly_csv {
        Some(path) => match MonthlyInflation::read_csv(path) {
            Ok(monthly) => Some(monthly),
            Err(e) => {
                warn!(path = %path.display(), "ignoring unreadable monthly inflation file: {e:#}");
                None
            }
        },
        None => None,
    };
    info!(quarterly = %quarterly_csv.display(), "using cached inflation files");
    Ok(InflationData {
        monthly_csv: monthly.as_ref().and(monthly_csv),
        monthly,
        quarterly,
        quarterly_csv,
    })
}

/// Deflated copies of every `metric` row, named `<metric>_Discounted`. A quarter
/// lacking either the value or the inflation rate gets an empty cell.
pub fn compute_discounted(
    table: &UnifiedTable,
    inflation: &QuarterlyInflation,
    metric: &str,
    index: &str,
) -> Vec<TableRow> {
    table
        .rows_for(metric)
        .map(|row| TableRow {
            company: row.company.clone(),
            metric: format!("{metric}{DISCOUNTED_SUFFIX}"),
            cells: table
                .quarters
                .iter()
                .zip(&row.cells)
                .map(|(quarter, cell)| {
                    if is_nan_sentinel(cell) {
                        return String::new();
                    }
                    let discounted = parse_percent_points(cell)
                        .zip(inflation.rate(quarter, index))
                        .map(|(value, rate)| discount(value, rate))
                        .filter(|d| d.is_finite());
                    clean_cell(discounted.map(points_to_percent).unwrap_or_default())
                })
                .collect(),
        })
        .collect()
}

/// Every rule applied in order, skipping metrics the table does not have.
pub fn discounted_rows(
    table: &UnifiedTable,
    inflation: &QuarterlyInflation,
    rules: &[DiscountRule],
) -> Vec<TableRow> {
    rules
        .iter()
        .flat_map(|rule| {
            let rows = compute_discounted(table, inflation, &rule.metric, &rule.index);
            if rows.is_empty() {
                warn!(metric = %rule.metric, "no rows to discount");
            }
            rows
        })
        .collect()
}
