//! Company spreadsheets.
//!
//! Each company publishes its indicators in its own layout. A [`CompanyProfile`]
//! names the sheet holding them and the anchor cell of every row we need; one
//! generic routine does the rest.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Error};
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    config::WorkspacePaths,
    error::FatalInputError,
    format::{localize_decimal, parse_decimal},
    Result,
};

/// First word of the label given to a company's quarter header row.
pub const HEADER_ROW_PREFIX: &str = "Quarters";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricAnchor {
    pub metric: String,
    pub anchor: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompanyProfile {
    pub company: String,
    pub input_file: String,
    pub treated_file: String,
    pub sheet: String,
    /// Rewrite numeric cells with a comma decimal separator when preparing the source.
    #[serde(default)]
    pub localize_decimals: bool,
    pub header_anchor: String,
    pub metrics: Vec<MetricAnchor>,
}

impl CompanyProfile {
    pub fn input_path(&self, paths: &WorkspacePaths) -> PathBuf {
        paths.input_dir.join(&self.input_file)
    }

    pub fn treated_path(&self, paths: &WorkspacePaths) -> PathBuf {
        paths.output_dir.join(&self.treated_file)
    }

    pub fn header_label(&self) -> String {
        format!("{HEADER_ROW_PREFIX} {}", self.company)
    }

    /// `"<metric> <company>"`, split back apart at the first space during consolidation.
    pub fn row_label(&self, metric: &str) -> String {
        format!("{metric} {}", self.company)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
}

impl CellValue {
    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => Self::Empty,
            Data::String(s) => Self::Text(s.clone()),
            Data::Float(f) => Self::Number(*f),
            Data::Int(i) => Self::Number(*i as f64),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn to_number(&self) -> Option<f64> {
        match self {
            Self::Empty => None,
            Self::Number(n) => Some(*n).filter(|n| n.is_finite()),
            Self::Text(s) => parse_decimal(s),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Zero-based position of an A1-style reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorCell {
    pub row: u32,
    pub col: u32,
}

impl FromStr for AnchorCell {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || Error::new(FatalInputError::InvalidAnchor(s.to_string()));
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .filter(|&i| i > 0)
            .ok_or_else(invalid)?;
        let (letters, digits) = s.split_at(split);
        if !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }
        let col = letters
            .chars()
            .try_fold(0u32, |acc, c| {
                let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
                acc.checked_mul(26)?.checked_add(digit)
            })
            .ok_or_else(invalid)?;
        let row = digits.parse::<u32>().ok().filter(|&r| r > 0).ok_or_else(invalid)?;
        Ok(Self {
            row: row - 1,
            col: col - 1,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub label: String,
    /// Cells after the anchor, up to the sheet's last used column.
    pub values: Vec<CellValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSource {
    pub company: String,
    pub header: ExtractedRow,
    pub metrics: Vec<ExtractedRow>,
}

/// Opens `sheet` in `path`, failing with the list of sheets the workbook does have.
pub fn open_sheet<P: AsRef<Path>>(path: P, sheet: &str) -> Result<Range<Data>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(FatalInputError::MissingFiles(vec![path.to_path_buf()]).into());
    }
    let mut spreadsheet: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;
    let available = spreadsheet.sheet_names();
    if !available.iter().any(|name| name == sheet) {
        return Err(FatalInputError::MissingSheet {
            path: path.to_path_buf(),
            sheet: sheet.to_string(),
            available,
        }
        .into());
    }
    spreadsheet
        .worksheet_range(sheet)
        .with_context(|| format!("failed to read sheet '{sheet}' of {}", path.display()))
}

/// Copies the profile's sheet, and only that sheet, into the treated workbook.
/// The source file is left untouched.
pub fn prepare_source(profile: &CompanyProfile, paths: &WorkspacePaths) -> Result<PathBuf> {
    let input = profile.input_path(paths);
    let output = profile.treated_path(paths);
    let range = open_sheet(&input, &profile.sheet)?;

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&profile.sheet)?;
    let (start_row, start_col) = range.start().unwrap_or_default();
    for (r, c, data) in range.used_cells() {
        let row = start_row + r as u32;
        let col = u16::try_from(start_col as usize + c).context("column out of range")?;
        match data {
            Data::Empty => {}
            Data::Float(f) if profile.localize_decimals => {
                worksheet.write_string(row, col, localize_decimal(&f.to_string()))?;
            }
            Data::Float(f) => {
                worksheet.write_number(row, col, *f)?;
            }
            Data::Int(i) => {
                worksheet.write_number(row, col, *i as f64)?;
            }
            Data::Bool(b) => {
                worksheet.write_boolean(row, col, *b)?;
            }
            Data::DateTime(dt) => {
                worksheet.write_number(row, col, dt.as_f64())?;
            }
            Data::String(s) if profile.localize_decimals && parse_decimal(s).is_some() => {
                worksheet.write_string(row, col, localize_decimal(s))?;
            }
            other => {
                worksheet.write_string(row, col, other.to_string())?;
            }
        }
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    workbook
        .save(&output)
        .with_context(|| format!("failed to save {}", output.display()))?;
    info!(company = %profile.company, output = %output.display(), "source prepared");
    Ok(output)
}

/// Reads the row starting at `anchor` through the last used column. The anchor cell
/// itself is replaced by `label`.
pub fn extract_row(range: &Range<Data>, anchor: AnchorCell, label: &str) -> ExtractedRow {
    let last_col = range.end().map_or(anchor.col, |(_, c)| c.max(anchor.col));
    let values = (anchor.col + 1..=last_col)
        .map(|col| {
            range
                .get_value((anchor.row, col))
                .map_or(CellValue::Empty, CellValue::from_data)
        })
        .collect();
    ExtractedRow {
        label: label.to_string(),
        values,
    }
}

/// Extracts the header row and every metric row of a prepared workbook.
pub fn extract_source<P: AsRef<Path>>(
    profile: &CompanyProfile,
    treated: P,
) -> Result<ExtractedSource> {
    let range = open_sheet(treated, &profile.sheet)?;
    let header = extract_row(
        &range,
        profile.header_anchor.parse()?,
        &profile.header_label(),
    );
    let metrics = profile
        .metrics
        .iter()
        .map(|m| {
            let row = extract_row(&range, m.anchor.parse()?, &profile.row_label(&m.metric));
            debug!(label = %row.label, cells = row.values.len(), "row extracted");
            Ok(row)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ExtractedSource {
        company: profile.company.clone(),
        header,
        metrics,
    })
}
