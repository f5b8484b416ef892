//! The consolidated workbook.
//!
//! Sheet one holds the unified table with the discounted rows appended a few
//! rows below it. Sheet two holds the monthly inflation table at column A and the
//! quarterly one further right. An optional third sheet repeats the inflation CSV
//! files cell by cell.

use std::{fs, path::Path};

use anyhow::Context;
use csv::ReaderBuilder;
use rust_xlsxwriter::{ColNum, RowNum, Workbook, Worksheet};
use tracing::{info, warn};

use crate::{
    config::ReportLayout,
    consolidate::{TableRow, UnifiedTable},
    format::clean_cell,
    inflation::InflationData,
    Result,
};

const INFLATION_UNAVAILABLE: &str = "inflation data unavailable";
const MONTHLY_UNAVAILABLE: &str = "monthly inflation data unavailable";

/// Writes `records` with their top-left corner at (`row`, `col`). NaN-like cells are
/// written as blanks.
fn write_records(
    worksheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    records: &[Vec<String>],
) -> Result<()> {
    for (r, record) in records.iter().enumerate() {
        for (c, cell) in record.iter().enumerate() {
            let cell = clean_cell(cell.clone());
            if cell.is_empty() {
                continue;
            }
            let col = col
                .checked_add(u16::try_from(c).context("too many columns")?)
                .context("too many columns")?;
            worksheet.write_string(row + r as RowNum, col, cell)?;
        }
    }
    Ok(())
}

/// Cells of a CSV file exactly as written, header included.
pub fn read_csv_cells<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<String>>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    rdr.records()
        .map(|r| Ok(r?.iter().map(str::to_string).collect()))
        .collect()
}

/// 0-based row of the first discounted row. Moved below the table when the table
/// would otherwise be overwritten.
fn discounted_start(table: &UnifiedTable, layout: &ReportLayout) -> RowNum {
    let wanted = layout.discounted_start_row.saturating_sub(1);
    let used = table.rows.len() as RowNum + 1;
    if wanted < used {
        warn!(
            wanted = layout.discounted_start_row,
            table_rows = used,
            "discounted rows would overlap the table, moving them below it"
        );
        used + 1
    } else {
        wanted
    }
}

pub fn write_report<P: AsRef<Path>>(
    path: P,
    table: &UnifiedTable,
    discounted: &[TableRow],
    inflation: Option<&InflationData>,
    layout: &ReportLayout,
) -> Result<()> {
    let path = path.as_ref();
    let mut workbook = Workbook::new();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&layout.table_sheet)?;
    write_records(worksheet, 0, 0, &table.to_records())?;
    if !discounted.is_empty() {
        let records: Vec<_> = discounted.iter().map(TableRow::to_record).collect();
        write_records(worksheet, discounted_start(table, layout), 0, &records)?;
    }

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&layout.inflation_sheet)?;
    match inflation {
        Some(data) => {
            match &data.monthly {
                Some(monthly) => write_records(worksheet, 0, 0, &monthly.to_records()?)?,
                None => {
                    worksheet.write_string(0, 0, MONTHLY_UNAVAILABLE)?;
                }
            }
            let col = layout.quarterly_inflation_column.saturating_sub(1);
            write_records(worksheet, 0, col, &data.quarterly.to_records())?;
        }
        None => {
            worksheet.write_string(0, 0, INFLATION_UNAVAILABLE)?;
        }
    }

    if layout.raw_inflation_sheet {
        if let Some(data) = inflation {
            let mut cells = match &data.monthly_csv {
                Some(monthly) => read_csv_cells(monthly)?,
                None => Vec::new(),
            };
            if !cells.is_empty() {
                cells.push(Vec::new());
            }
            cells.extend(read_csv_cells(&data.quarterly_csv)?);
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&layout.raw_inflation_sheet_name)?;
            for (r, record) in cells.iter().enumerate() {
                for (c, cell) in record.iter().enumerate() {
                    if !cell.is_empty() {
                        worksheet.write_string(r as RowNum, c as ColNum, cell)?;
                    }
                }
            }
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    info!(path = %path.display(), rows = table.rows.len(), discounted = discounted.len(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflation::{QuarterlyInflation, QuarterlyRow};
    use calamine::{open_workbook, Data, Reader, Xlsx};
    use tempfile::TempDir;

    fn row(company: &str, metric: &str, cells: &[&str]) -> TableRow {
        TableRow {
            company: company.to_string(),
            metric: metric.to_string(),
            cells: cells.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn table() -> UnifiedTable {
        UnifiedTable {
            quarters: vec!["1Q24".to_string(), "2Q24".to_string()],
            rows: vec![
                row("Allos", "SSS", &["5,00%", "NaN"]),
                row("Allos", "SSR", &["", "3,00%"]),
            ],
        }
    }

    fn cell(range: &calamine::Range<Data>, row: u32, col: u32) -> String {
        range
            .get_value((row, col))
            .map(|d| d.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn writes_table_discounted_rows_and_inflation() {
        let dir = TempDir::new().unwrap();
        let quarterly_csv = dir.path().join("q.csv");
        fs::write(&quarterly_csv, "quarter,IPCA\n1Q24,\"2,00\"\n").unwrap();
        let inflation = InflationData {
            monthly: None,
            quarterly: QuarterlyInflation {
                indices: vec!["IPCA".to_string()],
                rows: vec![QuarterlyRow {
                    quarter: "1Q24".parse().unwrap(),
                    rates: vec![Some(2.0)],
                }],
            },
            monthly_csv: None,
            quarterly_csv,
        };
        let discounted = [row("Allos", "SSS_Discounted", &["2,94%", ""])];
        let path = dir.path().join("out").join("Consolidado.xlsx");
        write_report(&path, &table(), &discounted, Some(&inflation), &ReportLayout::default())
            .unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(
            workbook.sheet_names(),
            ["Consolidado", "IPCA_IGPM", "IPCA_IGPM_CSV"]
        );

        let sheet = workbook.worksheet_range("Consolidado").unwrap();
        assert_eq!(cell(&sheet, 0, 0), "Company");
        assert_eq!(cell(&sheet, 0, 3), "2Q24");
        assert_eq!(cell(&sheet, 1, 2), "5,00%");
        assert_eq!(cell(&sheet, 1, 3), "");
        assert_eq!(cell(&sheet, 17, 1), "SSS_Discounted");
        assert_eq!(cell(&sheet, 17, 2), "2,94%");

        let sheet = workbook.worksheet_range("IPCA_IGPM").unwrap();
        assert_eq!(cell(&sheet, 0, 0), MONTHLY_UNAVAILABLE);
        assert_eq!(cell(&sheet, 0, 4), "quarter");
        assert_eq!(cell(&sheet, 1, 5), "2,00");

        let sheet = workbook.worksheet_range("IPCA_IGPM_CSV").unwrap();
        assert_eq!(cell(&sheet, 1, 1), "2,00");
    }

    #[test]
    fn without_inflation_the_second_sheet_says_so() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Consolidado.xlsx");
        write_report(&path, &table(), &[], None, &ReportLayout::default()).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(workbook.sheet_names(), ["Consolidado", "IPCA_IGPM"]);
        let sheet = workbook.worksheet_range("IPCA_IGPM").unwrap();
        assert_eq!(cell(&sheet, 0, 0), INFLATION_UNAVAILABLE);
    }

    #[test]
    fn discounted_rows_never_overwrite_the_table() {
        let layout = ReportLayout {
            discounted_start_row: 2,
            ..ReportLayout::default()
        };
        assert_eq!(discounted_start(&table(), &layout), 4);
        assert_eq!(discounted_start(&table(), &ReportLayout::default()), 17);
    }
}
