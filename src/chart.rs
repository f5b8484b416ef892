//! Charts of the final table.

use std::{
    fmt::{self, Write},
    fs,
    path::Path,
};

use anyhow::Context;
use rust_xlsxwriter::{Chart, ChartType, ColNum, RowNum, Workbook};
use tracing::info;

use crate::{
    consolidate::{TableRow, COMPANY_COLUMN, METRIC_COLUMN},
    format::{is_nan_sentinel, to_rounded_number},
    quarter::{sort_key, UNPARSEABLE_KEY},
    Result,
};

const CHART_ROWS: RowNum = 20;
const CHART_COLS: ColNum = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub company: String,
    /// Percent points per plotted quarter.
    pub points: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricChart {
    pub metric: String,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartData {
    pub quarters: Vec<String>,
    pub charts: Vec<MetricChart>,
}

impl ChartData {
    /// One chart per metric in `metrics` that has rows, restricted to quarters from
    /// `from_year` on.
    pub fn from_rows<'a, I>(quarters: &[String], rows: I, metrics: &[String], from_year: i32) -> Self
    where
        I: IntoIterator<Item = &'a TableRow>,
    {
        let rows: Vec<&TableRow> = rows.into_iter().collect();
        let kept: Vec<usize> = quarters
            .iter()
            .enumerate()
            .filter(|(_, q)| {
                let key = sort_key(q);
                key != UNPARSEABLE_KEY && key.0 >= from_year
            })
            .map(|(i, _)| i)
            .collect();

        let charts = metrics
            .iter()
            .filter_map(|metric| {
                let series: Vec<ChartSeries> = rows
                    .iter()
                    .filter(|r| &r.metric == metric)
                    .map(|r| ChartSeries {
                        company: r.company.clone(),
                        points: kept.iter().map(|&i| point(r.cells.get(i))).collect(),
                    })
                    .collect();
                (!series.is_empty()).then(|| MetricChart {
                    metric: metric.clone(),
                    series,
                })
            })
            .collect();

        Self {
            quarters: kept.iter().map(|&i| quarters[i].clone()).collect(),
            charts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty() || self.quarters.is_empty()
    }
}

fn point(cell: Option<&String>) -> Option<f64> {
    let cell = cell?;
    if is_nan_sentinel(cell) {
        return None;
    }
    to_rounded_number(cell.trim().trim_end_matches('%'), 3)
}

/// Turns chart data into an artifact at `output`.
pub trait ChartRenderer {
    fn render(&self, data: &ChartData, output: &Path) -> Result<()>;
}

/// Writes the plotted values to a workbook with one native line chart per metric.
#[derive(Debug, Clone)]
pub struct XlsxChartRenderer {
    pub sheet_name: String,
}

impl Default for XlsxChartRenderer {
    fn default() -> Self {
        Self {
            sheet_name: "Consolidado".to_string(),
        }
    }
}

impl ChartRenderer for XlsxChartRenderer {
    fn render(&self, data: &ChartData, output: &Path) -> Result<()> {
        let sheet = self.sheet_name.as_str();
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet)?;

        worksheet.write_string(0, 0, COMPANY_COLUMN)?;
        worksheet.write_string(0, 1, METRIC_COLUMN)?;
        for (i, quarter) in data.quarters.iter().enumerate() {
            worksheet.write_string(0, 2 + i as ColNum, quarter)?;
        }
        let last_col = 1 + data.quarters.len() as ColNum;

        let mut row: RowNum = 1;
        let mut charts = Vec::with_capacity(data.charts.len());
        for metric_chart in &data.charts {
            let mut chart = Chart::new(ChartType::Line);
            for series in &metric_chart.series {
                worksheet.write_string(row, 0, &series.company)?;
                worksheet.write_string(row, 1, &metric_chart.metric)?;
                for (i, value) in series.points.iter().enumerate() {
                    if let Some(value) = value {
                        worksheet.write_number(row, 2 + i as ColNum, *value)?;
                    }
                }
                chart
                    .add_series()
                    .set_name((sheet, row, 0))
                    .set_categories((sheet, 0, 2, 0, last_col))
                    .set_values((sheet, row, 2, row, last_col));
                row += 1;
            }
            chart.title().set_name(metric_chart.metric.as_str());
            chart.x_axis().set_name("Quarter");
            chart.y_axis().set_name("%");
            charts.push(chart);
        }

        let first_chart_row = row + 2;
        for (i, chart) in charts.iter().enumerate() {
            let chart_row = first_chart_row + (i as RowNum / 2) * CHART_ROWS;
            let chart_col = (i as ColNum % 2) * CHART_COLS;
            worksheet.insert_chart(chart_row, chart_col, chart)?;
        }

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        workbook
            .save(output)
            .with_context(|| format!("failed to save {}", output.display()))?;
        info!(path = %output.display(), charts = charts.len(), "charts written");
        Ok(())
    }
}

const PALETTE: [&str; 6] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b"];
const PLOT_MARGIN: f64 = 44.;
const TITLE_HEIGHT: f64 = 28.;

/// Draws every metric chart as a panel of one SVG image.
#[derive(Debug, Clone)]
pub struct SvgChartRenderer {
    pub panel_width: u32,
    pub panel_height: u32,
    /// Panels per row.
    pub columns: u32,
}

impl Default for SvgChartRenderer {
    fn default() -> Self {
        Self {
            panel_width: 480,
            panel_height: 300,
            columns: 2,
        }
    }
}

impl SvgChartRenderer {
    pub fn to_svg(&self, data: &ChartData) -> std::result::Result<String, fmt::Error> {
        let columns = self.columns.max(1) as usize;
        let rows = data.charts.len().div_ceil(columns).max(1);
        let (width, height) = (f64::from(self.panel_width), f64::from(self.panel_height));

        let mut svg = String::new();
        writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" font-family="sans-serif" font-size="11">"#,
            width * columns as f64,
            height * rows as f64
        )?;
        writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
        for (i, chart) in data.charts.iter().enumerate() {
            let x0 = (i % columns) as f64 * width;
            let y0 = (i / columns) as f64 * height;
            self.write_panel(&mut svg, &data.quarters, chart, x0, y0)?;
        }
        svg.push_str("</svg>\n");
        Ok(svg)
    }

    fn write_panel(
        &self,
        svg: &mut String,
        quarters: &[String],
        chart: &MetricChart,
        x0: f64,
        y0: f64,
    ) -> fmt::Result {
        let (width, height) = (f64::from(self.panel_width), f64::from(self.panel_height));
        let (left, right) = (x0 + PLOT_MARGIN, x0 + width - PLOT_MARGIN / 2.);
        let (top, bottom) = (y0 + TITLE_HEIGHT, y0 + height - PLOT_MARGIN);

        writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="13">{}</text>"#,
            x0 + width / 2.,
            y0 + 18.,
            escape(&chart.metric)
        )?;
        writeln!(
            svg,
            r#"<polyline points="{left:.1},{top:.1} {left:.1},{bottom:.1} {right:.1},{bottom:.1}" fill="none" stroke="black"/>"#
        )?;

        let values = chart.series.iter().flat_map(|s| s.points.iter().flatten());
        let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
        if !lo.is_finite() {
            return Ok(());
        }
        let (lo, hi) = if hi - lo < f64::EPSILON { (lo - 1., hi + 1.) } else { (lo, hi) };
        let x = |j: usize| match quarters.len() {
            0 | 1 => (left + right) / 2.,
            n => left + j as f64 * (right - left) / (n - 1) as f64,
        };
        let y = |v: f64| bottom - (v - lo) / (hi - lo) * (bottom - top);

        for (v, py) in [(lo, bottom), (hi, top)] {
            writeln!(
                svg,
                r#"<text x="{:.1}" y="{py:.1}" text-anchor="end">{v:.1}%</text>"#,
                left - 4.
            )?;
        }
        if let (Some(first), Some(last)) = (quarters.first(), quarters.last()) {
            writeln!(
                svg,
                r#"<text x="{left:.1}" y="{:.1}">{}</text>"#,
                bottom + 14.,
                escape(first)
            )?;
            writeln!(
                svg,
                r#"<text x="{right:.1}" y="{:.1}" text-anchor="end">{}</text>"#,
                bottom + 14.,
                escape(last)
            )?;
        }

        for (k, series) in chart.series.iter().enumerate() {
            let color = PALETTE[k % PALETTE.len()];
            // Gaps split the line; an isolated point is drawn as a dot.
            let mut run: Vec<(f64, f64)> = Vec::new();
            for (j, point) in series.points.iter().chain([&None]).enumerate() {
                match point {
                    Some(v) => run.push((x(j), y(*v))),
                    None => {
                        write_run(svg, &run, color)?;
                        run.clear();
                    }
                }
            }
            writeln!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" fill="{color}">{}</text>"#,
                left + 6.,
                top + 12. * (k + 1) as f64,
                escape(&series.company)
            )?;
        }
        Ok(())
    }
}

fn write_run(svg: &mut String, run: &[(f64, f64)], color: &str) -> fmt::Result {
    match run {
        [] => Ok(()),
        [(x, y)] => writeln!(svg, r#"<circle cx="{x:.1}" cy="{y:.1}" r="2.5" fill="{color}"/>"#),
        points => {
            let points: Vec<String> = points.iter().map(|(x, y)| format!("{x:.1},{y:.1}")).collect();
            writeln!(
                svg,
                r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="1.5"/>"#,
                points.join(" ")
            )
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl ChartRenderer for SvgChartRenderer {
    fn render(&self, data: &ChartData, output: &Path) -> Result<()> {
        let svg = self.to_svg(data)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(output, svg).with_context(|| format!("failed to save {}", output.display()))?;
        info!(path = %output.display(), panels = data.charts.len(), "chart image written");
        Ok(())
    }
}
