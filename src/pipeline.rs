//! The end-to-end run: company workbooks in, consolidated report out.

use std::{
    fs,
    path::{Path, PathBuf},
};

use time::{Date, OffsetDateTime};
use tracing::{error, info, warn};

use crate::{
    chart::{ChartData, ChartRenderer, SvgChartRenderer, XlsxChartRenderer},
    config::PipelineConfig,
    consolidate::{collect_series, consolidate, TableRow, UnifiedTable},
    error::{ArtifactIoError, EnrichmentError, FatalInputError},
    extract::{extract_source, prepare_source, ExtractedSource},
    inflation::{
        discounted_rows, load_cached_inflation, refresh_inflation, BcbSeriesFetcher,
        IndexSeriesFetcher, InflationData,
    },
    report::write_report,
    Result,
};

/// Share of the progress bar covered by source preparation.
const SOURCES_PROGRESS: usize = 75;

/// Receives checkpoints of a run. Called synchronously from the thread running it.
pub trait ProgressObserver {
    fn on_progress(&self, _percent: u8) {}
    fn on_status(&self, _message: &str) {}
}

/// Sends checkpoints to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, percent: u8) {
        info!(percent, "progress");
    }

    fn on_status(&self, message: &str) {
        info!("{message}");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment {
    /// Index series fetched during this run.
    Fresh,
    /// Inflation files from an earlier run were reused.
    Cached,
    /// No inflation data; the report has no discounted rows.
    Skipped(String),
}

#[derive(Debug)]
pub struct RunSummary {
    pub report: PathBuf,
    pub table: UnifiedTable,
    pub discounted: Vec<TableRow>,
    pub enrichment: Enrichment,
    /// Chart artifacts that were written.
    pub charts: Vec<PathBuf>,
    pub delivered: Option<PathBuf>,
    pub delivery_error: Option<ArtifactIoError>,
}

pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Option<Box<dyn IndexSeriesFetcher + Send>>,
    /// Renderers and the file name each writes under the output directory.
    chart_renderers: Vec<(Box<dyn ChartRenderer + Send>, String)>,
    today: Date,
}

impl Pipeline {
    /// Pipeline with the SGS fetcher (unless fetching is disabled), the chart
    /// workbook and the chart image.
    pub fn new(config: PipelineConfig) -> Self {
        let fetcher: Option<Box<dyn IndexSeriesFetcher + Send>> = if config.fetch_inflation {
            Some(Box::new(BcbSeriesFetcher::new(config.sgs_base_url.clone())))
        } else {
            None
        };
        let workbook = XlsxChartRenderer {
            sheet_name: config.layout.table_sheet.clone(),
        };
        let workbook: Box<dyn ChartRenderer + Send> = Box::new(workbook);
        let image: Box<dyn ChartRenderer + Send> = Box::new(SvgChartRenderer::default());
        let chart_renderers = vec![
            (workbook, config.layout.chart_workbook_name.clone()),
            (image, config.layout.chart_image_name.clone()),
        ];
        Self {
            config,
            fetcher,
            chart_renderers,
            today: OffsetDateTime::now_utc().date(),
        }
    }

    pub fn with_fetcher<F: IndexSeriesFetcher + Send + 'static>(mut self, fetcher: F) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Only cached inflation files will be used.
    pub fn without_fetcher(mut self) -> Self {
        self.fetcher = None;
        self
    }

    /// Adds a renderer writing `file_name` in the output directory.
    pub fn with_chart_renderer<R, S>(mut self, renderer: R, file_name: S) -> Self
    where
        R: ChartRenderer + Send + 'static,
        S: Into<String>,
    {
        self.chart_renderers.push((Box::new(renderer), file_name.into()));
        self
    }

    pub fn without_charts(mut self) -> Self {
        self.chart_renderers.clear();
        self
    }

    /// Date embedded in the monthly inflation file name.
    pub fn with_date(mut self, today: Date) -> Self {
        self.today = today;
        self
    }

    /// Fails with every missing source file at once.
    pub fn check_inputs(&self) -> Result<()> {
        let missing: Vec<PathBuf> = self
            .config
            .profiles
            .iter()
            .map(|p| p.input_path(&self.config.paths))
            .filter(|path| !path.exists())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FatalInputError::MissingFiles(missing).into())
        }
    }

    pub fn run(&self, observer: &dyn ProgressObserver) -> Result<RunSummary> {
        observer.on_progress(0);
        match self.execute(observer) {
            Ok(summary) => {
                observer.on_progress(100);
                observer.on_status("Processing finished");
                Ok(summary)
            }
            Err(e) => {
                error!("run failed: {e:#}");
                observer.on_status(&format!("Error: {e:#}"));
                Err(e)
            }
        }
    }

    fn execute(&self, observer: &dyn ProgressObserver) -> Result<RunSummary> {
        let paths = &self.config.paths;
        let layout = &self.config.layout;

        observer.on_status("Checking input files...");
        self.check_inputs()?;

        let total = self.config.profiles.len();
        let mut sources: Vec<ExtractedSource> = Vec::with_capacity(total);
        for (i, profile) in self.config.profiles.iter().enumerate() {
            observer.on_status(&format!("Processing {}...", profile.company));
            let treated = prepare_source(profile, paths)?;
            sources.push(extract_source(profile, &treated)?);
            observer.on_progress(((i + 1) * SOURCES_PROGRESS / total) as u8);
        }

        observer.on_status("Updating inflation data...");
        let (inflation, enrichment) = match self.load_inflation() {
            Ok((data, enrichment)) => (Some(data), enrichment),
            Err(e) => {
                warn!("skipping inflation enrichment: {e}");
                observer.on_status(&format!("Inflation data unavailable: {e}"));
                (None, Enrichment::Skipped(e.to_string()))
            }
        };

        observer.on_status("Consolidating data...");
        let (headers, series) = collect_series(&sources);
        let table = consolidate(&headers, &series);
        info!(
            quarters = table.quarters.len(),
            rows = table.rows.len(),
            "table consolidated"
        );
        let discounted = inflation
            .as_ref()
            .map(|data| discounted_rows(&table, &data.quarterly, &self.config.discounts))
            .unwrap_or_default();

        let report = paths.output_dir.join(&layout.workbook_name);
        write_report(&report, &table, &discounted, inflation.as_ref(), layout)?;

        let charts = self.render_charts(&table, &discounted);

        let (delivered, delivery_error) = match self.deliver(&report) {
            Ok(path) => (Some(path), None),
            Err(e) => {
                warn!("{e}");
                observer.on_status(&format!("Report kept at {}: {e}", report.display()));
                (None, Some(e))
            }
        };

        Ok(RunSummary {
            report,
            table,
            discounted,
            enrichment,
            charts,
            delivered,
            delivery_error,
        })
    }

    /// Fresh series when a fetcher is set and answers, cached files otherwise.
    fn load_inflation(&self) -> std::result::Result<(InflationData, Enrichment), EnrichmentError> {
        let dir = &self.config.paths.output_dir;
        let files = &self.config.inflation_files;
        if let Some(fetcher) = &self.fetcher {
            match refresh_inflation(fetcher.as_ref(), &self.config.indices, dir, files, self.today) {
                Ok(data) => return Ok((data, Enrichment::Fresh)),
                Err(e) => warn!("{e}; trying cached inflation files"),
            }
        }
        load_cached_inflation(dir, files).map(|data| (data, Enrichment::Cached))
    }

    fn render_charts(&self, table: &UnifiedTable, discounted: &[TableRow]) -> Vec<PathBuf> {
        if self.chart_renderers.is_empty() {
            return Vec::new();
        }
        let layout = &self.config.layout;
        let data = ChartData::from_rows(
            &table.quarters,
            table.rows.iter().chain(discounted),
            &layout.chart_metrics,
            layout.chart_from_year,
        );
        if data.is_empty() {
            info!("nothing to chart");
            return Vec::new();
        }
        self.chart_renderers
            .iter()
            .filter_map(|(renderer, file_name)| {
                let output = self.config.paths.output_dir.join(file_name);
                match renderer.render(&data, &output) {
                    Ok(()) => Some(output),
                    Err(e) => {
                        warn!(path = %output.display(), "chart rendering failed: {e:#}");
                        None
                    }
                }
            })
            .collect()
    }

    fn deliver(&self, report: &Path) -> std::result::Result<PathBuf, ArtifactIoError> {
        let dir = &self.config.paths.delivery_dir;
        let target = dir.join(&self.config.layout.workbook_name);
        let io_error = |source| ArtifactIoError {
            from: report.to_path_buf(),
            to: target.clone(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_error)?;
        fs::copy(report, &target).map_err(io_error)?;
        info!(path = %target.display(), "report delivered");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspacePaths;
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl ProgressObserver for Recorder {
        fn on_progress(&self, percent: u8) {
            self.events.borrow_mut().push(format!("{percent}%"));
        }

        fn on_status(&self, message: &str) {
            self.events.borrow_mut().push(message.to_string());
        }
    }

    fn config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            paths: WorkspacePaths {
                input_dir: dir.path().join("reports"),
                output_dir: dir.path().join("out"),
                delivery_dir: dir.path().join("desktop"),
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn check_inputs_lists_every_missing_file() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(config(&dir)).without_fetcher();
        let err = pipeline.check_inputs().unwrap_err();
        match err.downcast_ref::<FatalInputError>() {
            Some(FatalInputError::MissingFiles(files)) => assert_eq!(files.len(), 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failed_run_reports_status_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(config(&dir)).without_fetcher().without_charts();
        let recorder = Recorder::default();
        assert!(pipeline.run(&recorder).is_err());

        let events = recorder.events.borrow();
        assert_eq!(events[0], "0%");
        assert!(events.last().unwrap().starts_with("Error: input files not found"));
        assert!(!dir.path().join("out").exists());
        assert!(!dir.path().join("desktop").exists());
    }

    #[test]
    fn log_observer_runs_without_a_receiver() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(config(&dir)).without_fetcher().without_charts();
        let err = pipeline.run(&LogObserver).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FatalInputError>(),
            Some(FatalInputError::MissingFiles(_))
        ));
    }
}
