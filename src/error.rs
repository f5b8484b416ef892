use std::{io, path::PathBuf};

use thiserror::Error;

/// A required source file or sheet is missing. Halts the whole run.
#[derive(Debug, Error)]
pub enum FatalInputError {
    #[error("input files not found: {}", display_paths(.0))]
    MissingFiles(Vec<PathBuf>),

    #[error(
        "sheet '{sheet}' not found in {}; available sheets: {}",
        .path.display(),
        .available.join(", ")
    )]
    MissingSheet {
        path: PathBuf,
        sheet: String,
        available: Vec<String>,
    },

    #[error("invalid anchor cell '{0}'")]
    InvalidAnchor(String),
}

/// Inflation enrichment could not run. Logged, never fatal.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("failed to fetch index series {name} ({code}): {cause:#}")]
    Fetch {
        name: String,
        code: u32,
        cause: anyhow::Error,
    },

    #[error("inflation file not found: {}", .0.display())]
    MissingInflationFile(PathBuf),

    #[error("inflation files unusable: {0:#}")]
    Storage(anyhow::Error),
}

/// The final artifact could not be copied to its delivery location.
#[derive(Debug, Error)]
#[error("failed to deliver {} to {}: {source}", .from.display(), .to.display())]
pub struct ArtifactIoError {
    pub from: PathBuf,
    pub to: PathBuf,
    pub source: io::Error,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sheet_lists_available_sheets() {
        let err = FatalInputError::MissingSheet {
            path: PathBuf::from("reports/allos.xlsx"),
            sheet: "Indicadores".to_string(),
            available: vec!["Capa".to_string(), "DRE".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'Indicadores'"));
        assert!(msg.contains("available sheets: Capa, DRE"));
    }

    #[test]
    fn missing_files_joins_paths() {
        let err = FatalInputError::MissingFiles(vec![
            PathBuf::from("a.xlsx"),
            PathBuf::from("b.xlsx"),
        ]);
        assert_eq!(err.to_string(), "input files not found: a.xlsx, b.xlsx");
    }
}
