//! Prompt dataset loading. The input is a CSV file with a `prompt` column;
//! other columns are ignored.

use std::io::Read;
use std::path::{Path, PathBuf};

pub const PROMPT_COLUMN: &str = "prompt";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("cannot read dataset {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset has no `prompt` column (found: {found})")]
    MissingColumn { found: String },
    #[error("dataset contains no prompts")]
    Empty,
}

pub fn load_prompts(path: &Path) -> Result<Vec<String>, DatasetError> {
    let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let prompts = read_prompts(file)?;
    tracing::debug!(path = %path.display(), count = prompts.len(), "loaded prompts");
    Ok(prompts)
}

pub fn read_prompts<R: Read>(reader: R) -> Result<Vec<String>, DatasetError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = reader.headers()?.clone();
    let column = headers
        .iter()
        .position(|h| h.trim().trim_start_matches('\u{feff}') == PROMPT_COLUMN)
        .ok_or_else(|| DatasetError::MissingColumn {
            found: headers.iter().collect::<Vec<_>>().join(", "),
        })?;

    let mut prompts = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(prompt) = record.get(column) {
            prompts.push(prompt.to_string());
        }
    }

    if prompts.is_empty() {
        return Err(DatasetError::Empty);
    }
    Ok(prompts)
}
