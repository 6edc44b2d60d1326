use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::fasta::read_fasta_file;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Could not read sequences.")]
    Io(#[from] std::io::Error),

    #[error("Could not write dataset.")]
    Csv(#[from] csv::Error),
}

/// A labelled training/benchmark sequence.
#[derive(Debug, Serialize)]
struct DatasetRow<'a> {
    name: &'a str,
    sequence: &'a str,
    active: f64,
}

/// Files named like `*high*` hold active peptides.
pub fn is_active_set(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().contains("high"))
        .unwrap_or(false)
}

/// Write a FASTA file as `name,sequence,active` CSV next to it.
pub fn fasta_to_csv<P: AsRef<Path>>(path: P) -> Result<PathBuf, DatasetError> {
    let path = path.as_ref();
    let records = read_fasta_file(path)?;
    let out = path.with_extension("csv");
    let active = if is_active_set(path) { 1.0 } else { 0.0 };

    let mut writer = csv::Writer::from_path(&out)?;
    for record in &records {
        writer.serialize(DatasetRow {
            name: &record.id,
            sequence: &record.sequence,
            active,
        })?;
    }
    writer.flush()?;

    info!(
        output_file = out.to_str(),
        n_sequences = records.len(),
        "Saved dataset."
    );
    Ok(out)
}
