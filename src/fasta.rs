use std::{collections::HashSet, fmt, fs, io, path::Path};

use bio::io::fasta;
use tracing::{debug, warn};

/// A peptide read from a FASTA file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceRecord {
    pub id: String,
    pub sequence: String,
}

impl SequenceRecord {
    pub fn new(id: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence: sequence.into(),
        }
    }

    /// Number of bytes the record takes up once written as FASTA.
    pub fn serialized_len(&self) -> usize {
        // '>' + id + '\n' + sequence + '\n'
        self.id.len() + self.sequence.len() + 3
    }
}

impl fmt::Display for SequenceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ">{}", self.id)?;
        writeln!(f, "{}", self.sequence)
    }
}

impl From<fasta::Record> for SequenceRecord {
    fn from(record: fasta::Record) -> Self {
        Self {
            id: record.id().to_string(),
            sequence: String::from_utf8_lossy(record.seq()).into_owned(),
        }
    }
}

/// Concatenate records into a FASTA payload.
pub fn to_fasta(records: &[SequenceRecord]) -> String {
    records.iter().map(|record| record.to_string()).collect()
}

pub fn read_records<R: io::Read>(reader: R) -> io::Result<Vec<SequenceRecord>> {
    let records = fasta::Reader::new(reader)
        .records()
        .map(|record_result| record_result.map(SequenceRecord::from))
        .collect::<io::Result<Vec<_>>>()?;

    warn_on_duplicate_ids(&records);
    Ok(records)
}

pub fn read_fasta_file<P: AsRef<Path>>(path: P) -> io::Result<Vec<SequenceRecord>> {
    let records = read_records(fs::File::open(path.as_ref())?)?;
    debug!(
        input_file = path.as_ref().to_str(),
        n_records = records.len(),
        "Read sequences."
    );
    Ok(records)
}

// Repeated identifiers are kept and only reported.
fn warn_on_duplicate_ids(records: &[SequenceRecord]) {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| !seen.insert(record.id.as_str()))
        .for_each(|record| warn!(id = record.id.as_str(), "Duplicate sequence identifier."));
}
