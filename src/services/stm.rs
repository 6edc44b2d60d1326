use crate::{
    chunk::Chunk,
    config::StmConfig,
    fasta::SequenceRecord,
    normalize::{column_key, Derivation, Schema, ID_COLUMN, SEQUENCE_COLUMN},
    table::{html_table, RawTable, TableError},
};

use super::{transport::RequestBody, LabelledTable, ServiceRequest};

pub const SCHEMA: Schema = Schema {
    id: &[],
    sequence: &[],
    class: &["prediction", "class", "result"],
    score: &["probability", "prob", "score"],
    drop: &["#", "no.", "s.no"],
    positive: &["amp"],
    negative: &["non-amp", "non_amp", "non amp"],
    derivation: Some(Derivation {
        threshold: 0.5,
        inclusive: true,
        positive: "AMP",
        negative: "Non-AMP",
    }),
};

pub(super) fn request(config: &StmConfig, chunk: &Chunk) -> ServiceRequest {
    ServiceRequest {
        url: config.url.clone(),
        body: RequestBody::Form(vec![("input".to_string(), chunk.to_fasta())]),
        substituted: false,
    }
}

pub(super) fn parse(config: &StmConfig, body: &str) -> Result<Vec<LabelledTable>, TableError> {
    Ok(vec![LabelledTable::unlabelled(html_table(
        body,
        config.table_index,
    )?)])
}

/// The result page lists predictions in submission order without identifiers.
///
/// Columns the table already carries are left untouched.
pub(crate) fn prepare(mut raw: RawTable, records: &[SequenceRecord]) -> Result<RawTable, TableError> {
    let has_column = |raw: &RawTable, name: &str| {
        let key = column_key(name);
        raw.header().iter().any(|column| column_key(column) == key)
    };
    if !has_column(&raw, SEQUENCE_COLUMN) {
        raw.prepend_column(
            SEQUENCE_COLUMN,
            records.iter().map(|record| record.sequence.clone()).collect(),
        )?;
    }
    if !has_column(&raw, ID_COLUMN) {
        raw.prepend_column(
            ID_COLUMN,
            records.iter().map(|record| record.id.clone()).collect(),
        )?;
    }
    Ok(raw)
}
