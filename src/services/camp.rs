use crate::{
    chunk::Chunk,
    config::CampConfig,
    normalize::{Derivation, Schema},
    table::{html_tables, TableError},
};

use super::{transport::RequestBody, LabelledTable, ServiceRequest};

pub const SCHEMA: Schema = Schema {
    id: &["seq._id.", "seq_id", "sequence_id", "id"],
    sequence: &["sequence"],
    class: &["class", "prediction"],
    score: &["amp_probability", "probability"],
    drop: &["#", "s.no"],
    positive: &["amp"],
    negative: &["namp", "nonamp", "non-amp"],
    derivation: Some(Derivation {
        threshold: 0.5,
        inclusive: true,
        positive: "AMP",
        negative: "NAMP",
    }),
};

/// All configured algorithms go out in a single multipart request.
pub(super) fn request(config: &CampConfig, chunk: &Chunk) -> ServiceRequest {
    let fields = config
        .algorithms
        .iter()
        .map(|algorithm| ("algo".to_string(), algorithm.clone()))
        .chain(std::iter::once(("sequences".to_string(), chunk.to_fasta())))
        .collect();
    ServiceRequest {
        url: config.url.clone(),
        body: RequestBody::Multipart(fields),
        substituted: false,
    }
}

/// One result table per requested algorithm, in request order.
pub(super) fn parse(config: &CampConfig, body: &str) -> Result<Vec<LabelledTable>, TableError> {
    let mut tables = html_tables(body)?.into_iter().skip(config.table_offset);
    config
        .algorithms
        .iter()
        .enumerate()
        .map(|(position, algorithm)| {
            tables
                .next()
                .map(|table| LabelledTable {
                    label: Some(algorithm.clone()),
                    table,
                })
                .ok_or(TableError::MissingTable(config.table_offset + position))
        })
        .collect()
}
