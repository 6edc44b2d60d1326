use crate::{
    chunk::Chunk,
    config::DbaaspConfig,
    normalize::{column_key, Derivation, Schema},
    table::{RawTable, TableError},
};

use super::{transport::RequestBody, LabelledTable, Params, ServiceRequest};

const COMBINED_COLUMN: &str = "predictive_value_(type)";

pub const SCHEMA: Schema = Schema {
    id: &["id", "name", "seq_id", "sequence_id"],
    sequence: &["sequence", "seq"],
    class: &["class"],
    score: &["score", "probability"],
    drop: &[],
    positive: &["active"],
    negative: &["not active"],
    derivation: Some(Derivation {
        threshold: 0.5,
        inclusive: true,
        positive: "Active",
        negative: "Not Active",
    }),
};

pub(super) fn request(config: &DbaaspConfig, chunk: &Chunk, params: &Params) -> ServiceRequest {
    let strain = params.strain().unwrap_or(config.default_strain.as_str());
    ServiceRequest {
        url: config.url.clone(),
        body: RequestBody::Form(vec![
            ("strains".to_string(), strain.to_string()),
            ("sequences".to_string(), chunk.to_fasta()),
        ]),
        substituted: false,
    }
}

/// The service answers with a JSON array of rows, headed by the column names.
pub(super) fn parse(body: &str) -> Result<Vec<LabelledTable>, TableError> {
    Ok(vec![LabelledTable::unlabelled(RawTable::from_json_rows(
        body,
    )?)])
}

/// Split "Predictive value (Type)" cells such as `12.5 (AMP)` into two columns.
pub(crate) fn prepare(mut raw: RawTable) -> RawTable {
    if let Some(index) = raw
        .header()
        .iter()
        .position(|name| column_key(name) == COMBINED_COLUMN)
    {
        raw.split_column(index, &["predictive_value", "type"], |cell| {
            let (value, kind) = cell.trim().split_once(' ').unwrap_or((cell.trim(), ""));
            vec![
                value.to_string(),
                kind.trim().trim_matches(|c| c == '(' || c == ')').to_string(),
            ]
        });
    }
    raw
}
