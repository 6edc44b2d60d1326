use serde_json::json;

use crate::{
    chunk::Chunk,
    config::AmplifyConfig,
    fasta::SequenceRecord,
    normalize::{Derivation, NormalizedTable, Schema},
    table::{RawTable, TableError},
};

use super::{transport::RequestBody, LabelledTable, Params, ServiceRequest};

pub const SCHEMA: Schema = Schema {
    id: &["sequence_id", "seq_id", "id"],
    sequence: &["sequence"],
    class: &["prediction"],
    score: &["probability_score", "score"],
    drop: &[],
    positive: &["amp"],
    negative: &["non-amp"],
    derivation: Some(Derivation {
        threshold: 0.5,
        inclusive: true,
        positive: "AMP",
        negative: "non-AMP",
    }),
};

/// Without an organism, identifiers are sent as 1-based positions and restored afterwards.
pub(super) fn request(config: &AmplifyConfig, chunk: &Chunk, params: &Params) -> ServiceRequest {
    let substituted = params.organism().is_none();
    let sequences: Vec<_> = chunk
        .records()
        .iter()
        .enumerate()
        .map(|(position, record)| {
            let id = if substituted {
                (position + 1).to_string()
            } else {
                record.id.clone()
            };
            json!({ "id": id, "sequence": record.sequence })
        })
        .collect();

    ServiceRequest {
        url: config.url.clone(),
        body: RequestBody::Json(json!({
            "organism": params.organism(),
            "accession": params.accession(),
            "sequences": sequences,
        })),
        substituted,
    }
}

/// Results come back as tab separated text.
pub(super) fn parse(body: &str) -> Result<Vec<LabelledTable>, TableError> {
    Ok(vec![LabelledTable::unlabelled(RawTable::from_delimited(
        body, b'\t',
    )?)])
}

/// Swap positional identifiers back for the submitted ones.
pub(crate) fn restore_ids(
    table: &mut NormalizedTable,
    records: &[SequenceRecord],
) -> Result<(), TableError> {
    for row in table.rows.iter_mut() {
        let record = row
            .id
            .parse::<usize>()
            .ok()
            .and_then(|position| position.checked_sub(1))
            .and_then(|index| records.get(index))
            .ok_or_else(|| {
                TableError::Mismatch(format!(
                    "identifier '{}' is not a position among {} submitted sequences",
                    row.id,
                    records.len()
                ))
            })?;
        row.id = record.id.clone();
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        normalize::{normalize, Context},
        services::{test::chunk, Service},
    };

    const RESPONSE: &str = "Sequence_ID\tSequence\tPrediction\tProbability_score\n\
                            1\tAAAA\tAMP\t0.97\n\
                            2\tCCCC\tnon-AMP\t0.03\n";

    #[test]
    fn test_ids_substituted_without_organism() {
        let request = request(&AmplifyConfig::default(), &chunk(), &Params::default());
        assert!(request.substituted);
        match request.body {
            RequestBody::Json(body) => {
                assert_eq!(body["sequences"][0]["id"], "1");
                assert_eq!(body["sequences"][1]["id"], "2");
                assert_eq!(body["sequences"][1]["sequence"], "CCCC");
                assert!(body["organism"].is_null());
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_ids_kept_with_organism() {
        let params = Params {
            organism: Some("Escherichia coli".to_string()),
            accession: Some("NC_000913.3".to_string()),
            ..Params::default()
        };
        let request = request(&AmplifyConfig::default(), &chunk(), &params);
        assert!(!request.substituted);
        match request.body {
            RequestBody::Json(body) => {
                assert_eq!(body["sequences"][0]["id"], "seq1");
                assert_eq!(body["organism"], "Escherichia coli");
                assert_eq!(body["accession"], "NC_000913.3");
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_identifiers_restored_in_order() {
        let chunk = chunk();
        let raw = parse(RESPONSE).unwrap().remove(0).table;
        let table = normalize(
            Service::Amplify,
            raw,
            &Context {
                records: chunk.records(),
                substituted: true,
            },
        )
        .unwrap();

        let ids: Vec<_> = table.rows.iter().map(|row| row.id.as_str()).collect();
        let expected: Vec<_> = chunk.records().iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, expected);
        assert_eq!(table.rows[0].flag, Some(true));
        assert_eq!(table.rows[1].flag, Some(false));
        assert_eq!(table.rows[1].score, Some(0.03));
    }

    #[test]
    fn test_unknown_position_is_error() {
        let records = vec![SequenceRecord::new("seq1", "AAAA")];
        let raw = RawTable::from_delimited("Sequence_ID\tPrediction\n3\tAMP\n", b'\t').unwrap();
        let result = normalize(
            Service::Amplify,
            raw,
            &Context {
                records: &records,
                substituted: true,
            },
        );
        assert!(matches!(result, Err(TableError::Mismatch(_))));
    }
}
