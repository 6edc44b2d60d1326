use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    chunk::{self, Chunk},
    config::{Config, ConfigError},
    fasta::{read_fasta_file, SequenceRecord},
    model::{Classifier, ModelError, Predictor},
    normalize::{normalize, Context, NormalizedTable},
    output::{output_path, write_table_to_file, OutputError},
    services::{submit, transport::Transport, Params, Service, ServiceError},
    table::TableError,
};

pub const LOCAL_MODEL_NAME: &str = "ampscanner";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not read sequences from {path}.")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Malformed response from {service}.")]
    Malformed {
        service: Service,
        #[source]
        source: TableError,
    },
}

/// Predictions of one service for one input file and parameter set.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionResult {
    pub service: String,
    pub parameter: Option<String>,
    pub table: NormalizedTable,
}

/// Runs the prediction services over FASTA files.
pub struct Pipeline<T> {
    config: Config,
    transport: T,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(config: Config, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submit records chunk by chunk and collect the normalized results.
    ///
    /// Chunks answered with an error status are left out; the rest keep their order.
    pub fn predict(
        &self,
        records: Vec<SequenceRecord>,
        service: Service,
        params: &Params,
    ) -> Result<Vec<PredictionResult>, PipelineError> {
        let chunks = match service.chunk_limit(&self.config, params)? {
            Some(limit) => chunk::split(records, limit),
            None if records.is_empty() => Vec::new(),
            None => vec![Chunk::from_records(records)],
        };
        let n_chunks = chunks.len();

        let labels = service.table_labels(&self.config);
        let mut tables: Vec<Option<NormalizedTable>> = vec![None; labels.len()];
        let mut n_skipped = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            debug!(
                service = service.name(),
                chunk = index + 1,
                n_chunks,
                size = chunk.size(),
                "Submitting chunk."
            );
            let Some(response) = submit(&self.transport, &self.config, service, chunk, params)?
            else {
                n_skipped += 1;
                continue;
            };

            let ctx = Context {
                records: chunk.records(),
                substituted: response.substituted,
            };
            for labelled in response.tables {
                let position = labels
                    .iter()
                    .position(|label| *label == labelled.label)
                    .ok_or_else(|| PipelineError::Malformed {
                        service,
                        source: TableError::Mismatch(format!(
                            "unexpected result table {:?}",
                            labelled.label
                        )),
                    })?;
                let normalized = normalize(service, labelled.table, &ctx)
                    .map_err(|source| PipelineError::Malformed { service, source })?;
                match &mut tables[position] {
                    Some(table) => table
                        .append(normalized)
                        .map_err(|source| PipelineError::Malformed { service, source })?,
                    slot => *slot = Some(normalized),
                }
            }
        }

        if n_skipped > 0 {
            warn!(
                service = service.name(),
                n_skipped,
                n_chunks,
                "Some chunks returned no result."
            );
        }

        let parameter = params.label(service, &self.config);
        Ok(labels
            .into_iter()
            .zip(tables)
            .map(|(label, table)| PredictionResult {
                service: service.name().to_string(),
                parameter: label.or_else(|| parameter.clone()),
                table: table.unwrap_or_default(),
            })
            .collect())
    }

    /// Predict every sequence of `input` with `service` and write one file per result table.
    pub fn run(
        &self,
        input: &Path,
        service: Service,
        params: &Params,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        info!(
            input_file = input.to_str(),
            service = service.name(),
            "Requesting predictions."
        );
        let records = read_input(input)?;
        self.predict(records, service, params)?
            .iter()
            .map(|result| self.write(input, result))
            .collect()
    }

    /// Classify every sequence of `input` with a local model.
    pub fn run_local<C: Classifier>(
        &self,
        input: &Path,
        predictor: &Predictor<C>,
    ) -> Result<PathBuf, PipelineError> {
        info!(input_file = input.to_str(), "Running local model.");
        let records = read_input(input)?;
        let result = PredictionResult {
            service: LOCAL_MODEL_NAME.to_string(),
            parameter: None,
            table: predictor.predict(&records)?,
        };
        self.write(input, &result)
    }

    fn write(&self, input: &Path, result: &PredictionResult) -> Result<PathBuf, PipelineError> {
        let path = output_path(
            input,
            self.config.output_dir.as_deref(),
            &result.service,
            result.parameter.as_deref(),
        );
        if result.table.is_empty() {
            warn!(
                output_file = path.to_str(),
                "No predictions were returned, writing an empty file."
            );
        }
        write_table_to_file(&result.table, &path)?;
        info!(
            output_file = path.to_str(),
            n_rows = result.table.len(),
            "Saved predictions."
        );
        Ok(path)
    }
}

fn read_input(input: &Path) -> Result<Vec<SequenceRecord>, PipelineError> {
    read_fasta_file(input).map_err(|source| PipelineError::Input {
        path: input.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        model::Classifier,
        services::{test::FakeTransport, transport::RequestBody},
    };
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn write_fasta(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn records(n: usize) -> Vec<SequenceRecord> {
        (1..=n)
            .map(|i| SequenceRecord::new(format!("seq{}", i), "KWKLFKKI"))
            .collect()
    }

    fn dbaasp_body(ids: &[&str]) -> String {
        let rows: Vec<String> = ids
            .iter()
            .map(|id| format!(r#"["{}", "0.9"]"#, id))
            .collect();
        format!(r#"[["id", "score"], {}]"#, rows.join(", "))
    }

    /// A config whose byte budget fits exactly `per_chunk` records of `records()`.
    fn config_with_chunks(per_chunk: usize) -> Config {
        let mut config = Config::default();
        config.chunking.max_bytes = records(1)[0].serialized_len() * per_chunk;
        config
    }

    #[test]
    fn test_two_records_end_to_end() {
        let dir = TempDir::new().unwrap();
        let input = write_fasta(&dir, "peptides.fasta", ">seq1\nAAAA\n>seq2\nCCCC\n");
        let transport = FakeTransport::new(vec![(
            200,
            r#"[["id", "score"], ["seq1", "0.91"], ["seq2", "0.12"]]"#,
        )]);
        let pipeline = Pipeline::new(Config::default(), &transport);

        let written = pipeline
            .run(&input, Service::Dbaasp, &Params::default())
            .unwrap();

        assert_eq!(
            written,
            vec![dir
                .path()
                .join("peptides_pred_dbaasp_Escherichia_coli_ATCC_25922.csv")]
        );
        assert_eq!(
            fs::read_to_string(&written[0]).unwrap(),
            "SeqID,Prediction_Class,Prediction_Score,Prediction_Num,Sequence\n\
             seq1,Active,0.91,1,AAAA\n\
             seq2,Not Active,0.12,0,CCCC\n"
        );
        assert_eq!(transport.sent.borrow().len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_failed_chunk_is_skipped() {
        let transport = FakeTransport::new(vec![
            (200, dbaasp_body(&["seq1", "seq2"]).as_str()),
            (500, "Internal Server Error"),
            (200, dbaasp_body(&["seq5", "seq6"]).as_str()),
        ]);
        let pipeline = Pipeline::new(config_with_chunks(2), &transport);

        let results = pipeline
            .predict(records(6), Service::Dbaasp, &Params::default())
            .unwrap();

        assert_eq!(transport.sent.borrow().len(), 3);
        assert_eq!(results.len(), 1);
        let ids: Vec<_> = results[0].table.rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["seq1", "seq2", "seq5", "seq6"]);
        assert!(logs_contain("Some chunks returned no result."));
    }

    #[test]
    fn test_chunks_sent_in_order() {
        let transport = FakeTransport::new(vec![
            (200, dbaasp_body(&["seq1", "seq2", "seq3"]).as_str()),
            (200, dbaasp_body(&["seq4"]).as_str()),
        ]);
        let pipeline = Pipeline::new(config_with_chunks(3), &transport);
        pipeline
            .predict(records(4), Service::Dbaasp, &Params::default())
            .unwrap();

        let sent = transport.sent.borrow();
        match &sent[1].1 {
            RequestBody::Form(fields) => assert_eq!(fields[1].1, ">seq4\nKWKLFKKI\n"),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_malformed_response_aborts() {
        let transport = FakeTransport::new(vec![(200, r#"[["id", "score"], ["seq1"]]"#)]);
        let pipeline = Pipeline::new(Config::default(), &transport);
        let result = pipeline.predict(records(1), Service::Dbaasp, &Params::default());
        assert!(matches!(
            result,
            Err(PipelineError::Service(ServiceError::Malformed { .. }))
        ));
    }

    #[test]
    #[traced_test]
    fn test_all_chunks_failing_writes_empty_file() {
        let dir = TempDir::new().unwrap();
        let input = write_fasta(&dir, "set.fasta", ">seq1\nKWKL\n");
        let transport = FakeTransport::new(vec![(404, "")]);
        let pipeline = Pipeline::new(Config::default(), &transport);

        let written = pipeline.run(&input, Service::Stm, &Params::default()).unwrap();

        assert_eq!(written, vec![dir.path().join("set_pred_stm.csv")]);
        assert_eq!(
            fs::read_to_string(&written[0]).unwrap(),
            "SeqID,Prediction_Class,Prediction_Score,Prediction_Num,Sequence\n"
        );
        assert!(logs_contain("writing an empty file"));
    }

    #[test]
    fn test_camp_writes_one_file_per_algorithm() {
        let dir = TempDir::new().unwrap();
        let input = write_fasta(&dir, "set.fasta", ">seq1\nKWKL\n");
        let table = |class: &str| {
            format!("<table><tr><th>Seq. ID.</th><th>Class</th></tr><tr><td>seq1</td><td>{class}</td></tr></table>")
        };
        let page = format!("{}{}", table("AMP"), table("NAMP"));
        let transport = FakeTransport::new(vec![(200, page.as_str())]);
        let mut config = Config::default();
        config.camp.algorithms = vec!["svm".to_string(), "da".to_string()];
        config.output_dir = Some(dir.path().join("out"));
        let pipeline = Pipeline::new(config, &transport);

        let written = pipeline.run(&input, Service::Camp, &Params::default()).unwrap();

        assert_eq!(
            written,
            vec![
                dir.path().join("out").join("set_pred_camp_svm.csv"),
                dir.path().join("out").join("set_pred_camp_da.csv"),
            ]
        );
        assert!(fs::read_to_string(&written[1]).unwrap().contains("seq1,NAMP,,0,KWKL"));
    }

    #[test]
    fn test_amplify_restores_ids_across_chunks() {
        let transport = FakeTransport::new(vec![
            (200, "Sequence_ID\tPrediction\n1\tAMP\n2\tnon-AMP\n"),
            (200, "Sequence_ID\tPrediction\n1\tAMP\n"),
        ]);
        let pipeline = Pipeline::new(config_with_chunks(2), &transport);

        let results = pipeline
            .predict(records(3), Service::Amplify, &Params::default())
            .unwrap();

        let ids: Vec<_> = results[0].table.rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["seq1", "seq2", "seq3"]);
        assert_eq!(results[0].parameter, None);
    }

    #[test]
    fn test_local_model_end_to_end() {
        struct Half;
        impl Classifier for Half {
            fn predict(&self, _encoded: &[usize]) -> f64 {
                0.5
            }
        }

        let dir = TempDir::new().unwrap();
        let input = write_fasta(&dir, "set.fasta", ">long\nACDEFGHIKLMNPQR\n");
        let mut config = Config::default();
        config.model.max_length = 10;
        let predictor = Predictor::new(Half, &config.model);
        let pipeline = Pipeline::new(config, FakeTransport::default());

        let written = pipeline.run_local(&input, &predictor).unwrap();

        assert_eq!(written, dir.path().join("set_pred_ampscanner.csv"));
        assert_eq!(
            fs::read_to_string(written).unwrap(),
            "SeqID,Prediction_Class,Prediction_Score,Prediction_Num,Sequence,warning\n\
             long,AMP,0.5,1,ACDEFGHIKLMNPQR,truncated\n"
        );
    }

    #[test]
    fn test_missing_input_file() {
        let pipeline = Pipeline::new(Config::default(), FakeTransport::default());
        let result = pipeline.run(
            Path::new("/nonexistent/input.fasta"),
            Service::Stm,
            &Params::default(),
        );
        assert!(matches!(result, Err(PipelineError::Input { .. })));
    }
}
