use std::{fs, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    config::ModelConfig,
    fasta::SequenceRecord,
    normalize::{round4, NormalizedRow, NormalizedTable},
};

/// Residue alphabet. Position 0 (`X`) doubles as the padding value.
pub const AMINO_ACIDS: &str = "XACDEFGHIKLMNPQRSTVWY";

pub const POSITIVE_CLASS: &str = "AMP";
pub const NEGATIVE_CLASS: &str = "Non-AMP";

const TRUNCATED: &str = "truncated";
const UNRECOGNIZED: &str = "unrecognized_symbols";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Could not read model file.")]
    Io(#[from] std::io::Error),

    #[error("Could not parse model file.")]
    Parse(#[from] serde_json::Error),

    #[error("Model expects {expected} weights, found {found}.")]
    WeightCount { expected: usize, found: usize },

    #[error("Model returned {probability} for '{id}', expected a probability.")]
    InvalidProbability { id: String, probability: f64 },

    #[error("No model file configured.")]
    MissingModel,
}

/// A trained binary classifier over encoded sequences.
pub trait Classifier {
    /// Probability in [0, 1] that the encoded sequence is positive.
    fn predict(&self, encoded: &[usize]) -> f64;
}

/// Logistic regression over the mean weight of the non-padding residues.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LinearModel {
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl LinearModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let model: LinearModel = serde_json::from_str(&fs::read_to_string(path)?)?;
        let expected = AMINO_ACIDS.len();
        if model.weights.len() != expected {
            return Err(ModelError::WeightCount {
                expected,
                found: model.weights.len(),
            });
        }
        Ok(model)
    }
}

impl Classifier for LinearModel {
    fn predict(&self, encoded: &[usize]) -> f64 {
        let residues: Vec<f64> = encoded
            .iter()
            .filter(|&&token| token != 0)
            .map(|&token| self.weights.get(token).copied().unwrap_or_default())
            .collect();
        let mean = if residues.is_empty() {
            0.0
        } else {
            residues.iter().sum::<f64>() / residues.len() as f64
        };
        1.0 / (1.0 + (-(self.bias + mean)).exp())
    }
}

/// A sequence turned into model input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoded {
    pub tokens: Vec<usize>,
    pub truncated: bool,
    pub unrecognized: bool,
}

impl Encoded {
    fn warning(&self) -> String {
        [
            self.truncated.then_some(TRUNCATED),
            self.unrecognized.then_some(UNRECOGNIZED),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(";")
    }
}

/// Encode residues by alphabet position, cut or zero-padded to exactly `max_length`.
pub fn encode(sequence: &str, max_length: usize) -> Encoded {
    let mut unrecognized = false;
    let mut tokens: Vec<usize> = sequence
        .chars()
        .map(|residue| {
            AMINO_ACIDS
                .find(residue.to_ascii_uppercase())
                .unwrap_or_else(|| {
                    unrecognized = true;
                    0
                })
        })
        .collect();
    let truncated = tokens.len() > max_length;
    tokens.resize(max_length, 0);
    Encoded {
        tokens,
        truncated,
        unrecognized,
    }
}

pub struct Predictor<C> {
    classifier: C,
    max_length: usize,
    threshold: f64,
}

impl<C: Classifier> Predictor<C> {
    pub fn new(classifier: C, config: &ModelConfig) -> Self {
        Self {
            classifier,
            max_length: config.max_length,
            threshold: config.threshold,
        }
    }

    /// Classify every record; one row per record, in input order.
    pub fn predict(&self, records: &[SequenceRecord]) -> Result<NormalizedTable, ModelError> {
        debug!(
            n_records = records.len(),
            max_length = self.max_length,
            "Running local model."
        );
        let rows = records
            .iter()
            .map(|record| -> Result<NormalizedRow, ModelError> {
                let encoded = encode(&record.sequence, self.max_length);
                let probability = self.classifier.predict(&encoded.tokens);
                if !(0.0..=1.0).contains(&probability) {
                    return Err(ModelError::InvalidProbability {
                        id: record.id.clone(),
                        probability,
                    });
                }
                let positive = probability >= self.threshold;
                trace!(id = record.id.as_str(), probability, positive, "Classified sequence.");
                Ok(NormalizedRow {
                    id: record.id.clone(),
                    class: Some(if positive { POSITIVE_CLASS } else { NEGATIVE_CLASS }.to_string()),
                    score: Some(round4(probability)),
                    flag: Some(positive),
                    sequence: Some(record.sequence.clone()),
                    extra: vec![encoded.warning()],
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NormalizedTable {
            extra_columns: vec!["warning".to_string()],
            rows,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    struct Constant(f64);

    impl Classifier for Constant {
        fn predict(&self, _encoded: &[usize]) -> f64 {
            self.0
        }
    }

    fn config(max_length: usize) -> ModelConfig {
        ModelConfig {
            max_length,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_encode_pads() {
        let encoded = encode("ACy", 5);
        assert_eq!(encoded.tokens, vec![1, 2, 20, 0, 0]);
        assert!(!encoded.truncated);
        assert!(!encoded.unrecognized);
    }

    #[test]
    fn test_encode_marks_unknown_symbols() {
        let encoded = encode("AB*", 4);
        assert_eq!(encoded.tokens, vec![1, 0, 0, 0]);
        assert!(encoded.unrecognized);
        assert_eq!(encoded.warning(), "unrecognized_symbols");
    }

    #[test]
    fn test_long_sequence_truncated_with_warning() {
        let records = vec![SequenceRecord::new("long", "ACDEFGHIKLMNPQR")];
        let table = Predictor::new(Constant(0.8), &config(10))
            .predict(&records)
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].extra, vec!["truncated"]);
        assert_eq!(table.rows[0].class.as_deref(), Some("AMP"));
        assert_eq!(table.rows[0].sequence.as_deref(), Some("ACDEFGHIKLMNPQR"));
        assert_eq!(encode("ACDEFGHIKLMNPQR", 10).tokens.len(), 10);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let records = vec![SequenceRecord::new("p", "KWKL")];
        let at = Predictor::new(Constant(0.5), &config(10)).predict(&records).unwrap();
        assert_eq!(at.rows[0].flag, Some(true));
        let below = Predictor::new(Constant(0.4999), &config(10)).predict(&records).unwrap();
        assert_eq!(below.rows[0].class.as_deref(), Some("Non-AMP"));
        assert_eq!(below.rows[0].extra, vec![""]);
    }

    #[test]
    fn test_out_of_range_probability_is_error() {
        let records = vec![SequenceRecord::new("p", "KWKL")];
        let result = Predictor::new(Constant(f64::NAN), &config(10)).predict(&records);
        assert!(matches!(result, Err(ModelError::InvalidProbability { .. })));
    }

    #[test]
    fn test_linear_model_from_file() {
        let mut weights = vec![0.0; AMINO_ACIDS.len()];
        weights[AMINO_ACIDS.find('K').unwrap()] = 4.0;
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            serde_json::json!({ "bias": -2.0, "weights": weights })
        )
        .unwrap();

        let model = LinearModel::load(file.path()).unwrap();
        let lysine_rich = model.predict(&encode("KKKK", 8).tokens);
        let plain = model.predict(&encode("AAAA", 8).tokens);
        assert!(lysine_rich > 0.5);
        assert!(plain < 0.5);
        assert!((model.predict(&encode("", 8).tokens) - 1.0 / (1.0 + 2f64.exp())).abs() < 1e-12);
    }

    #[test]
    fn test_linear_model_wrong_width() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"bias": 0.0, "weights": [1.0, 2.0]}}"#).unwrap();
        assert!(matches!(
            LinearModel::load(file.path()),
            Err(ModelError::WeightCount { expected: 21, found: 2 })
        ));
    }
}
