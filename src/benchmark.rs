use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::normalize::{round4, FLAG_COLUMN, ID_COLUMN};

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("Could not read benchmark inputs.")]
    Io(#[from] std::io::Error),

    #[error("Could not read or write CSV.")]
    Csv(#[from] csv::Error),

    #[error("{predictions} does not match {ground_truth}: {reason}")]
    Inconsistent {
        predictions: PathBuf,
        ground_truth: PathBuf,
        reason: String,
    },

    #[error("Model {model} has {found} prediction files for {expected} datasets.")]
    FileCount {
        model: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Deserialize)]
struct GroundTruthRow {
    name: String,
    active: f64,
}

#[derive(Debug, Deserialize)]
struct PredictionRow {
    #[serde(rename = "SeqID")]
    id: String,
    #[serde(rename = "Prediction_Num")]
    flag: Option<f64>,
}

/// Confusion matrix of binary predictions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Confusion {
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tp: usize,
}

impl Confusion {
    pub fn from_labels(truth: &[bool], predicted: &[bool]) -> Self {
        truth
            .iter()
            .zip(predicted)
            .fold(Self::default(), |mut confusion, (&actual, &guess)| {
                match (actual, guess) {
                    (false, false) => confusion.tn += 1,
                    (false, true) => confusion.fp += 1,
                    (true, false) => confusion.fn_ += 1,
                    (true, true) => confusion.tp += 1,
                }
                confusion
            })
    }

    fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }
}

/// Undefined ratios are NaN.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Metrics {
    pub tpr: f64,
    pub tnr: f64,
    pub fpr: f64,
    pub fnr: f64,
    pub f1_score: f64,
    pub accuracy: f64,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        f64::NAN
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn calculate_metrics(truth: &[bool], predicted: &[bool]) -> Metrics {
    let c = Confusion::from_labels(truth, predicted);
    let tpr = ratio(c.tp, c.tp + c.fn_);
    let tnr = ratio(c.tn, c.tn + c.fp);
    let f1_score = if c.tp + c.fp > 0 && c.tp + c.fn_ > 0 {
        ratio(2 * c.tp, 2 * c.tp + c.fp + c.fn_)
    } else {
        f64::NAN
    };
    Metrics {
        tpr,
        tnr,
        fpr: 1.0 - tnr,
        fnr: 1.0 - tpr,
        f1_score,
        accuracy: ratio(c.tp + c.tn, c.total()),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkRow {
    pub model: String,
    pub dataset: String,
    pub metrics: Metrics,
}

pub const OVERALL: &str = "OVERALL";

fn sorted_csv_files(dir: &Path) -> Result<Vec<PathBuf>, BenchmarkError> {
    let mut files = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;
    files.retain(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "csv"));
    files.sort();
    Ok(files)
}

fn model_dirs(predictions_dir: &Path) -> Result<Vec<PathBuf>, BenchmarkError> {
    let mut dirs = fs::read_dir(predictions_dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;
    dirs.retain(|path| path.is_dir());
    dirs.sort();
    Ok(dirs)
}

fn read_ground_truth(path: &Path) -> Result<Vec<GroundTruthRow>, BenchmarkError> {
    Ok(csv::Reader::from_path(path)?
        .deserialize()
        .collect::<Result<Vec<_>, _>>()?)
}

fn read_predictions(path: &Path) -> Result<Vec<PredictionRow>, BenchmarkError> {
    Ok(csv::Reader::from_path(path)?
        .deserialize()
        .collect::<Result<Vec<_>, _>>()?)
}

/// Both files must list the same sequences in the same order, each with a prediction.
fn ensure_consistency(
    predictions: &[PredictionRow],
    ground_truth: &[GroundTruthRow],
    predictions_path: &Path,
    ground_truth_path: &Path,
) -> Result<(Vec<bool>, Vec<bool>), BenchmarkError> {
    let inconsistent = |reason: String| BenchmarkError::Inconsistent {
        predictions: predictions_path.to_path_buf(),
        ground_truth: ground_truth_path.to_path_buf(),
        reason,
    };
    if predictions.len() != ground_truth.len() {
        return Err(inconsistent(format!(
            "{} predictions for {} sequences",
            predictions.len(),
            ground_truth.len()
        )));
    }

    let mut truth = Vec::with_capacity(ground_truth.len());
    let mut predicted = Vec::with_capacity(predictions.len());
    for (prediction, expected) in predictions.iter().zip(ground_truth) {
        if prediction.id != expected.name {
            return Err(inconsistent(format!(
                "{} '{}' where '{}' was expected",
                ID_COLUMN, prediction.id, expected.name
            )));
        }
        let flag = prediction.flag.ok_or_else(|| {
            inconsistent(format!("no {} for '{}'", FLAG_COLUMN, prediction.id))
        })?;
        truth.push(expected.active >= 0.5);
        predicted.push(flag >= 0.5);
    }
    Ok((truth, predicted))
}

/// Score each model's predictions against ground truth datasets.
///
/// `predictions_dir` holds one subdirectory per model, each with one prediction file
/// per dataset; files are paired in sorted order. Every model gets an extra
/// [`OVERALL`] row over all of its datasets.
pub fn benchmark(
    datasets_dir: &Path,
    predictions_dir: &Path,
) -> Result<Vec<BenchmarkRow>, BenchmarkError> {
    let datasets = sorted_csv_files(datasets_dir)?;
    let mut result = Vec::new();

    for model_dir in model_dirs(predictions_dir)? {
        let model = model_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(model = model.as_str(), "Running benchmark.");

        let prediction_files = sorted_csv_files(&model_dir)?;
        if prediction_files.len() != datasets.len() {
            return Err(BenchmarkError::FileCount {
                model,
                expected: datasets.len(),
                found: prediction_files.len(),
            });
        }

        let mut all_truth = Vec::new();
        let mut all_predicted = Vec::new();
        for (ground_truth_path, predictions_path) in datasets.iter().zip(&prediction_files) {
            debug!(
                predictions = predictions_path.to_str(),
                ground_truth = ground_truth_path.to_str(),
                "Testing predictions."
            );
            let (truth, predicted) = ensure_consistency(
                &read_predictions(predictions_path)?,
                &read_ground_truth(ground_truth_path)?,
                predictions_path,
                ground_truth_path,
            )?;
            result.push(BenchmarkRow {
                model: model.clone(),
                dataset: ground_truth_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                metrics: calculate_metrics(&truth, &predicted),
            });
            all_truth.extend(truth);
            all_predicted.extend(predicted);
        }

        result.push(BenchmarkRow {
            model,
            dataset: OVERALL.to_string(),
            metrics: calculate_metrics(&all_truth, &all_predicted),
        });
    }
    Ok(result)
}

fn format_metric(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        round4(value).to_string()
    }
}

pub fn write_benchmark<W: std::io::Write>(
    rows: &[BenchmarkRow],
    writer: W,
) -> Result<(), BenchmarkError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record([
        "model", "dataset", "tpr", "tnr", "fpr", "fnr", "f1_score", "accuracy",
    ])?;
    for row in rows {
        let m = row.metrics;
        writer.write_record(
            [row.model.clone(), row.dataset.clone()]
                .into_iter()
                .chain(
                    [m.tpr, m.tnr, m.fpr, m.fnr, m.f1_score, m.accuracy]
                        .into_iter()
                        .map(format_metric),
                ),
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Save the benchmark as `benchmark_<date>_<time>.csv` in `dir`.
pub fn save_benchmark(rows: &[BenchmarkRow], dir: &Path) -> Result<PathBuf, BenchmarkError> {
    let path = dir.join(format!(
        "benchmark_{}.csv",
        chrono::Local::now().format("%Y-%m-%d_%H:%M")
    ));
    write_benchmark(rows, fs::File::create(&path)?)?;
    info!(output_file = path.to_str(), "Saved benchmark.");
    Ok(path)
}
