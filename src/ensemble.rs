use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::normalize::{column_key, round4, ID_COLUMN};

const CLASS_COLUMN: &str = "class";

#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("Could not read or write CSV.")]
    Csv(#[from] csv::Error),

    #[error("Grid step must lie strictly between 0 and 1, got {0}.")]
    InvalidStep(f64),

    #[error("top_k must be positive.")]
    ZeroTopK,

    #[error("At least one model is needed.")]
    NoModels,

    #[error("Training set has no column '{0}'.")]
    MissingColumn(String),

    #[error("Row {row}: '{value}' in column '{column}' is not a number.")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Candidate '{id}' has {found} scores for {expected} models.")]
    ScoreCount {
        id: String,
        expected: usize,
        found: usize,
    },
}

/// How the weight vectors of a grid search are laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridMode {
    /// Grid points on the simplex: weights are non-negative and sum to one.
    UnitSum,
    /// Every combination of grid levels in [0, 1].
    FullCube,
}

/// A sequence with one score per model and its known class.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub scores: Vec<f64>,
    pub active: bool,
}

/// Quality of one weight vector.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightScore {
    pub weights: Vec<f64>,
    pub metric: f64,
}

fn cartesian(dims: usize, levels: &[usize]) -> Vec<Vec<usize>> {
    (0..dims).fold(vec![Vec::new()], |points, _| {
        points
            .into_iter()
            .flat_map(|point| {
                levels.iter().map(move |&level| {
                    let mut next = point.clone();
                    next.push(level);
                    next
                })
            })
            .collect()
    })
}

/// All weight vectors for `n_models` models with resolution `step`.
///
/// In `UnitSum` mode the last weight takes whatever the others leave, so every
/// vector sums to one.
pub fn weights_grid(
    n_models: usize,
    step: f64,
    mode: GridMode,
) -> Result<Vec<Vec<f64>>, EnsembleError> {
    if !(step > 0.0 && step < 1.0) {
        return Err(EnsembleError::InvalidStep(step));
    }
    if n_models == 0 {
        return Err(EnsembleError::NoModels);
    }
    // Tolerate steps like 0.1 whose inverse is not exact in binary.
    let n_steps = (1.0 / step + 1e-9).floor() as usize;
    let levels: Vec<usize> = (0..=n_steps).collect();
    let weight = |count: usize| round4(count as f64 * step);

    let grid = match mode {
        GridMode::FullCube => cartesian(n_models, &levels)
            .into_iter()
            .map(|counts| counts.into_iter().map(weight).collect())
            .collect(),
        GridMode::UnitSum => cartesian(n_models - 1, &levels)
            .into_iter()
            .filter(|counts| counts.iter().sum::<usize>() <= n_steps)
            .map(|counts| {
                let mut weights: Vec<f64> = counts.into_iter().map(weight).collect();
                let rest = 1.0 - weights.iter().sum::<f64>();
                weights.push(round4(rest.max(0.0)));
                weights
            })
            .collect(),
    };
    Ok(grid)
}

pub fn weighted_score(scores: &[f64], weights: &[f64]) -> f64 {
    scores
        .iter()
        .zip(weights)
        .map(|(score, weight)| score * weight)
        .sum()
}

/// Candidates with their weighted score, best first. Ties keep their input order.
pub fn rank<'a>(candidates: &'a [Candidate], weights: &[f64]) -> Vec<(&'a Candidate, f64)> {
    let mut ranked: Vec<_> = candidates
        .iter()
        .map(|candidate| (candidate, weighted_score(&candidate.scores, weights)))
        .collect();
    ranked.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    ranked
}

/// Share of actives among the first `k` labels. Always divided by `k`, even when
/// fewer labels are given.
pub fn top_k_fraction_of_ones<I>(ranked_labels: I, k: usize) -> f64
where
    I: IntoIterator<Item = bool>,
{
    if k == 0 {
        return f64::NAN;
    }
    let ones = ranked_labels
        .into_iter()
        .take(k)
        .filter(|&active| active)
        .count();
    ones as f64 / k as f64
}

/// Score every weight vector of the grid by the top-`k` fraction of actives.
///
/// Results are sorted by metric, best first; equal metrics keep grid order.
pub fn grid_search_weights(
    candidates: &[Candidate],
    n_models: usize,
    step: f64,
    mode: GridMode,
    top_k: usize,
) -> Result<Vec<WeightScore>, EnsembleError> {
    if top_k == 0 {
        return Err(EnsembleError::ZeroTopK);
    }
    if let Some(candidate) = candidates
        .iter()
        .find(|candidate| candidate.scores.len() != n_models)
    {
        return Err(EnsembleError::ScoreCount {
            id: candidate.id.clone(),
            expected: n_models,
            found: candidate.scores.len(),
        });
    }

    let grid = weights_grid(n_models, step, mode)?;
    info!(
        n_weights = grid.len(),
        n_candidates = candidates.len(),
        top_k,
        "Running grid search."
    );

    let mut result: Vec<WeightScore> = grid
        .into_iter()
        .map(|weights| {
            let labels = rank(candidates, &weights)
                .into_iter()
                .map(|(candidate, _)| candidate.active);
            let metric = top_k_fraction_of_ones(labels, top_k);
            WeightScore { weights, metric }
        })
        .collect();
    result.sort_by(|a, b| b.metric.total_cmp(&a.metric));

    if let Some(best) = result.first() {
        debug!(weights = ?best.weights, metric = best.metric, "Best weights.");
    }
    Ok(result)
}

/// Read candidates from a CSV with one `<model>_score` column per model and a
/// 0/1 `class` column.
pub fn read_training_set<P: AsRef<Path>>(
    path: P,
    models: &[String],
) -> Result<Vec<Candidate>, EnsembleError> {
    let mut reader = csv::Reader::from_path(path)?;
    let keys: Vec<String> = reader.headers()?.iter().map(column_key).collect();
    let find = |name: &str| {
        let key = column_key(name);
        keys.iter()
            .position(|column| *column == key)
            .ok_or(EnsembleError::MissingColumn(name.to_string()))
    };

    let score_columns = models
        .iter()
        .map(|model| find(&format!("{}_score", model)))
        .collect::<Result<Vec<_>, _>>()?;
    let class_column = find(CLASS_COLUMN)?;
    let id_column = find("name").or_else(|_| find(ID_COLUMN)).ok();

    let mut candidates = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let number = |index: usize| {
            let value = record.get(index).unwrap_or_default().trim();
            value.parse::<f64>().map_err(|_| EnsembleError::InvalidNumber {
                row,
                column: keys[index].clone(),
                value: value.to_string(),
            })
        };
        candidates.push(Candidate {
            id: id_column
                .and_then(|index| record.get(index))
                .map(str::to_string)
                .unwrap_or_else(|| row.to_string()),
            scores: score_columns
                .iter()
                .map(|&index| number(index))
                .collect::<Result<Vec<_>, _>>()?,
            active: number(class_column)? >= 0.5,
        });
    }
    debug!(n_candidates = candidates.len(), "Read training set.");
    Ok(candidates)
}

/// Write `<model>_weight` columns and the metric, one row per weight vector.
pub fn write_grid_search<W: std::io::Write>(
    results: &[WeightScore],
    models: &[String],
    writer: W,
) -> Result<(), EnsembleError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(
        models
            .iter()
            .map(|model| format!("{}_weight", model))
            .chain(std::iter::once("metric".to_string())),
    )?;
    for result in results {
        writer.write_record(
            result
                .weights
                .iter()
                .chain(std::iter::once(&result.metric))
                .map(|&value| round4(value).to_string()),
        )?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}
