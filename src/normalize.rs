use std::collections::HashMap;

use itertools::Itertools;

use crate::{
    fasta::SequenceRecord,
    services::{amplify, camp, dbaasp, stm, Service},
    table::{RawTable, TableError},
};

pub const ID_COLUMN: &str = "SeqID";
pub const CLASS_COLUMN: &str = "Prediction_Class";
pub const SCORE_COLUMN: &str = "Prediction_Score";
pub const FLAG_COLUMN: &str = "Prediction_Num";
pub const SEQUENCE_COLUMN: &str = "Sequence";

pub const CANONICAL_COLUMNS: [&str; 5] = [
    ID_COLUMN,
    CLASS_COLUMN,
    SCORE_COLUMN,
    FLAG_COLUMN,
    SEQUENCE_COLUMN,
];

/// One prediction in the shared output shape.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedRow {
    pub id: String,
    pub class: Option<String>,
    /// Rounded to four decimals.
    pub score: Option<f64>,
    /// Whether the class counts as a positive prediction.
    pub flag: Option<bool>,
    pub sequence: Option<String>,
    /// Values of the service specific columns, in `NormalizedTable::extra_columns` order.
    pub extra: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedTable {
    pub extra_columns: Vec<String>,
    pub rows: Vec<NormalizedRow>,
}

impl NormalizedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> Vec<String> {
        CANONICAL_COLUMNS
            .iter()
            .map(|column| column.to_string())
            .chain(self.extra_columns.iter().cloned())
            .collect()
    }

    /// Append the rows of `other`, which must have the same extra columns.
    ///
    /// A table without rows takes the shape of `other`.
    pub fn append(&mut self, other: NormalizedTable) -> Result<(), TableError> {
        if self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.extra_columns != self.extra_columns && !other.is_empty() {
            return Err(TableError::Mismatch(format!(
                "columns [{}] differ from earlier chunks [{}]",
                other.extra_columns.join(", "),
                self.extra_columns.join(", ")
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// The table as text cells under its canonical header.
    pub fn to_raw(&self) -> Result<RawTable, TableError> {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                [
                    row.id.clone(),
                    row.class.clone().unwrap_or_default(),
                    row.score.map(|score| score.to_string()).unwrap_or_default(),
                    row.flag
                        .map(|flag| if flag { "1" } else { "0" }.to_string())
                        .unwrap_or_default(),
                    row.sequence.clone().unwrap_or_default(),
                ]
                .into_iter()
                .chain(row.extra.iter().cloned())
                .collect()
            })
            .collect();
        RawTable::new(self.header(), rows)
    }
}

/// How a class label is derived from the score when a service reports none.
#[derive(Clone, Copy, Debug)]
pub struct Derivation {
    pub threshold: f64,
    /// Whether a score equal to the threshold counts as positive.
    pub inclusive: bool,
    pub positive: &'static str,
    pub negative: &'static str,
}

impl Derivation {
    pub fn is_positive(&self, score: f64) -> bool {
        if self.inclusive {
            score >= self.threshold
        } else {
            score > self.threshold
        }
    }
}

/// Column names a service uses, as column keys (see [`column_key`]).
///
/// The canonical column names are always recognised as well, so normalizing an
/// already normalized table only re-coerces its values.
#[derive(Clone, Copy, Debug)]
pub struct Schema {
    pub id: &'static [&'static str],
    pub sequence: &'static [&'static str],
    pub class: &'static [&'static str],
    pub score: &'static [&'static str],
    pub drop: &'static [&'static str],
    /// Class labels (lower case) that mean a positive prediction.
    pub positive: &'static [&'static str],
    pub negative: &'static [&'static str],
    pub derivation: Option<Derivation>,
}

/// Lower-cased name with runs of whitespace replaced by `_`.
pub fn column_key(name: &str) -> String {
    name.to_lowercase().split_whitespace().join("_")
}

/// Submitted records and what was done to them before sending.
#[derive(Clone, Copy, Debug)]
pub struct Context<'a> {
    pub records: &'a [SequenceRecord],
    /// Identifiers were replaced by 1-based positions before submission.
    pub substituted: bool,
}

/// Map a raw service table onto the canonical schema.
pub fn normalize(
    service: Service,
    raw: RawTable,
    ctx: &Context,
) -> Result<NormalizedTable, TableError> {
    let mut table = match service {
        Service::Dbaasp => apply_schema(&dbaasp::prepare(raw), &dbaasp::SCHEMA)?,
        Service::Stm => apply_schema(&stm::prepare(raw, ctx.records)?, &stm::SCHEMA)?,
        Service::Camp => apply_schema(&raw, &camp::SCHEMA)?,
        Service::Amplify => {
            let mut table = apply_schema(&raw, &amplify::SCHEMA)?;
            if ctx.substituted {
                amplify::restore_ids(&mut table, ctx.records)?;
            }
            table
        }
    };
    fill_missing_sequences(&mut table, ctx.records);
    Ok(table)
}

pub fn apply_schema(raw: &RawTable, schema: &Schema) -> Result<NormalizedTable, TableError> {
    let keys = raw.header().iter().map(|name| column_key(name)).collect_vec();
    let find = |aliases: &[&str], canonical: &str| {
        let canonical = column_key(canonical);
        keys.iter()
            .position(|key| *key == canonical || aliases.contains(&key.as_str()))
    };

    let id = find(schema.id, ID_COLUMN)
        .ok_or_else(|| TableError::MissingColumn(ID_COLUMN.to_string()))?;
    let sequence = find(schema.sequence, SEQUENCE_COLUMN);
    let class = find(schema.class, CLASS_COLUMN);
    let score = find(schema.score, SCORE_COLUMN);
    let flag = find(&[], FLAG_COLUMN);

    let mapped = [Some(id), sequence, class, score, flag];
    let extra = (0..keys.len())
        .filter(|index| !mapped.contains(&Some(*index)))
        .filter(|&index| !keys[index].is_empty() && !schema.drop.contains(&keys[index].as_str()))
        .collect_vec();

    let rows = raw
        .rows()
        .iter()
        .map(|cells| -> Result<NormalizedRow, TableError> {
            let score_value = score
                .map(|index| parse_score(&raw.header()[index], &cells[index]))
                .transpose()?
                .flatten();
            let (class_label, flag_value) = classify(
                schema,
                class.map(|index| cells[index].as_str()),
                score_value,
            );
            Ok(NormalizedRow {
                id: cells[id].trim().to_string(),
                class: class_label,
                score: score_value,
                flag: flag_value,
                sequence: sequence
                    .map(|index| cells[index].trim().to_string())
                    .filter(|sequence| !sequence.is_empty()),
                extra: extra.iter().map(|&index| cells[index].clone()).collect(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NormalizedTable {
        extra_columns: extra.into_iter().map(|index| keys[index].clone()).collect(),
        rows,
    })
}

fn parse_score(column: &str, value: &str) -> Result<Option<f64>, TableError> {
    let value = value.trim();
    if value.is_empty() || ["-", "na", "n/a", "nan"].contains(&value.to_lowercase().as_str()) {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|score| score.is_finite())
        .map(|score| Some(round4(score)))
        .ok_or_else(|| TableError::InvalidNumber {
            column: column.to_string(),
            value: value.to_string(),
        })
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn classify(
    schema: &Schema,
    label: Option<&str>,
    score: Option<f64>,
) -> (Option<String>, Option<bool>) {
    let from_score = |score: Option<f64>| {
        schema
            .derivation
            .zip(score)
            .map(|(derivation, score)| (derivation, derivation.is_positive(score)))
    };

    match label.map(str::trim).filter(|label| !label.is_empty()) {
        Some(label) => {
            let key = label.to_lowercase();
            let flag = if schema.positive.contains(&key.as_str()) {
                Some(true)
            } else if schema.negative.contains(&key.as_str()) {
                Some(false)
            } else {
                from_score(score).map(|(_, positive)| positive)
            };
            (Some(label.to_string()), flag)
        }
        None => match from_score(score) {
            Some((derivation, true)) => (Some(derivation.positive.to_string()), Some(true)),
            Some((derivation, false)) => (Some(derivation.negative.to_string()), Some(false)),
            None => (None, None),
        },
    }
}

fn fill_missing_sequences(table: &mut NormalizedTable, records: &[SequenceRecord]) {
    let by_id: HashMap<&str, &str> = records
        .iter()
        .map(|record| (record.id.as_str(), record.sequence.as_str()))
        .collect();
    table
        .rows
        .iter_mut()
        .filter(|row| row.sequence.is_none())
        .for_each(|row| row.sequence = by_id.get(row.id.as_str()).map(|sequence| sequence.to_string()));
}
