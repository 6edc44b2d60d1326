use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{normalize::NormalizedTable, table::TableError};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Could not write predictions.")]
    Csv(#[from] csv::Error),

    #[error("Could not write predictions.")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// `<input-stem>_pred_<service>[_<parameter>].csv`, with spaces in the parameter replaced by `_`.
pub fn output_file_name(input: &Path, service: &str, parameter: Option<&str>) -> String {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    match parameter {
        Some(parameter) => format!(
            "{}_pred_{}_{}.csv",
            stem,
            service,
            parameter.split_whitespace().collect::<Vec<_>>().join("_")
        ),
        None => format!("{}_pred_{}.csv", stem, service),
    }
}

/// Place the output next to the input unless an output directory is given.
pub fn output_path(
    input: &Path,
    output_dir: Option<&Path>,
    service: &str,
    parameter: Option<&str>,
) -> PathBuf {
    let directory = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    directory.join(output_file_name(input, service, parameter))
}

pub fn write_table<W: io::Write>(table: &NormalizedTable, writer: W) -> Result<(), OutputError> {
    let raw = table.to_raw()?;
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(raw.header())?;
    for row in raw.rows() {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_table_to_file<P: AsRef<Path>>(
    table: &NormalizedTable,
    path: P,
) -> Result<(), OutputError> {
    if let Some(parent) = path.as_ref().parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_table(table, fs::File::create(path)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::normalize::NormalizedRow;

    #[test]
    fn test_output_file_name() {
        let input = Path::new("/data/high_activity.fasta");
        assert_eq!(
            output_file_name(input, "dbaasp", Some("Escherichia coli ATCC 25922")),
            "high_activity_pred_dbaasp_Escherichia_coli_ATCC_25922.csv"
        );
        assert_eq!(output_file_name(input, "stm", None), "high_activity_pred_stm.csv");
    }

    #[test]
    fn test_output_path() {
        let input = Path::new("/data/set.fasta");
        assert_eq!(
            output_path(input, None, "stm", None),
            PathBuf::from("/data/set_pred_stm.csv")
        );
        assert_eq!(
            output_path(input, Some(Path::new("/out")), "camp", Some("svm")),
            PathBuf::from("/out/set_pred_camp_svm.csv")
        );
    }

    #[test]
    fn test_write_table() {
        let table = NormalizedTable {
            extra_columns: vec!["warning".to_string()],
            rows: vec![NormalizedRow {
                id: "seq,1".to_string(),
                class: Some("AMP".to_string()),
                score: Some(0.25),
                flag: Some(true),
                sequence: Some("KWKL".to_string()),
                extra: vec![String::new()],
            }],
        };
        let mut buffer = Vec::new();
        write_table(&table, &mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "SeqID,Prediction_Class,Prediction_Score,Prediction_Num,Sequence,warning\n\
             \"seq,1\",AMP,0.25,1,KWKL,\n"
        );
    }

    #[test]
    fn test_empty_table_writes_header() {
        let mut buffer = Vec::new();
        write_table(&NormalizedTable::default(), &mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "SeqID,Prediction_Class,Prediction_Score,Prediction_Num,Sequence\n"
        );
    }
}
