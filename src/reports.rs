use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;

use crate::{
    normalize::{apply_schema, Derivation, NormalizedTable, Schema},
    table::{html_table, RawTable, TableError},
};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{0} is not an HTML page.")]
    NotHtml(PathBuf),

    #[error("Could not read report.")]
    Io(#[from] std::io::Error),

    #[error("Malformed {tool} report.")]
    Malformed {
        tool: ReportTool,
        #[source]
        source: TableError,
    },
}

/// Hemolysis predictors whose saved result pages can be converted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportTool {
    Happenn,
    HlppredFuse,
    Hemopi,
    Hemopred,
}

impl ReportTool {
    pub fn name(&self) -> &'static str {
        match self {
            ReportTool::Happenn => "happenn",
            ReportTool::HlppredFuse => "hlppredfuse",
            ReportTool::Hemopi => "hemopi",
            ReportTool::Hemopred => "hemopred",
        }
    }

    fn is_html(&self) -> bool {
        !matches!(self, ReportTool::Hemopred)
    }

    fn schema(&self) -> &'static Schema {
        match self {
            ReportTool::Happenn => &HAPPENN,
            ReportTool::HlppredFuse => &HLPPRED_FUSE,
            ReportTool::Hemopi => &HEMOPI,
            ReportTool::Hemopred => &HEMOPRED,
        }
    }
}

impl fmt::Display for ReportTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const HEMOLYTIC: Derivation = Derivation {
    threshold: 0.5,
    inclusive: true,
    positive: "hemolytic",
    negative: "non-hemolytic",
};

static HAPPENN: Schema = Schema {
    id: &["id", "name"],
    sequence: &["sequence"],
    class: &[],
    score: &["prob"],
    drop: &["#", "nter", "cter"],
    positive: &["hemolytic"],
    negative: &["non-hemolytic"],
    derivation: Some(Derivation {
        inclusive: false,
        ..HEMOLYTIC
    }),
};

static HLPPRED_FUSE: Schema = Schema {
    id: &["fasta_id"],
    sequence: &["sequence"],
    class: &["hlp_or_non-hlp"],
    score: &["prob"],
    drop: &["s.no"],
    positive: &["hlp"],
    negative: &["non-hlp"],
    derivation: None,
};

static HEMOPI: Schema = Schema {
    id: &["peptide_id"],
    sequence: &["peptide_sequence"],
    class: &[],
    score: &["prob_score"],
    drop: &[],
    positive: &["hemolytic"],
    negative: &["non-hemolytic"],
    derivation: Some(HEMOLYTIC),
};

static HEMOPRED: Schema = Schema {
    id: &["protein"],
    sequence: &["sequence"],
    class: &["prediction"],
    score: &["score", "probability"],
    drop: &[],
    positive: &["hemolytic"],
    negative: &["non-hemolytic"],
    derivation: None,
};

/// Convert a saved result file of `tool` to the canonical shape.
pub fn parse_report(tool: ReportTool, path: &Path) -> Result<NormalizedTable, ReportError> {
    let is_html_file = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
        .unwrap_or(false);
    if tool.is_html() && !is_html_file {
        return Err(ReportError::NotHtml(path.to_path_buf()));
    }

    info!(input_file = path.to_str(), tool = tool.name(), "Parsing report.");
    let contents = fs::read_to_string(path)?;
    let malformed = |source: TableError| ReportError::Malformed { tool, source };

    let raw = match tool {
        ReportTool::Hemopred => RawTable::from_delimited(&contents, b',').map_err(malformed)?,
        // The last row of HemoPI pages is a footer.
        ReportTool::Hemopi => html_table(&contents, 0).map_err(malformed)?.drop_last_row(),
        _ => html_table(&contents, 0).map_err(malformed)?,
    };
    apply_schema(&raw, tool.schema()).map_err(malformed)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn save(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_happenn() {
        let dir = TempDir::new().unwrap();
        let path = save(
            &dir,
            "happenn.html",
            "<table><tr><th>#</th><th>ID</th><th>Sequence</th><th>nTer</th><th>cTer</th><th>Prob</th></tr>\
             <tr><td>1</td><td>p1</td><td>KWKL</td><td>free</td><td>amid</td><td>0.5</td></tr>\
             <tr><td>2</td><td>p2</td><td>GLFD</td><td>free</td><td>free</td><td>0.93</td></tr></table>",
        );
        let table = parse_report(ReportTool::Happenn, &path).unwrap();
        assert!(table.extra_columns.is_empty());
        // Exactly 0.5 is not hemolytic for HAPPENN.
        assert_eq!(table.rows[0].flag, Some(false));
        assert_eq!(table.rows[1].class.as_deref(), Some("hemolytic"));
        assert_eq!(table.rows[1].sequence.as_deref(), Some("GLFD"));
    }

    #[test]
    fn test_hlppred_fuse_header_in_first_row() {
        let dir = TempDir::new().unwrap();
        let path = save(
            &dir,
            "hlp.html",
            "<table><tr><td>S.NO</td><td>FASTA ID</td><td>HLP or Non-HLP</td><td>Prob</td></tr>\
             <tr><td>1</td><td>p1</td><td>HLP</td><td>0.81</td></tr>\
             <tr><td>2</td><td>p2</td><td>Non-HLP</td><td>0.12</td></tr></table>",
        );
        let table = parse_report(ReportTool::HlppredFuse, &path).unwrap();
        assert_eq!(table.rows[0].id, "p1");
        assert_eq!(table.rows[0].flag, Some(true));
        assert_eq!(table.rows[1].flag, Some(false));
        assert_eq!(table.rows[1].score, Some(0.12));
    }

    #[test]
    fn test_hemopi_drops_footer_and_unnamed_columns() {
        let dir = TempDir::new().unwrap();
        let path = save(
            &dir,
            "hemopi.html",
            "<table>\
             <tr><th>Result</th><th>Result</th><th>Result</th><th></th></tr>\
             <tr><th>Peptide ID</th><th>Peptide Sequence</th><th>PROB Score</th><th></th></tr>\
             <tr><td>p1</td><td>KWKL</td><td>0.5</td><td></td></tr>\
             <tr><td>footer</td><td></td><td></td><td></td></tr></table>",
        );
        let table = parse_report(ReportTool::Hemopi, &path).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.extra_columns.is_empty());
        assert_eq!(table.rows[0].flag, Some(true));
        assert_eq!(table.rows[0].sequence.as_deref(), Some("KWKL"));
    }

    #[test]
    fn test_hemopred_csv() {
        let dir = TempDir::new().unwrap();
        let path = save(
            &dir,
            "hemopred.csv",
            "Protein,Sequence,Prediction\np1,KWKL,hemolytic\np2,GLFD,non-hemolytic\n",
        );
        let table = parse_report(ReportTool::Hemopred, &path).unwrap();
        assert_eq!(table.rows[0].flag, Some(true));
        assert_eq!(table.rows[1].flag, Some(false));
        assert_eq!(table.rows[1].id, "p2");
    }

    #[test]
    fn test_html_tool_rejects_other_files() {
        assert!(matches!(
            parse_report(ReportTool::Happenn, Path::new("report.csv")),
            Err(ReportError::NotHtml(_))
        ));
    }
}
