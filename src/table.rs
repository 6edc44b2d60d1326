use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;

/// Anything that makes a service response unusable.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Row {row} has {found} cells, expected {expected}.")]
    ColumnCountMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Response has no header row.")]
    MissingHeader,

    #[error("Response contains no table at index {0}.")]
    MissingTable(usize),

    #[error("Required column '{0}' not found.")]
    MissingColumn(String),

    #[error("Column '{column}' holds non-numeric value '{value}'.")]
    InvalidNumber { column: String, value: String },

    #[error("Response does not match the submitted sequences: {0}")]
    Mismatch(String),

    #[error("Could not parse JSON table.")]
    Json(#[from] serde_json::Error),

    #[error("Could not parse delimited table.")]
    Csv(#[from] csv::Error),
}

/// A service's table as received: a header and rows of text cells.
#[derive(Clone, Debug, PartialEq)]
pub struct RawTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Every row must have as many cells as the header.
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, TableError> {
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != header.len())
        {
            return Err(TableError::ColumnCountMismatch {
                row,
                expected: header.len(),
                found: cells.len(),
            });
        }
        Ok(Self { header, rows })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn drop_last_row(mut self) -> Self {
        self.rows.pop();
        self
    }

    /// Add a column in front of the others.
    pub fn prepend_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<String>,
    ) -> Result<(), TableError> {
        if values.len() != self.rows.len() {
            return Err(TableError::Mismatch(format!(
                "{} rows returned for {} sequences",
                self.rows.len(),
                values.len()
            )));
        }
        self.header.insert(0, name.into());
        self.rows
            .iter_mut()
            .zip(values)
            .for_each(|(row, value)| row.insert(0, value));
        Ok(())
    }

    /// Replace the column at `index` by several columns computed from its cells.
    pub fn split_column<F>(&mut self, index: usize, names: &[&str], split: F)
    where
        F: Fn(&str) -> Vec<String>,
    {
        let width = names.len();
        self.header
            .splice(index..=index, names.iter().map(|name| name.to_string()));
        for row in self.rows.iter_mut() {
            let mut parts = split(&row[index]);
            parts.resize(width, String::new());
            row.splice(index..=index, parts);
        }
    }

    /// Parse a JSON array of arrays whose first row is the header.
    pub fn from_json_rows(body: &str) -> Result<Self, TableError> {
        let mut rows = serde_json::from_str::<Vec<Vec<Value>>>(body)?
            .into_iter()
            .map(|row| row.into_iter().map(json_cell).collect::<Vec<_>>());
        let header = rows.next().ok_or(TableError::MissingHeader)?;
        Self::new(header, rows.collect())
    }

    /// Parse delimited text whose first line is the header.
    pub fn from_delimited(text: &str, delimiter: u8) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(text.as_bytes());
        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if header.is_empty() {
            return Err(TableError::MissingHeader);
        }
        let rows = reader
            .records()
            .map(|record| record.map(|record| record.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Self::new(header, rows)
    }
}

fn json_cell(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse every `<table>` of an HTML document, in document order.
///
/// Nested tables are listed on their own and their rows do not count towards the
/// enclosing table. The header is the last of the leading rows made only of `<th>`
/// cells; a table without such rows uses its first row as header.
pub fn html_tables(document: &str) -> Result<Vec<RawTable>, TableError> {
    let document = Html::parse_document(document);
    let table_selector = Selector::parse("table").expect("Static selector should parse.");
    document
        .select(&table_selector)
        .map(html_table_from_element)
        .collect()
}

/// Parse the table at `index` of an HTML document.
pub fn html_table(document: &str, index: usize) -> Result<RawTable, TableError> {
    html_tables(document)?
        .into_iter()
        .nth(index)
        .ok_or(TableError::MissingTable(index))
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

fn is_named(element: &ElementRef, names: &[&str]) -> bool {
    names.contains(&element.value().name())
}

/// `<tr>` elements of this table only, looking through its row groups.
fn own_rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    child_elements(table)
        .flat_map(|child| {
            if is_named(&child, &["thead", "tbody", "tfoot"]) {
                child_elements(child)
                    .filter(|row| is_named(row, &["tr"]))
                    .collect::<Vec<_>>()
            } else if is_named(&child, &["tr"]) {
                vec![child]
            } else {
                Vec::new()
            }
        })
        .collect()
}

fn html_table_from_element(table: ElementRef) -> Result<RawTable, TableError> {
    let mut header: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<String>> = Vec::new();
    for row in own_rows(table) {
        let cells: Vec<(bool, String)> = child_elements(row)
            .filter(|cell| is_named(cell, &["th", "td"]))
            .map(|cell| (is_named(&cell, &["th"]), cell_text(cell)))
            .collect();
        if cells.is_empty() {
            continue;
        }
        let header_row = cells.iter().all(|(is_th, _)| *is_th);
        let texts = cells.into_iter().map(|(_, text)| text).collect();
        if rows.is_empty() && header_row {
            header = Some(texts);
        } else {
            rows.push(texts);
        }
    }

    let header = match header {
        Some(header) => header,
        // Empty layout tables still hold their place in the document order.
        None if rows.is_empty() => Vec::new(),
        None => rows.remove(0),
    };
    RawTable::new(header, rows)
}

fn cell_text(cell: ElementRef) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
