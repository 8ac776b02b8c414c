use csv::{ReaderBuilder, StringRecord, Trim};
use serde::de::DeserializeOwned;

/// One parsed relation: the header row and the typed records in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable<T> {
    pub headers: Vec<String>,
    pub rows: Vec<T>,
    pub row_numbers: Vec<u64>,
}

impl<T> Default for CsvTable<T> {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            row_numbers: Vec::new(),
        }
    }
}

impl<T> CsvTable<T> {
    pub fn from_rows(headers: &[&str], rows: Vec<T>) -> Self {
        Self {
            headers: headers.iter().map(|header| header.to_string()).collect(),
            rows,
            row_numbers: Vec::new(),
        }
    }

    /// CSV line number of the row, counting the header as line 1.
    pub fn row_number(&self, index: usize) -> u64 {
        self.row_numbers
            .get(index)
            .copied()
            .unwrap_or(index as u64 + 2)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|header| header == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Same headers and row numbers, rows passed through `f`.
    pub fn map_rows<U>(&self, f: impl FnMut(&T) -> U) -> CsvTable<U> {
        CsvTable {
            headers: self.headers.clone(),
            rows: self.rows.iter().map(f).collect(),
            row_numbers: self.row_numbers.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvParseError {
    pub file: String,
    pub message: String,
    pub line_index: Option<u64>,
}

/// A data row that could not be turned into a record and was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct RowIssue {
    pub line: u64,
    pub message: String,
}

#[derive(Debug)]
pub struct ParsedCsv<T> {
    pub table: CsvTable<T>,
    pub row_issues: Vec<RowIssue>,
}

/// Parses a whole file. Only an unreadable header fails the file; rows that do
/// not deserialize are collected as [`RowIssue`]s and the rest still load.
pub fn read_csv_table<T: DeserializeOwned>(
    file: &str,
    data: &[u8],
) -> Result<ParsedCsv<T>, CsvParseError> {
    let data = strip_utf8_bom(data);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(data);

    let headers = reader.headers().map_err(|err| CsvParseError {
        file: file.to_string(),
        message: err.to_string(),
        line_index: Some(1),
    })?;
    let headers: StringRecord = headers
        .iter()
        .map(|header| header.trim().to_ascii_lowercase())
        .collect();

    let mut table = CsvTable {
        headers: headers.iter().map(str::to_string).collect(),
        rows: Vec::new(),
        row_numbers: Vec::new(),
    };
    let mut row_issues = Vec::new();
    let mut record = StringRecord::new();
    loop {
        match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                let line = record
                    .position()
                    .map(|position| position.line())
                    .unwrap_or(table.rows.len() as u64 + 2);
                if record.iter().all(|field| field.trim().is_empty()) {
                    continue;
                }
                match record.deserialize::<T>(Some(&headers)) {
                    Ok(row) => {
                        table.rows.push(row);
                        table.row_numbers.push(line);
                    }
                    Err(err) => row_issues.push(RowIssue {
                        line,
                        message: err.to_string(),
                    }),
                }
            }
            Err(err) => {
                let line = err
                    .position()
                    .map(|position| position.line())
                    .unwrap_or(table.rows.len() as u64 + 2);
                if err.is_io_error() {
                    return Err(CsvParseError {
                        file: file.to_string(),
                        message: err.to_string(),
                        line_index: Some(line),
                    });
                }
                row_issues.push(RowIssue {
                    line,
                    message: err.to_string(),
                });
            }
        }
    }

    Ok(ParsedCsv { table, row_issues })
}

fn strip_utf8_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}
