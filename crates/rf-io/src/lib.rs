#![forbid(unsafe_code)]

use csv::{ReaderBuilder, WriterBuilder};
use thiserror::Error;

use rf_frame::{Frame, FrameError, Table};
use rf_types::{Schema, Value, render_value};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no header row")]
    MissingHeaders,
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Tokenize CSV text into the header row and the data rows.
///
/// The frame stays independent of this reader: it only ever sees the
/// `Vec<Vec<String>>` this returns.
pub fn read_csv_records(input: &str) -> Result<(Vec<String>, Vec<Vec<String>>), IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(IoError::from)?
        .iter()
        .map(str::to_owned)
        .collect();
    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_owned).collect());
    }
    Ok((headers, rows))
}

/// Tokenize CSV text and parse it into a frame under the given schema.
///
/// The header row is positional documentation only; cells parse by the
/// schema's column tags.
pub fn read_csv_frame(input: &str, schema: Schema) -> Result<Frame, IoError> {
    let (_, rows) = read_csv_records(input)?;
    Frame::from_rows(&rows, schema).map_err(IoError::from)
}

/// Write a table (frame or view) as CSV with a header row.
///
/// Cells use their raw text forms: strings and chars unquoted beyond what
/// CSV itself requires, Null as the table's null sentinel.
pub fn write_csv_string(table: &dyn Table) -> Result<String, IoError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    let headers: Vec<String> = (0..table.cols())
        .map(|col| table.col_name(col).map(str::to_owned))
        .collect::<Result<_, _>>()?;
    writer.write_record(&headers)?;

    for row in 0..table.rows() {
        let record: Vec<String> = (0..table.cols())
            .map(|col| csv_field(table.value_at(row, col), table))
            .collect();
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn csv_field(value: &Value, table: &dyn Table) -> String {
    match value {
        Value::Null => table.options().null_text.clone(),
        Value::Str(text) => text.clone(),
        Value::Char(byte) => (*byte as char).to_string(),
        other => render_value(other, table.options()),
    }
}
