//! Writers of result set rows to CSV/TSV or JSON.
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::io;
use std::io::Write;

use crate::row::ColumnType;
use crate::text::TextFilter;
use crate::value::{Value, ValueRow};

#[derive(Debug)]
pub enum OutputError {
    IoError(io::Error),
    CsvError(csv::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputError::IoError(_) => write!(f, "failed to write output"),
            OutputError::CsvError(_) => write!(f, "failed to write CSV record"),
            OutputError::JsonError(_) => write!(f, "failed to write JSON document"),
        }
    }
}

impl Error for OutputError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OutputError::IoError(err) => Some(err),
            OutputError::CsvError(err) => Some(err),
            OutputError::JsonError(err) => Some(err),
        }
    }
}

impl From<io::Error> for OutputError {
    fn from(err: io::Error) -> OutputError {
        OutputError::IoError(err)
    }
}

impl From<csv::Error> for OutputError {
    fn from(err: csv::Error) -> OutputError {
        OutputError::CsvError(err)
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(err: serde_json::Error) -> OutputError {
        OutputError::JsonError(err)
    }
}

/// Sink for result sets.
///
/// For each result: `write_header` once, `write_row` for every row, then `finish_result`.
pub trait RowWriter {
    fn write_header(&mut self, schema: &[ColumnType]) -> Result<(), OutputError>;
    fn write_row(&mut self, row: ValueRow) -> Result<(), OutputError>;
    fn finish_result(&mut self) -> Result<(), OutputError>;
}

/// Writes CSV or TSV; NULL is an empty field.
pub struct CsvRowWriter<W: Write> {
    writer: csv::Writer<W>,
    typed_header: bool,
}

impl<W: Write> fmt::Debug for CsvRowWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CsvRowWriter")
            .field("typed_header", &self.typed_header)
            .finish()
    }
}

impl<W: Write> CsvRowWriter<W> {
    pub fn new(writer: W, delimiter: u8, typed_header: bool) -> CsvRowWriter<W> {
        CsvRowWriter {
            writer: csv::WriterBuilder::new()
                .delimiter(delimiter)
                .flexible(true)
                .from_writer(writer),
            typed_header,
        }
    }

    pub fn into_inner(self) -> Result<W, OutputError> {
        self.writer
            .into_inner()
            .map_err(|err| OutputError::IoError(err.into_error()))
    }
}

impl<W: Write> RowWriter for CsvRowWriter<W> {
    fn write_header(&mut self, schema: &[ColumnType]) -> Result<(), OutputError> {
        if self.typed_header {
            self.writer.write_record(
                schema
                    .iter()
                    .map(|column| format!("{} {}", column.name, column.value_type)),
            )?;
        } else {
            self.writer
                .write_record(schema.iter().map(|column| column.name.as_str()))?;
        }
        Ok(())
    }

    fn write_row(&mut self, row: ValueRow) -> Result<(), OutputError> {
        self.writer.write_record(row.iter().map(|value| match value {
            Some(Value::String(value)) => value.clone(),
            Some(value) => value.to_string(),
            None => String::new(),
        }))?;
        Ok(())
    }

    fn finish_result(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Shape of JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    /// `{"fields": [{"name": .., "type": ..}], "rows": [[..]]}`
    List,
    /// `[{"column": value, ..}]`
    Dict,
}

impl RowLayout {
    pub const VARIANTS: &'static [&'static str] = &["list", "dict"];
}

#[derive(Debug)]
pub struct UnknownRowLayout(String);

impl fmt::Display for UnknownRowLayout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown row type '{}'; expected list or dict", self.0)
    }
}

impl Error for UnknownRowLayout {}

impl std::str::FromStr for RowLayout {
    type Err = UnknownRowLayout;

    fn from_str(layout: &str) -> Result<RowLayout, UnknownRowLayout> {
        match layout {
            "list" => Ok(RowLayout::List),
            "dict" => Ok(RowLayout::Dict),
            other => Err(UnknownRowLayout(other.to_owned())),
        }
    }
}

#[derive(Serialize)]
struct Field<'i> {
    name: &'i str,
    #[serde(rename = "type")]
    value_type: &'static str,
}

#[derive(Serialize)]
struct ListDocument<'i> {
    fields: Vec<Field<'i>>,
    rows: &'i [ValueRow],
}

struct DictRow<'i> {
    schema: &'i [ColumnType],
    row: &'i ValueRow,
}

impl Serialize for DictRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.row.len()))?;
        for (column, value) in self.schema.iter().zip(self.row.iter()) {
            map.serialize_entry(&column.name, value)?;
        }
        map.end()
    }
}

struct DictDocument<'i> {
    schema: &'i [ColumnType],
    rows: &'i [ValueRow],
}

impl Serialize for DictDocument<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in self.rows {
            seq.serialize_element(&DictRow {
                schema: self.schema,
                row,
            })?;
        }
        seq.end()
    }
}

/// Writes one pretty printed JSON document per result followed by new line.
pub struct JsonRowWriter<W: Write> {
    writer: W,
    layout: RowLayout,
    filter: TextFilter,
    schema: Vec<ColumnType>,
    rows: Vec<ValueRow>,
}

impl<W: Write> fmt::Debug for JsonRowWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("JsonRowWriter")
            .field("layout", &self.layout)
            .field("filter", &self.filter)
            .finish()
    }
}

impl<W: Write> JsonRowWriter<W> {
    pub fn new(writer: W, layout: RowLayout, filter: TextFilter) -> JsonRowWriter<W> {
        JsonRowWriter {
            writer,
            layout,
            filter,
            schema: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RowWriter for JsonRowWriter<W> {
    fn write_header(&mut self, schema: &[ColumnType]) -> Result<(), OutputError> {
        self.schema = schema.to_vec();
        self.rows.clear();
        Ok(())
    }

    fn write_row(&mut self, row: ValueRow) -> Result<(), OutputError> {
        let row = if self.filter.is_noop() {
            row
        } else {
            let filter = &self.filter;
            row.into_iter()
                .map(|value| value.map(|value| value.map_string(|s| filter.apply(s))))
                .collect()
        };
        self.rows.push(row);
        Ok(())
    }

    fn finish_result(&mut self) -> Result<(), OutputError> {
        match self.layout {
            RowLayout::List => serde_json::to_writer_pretty(
                &mut self.writer,
                &ListDocument {
                    fields: self
                        .schema
                        .iter()
                        .map(|column| Field {
                            name: &column.name,
                            value_type: column.value_type.name(),
                        })
                        .collect(),
                    rows: &self.rows,
                },
            )?,
            RowLayout::Dict => serde_json::to_writer_pretty(
                &mut self.writer,
                &DictDocument {
                    schema: &self.schema,
                    rows: &self.rows,
                },
            )?,
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        self.schema.clear();
        self.rows.clear();
        Ok(())
    }
}
