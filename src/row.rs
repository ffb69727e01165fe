/*!
Fetching data from ODBC Cursor and mapping driver types to the generic value taxonomy.
!*/

use chrono::naive::{NaiveDate, NaiveTime};
use error_context::prelude::*;
use odbc::ffi::SqlDataType;
use odbc::safe::AutocommitMode;
use odbc::{ColumnDescriptor, DiagnosticRecord, OdbcType};
use odbc::{SqlDate, SqlSsTime2, SqlTime, SqlTimestamp};
use std::error::Error;
use std::fmt;
use std::string::FromUtf16Error;

use crate::query::Options;
use crate::value::{Value, ValueRow, ValueType};

/// This error can be returned if database provided column of type that currently cannot be mapped to `Value` type.
#[derive(Debug)]
pub struct UnsupportedSqlDataType {
    column: String,
    data_type: SqlDataType,
}

impl fmt::Display for UnsupportedSqlDataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "column '{}' has unsupported SQL data type: {:?}",
            self.column, self.data_type
        )
    }
}

impl Error for UnsupportedSqlDataType {}

/// Errors related to datum access of ODBC cursor.
#[derive(Debug)]
pub enum DatumAccessError {
    OdbcCursorError(DiagnosticRecord),
    FromUtf16Error(FromUtf16Error, &'static str),
}

impl fmt::Display for DatumAccessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DatumAccessError::OdbcCursorError(_) => {
                write!(f, "failed to access data in ODBC cursor")
            }
            DatumAccessError::FromUtf16Error(_, context) => write!(
                f,
                "failed to create String from UTF-16 column data while {}",
                context
            ),
        }
    }
}

impl Error for DatumAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DatumAccessError::OdbcCursorError(err) => Some(err),
            DatumAccessError::FromUtf16Error(err, _) => Some(err),
        }
    }
}

impl From<ErrorContext<FromUtf16Error, &'static str>> for DatumAccessError {
    fn from(err: ErrorContext<FromUtf16Error, &'static str>) -> DatumAccessError {
        DatumAccessError::FromUtf16Error(err.error, err.context)
    }
}

/// Description of column type, name and nullability properties used to represent row schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnType {
    /// Generic type of values in this column.
    pub value_type: ValueType,
    /// ODBC SQL Data Type as returned by the driver.
    pub odbc_type: SqlDataType,
    /// `true` if column can contain `NULL` value.
    pub nullable: bool,
    /// Name of the column as provided by the ODBC driver.
    pub name: String,
    /// Scale of exact numeric columns.
    pub decimal_digits: Option<u16>,
}

impl ColumnType {
    /// Map driver column description to generic type.
    pub fn new(
        column_descriptor: ColumnDescriptor,
        options: &Options,
    ) -> Result<ColumnType, UnsupportedSqlDataType> {
        let value_type = match value_type_of(
            column_descriptor.data_type,
            column_descriptor.decimal_digits,
            options.integral_numerics,
        ) {
            Some(value_type) => value_type,
            None => {
                return Err(UnsupportedSqlDataType {
                    column: column_descriptor.name,
                    data_type: column_descriptor.data_type,
                })
            }
        };

        Ok(ColumnType {
            value_type,
            odbc_type: column_descriptor.data_type,
            nullable: column_descriptor.nullable.unwrap_or(true),
            name: column_descriptor.name,
            decimal_digits: column_descriptor.decimal_digits,
        })
    }

    /// Fixed-width character column; values are padded with blanks by the driver.
    pub fn is_fixed_width_text(&self) -> bool {
        match self.odbc_type {
            SqlDataType::SQL_CHAR | SqlDataType::SQL_EXT_WCHAR => true,
            _ => false,
        }
    }
}

/// Type map from ODBC SQL data type to generic value type.
///
/// Returns `None` for types that have no generic counterpart (binary, GUID, intervals).
pub fn value_type_of(
    data_type: SqlDataType,
    decimal_digits: Option<u16>,
    integral_numerics: bool,
) -> Option<ValueType> {
    use SqlDataType::*;
    Some(match data_type {
        SQL_CHAR | SQL_VARCHAR | SQL_EXT_LONGVARCHAR | SQL_EXT_WCHAR | SQL_EXT_WVARCHAR
        | SQL_EXT_WLONGVARCHAR | SQL_UNKNOWN_TYPE => ValueType::String,
        SQL_EXT_TINYINT | SQL_SMALLINT | SQL_INTEGER | SQL_EXT_BIGINT => ValueType::Integer,
        SQL_NUMERIC | SQL_DECIMAL => {
            if integral_numerics && decimal_digits == Some(0) {
                ValueType::Integer
            } else {
                ValueType::Number
            }
        }
        SQL_REAL | SQL_FLOAT | SQL_DOUBLE => ValueType::Number,
        SQL_DATE | SQL_TIMESTAMP => ValueType::Date,
        SQL_TIME | SQL_SS_TIME2 => ValueType::Time,
        SQL_EXT_BIT => ValueType::Boolean,
        _ => return None,
    })
}

fn naive_date(value: &SqlDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        i32::from(value.year),
        u32::from(value.month),
        u32::from(value.day),
    )
}

fn naive_time(hour: u16, minute: u16, second: u16, fraction: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_nano_opt(
        u32::from(hour),
        u32::from(minute),
        u32::from(second),
        fraction,
    )
}

/// Represents SQL table column which can be converted to `Value`.
pub struct Column<'r, 's, 'c, S, AC: AutocommitMode> {
    column_type: &'r ColumnType,
    cursor: &'r mut odbc::Cursor<'s, 'c, 'c, S, AC>,
    index: u16,
    options: &'r Options,
}

impl<'r, 's, 'c, S, AC: AutocommitMode> Column<'r, 's, 'c, S, AC> {
    fn into<T: OdbcType<'r>>(self) -> Result<Option<T>, DatumAccessError> {
        self.cursor
            .get_data::<T>(self.index + 1)
            .map_err(DatumAccessError::OdbcCursorError)
    }

    // https://docs.microsoft.com/en-us/sql/odbc/reference/appendixes/c-data-types?view=sql-server-2017

    fn into_string(self) -> Result<Option<String>, DatumAccessError> {
        let trim = self.options.trim_char_padding && self.column_type.is_fixed_width_text();

        let string = if self.options.utf_16_strings {
            self.into::<&[u16]>()?
                .map(|bytes| String::from_utf16(bytes).wrap_error_while("getting UTF-16 string"))
                .transpose()?
        } else {
            self.into::<String>()?
        };

        Ok(if trim {
            string.map(|mut string| {
                let len = string.trim_end_matches(' ').len();
                string.truncate(len);
                string
            })
        } else {
            string
        })
    }

    /// Fetch column datum as generic value.
    ///
    /// Date and time parts that do not form a valid value (e.g. empty FoxPro dates) are read as `NULL`.
    pub fn into_value(self) -> Result<Option<Value>, DatumAccessError> {
        use SqlDataType::*;
        Ok(match (self.column_type.value_type, self.column_type.odbc_type) {
            (ValueType::String, _) => self.into_string()?.map(Value::String),
            (ValueType::Integer, SQL_EXT_TINYINT) => {
                self.into::<i8>()?.map(|value| Value::Integer(i64::from(value)))
            }
            (ValueType::Integer, SQL_SMALLINT) => {
                self.into::<i16>()?.map(|value| Value::Integer(i64::from(value)))
            }
            (ValueType::Integer, SQL_INTEGER) => {
                self.into::<i32>()?.map(|value| Value::Integer(i64::from(value)))
            }
            (ValueType::Integer, SQL_EXT_BIGINT) => self.into::<i64>()?.map(Value::Integer),
            // exact numeric with no decimal digits; driver converts to SQL_C_SBIGINT
            (ValueType::Integer, _) => self.into::<i64>()?.map(Value::Integer),
            (ValueType::Number, _) => self.into::<f64>()?.map(Value::Number),
            (ValueType::Date, SQL_TIMESTAMP) => {
                self.into::<SqlTimestamp>()?.and_then(|value| {
                    naive_date(&SqlDate {
                        year: value.year,
                        month: value.month,
                        day: value.day,
                    })
                    .and_then(|date| {
                        naive_time(value.hour, value.minute, value.second, value.fraction)
                            .map(|time| Value::Timestamp(date.and_time(time)))
                    })
                })
            }
            (ValueType::Date, _) => self
                .into::<SqlDate>()?
                .and_then(|value| naive_date(&value))
                .map(Value::Date),
            (ValueType::Time, SQL_SS_TIME2) => self
                .into::<SqlSsTime2>()?
                .and_then(|value| naive_time(value.hour, value.minute, value.second, value.fraction))
                .map(Value::Time),
            (ValueType::Time, _) => self
                .into::<SqlTime>()?
                .and_then(|value| naive_time(value.hour, value.minute, value.second, 0))
                .map(Value::Time),
            (ValueType::Boolean, _) => self.into::<u8>()?.map(|byte| Value::Boolean(byte != 0)),
        })
    }
}

/// Represents SQL table row of Column objects.
pub struct Row<'r, 's, 'c, S, AC: AutocommitMode> {
    schema: &'r [ColumnType],
    cursor: odbc::Cursor<'s, 'c, 'c, S, AC>,
    options: &'r Options,
    index: u16,
    columns: u16,
}

impl<'r, 's, 'c, S, AC: AutocommitMode> Row<'r, 's, 'c, S, AC> {
    pub fn new(
        cursor: odbc::Cursor<'s, 'c, 'c, S, AC>,
        schema: &'r [ColumnType],
        options: &'r Options,
    ) -> Row<'r, 's, 'c, S, AC> {
        Row {
            schema,
            cursor,
            options,
            index: 0,
            columns: schema.len() as u16,
        }
    }

    pub fn shift_column<'i>(&'i mut self) -> Option<Column<'i, 's, 'c, S, AC>> {
        let options = self.options;
        self.schema
            .get(self.index as usize)
            .map(move |column_type| {
                let column = Column {
                    column_type,
                    cursor: &mut self.cursor,
                    index: self.index,
                    options,
                };

                self.index += 1;
                column
            })
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }
}

/// This traits allow for conversion of `Row` type representing ODBC cursor used internally by `ResultSet` iterator to any other type returned as `Item` that implements it.
pub trait TryFromRow: Sized {
    type Error: Error + 'static;
    /// Given `ColumnType` convert from `Row` to other type of value representing table row.
    fn try_from_row<'r, 's, 'c, S, AC: AutocommitMode>(
        row: Row<'r, 's, 'c, S, AC>,
    ) -> Result<Self, Self::Error>;
}

impl TryFromRow for ValueRow {
    type Error = DatumAccessError;
    fn try_from_row<'r, 's, 'c, S, AC: AutocommitMode>(
        mut row: Row<'r, 's, 'c, S, AC>,
    ) -> Result<Self, Self::Error> {
        let mut values = Vec::with_capacity(row.columns() as usize);
        while let Some(column) = row.shift_column() {
            values.push(column.into_value()?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SqlDataType::*;

    #[test]
    fn test_text_types_are_strings() {
        for data_type in &[
            SQL_CHAR,
            SQL_VARCHAR,
            SQL_EXT_LONGVARCHAR,
            SQL_EXT_WCHAR,
            SQL_EXT_WVARCHAR,
            SQL_EXT_WLONGVARCHAR,
        ] {
            assert_eq!(value_type_of(*data_type, None, false), Some(ValueType::String));
        }
    }

    #[test]
    fn test_integer_types() {
        for data_type in &[SQL_EXT_TINYINT, SQL_SMALLINT, SQL_INTEGER, SQL_EXT_BIGINT] {
            assert_eq!(value_type_of(*data_type, None, false), Some(ValueType::Integer));
        }
    }

    #[test]
    fn test_numeric_is_number() {
        assert_eq!(value_type_of(SQL_NUMERIC, Some(0), false), Some(ValueType::Number));
        assert_eq!(value_type_of(SQL_DECIMAL, Some(3), false), Some(ValueType::Number));
        assert_eq!(value_type_of(SQL_DOUBLE, None, false), Some(ValueType::Number));
        assert_eq!(value_type_of(SQL_REAL, None, true), Some(ValueType::Number));
    }

    #[test]
    fn test_integral_numerics() {
        assert_eq!(value_type_of(SQL_NUMERIC, Some(0), true), Some(ValueType::Integer));
        assert_eq!(value_type_of(SQL_NUMERIC, Some(2), true), Some(ValueType::Number));
        assert_eq!(value_type_of(SQL_DECIMAL, None, true), Some(ValueType::Number));
    }

    #[test]
    fn test_date_time_boolean() {
        assert_eq!(value_type_of(SQL_DATE, None, false), Some(ValueType::Date));
        assert_eq!(value_type_of(SQL_TIMESTAMP, None, false), Some(ValueType::Date));
        assert_eq!(value_type_of(SQL_TIME, None, false), Some(ValueType::Time));
        assert_eq!(value_type_of(SQL_SS_TIME2, None, false), Some(ValueType::Time));
        assert_eq!(value_type_of(SQL_EXT_BIT, None, false), Some(ValueType::Boolean));
    }

    #[test]
    fn test_binary_is_unsupported() {
        assert_eq!(value_type_of(SQL_EXT_LONGVARBINARY, None, false), None);
        assert_eq!(value_type_of(SQL_EXT_VARBINARY, None, false), None);
    }

    #[test]
    fn test_column_type_from_descriptor() {
        let column_type = ColumnType::new(
            ColumnDescriptor {
                name: "weight".to_owned(),
                data_type: SQL_NUMERIC,
                column_size: Some(10),
                decimal_digits: Some(0),
                nullable: None,
            },
            &Options {
                integral_numerics: true,
                ..Options::default()
            },
        )
        .expect("supported type");

        assert_eq!(column_type.value_type, ValueType::Integer);
        assert_eq!(column_type.name, "weight");
        assert!(column_type.nullable);
        assert!(!column_type.is_fixed_width_text());
    }

    #[test]
    fn test_unsupported_column_type() {
        let err = ColumnType::new(
            ColumnDescriptor {
                name: "picture".to_owned(),
                data_type: SQL_EXT_LONGVARBINARY,
                column_size: None,
                decimal_digits: None,
                nullable: Some(true),
            },
            &Options::default(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("picture"));
    }

    #[test]
    fn test_empty_date_parts() {
        assert!(naive_date(&SqlDate { year: 0, month: 0, day: 0 }).is_none());
        assert!(naive_date(&SqlDate { year: 1999, month: 12, day: 31 }).is_some());
        assert!(naive_time(25, 0, 0, 0).is_none());
    }
}
