/*!
Generic value taxonomy shared by query results and parameterized input.

Every driver type is reported as one of `string`, `integer`, `number`, `date`, `time` or `boolean`.
!*/

use chrono::naive::{NaiveDate, NaiveDateTime, NaiveTime};
use chrono::Timelike;
use serde::ser::{Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::num::{ParseFloatError, ParseIntError};
use std::str::FromStr;

pub type ValueRow = Vec<Option<Value>>;

/// Generic type of a column or input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Integer,
    Number,
    Date,
    Time,
    Boolean,
}

impl ValueType {
    /// Name used in typed headers.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Number => "number",
            ValueType::Date => "date",
            ValueType::Time => "time",
            ValueType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct UnknownValueType(String);

impl fmt::Display for UnknownValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unknown value type '{}'; expected one of: string, integer, number, date, time, boolean",
            self.0
        )
    }
}

impl Error for UnknownValueType {}

/// Missing type name means `string`.
impl FromStr for ValueType {
    type Err = UnknownValueType;

    fn from_str(name: &str) -> Result<ValueType, UnknownValueType> {
        Ok(match name.trim() {
            "" | "string" => ValueType::String,
            "integer" => ValueType::Integer,
            "number" => ValueType::Number,
            "date" => ValueType::Date,
            "time" => ValueType::Time,
            "boolean" => ValueType::Boolean,
            other => return Err(UnknownValueType(other.to_owned())),
        })
    }
}

/// Error parsing text of an input field as given type.
#[derive(Debug)]
pub enum ValueParseError {
    Integer(String, ParseIntError),
    Number(String, ParseFloatError),
    DateTime(String, ValueType, chrono::ParseError),
    Boolean(String),
}

impl fmt::Display for ValueParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueParseError::Integer(text, _) => write!(f, "failed to parse '{}' as integer", text),
            ValueParseError::Number(text, _) => write!(f, "failed to parse '{}' as number", text),
            ValueParseError::DateTime(text, value_type, _) => {
                write!(f, "failed to parse '{}' as {}", text, value_type)
            }
            ValueParseError::Boolean(text) => write!(
                f,
                "failed to parse '{}' as boolean; expected 1, 0, true or false",
                text
            ),
        }
    }
}

impl Error for ValueParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ValueParseError::Integer(_, err) => Some(err),
            ValueParseError::Number(_, err) => Some(err),
            ValueParseError::DateTime(_, _, err) => Some(err),
            ValueParseError::Boolean(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
    /// Date with time of day; reported as `date` type.
    Timestamp(NaiveDateTime),
    Time(NaiveTime),
    Boolean(bool),
}

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

impl Value {
    /// Parse input field text as value of given type.
    ///
    /// Strings are taken verbatim, other types ignore surrounding blanks.
    pub fn parse(text: &str, value_type: ValueType) -> Result<Value, ValueParseError> {
        let trimmed = text.trim();
        Ok(match value_type {
            ValueType::String => Value::String(text.to_owned()),
            ValueType::Integer => Value::Integer(
                trimmed
                    .parse()
                    .map_err(|err| ValueParseError::Integer(text.to_owned(), err))?,
            ),
            ValueType::Number => Value::Number(
                trimmed
                    .parse()
                    .map_err(|err| ValueParseError::Number(text.to_owned(), err))?,
            ),
            ValueType::Date => {
                let parsed = if trimmed.len() > 10 {
                    NaiveDateTime::parse_from_str(&trimmed.replacen('T', " ", 1), TIMESTAMP_FORMAT)
                        .map(Value::Timestamp)
                } else {
                    NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map(Value::Date)
                };
                parsed.map_err(|err| ValueParseError::DateTime(text.to_owned(), value_type, err))?
            }
            ValueType::Time => Value::Time(
                NaiveTime::parse_from_str(trimmed, TIME_FORMAT)
                    .map_err(|err| ValueParseError::DateTime(text.to_owned(), value_type, err))?,
            ),
            ValueType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" => Value::Boolean(true),
                "0" | "false" => Value::Boolean(false),
                _ => return Err(ValueParseError::Boolean(text.to_owned())),
            },
        })
    }

    /// Apply `f` to string values; other values are returned unchanged.
    pub fn map_string(self, f: impl FnOnce(String) -> String) -> Value {
        match self {
            Value::String(value) => Value::String(f(value)),
            other => other,
        }
    }
}

/// Shortest text that reads back as the same `f64`, always with fractional part or exponent.
///
/// Magnitudes below `1e-4` or from `1e16` up use exponent form with sign and at least two digits: `1e+16`, `2.5e-07`.
fn write_number(f: &mut fmt::Formatter, value: f64) -> fmt::Result {
    let text = format!("{:?}", value);
    match text.find('e') {
        Some(at) => {
            let (mantissa, exponent) = (&text[..at], &text[at + 1..]);
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            write!(f, "{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => f.write_str(&text),
    }
}

/// Text form used in CSV output.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(value) => f.write_str(value),
            Value::Integer(value) => write!(f, "{}", value),
            Value::Number(value) => write_number(f, *value),
            Value::Date(value) => write!(f, "{}", value.format(DATE_FORMAT)),
            Value::Timestamp(value) => {
                if value.num_seconds_from_midnight() == 0 && value.nanosecond() == 0 {
                    write!(f, "{}", value.format(DATE_FORMAT))
                } else {
                    write!(f, "{}", value.format(TIMESTAMP_FORMAT))
                }
            }
            Value::Time(value) => write!(f, "{}", value.format(TIME_FORMAT)),
            Value::Boolean(true) => f.write_str("1"),
            Value::Boolean(false) => f.write_str("0"),
        }
    }
}

/// JSON natives where possible; dates and times as text.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(value) => serializer.serialize_str(value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Number(value) => serializer.serialize_f64(*value),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Date(_) | Value::Timestamp(_) | Value::Time(_) => serializer.collect_str(self),
        }
    }
}
