//! Typed input values for parameterized queries.
//!
//! Parameter values come as CSV records; the first record is a header where each field is a
//! parameter name optionally followed by its generic type, e.g. `name string,score number`.
use chrono::{Datelike, Timelike};
use lazy_static::lazy_static;
use log::debug;
use odbc::{SqlDate, SqlTime, SqlTimestamp};
use regex::{Captures, Regex};
use std::error::Error;
use std::fmt;
use std::str::FromStr;

use crate::query::Options;
use crate::value::{UnknownValueType, Value, ValueParseError, ValueType};

/// How parameters are referenced in query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// Positional `?` markers bound in header column order.
    Qmark,
    /// `:name` markers bound by header column name.
    Named,
}

impl ParamStyle {
    pub const VARIANTS: &'static [&'static str] = &["qmark", "named"];
}

#[derive(Debug)]
pub struct UnknownParamStyle(String);

impl fmt::Display for UnknownParamStyle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown parameter style '{}'; expected qmark or named", self.0)
    }
}

impl Error for UnknownParamStyle {}

impl FromStr for ParamStyle {
    type Err = UnknownParamStyle;

    fn from_str(style: &str) -> Result<ParamStyle, UnknownParamStyle> {
        match style {
            "qmark" => Ok(ParamStyle::Qmark),
            "named" => Ok(ParamStyle::Named),
            other => Err(UnknownParamStyle(other.to_owned())),
        }
    }
}

/// Problems with parameter header, records or query placeholders.
#[derive(Debug)]
pub enum ParameterError {
    MalformedHeaderField(String),
    UnknownValueType(UnknownValueType),
    UnknownParameter(String),
    UnexpectedNumberOfFields { expected: usize, got: usize },
    ValueParseError(String, ValueParseError),
}

impl fmt::Display for ParameterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParameterError::MalformedHeaderField(field) => write!(
                f,
                "malformed parameter header field '{}'; expected 'name [type]'",
                field
            ),
            ParameterError::UnknownValueType(_) => write!(f, "parameter header has unknown type"),
            ParameterError::UnknownParameter(name) => {
                write!(f, "query parameter ':{}' not found in input header", name)
            }
            ParameterError::UnexpectedNumberOfFields { expected, got } => write!(
                f,
                "unexpected number of input fields: expected {} but got {}",
                expected, got
            ),
            ParameterError::ValueParseError(name, _) => {
                write!(f, "invalid value of parameter '{}'", name)
            }
        }
    }
}

impl Error for ParameterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParameterError::UnknownValueType(err) => Some(err),
            ParameterError::ValueParseError(_, err) => Some(err),
            ParameterError::MalformedHeaderField(_)
            | ParameterError::UnknownParameter(_)
            | ParameterError::UnexpectedNumberOfFields { .. } => None,
        }
    }
}

impl From<UnknownValueType> for ParameterError {
    fn from(err: UnknownValueType) -> ParameterError {
        ParameterError::UnknownValueType(err)
    }
}

/// Value in form that can be bound to statement.
#[derive(Debug)]
pub enum Parameter {
    String(String),
    WideString(Vec<u16>),
    Integer(i64),
    Double(f64),
    Bit(bool),
    Date(SqlDate),
    Time(SqlTime),
    Timestamp(SqlTimestamp),
}

impl Parameter {
    pub fn from_value(value: Value, options: &Options) -> Parameter {
        match value {
            Value::String(value) if options.utf_16_strings => {
                Parameter::WideString(value.encode_utf16().collect())
            }
            Value::String(value) => Parameter::String(value),
            Value::Integer(value) if options.integer_parameters_as_float => {
                Parameter::Double(value as f64)
            }
            Value::Integer(value) => Parameter::Integer(value),
            Value::Number(value) => Parameter::Double(value),
            Value::Boolean(value) => Parameter::Bit(value),
            Value::Date(value) => Parameter::Date(SqlDate {
                year: value.year() as i16,
                month: value.month() as u16,
                day: value.day() as u16,
            }),
            Value::Timestamp(value) => Parameter::Timestamp(SqlTimestamp {
                year: value.year() as i16,
                month: value.month() as u16,
                day: value.day() as u16,
                hour: value.hour() as u16,
                minute: value.minute() as u16,
                second: value.second() as u16,
                fraction: value.nanosecond(),
            }),
            Value::Time(value) => Parameter::Time(SqlTime {
                hour: value.hour() as u16,
                minute: value.minute() as u16,
                second: value.second() as u16,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterColumn {
    pub name: String,
    pub value_type: ValueType,
}

/// Names and types of input fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterHeader {
    columns: Vec<ParameterColumn>,
}

impl ParameterHeader {
    /// Parse header record; each field is `name [type]` with blanks around ignored.
    ///
    /// Blank fields are rejected.
    pub fn parse<I, F>(fields: I) -> Result<ParameterHeader, ParameterError>
    where
        I: IntoIterator<Item = F>,
        F: AsRef<str>,
    {
        let columns = fields
            .into_iter()
            .map(|field| {
                let field = field.as_ref();
                let words = field.split_whitespace().collect::<Vec<_>>();
                let (name, value_type) = match words.as_slice() {
                    [name] => (*name, ValueType::String),
                    [name, value_type] => (*name, value_type.parse()?),
                    _ => return Err(ParameterError::MalformedHeaderField(field.to_owned())),
                };
                Ok(ParameterColumn {
                    name: name.to_owned(),
                    value_type,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Parameter header: {}",
            columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.value_type))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(ParameterHeader { columns })
    }

    pub fn columns(&self) -> &[ParameterColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Parse record fields and order them for binding; `order` lists header column indices.
    pub fn parameters<F: AsRef<str>>(
        &self,
        record: &[F],
        order: &[usize],
        options: &Options,
    ) -> Result<Vec<Parameter>, ParameterError> {
        if record.len() != self.columns.len() {
            return Err(ParameterError::UnexpectedNumberOfFields {
                expected: self.columns.len(),
                got: record.len(),
            });
        }

        order
            .iter()
            .map(|&index| {
                let column = &self.columns[index];
                Value::parse(record[index].as_ref(), column.value_type)
                    .map(|value| Parameter::from_value(value, options))
                    .map_err(|err| ParameterError::ValueParseError(column.name.clone(), err))
            })
            .collect()
    }
}

/// Query text ready for execution with the order of header columns to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct BindPlan {
    pub query: String,
    pub order: Vec<usize>,
}

impl BindPlan {
    pub fn new(query: &str, style: ParamStyle, header: &ParameterHeader) -> Result<BindPlan, ParameterError> {
        match style {
            ParamStyle::Qmark => Ok(BindPlan {
                query: query.to_owned(),
                order: (0..header.len()).collect(),
            }),
            ParamStyle::Named => {
                let named = NamedQuery::parse(query);
                let order = named.order(header)?;
                Ok(BindPlan {
                    query: named.query,
                    order,
                })
            }
        }
    }
}

/// Query with `:name` placeholders rewritten to `?`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedQuery {
    pub query: String,
    pub names: Vec<String>,
}

impl NamedQuery {
    /// Placeholders inside quoted literals are left alone.
    pub fn parse(query: &str) -> NamedQuery {
        lazy_static! {
            static ref PLACEHOLDER: Regex =
                Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|::|:([A-Za-z_][A-Za-z0-9_]*)"#).unwrap();
        }

        let mut names = Vec::new();
        let query = PLACEHOLDER
            .replace_all(query, |caps: &Captures| match caps.get(1) {
                Some(name) => {
                    names.push(name.as_str().to_owned());
                    "?".to_owned()
                }
                None => caps[0].to_owned(),
            })
            .into_owned();

        NamedQuery { query, names }
    }

    /// Header column index for each placeholder.
    pub fn order(&self, header: &ParameterHeader) -> Result<Vec<usize>, ParameterError> {
        self.names
            .iter()
            .map(|name| {
                header
                    .position(name)
                    .ok_or_else(|| ParameterError::UnknownParameter(name.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn header(fields: &[&str]) -> ParameterHeader {
        ParameterHeader::parse(fields).expect("valid header")
    }

    #[test]
    fn test_param_style() {
        assert_eq!("qmark".parse::<ParamStyle>().unwrap(), ParamStyle::Qmark);
        assert_eq!("named".parse::<ParamStyle>().unwrap(), ParamStyle::Named);
        assert!("format".parse::<ParamStyle>().is_err());
    }

    #[test]
    fn test_header() {
        let header = header(&["name string", " score  number ", "id", "in "]);
        assert_eq!(
            header.columns(),
            &[
                ParameterColumn { name: "name".to_owned(), value_type: ValueType::String },
                ParameterColumn { name: "score".to_owned(), value_type: ValueType::Number },
                ParameterColumn { name: "id".to_owned(), value_type: ValueType::String },
                ParameterColumn { name: "in".to_owned(), value_type: ValueType::String },
            ]
        );
    }

    #[test]
    fn test_header_errors() {
        assert_matches!(
            ParameterHeader::parse(&["name varchar"]),
            Err(ParameterError::UnknownValueType(_))
        );
        assert_matches!(
            ParameterHeader::parse(&["first name string"]),
            Err(ParameterError::MalformedHeaderField(_))
        );
        assert_matches!(
            ParameterHeader::parse(&["first name varchar"]),
            Err(ParameterError::MalformedHeaderField(_))
        );
    }

    #[test]
    fn test_header_blank_fields() {
        assert_matches!(
            ParameterHeader::parse(&["id", ""]),
            Err(ParameterError::MalformedHeaderField(ref field)) => assert_eq!(field, "")
        );
        assert_matches!(
            ParameterHeader::parse(&["  "]),
            Err(ParameterError::MalformedHeaderField(_))
        );
    }

    #[test]
    fn test_named_query() {
        let named = NamedQuery::parse("select :name, :score from dummy where n < 1");
        assert_eq!(named.query, "select ?, ? from dummy where n < 1");
        assert_eq!(named.names, ["name", "score"]);
    }

    #[test]
    fn test_named_query_skips_literals() {
        let named = NamedQuery::parse(r#"select ':x', "a:b", 'it'':s', :y, a::int from t"#);
        assert_eq!(named.query, r#"select ':x', "a:b", 'it'':s', ?, a::int from t"#);
        assert_eq!(named.names, ["y"]);
    }

    #[test]
    fn test_named_order() {
        let header = header(&["score number", "name string"]);
        let named = NamedQuery::parse("select :name, :score, :name from dummy");
        assert_eq!(named.order(&header).unwrap(), [1, 0, 1]);

        let named = NamedQuery::parse("select :missing from dummy");
        assert_matches!(named.order(&header), Err(ParameterError::UnknownParameter(ref name)) => assert_eq!(name, "missing"));
    }

    #[test]
    fn test_bind_plan_qmark() {
        let header = header(&["id integer", "name string"]);
        let plan = BindPlan::new("insert into person values (?, ?)", ParamStyle::Qmark, &header).unwrap();
        assert_eq!(plan.query, "insert into person values (?, ?)");
        assert_eq!(plan.order, [0, 1]);
    }

    #[test]
    fn test_parameters() {
        let header = header(&["name string", "score number", "born date", "cool boolean"]);
        let options = Options {
            utf_16_strings: false,
            ..Options::default()
        };
        let parameters = header
            .parameters(&["john", "5.0", "1999-12-31", "1"], &[0, 1, 2, 3], &options)
            .unwrap();

        assert_matches!(parameters[0], Parameter::String(ref name) => assert_eq!(name, "john"));
        assert_matches!(parameters[1], Parameter::Double(score) => assert_eq!(score, 5.0));
        assert_matches!(parameters[2], Parameter::Date(SqlDate { year: 1999, month: 12, day: 31 }));
        assert_matches!(parameters[3], Parameter::Bit(true));
    }

    #[test]
    fn test_wide_string_parameters() {
        let header = header(&["in string"]);
        let parameters = header
            .parameters(&["Привет"], &[0], &Options::default())
            .unwrap();

        assert_matches!(parameters[0], Parameter::WideString(ref wide) => assert_eq!(String::from_utf16(wide).unwrap(), "Привет"));
    }

    #[test]
    fn test_integer_parameters_as_float() {
        let header = header(&["id integer"]);
        let options = Options {
            integer_parameters_as_float: true,
            ..Options::default()
        };
        assert_matches!(
            header.parameters(&["1"], &[0], &options).unwrap()[0],
            Parameter::Double(value) => assert_eq!(value, 1.0)
        );
        assert_matches!(
            header.parameters(&["1"], &[0], &Options::default()).unwrap()[0],
            Parameter::Integer(1)
        );
    }

    #[test]
    fn test_parameters_errors() {
        let header = header(&["id integer", "name string"]);
        let options = Options::default();
        assert_matches!(
            header.parameters(&["1"], &[0, 1], &options),
            Err(ParameterError::UnexpectedNumberOfFields { expected: 2, got: 1 })
        );
        assert_matches!(
            header.parameters(&["x", "john"], &[0, 1], &options),
            Err(ParameterError::ValueParseError(ref name, _)) => assert_eq!(name, "id")
        );
    }
}
