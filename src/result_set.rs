use error_context::prelude::*;
use log::{debug, log_enabled, trace};
use odbc::safe::AutocommitMode;
use odbc::{ColumnDescriptor, DiagnosticRecord, Executed, Prepared, ResultSetState};
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;

use crate::query::{Handle, Options, PreparedStatement};
use crate::row::{ColumnType, Row, TryFromRow, UnsupportedSqlDataType};
use crate::OdbcError;

/// Error crating ResultSet iterator.
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResultSetError {
    OdbcError(DiagnosticRecord, &'static str),
    UnsupportedSqlDataType(UnsupportedSqlDataType),
}

impl fmt::Display for ResultSetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResultSetError::OdbcError(_, context) => {
                write!(f, "ODBC call failed while {}", context)
            }
            ResultSetError::UnsupportedSqlDataType(_) => {
                write!(f, "query schema has unsupported data type")
            }
        }
    }
}

impl Error for ResultSetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ResultSetError::OdbcError(err, _) => Some(err),
            ResultSetError::UnsupportedSqlDataType(err) => Some(err),
        }
    }
}

impl From<ErrorContext<DiagnosticRecord, &'static str>> for ResultSetError {
    fn from(err: ErrorContext<DiagnosticRecord, &'static str>) -> ResultSetError {
        ResultSetError::OdbcError(err.error, err.context)
    }
}

impl From<UnsupportedSqlDataType> for ResultSetError {
    fn from(err: UnsupportedSqlDataType) -> ResultSetError {
        ResultSetError::UnsupportedSqlDataType(err)
    }
}

/// Errors related to data access of query result set.
///
/// This error can happen when iterating rows of executed query result set.
/// For convenience this error can be converted into `QueryError`.
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum DataAccessError {
    OdbcError(DiagnosticRecord, &'static str),
    FromRowError(Box<dyn Error>),
}

impl fmt::Display for DataAccessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataAccessError::OdbcError(_, context) => {
                write!(f, "ODBC call failed while {}", context)
            }
            DataAccessError::FromRowError(_) => {
                write!(f, "failed to convert table row to target type")
            }
        }
    }
}

impl Error for DataAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DataAccessError::OdbcError(err, _) => Some(err),
            DataAccessError::FromRowError(err) => Some(err.as_ref()),
        }
    }
}

impl From<ErrorContext<DiagnosticRecord, &'static str>> for DataAccessError {
    fn from(err: ErrorContext<DiagnosticRecord, &'static str>) -> DataAccessError {
        DataAccessError::OdbcError(err.error, err.context)
    }
}

/// Iterator over result set rows.
///
/// Items of this iterator can be of any type that implements `TryFromRow`.
pub struct ResultSet<'h, 'c, V, S, AC: AutocommitMode> {
    statement: Option<ExecutedStatement<'c, S, AC>>,
    schema: Vec<ColumnType>,
    columns: i16,
    options: &'c Options,
    phantom: PhantomData<&'h V>,
}

impl<'h, 'c, V, S, AC: AutocommitMode> fmt::Debug for ResultSet<'h, 'c, V, S, AC> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("schema", &self.schema)
            .field("columns", &self.columns)
            .field("options", &self.options)
            .finish()
    }
}

impl<'h, 'c, V, S, AC: AutocommitMode> Drop for ResultSet<'h, 'c, V, S, AC> {
    fn drop(&mut self) {
        // We need to make sure statement is dropped; implementing Drop forces use of drop(row_iter) if not consumed before another query
        drop(self.statement.take())
    }
}

enum ExecutedStatement<'c, S, AC: AutocommitMode> {
    HasResult(odbc::Statement<'c, 'c, S, odbc::HasResult, AC>),
    NoResult(odbc::Statement<'c, 'c, S, odbc::NoResult, AC>),
}

impl<'h, 'c: 'h, V, S, AC: AutocommitMode> ResultSet<'h, 'c, V, S, AC>
where
    V: TryFromRow,
{
    pub(crate) fn from_result(
        _handle: &'h Handle<'c, AC>,
        result: ResultSetState<'c, '_, S, AC>,
        options: &'c Options,
    ) -> Result<ResultSet<'h, 'c, V, S, AC>, ResultSetError> {
        let (odbc_schema, columns, statement) = match result {
            ResultSetState::Data(statement) => {
                let columns = statement
                    .num_result_cols()
                    .wrap_error_while("getting number of result columns")?;
                let odbc_schema = (1..=columns)
                    .map(|i| statement.describe_col(i as u16))
                    .collect::<Result<Vec<ColumnDescriptor>, _>>()
                    .wrap_error_while("getting column descriptiors")?;
                let statement = statement
                    .reset_parameters()
                    .wrap_error_while("reseting bound parameters on statement")?; // don't reference parameter data any more

                if log_enabled!(::log::Level::Debug) {
                    if odbc_schema.is_empty() {
                        debug!("Got empty data set");
                    } else {
                        debug!(
                            "Got data with columns: {}",
                            odbc_schema
                                .iter()
                                .map(|cd| cd.name.clone())
                                .collect::<Vec<String>>()
                                .join(", ")
                        );
                    }
                }

                (
                    odbc_schema,
                    columns,
                    ExecutedStatement::HasResult(statement),
                )
            }
            ResultSetState::NoData(statement) => {
                debug!("No data");
                let statement = statement
                    .reset_parameters()
                    .wrap_error_while("reseting bound parameters on statement")?; // don't reference parameter data any more
                (Vec::new(), 0, ExecutedStatement::NoResult(statement))
            }
        };

        if log_enabled!(::log::Level::Trace) {
            for cd in &odbc_schema {
                trace!("ODBC query result schema: {} [{:?}] size: {:?} nullable: {:?} decimal_digits: {:?}", cd.name, cd.data_type, cd.column_size, cd.nullable, cd.decimal_digits);
            }
        }

        // convert schema here so that when iterating rows we can pass reference to it per row for row type conversion
        let schema = odbc_schema
            .into_iter()
            .map(|cd| ColumnType::new(cd, options))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResultSet {
            statement: Some(statement),
            schema,
            columns,
            options,
            phantom: PhantomData,
        })
    }

    /// Information about column types.
    pub fn schema(&self) -> &[ColumnType] {
        self.schema.as_slice()
    }

    /// `true` if statement produced a result set (even with no rows); `false` for statements like "INSERT".
    pub fn has_result(&self) -> bool {
        match self.statement {
            Some(ExecutedStatement::HasResult(_)) => self.columns > 0,
            _ => false,
        }
    }
}

impl<'h, 'c: 'h, V, AC: AutocommitMode> ResultSet<'h, 'c, V, Prepared, AC>
where
    V: TryFromRow,
{
    /// Close the result set and discard any not consumed rows.
    ///
    /// Returns the prepared statement so it can be executed again.
    pub fn close(mut self) -> Result<PreparedStatement<'c, AC>, OdbcError> {
        match self.statement.take() {
            Some(ExecutedStatement::HasResult(statement)) => Ok(PreparedStatement::from_statement(
                statement
                    .close_cursor()
                    .wrap_error_while("closing cursor on executed prepared statement")?,
            )),
            Some(ExecutedStatement::NoResult(statement)) => {
                Ok(PreparedStatement::from_statement(statement))
            }
            None => Err(OdbcError::OdbcError(None, "closing already closed result set")),
        }
    }
}

impl<'h, 'c: 'h, V, AC: AutocommitMode> ResultSet<'h, 'c, V, Executed, AC>
where
    V: TryFromRow,
{
    /// Close the result set and discard any not consumed rows.
    pub fn close(mut self) -> Result<(), OdbcError> {
        if let Some(ExecutedStatement::HasResult(statement)) = self.statement.take() {
            statement
                .close_cursor()
                .wrap_error_while("closing cursor on executed statement")?;
        }
        Ok(())
    }
}

impl<'h, 'c: 'h, V, S, AC: AutocommitMode> Iterator for ResultSet<'h, 'c, V, S, AC>
where
    V: TryFromRow,
{
    type Item = Result<V, DataAccessError>;

    fn next(&mut self) -> Option<Self::Item> {
        let statement = match self.statement.as_mut() {
            Some(ExecutedStatement::HasResult(statement)) => statement,
            _ => return None,
        };

        // Invalid cursor
        if self.columns == 0 {
            return None;
        }

        let options = self.options;
        let schema = &self.schema;

        statement
            .fetch()
            .wrap_error_while("fetching row")
            .transpose()
            .map(|cursor| {
                let row = Row::new(cursor?, schema, options);
                TryFromRow::try_from_row(row)
                    .map_err(|err| DataAccessError::FromRowError(Box::new(err)))
            })
    }
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use crate::{Odbc, Options, Value, ValueRow, ValueType};
    #[allow(unused_imports)]
    use assert_matches::assert_matches;

    #[test]
    #[cfg(feature = "test-vfp")]
    fn test_value_row_types() {
        let odbc = Odbc::initialize().expect("open ODBC");
        let mut db = odbc
            .connect(crate::tests::vfp_connection_string().as_str())
            .expect("connect to Visual FoxPro");

        let mut handle = db.handle();
        let mut result = handle
            .query::<ValueRow>(
                "SELECT 'john' AS name, CAST(40 AS INTEGER) AS age, 73.5 AS weight, DATE(1980, 1, 1) AS birth, .T. AS cool FROM dummy WHERE n < 1",
            )
            .expect("failed to run query");

        let types = result
            .schema()
            .iter()
            .map(|column| column.value_type)
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            [
                ValueType::String,
                ValueType::Integer,
                ValueType::Number,
                ValueType::Date,
                ValueType::Boolean
            ]
        );

        let row = result.next().expect("one row").expect("fetch data");
        assert_matches!(row[0], Some(Value::String(ref name)) => assert_eq!(name, "john"));
        assert_matches!(row[1], Some(Value::Integer(40)));
        assert_matches!(row[2], Some(Value::Number(weight)) => assert_eq!(weight, 73.5));
        assert_matches!(row[4], Some(Value::Boolean(true)));
        assert!(result.next().is_none());
    }

    #[test]
    #[cfg(feature = "test-vfp")]
    fn test_empty_result_set_has_schema() {
        let odbc = Odbc::initialize().expect("open ODBC");
        let mut db = odbc
            .connect(crate::tests::vfp_connection_string().as_str())
            .expect("connect to Visual FoxPro");

        let mut handle = db.handle();
        let result = handle
            .query::<ValueRow>("SELECT n FROM dummy WHERE n < 0")
            .expect("failed to run query");

        assert!(result.has_result());
        assert_eq!(result.schema().len(), 1);
        assert_eq!(result.count(), 0);
    }

    #[test]
    #[cfg(feature = "test-vfp")]
    fn test_prepared_statement_reuse() {
        use crate::parameter::Parameter;

        let odbc = Odbc::initialize().expect("open ODBC");
        let mut db = odbc
            .connect_with_options(
                crate::tests::vfp_connection_string().as_str(),
                Options {
                    integer_parameters_as_float: true,
                    ..Options::default()
                },
            )
            .expect("connect to Visual FoxPro");

        let mut handle = db.handle();
        let mut statement = handle
            .prepare("SELECT ? AS out FROM dummy WHERE n < 1")
            .expect("prepare query");

        for input in &[1i64, 2, 3] {
            let parameters = [Parameter::from_value(Value::Integer(*input), handle.options())];
            let mut result = handle
                .execute_with_parameters::<ValueRow, _>(statement, |binder| {
                    binder.bind_parameter(&parameters[0])
                })
                .expect("execute query");

            let row = result.next().expect("one row").expect("fetch data");
            assert_matches!(row[0], Some(Value::Number(out)) => assert_eq!(out, *input as f64));
            statement = result.close().expect("close result set");
        }
    }

    #[test]
    #[cfg(feature = "test-sql-server")]
    fn test_sql_server_char_padding_trimmed() {
        let odbc = Odbc::initialize().expect("open ODBC");
        let mut db = odbc
            .connect(crate::tests::sql_server_connection_string().as_str())
            .expect("connect to SQL Server");

        let mut handle = db.handle();
        let mut result = handle
            .query::<ValueRow>("SELECT CAST('test' AS CHAR(20))")
            .expect("failed to run query");

        let row = result.next().expect("one row").expect("fetch data");
        assert_matches!(row[0], Some(Value::String(ref value)) => assert_eq!(value, "test"));
    }

    #[test]
    #[cfg(feature = "test-sql-server")]
    fn test_sql_server_integral_numeric_is_exact() {
        let odbc = Odbc::initialize().expect("open ODBC");
        let mut db = odbc
            .connect_with_options(
                crate::tests::sql_server_connection_string().as_str(),
                Options {
                    integral_numerics: true,
                    ..Options::default()
                },
            )
            .expect("connect to SQL Server");

        let mut handle = db.handle();
        let mut result = handle
            .query::<ValueRow>("SELECT CAST(12345678901234567 AS NUMERIC(20, 0)) AS id")
            .expect("failed to run query");

        assert_eq!(result.schema()[0].value_type, ValueType::Integer);
        let row = result.next().expect("one row").expect("fetch data");
        assert_eq!(row[0], Some(Value::Integer(12_345_678_901_234_567)));
    }

    #[test]
    #[cfg(feature = "test-sql-server")]
    fn test_sql_server_statement_without_result() {
        let odbc = Odbc::initialize().expect("open ODBC");
        let mut db = odbc
            .connect(crate::tests::sql_server_connection_string().as_str())
            .expect("connect to SQL Server");

        let mut handle = db.handle();
        let mut data = handle
            .query::<ValueRow>("SELECT foo INTO #bar FROM (SELECT 1 as foo UNION SELECT 2 as foo) a")
            .expect("failed to run insert query");

        assert!(!data.has_result());
        assert!(data.schema().is_empty());
        assert!(data.next().is_none());
    }
}
