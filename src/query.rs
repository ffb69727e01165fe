use error_context::prelude::*;
use log::{debug, log_enabled, trace};
use odbc::safe::{AutocommitMode, AutocommitOff, AutocommitOn};
use odbc::{
    Allocated, ColumnDescriptor, Connection as OdbcConnection, DiagnosticRecord, Executed,
    NoResult, OdbcType, Prepared, Statement,
};
use std::error::Error;
use std::fmt;
use std::fmt::Debug;

use crate::parameter::Parameter;
use crate::result_set::{DataAccessError, ResultSet, ResultSetError};
use crate::row::{TryFromRow, UnsupportedSqlDataType};
use crate::{Odbc, OdbcError};

/// Errors related to execution of queries.
///
/// `OdbcError` and `DataAccessError` can be converted into `QueryError`.
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum QueryError {
    OdbcError(OdbcError),
    BindError(DiagnosticRecord),
    UnsupportedSqlDataType(UnsupportedSqlDataType),
    ResultSetError(ResultSetError),
    DataAccessError(DataAccessError),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryError::OdbcError(err) => write!(f, "{}", err),
            QueryError::BindError(_) => {
                write!(f, "ODBC call failed while binding parameter to statement")
            }
            QueryError::UnsupportedSqlDataType(_) => {
                write!(f, "query schema has unsupported data type")
            }
            QueryError::ResultSetError(_) => write!(f, "failed to create result set for query"),
            QueryError::DataAccessError(_) => write!(f, "failed to access result data"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            QueryError::OdbcError(err) => err.source(),
            QueryError::BindError(err) => Some(err),
            QueryError::UnsupportedSqlDataType(err) => Some(err),
            QueryError::ResultSetError(err) => Some(err),
            QueryError::DataAccessError(err) => Some(err),
        }
    }
}

impl From<ErrorContext<DiagnosticRecord, &'static str>> for QueryError {
    fn from(err: ErrorContext<DiagnosticRecord, &'static str>) -> QueryError {
        QueryError::OdbcError(err.into())
    }
}

impl From<BindError> for QueryError {
    fn from(err: BindError) -> QueryError {
        QueryError::BindError(err.0)
    }
}

impl From<OdbcError> for QueryError {
    fn from(err: OdbcError) -> QueryError {
        QueryError::OdbcError(err)
    }
}

impl From<UnsupportedSqlDataType> for QueryError {
    fn from(err: UnsupportedSqlDataType) -> QueryError {
        QueryError::UnsupportedSqlDataType(err)
    }
}

impl From<ResultSetError> for QueryError {
    fn from(err: ResultSetError) -> QueryError {
        QueryError::ResultSetError(err)
    }
}

impl From<DataAccessError> for QueryError {
    fn from(err: DataAccessError) -> QueryError {
        QueryError::DataAccessError(err)
    }
}

/// Error that can happen when binding values to parametrized queries.
#[derive(Debug)]
pub struct BindError(DiagnosticRecord);

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ODBC call failed while binding parameter")
    }
}

impl Error for BindError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl From<DiagnosticRecord> for BindError {
    fn from(err: DiagnosticRecord) -> BindError {
        BindError(err)
    }
}

/// Controls binding of parametrized query values.
pub struct Binder<'h, 't, S, AC: AutocommitMode> {
    statement: Statement<'h, 't, S, NoResult, AC>,
    index: u16,
}

impl<S, AC: AutocommitMode> fmt::Debug for Binder<'_, '_, S, AC> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Binder")
            .field("index", &self.index)
            .finish()
    }
}

impl<'h, 't, S, AC: AutocommitMode> Binder<'h, 't, S, AC> {
    pub fn bind<'new_t, T>(self, value: &'new_t T) -> Result<Binder<'h, 'new_t, S, AC>, BindError>
    where
        T: OdbcType<'new_t> + Debug,
        't: 'new_t,
    {
        let index = self.index + 1;
        if log_enabled!(::log::Level::Trace) {
            trace!("Parameter {}: {:?}", index, value);
        }
        let statement = self.statement.bind_parameter(index, value)?;

        Ok(Binder { statement, index })
    }

    /// Bind typed input value as next parameter.
    pub fn bind_parameter<'new_t>(
        self,
        parameter: &'new_t Parameter,
    ) -> Result<Binder<'h, 'new_t, S, AC>, BindError>
    where
        't: 'new_t,
    {
        match parameter {
            Parameter::String(value) => self.bind(value),
            Parameter::WideString(value) => self.bind(value),
            Parameter::Integer(value) => self.bind(value),
            Parameter::Double(value) => self.bind(value),
            Parameter::Bit(value) => self.bind(value),
            Parameter::Date(value) => self.bind(value),
            Parameter::Time(value) => self.bind(value),
            Parameter::Timestamp(value) => self.bind(value),
        }
    }

    fn into_inner(self) -> Statement<'h, 't, S, NoResult, AC> {
        self.statement
    }
}

impl<'h, S, AC: AutocommitMode> From<Statement<'h, 'h, S, NoResult, AC>> for Binder<'h, 'h, S, AC> {
    fn from(statement: Statement<'h, 'h, S, NoResult, AC>) -> Binder<'h, 'h, S, AC> {
        Binder {
            statement,
            index: 0,
        }
    }
}

/// Runtime configuration of data access.
#[derive(Debug, Clone)]
pub struct Options {
    /// When `true` character data is fetched and bound as UTF-16 (wide) strings so that the driver manager converts from the database code page.
    pub utf_16_strings: bool,
    /// Strip trailing blanks the driver pads fixed-width `CHAR` values with.
    pub trim_char_padding: bool,
    /// Report `NUMERIC`/`DECIMAL` columns with zero decimal digits as `integer`.
    pub integral_numerics: bool,
    /// Bind `integer` parameters as `DOUBLE`; Visual FoxPro driver mishandles integer parameters.
    pub integer_parameters_as_float: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            utf_16_strings: true,
            trim_char_padding: true,
            integral_numerics: false,
            integer_parameters_as_float: false,
        }
    }
}

/// ODBC prepared statement.
pub struct PreparedStatement<'h, AC: AutocommitMode>(Statement<'h, 'h, Prepared, NoResult, AC>);

impl<'h, AC: AutocommitMode> fmt::Debug for PreparedStatement<'h, AC> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut d = f.debug_struct("PreparedStatement");

        let schema = (1..=self.0.num_result_cols().map_err(|_| std::fmt::Error)?)
            .map(|i| self.0.describe_col(i as u16))
            .collect::<Result<Vec<ColumnDescriptor>, _>>()
            .map_err(|_| std::fmt::Error)?;

        d.field("odbc_schema", &schema);
        d.finish()
    }
}

impl<'h, AC: AutocommitMode> PreparedStatement<'h, AC> {
    pub(crate) fn from_statement(
        statement: Statement<'h, 'h, Prepared, NoResult, AC>,
    ) -> PreparedStatement<'h, AC> {
        PreparedStatement(statement)
    }
}

/// Database connection.
///
/// Starts in autocommit mode; `disable_autocommit` turns it into a connection where changes need to be committed.
pub struct Connection<AC: AutocommitMode> {
    connection: OdbcConnection<'static, AC>,
    options: Options,
}

impl<AC: AutocommitMode> fmt::Debug for Connection<AC> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Connection")
            .field("options", &self.options)
            .finish()
    }
}

impl Connection<AutocommitOn> {
    pub fn with_options(
        odbc: &'static Odbc,
        connection_string: &str,
        options: Options,
    ) -> Result<Connection<AutocommitOn>, OdbcError> {
        odbc.environment
            .connect_with_connection_string(connection_string)
            .wrap_error_while("connecting to database")
            .map_err(Into::into)
            .map(|connection| Connection {
                connection,
                options,
            })
    }

    /// Switch to manual commit mode.
    pub fn disable_autocommit(self) -> Result<Connection<AutocommitOff>, OdbcError> {
        debug!("Disabling autocommit");
        let Connection {
            connection,
            options,
        } = self;

        connection
            .disable_autocommit()
            .map(|connection| Connection {
                connection,
                options,
            })
            .map_err(|_| OdbcError::OdbcError(None, "disabling autocommit"))
    }
}

impl Connection<AutocommitOff> {
    pub fn commit(&mut self) -> Result<(), OdbcError> {
        debug!("Committing transaction");
        Ok(self
            .connection
            .commit()
            .wrap_error_while("committing transaction")?)
    }

    pub fn rollback(&mut self) -> Result<(), OdbcError> {
        debug!("Rolling back transaction");
        Ok(self
            .connection
            .rollback()
            .wrap_error_while("rolling back transaction")?)
    }

    /// Call function in transaction.
    /// If function returns Err the transaction will be rolled back otherwise committed.
    pub fn in_transaction<O, E>(
        &mut self,
        f: impl FnOnce(&mut Handle<'_, AutocommitOff>) -> Result<O, E>,
    ) -> Result<Result<O, E>, OdbcError> {
        let result = f(&mut self.handle());
        Ok(match result {
            ok @ Ok(_) => {
                self.commit()?;
                ok
            }
            err @ Err(_) => {
                self.rollback()?;
                err
            }
        })
    }
}

impl<AC: AutocommitMode> Connection<AC> {
    /// Data access options this connection was made with.
    pub fn options(&self) -> &Options {
        &self.options
    }
}

/// Blocks access to `Connection` for duration of query.
///
/// Statically ensures that query result set is consumed before next query can be executed on this connection.
#[derive(Debug)]
pub struct Handle<'c, AC: AutocommitMode>(&'c Connection<AC>);

impl<'c, AC: AutocommitMode> Connection<AC> {
    pub fn handle(&'c mut self) -> Handle<'c, AC> {
        Handle(self)
    }
}

impl<'h, 'c: 'h, AC: AutocommitMode> Handle<'c, AC> {
    fn statement(&'h self) -> Result<Statement<'c, 'c, Allocated, NoResult, AC>, OdbcError> {
        Statement::with_parent(&self.0.connection)
            .wrap_error_while("pairing statement with connection")
            .map_err(Into::into)
    }

    pub fn options(&self) -> &'c Options {
        &self.0.options
    }

    /// Prepare statement for fast execution and parametrization.
    /// For one-off queries it is more efficient to use `query()` function.
    pub fn prepare(&'h mut self, query: &str) -> Result<PreparedStatement<'c, AC>, OdbcError> {
        debug!("Preparing ODBC query: {}", &query);

        let statement = self
            .statement()?
            .prepare(query)
            .wrap_error_while("preparing query")?;

        Ok(PreparedStatement(statement))
    }

    /// Execute one-off query.
    pub fn query<V>(&'h mut self, query: &str) -> Result<ResultSet<'h, 'c, V, Executed, AC>, QueryError>
    where
        V: TryFromRow,
    {
        debug!("Direct ODBC query: {}", &query);

        let statement = self.statement()?;

        Ok(ResultSet::from_result(
            self,
            statement
                .exec_direct(query)
                .wrap_error_while("executing direct statement")?,
            &self.0.options,
        )?)
    }

    /// Bind parameters and execute prepared statement.
    pub fn execute_with_parameters<'t, V, F>(
        &'h mut self,
        statement: PreparedStatement<'c, AC>,
        bind: F,
    ) -> Result<ResultSet<'h, 'c, V, Prepared, AC>, QueryError>
    where
        V: TryFromRow,
        F: FnOnce(
            Binder<'c, 'c, Prepared, AC>,
        ) -> Result<Binder<'c, 't, Prepared, AC>, BindError>,
    {
        let statement = bind(statement.0.into())?.into_inner();

        Ok(ResultSet::from_result(
            self,
            statement
                .execute()
                .wrap_error_while("executing statement")?,
            &self.0.options,
        )?)
    }
}
