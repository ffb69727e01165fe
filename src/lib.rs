/*!
Run SQL read from standard input against ODBC data sources (Visual FoxPro, TopSpeed, SQL Server) and
write result sets as CSV or JSON.

Query results are described with a generic type taxonomy (`string`, `integer`, `number`, `date`,
`time`, `boolean`) regardless of what native types the driver reports.

# Example

```no_run
use basq::{Odbc, ValueRow};

let odbc = Odbc::initialize().expect("open ODBC");
let mut db = odbc
    .connect("Driver={Microsoft Visual FoxPro Driver};SourceType=DBC;SourceDB=db.dbc")
    .expect("connect to database");

for row in db
    .handle()
    .query::<ValueRow>("SELECT name FROM person")
    .expect("failed to run query")
{
    println!("{:?}", row.expect("fetch row"));
}
```
!*/

use error_context::prelude::*;
use log::debug;
use odbc::safe::AutocommitOn;
use odbc::{DiagnosticRecord, Environment, Version3};
use std::error::Error;
use std::fmt;

pub mod datasource;
pub mod input;
pub mod output;
pub mod parameter;
pub mod query;
pub mod result_set;
pub mod row;
pub mod script;
pub mod text;
pub mod value;

pub use odbc::ffi::SqlDataType;
pub use odbc::safe::{AutocommitMode, AutocommitOff};
pub use query::{BindError, Binder, Connection, Handle, Options, PreparedStatement, QueryError};
pub use result_set::{DataAccessError, ResultSet, ResultSetError};
pub use row::{ColumnType, DatumAccessError, Row, TryFromRow, UnsupportedSqlDataType};
pub use script::ScriptError;
pub use value::{Value, ValueRow, ValueType};

/// General ODBC initialization and connection errors
#[derive(Debug)]
pub enum OdbcError {
    OdbcError(Option<DiagnosticRecord>, &'static str),
}

impl fmt::Display for OdbcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OdbcError::OdbcError(Some(diag), context) => {
                write!(f, "ODBC call failed while {}: {}", context, diag)
            }
            OdbcError::OdbcError(None, context) => write!(f, "ODBC call failed while {}", context),
        }
    }
}

fn to_dyn(diag: &Option<DiagnosticRecord>) -> Option<&(dyn Error + 'static)> {
    diag.as_ref().map(|e| e as &(dyn Error + 'static))
}

impl Error for OdbcError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OdbcError::OdbcError(diag, _) => to_dyn(diag),
        }
    }
}

impl From<ErrorContext<Option<DiagnosticRecord>, &'static str>> for OdbcError {
    fn from(err: ErrorContext<Option<DiagnosticRecord>, &'static str>) -> OdbcError {
        OdbcError::OdbcError(err.error, err.context)
    }
}

impl From<ErrorContext<DiagnosticRecord, &'static str>> for OdbcError {
    fn from(err: ErrorContext<DiagnosticRecord, &'static str>) -> OdbcError {
        OdbcError::OdbcError(Some(err.error), err.context)
    }
}

pub type EnvironmentV3 = Environment<Version3>;

/// ODBC environment entry point.
///
/// There is one environment per process; it is never released.
pub struct Odbc {
    environment: EnvironmentV3,
}

impl fmt::Debug for Odbc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Odbc").finish()
    }
}

impl Odbc {
    /// Allocate ODBC environment for the rest of the process life.
    pub fn initialize() -> Result<&'static Odbc, OdbcError> {
        debug!("Initializing ODBC environment");
        let environment = odbc::create_environment_v3()
            .wrap_error_while("creating v3 environment")?;
        Ok(Box::leak(Box::new(Odbc { environment })))
    }

    /// Connect to database with default `Options`.
    pub fn connect(&'static self, connection_string: &str) -> Result<Connection<AutocommitOn>, OdbcError> {
        self.connect_with_options(connection_string, Options::default())
    }

    pub fn connect_with_options(
        &'static self,
        connection_string: &str,
        options: Options,
    ) -> Result<Connection<AutocommitOn>, OdbcError> {
        debug!("Connecting to database");
        Connection::with_options(self, connection_string, options)
    }
}
