//! Running query scripts read from `InputReader` and writing results with `RowWriter`.
use log::{debug, warn};
use std::error::Error;
use std::fmt;
use std::io::BufRead;

use crate::input::{InputError, InputReader};
use crate::output::{OutputError, RowWriter};
use crate::parameter::{BindPlan, ParamStyle, Parameter, ParameterError, ParameterHeader};
use crate::query::{BindError, Binder, Handle, QueryError};
use crate::result_set::{DataAccessError, ResultSet};
use odbc::safe::AutocommitMode;
use crate::value::ValueRow;
use crate::OdbcError;

/// Errors that stop script execution.
#[derive(Debug)]
pub enum ScriptError {
    InputError(InputError),
    ParameterError(ParameterError),
    QueryError(QueryError),
    DataAccessError(DataAccessError),
    OutputError(OutputError),
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScriptError::InputError(_) => write!(f, "failed to read query script"),
            ScriptError::ParameterError(_) => write!(f, "invalid query parameters"),
            ScriptError::QueryError(_) => write!(f, "failed to execute query"),
            ScriptError::DataAccessError(_) => write!(f, "failed to fetch query result"),
            ScriptError::OutputError(_) => write!(f, "failed to write query result"),
        }
    }
}

impl Error for ScriptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ScriptError::InputError(err) => Some(err),
            ScriptError::ParameterError(err) => Some(err),
            ScriptError::QueryError(err) => Some(err),
            ScriptError::DataAccessError(err) => Some(err),
            ScriptError::OutputError(err) => Some(err),
        }
    }
}

impl From<InputError> for ScriptError {
    fn from(err: InputError) -> ScriptError {
        ScriptError::InputError(err)
    }
}

impl From<ParameterError> for ScriptError {
    fn from(err: ParameterError) -> ScriptError {
        ScriptError::ParameterError(err)
    }
}

impl From<QueryError> for ScriptError {
    fn from(err: QueryError) -> ScriptError {
        ScriptError::QueryError(err)
    }
}

impl From<OdbcError> for ScriptError {
    fn from(err: OdbcError) -> ScriptError {
        ScriptError::QueryError(err.into())
    }
}

impl From<DataAccessError> for ScriptError {
    fn from(err: DataAccessError) -> ScriptError {
        ScriptError::DataAccessError(err)
    }
}

impl From<OutputError> for ScriptError {
    fn from(err: OutputError) -> ScriptError {
        ScriptError::OutputError(err)
    }
}

fn bind_all<'h, 't, S, AC: AutocommitMode>(
    binder: Binder<'h, 't, S, AC>,
    parameters: &'t [Parameter],
) -> Result<Binder<'h, 't, S, AC>, BindError> {
    parameters
        .iter()
        .try_fold(binder, |binder, parameter| binder.bind_parameter(parameter))
}

/// Write rows of result; returns `true` if statement produced result set.
fn write_result<'h, 'c: 'h, S, AC: AutocommitMode>(
    rows: &mut ResultSet<'h, 'c, ValueRow, S, AC>,
    writer: &mut impl RowWriter,
    write_header: bool,
) -> Result<bool, ScriptError> {
    if !rows.has_result() {
        debug!("Statement produced no result set");
        return Ok(false);
    }

    if write_header {
        writer.write_header(rows.schema())?;
    }
    for row in rows {
        writer.write_row(row?)?;
    }
    Ok(true)
}

/// Execute every query of the script.
///
/// Without `paramstyle` each non-blank line is a query. With it each query is followed by a
/// parameter header record and data records; the statement is prepared once and executed for
/// every data record. Header of the result is written once per query and statements without
/// result set write nothing.
pub fn run<AC: AutocommitMode>(
    handle: &mut Handle<'_, AC>,
    input: &mut InputReader<impl BufRead>,
    writer: &mut impl RowWriter,
    paramstyle: Option<ParamStyle>,
) -> Result<(), ScriptError> {
    while let Some(query) = input.next_query()? {
        let style = match paramstyle {
            Some(style) => style,
            None => {
                let mut rows = handle.query::<ValueRow>(&query)?;
                if write_result(&mut rows, writer, true)? {
                    writer.finish_result()?;
                }
                rows.close()?;
                continue;
            }
        };

        let header = match input.next_record()? {
            Some(record) => ParameterHeader::parse(record)?,
            None => {
                warn!(
                    "No parameter header after query ending at line {}: {}",
                    input.line(),
                    query
                );
                continue;
            }
        };
        let plan = BindPlan::new(&query, style, &header)?;
        let options = handle.options();

        let mut statement = None;
        let mut header_written = false;
        while let Some(record) = input.next_record()? {
            let parameters = header.parameters(&record, &plan.order, options)?;
            let prepared = match statement.take() {
                Some(prepared) => prepared,
                None => handle.prepare(&plan.query)?,
            };

            let mut rows = handle.execute_with_parameters::<ValueRow, _>(prepared, |binder| {
                bind_all(binder, &parameters)
            })?;
            header_written |= write_result(&mut rows, writer, !header_written)?;
            statement = Some(rows.close()?);
        }

        if header_written {
            writer.finish_result()?;
        }
    }

    Ok(())
}

/// Execute each non-blank line as query and write one result per query, also for statements without result set.
pub fn run_documents<AC: AutocommitMode>(
    handle: &mut Handle<'_, AC>,
    input: &mut InputReader<impl BufRead>,
    writer: &mut impl RowWriter,
) -> Result<(), ScriptError> {
    while let Some(query) = input.next_query()? {
        let mut rows = handle.query::<ValueRow>(&query)?;
        writer.write_header(rows.schema())?;
        for row in &mut rows {
            writer.write_row(row?)?;
        }
        writer.finish_result()?;
        rows.close()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::*;
    #[allow(unused_imports)]
    use crate::output::{CsvRowWriter, JsonRowWriter, RowLayout};
    #[allow(unused_imports)]
    use crate::text::TextFilter;
    #[allow(unused_imports)]
    use crate::{Odbc, Options, Value};
    #[allow(unused_imports)]
    use assert_matches::assert_matches;

    #[cfg(feature = "test-vfp")]
    fn vfp_script(script: &str, paramstyle: Option<ParamStyle>) -> Result<String, ScriptError> {
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

        let mut input = InputReader::new(script.as_bytes());
        let mut writer = CsvRowWriter::new(Vec::new(), b',', false);
        run(&mut db.handle(), &mut input, &mut writer, paramstyle)?;
        Ok(String::from_utf8(writer.into_inner().expect("flush output")).expect("UTF-8 output"))
    }

    #[test]
    #[cfg(feature = "test-vfp")]
    fn test_select_with_no_rows_prints_header() {
        assert_eq!(
            vfp_script("select n from dummy where n < 0\n", None).unwrap(),
            "n\n"
        );
    }

    #[test]
    #[cfg(feature = "test-vfp")]
    fn test_parameterized_select_header_once_per_block() {
        assert_eq!(
            vfp_script(
                "select ? as out from dummy where n < 1\nout integer\n1\n2\n\nselect ? as a, ? as b from dummy where n < 1\na string,b number\nx,1.5\n",
                Some(ParamStyle::Qmark)
            )
            .unwrap(),
            "out\n1.0\n2.0\na,b\nx,1.5\n"
        );
    }

    #[test]
    #[cfg(feature = "test-vfp")]
    fn test_parameterized_select_with_no_input_values() {
        assert_eq!(
            vfp_script(
                "select ? as out from dummy where n < 1\nname string\n",
                Some(ParamStyle::Qmark)
            )
            .unwrap(),
            ""
        );
    }

    #[test]
    #[cfg(feature = "test-vfp")]
    fn test_parameter_errors_stop_script() {
        assert_matches!(
            vfp_script(
                "select ? as out from dummy where n < 1\nout integer\nx\n",
                Some(ParamStyle::Qmark)
            ),
            Err(ScriptError::ParameterError(ParameterError::ValueParseError(..)))
        );
    }

    #[test]
    #[cfg(feature = "test-sql-server")]
    fn test_statements_without_result_print_nothing() {
        let odbc = Odbc::initialize().expect("open ODBC");
        let mut db = odbc
            .connect(crate::tests::sql_server_connection_string().as_str())
            .expect("connect to SQL Server");

        let mut input = InputReader::new(
            "create table #person (id int, name varchar(20))\ninsert into #person values (1, 'john')\nselect id, name from #person\n"
                .as_bytes(),
        );
        let mut writer = CsvRowWriter::new(Vec::new(), b',', false);
        run(&mut db.handle(), &mut input, &mut writer, None).expect("run script");

        assert_eq!(
            String::from_utf8(writer.into_inner().unwrap()).unwrap(),
            "id,name\n1,john\n"
        );
    }

    #[test]
    #[cfg(feature = "test-sql-server")]
    fn test_input_queries_done_in_transaction() {
        let odbc = Odbc::initialize().expect("open ODBC");
        let mut db = odbc
            .connect(crate::tests::sql_server_connection_string().as_str())
            .expect("connect to SQL Server");
        db.handle()
            .query::<ValueRow>("create table #person (id int, name varchar(20))")
            .expect("create table")
            .close()
            .expect("close result");

        let mut db = db.disable_autocommit().expect("disable autocommit");
        let mut input = InputReader::new(
            "insert into #person values (1, 'bill')\nselect * from no_such_table\n".as_bytes(),
        );
        let mut writer = CsvRowWriter::new(Vec::new(), b',', false);
        let result = db
            .in_transaction(|handle| run(handle, &mut input, &mut writer, None))
            .expect("roll back");
        assert_matches!(result, Err(ScriptError::QueryError(_)));

        let mut handle = db.handle();
        let mut rows = handle
            .query::<ValueRow>("select count(*) from #person")
            .expect("count rows");
        assert_matches!(rows.next(), Some(Ok(ref row)) => assert_eq!(row[0], Some(Value::Integer(0))));
    }

    #[test]
    #[cfg(feature = "test-sql-server")]
    fn test_documents_for_each_query() {
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

        let mut input = InputReader::new(
            "select cast(12345678901234567 as numeric(20, 0)) as id\n\nselect cast('a' as char(3)) as c\n"
                .as_bytes(),
        );
        let mut writer = JsonRowWriter::new(Vec::new(), RowLayout::Dict, TextFilter::default());
        run_documents(&mut db.handle(), &mut input, &mut writer).expect("run script");

        assert_eq!(
            String::from_utf8(writer.into_inner()).unwrap(),
            "[\n  {\n    \"id\": 12345678901234567\n  }\n]\n[\n  {\n    \"c\": \"a\"\n  }\n]\n"
        );
    }
}
