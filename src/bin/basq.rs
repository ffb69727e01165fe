use basq::datasource::DataSource;
use basq::input::InputReader;
use basq::output::CsvRowWriter;
use basq::parameter::ParamStyle;
use basq::script::run;
use basq::Odbc;
use cotton::prelude::*;
use std::io;

/// Execute SQL read from stdin and print results as CSV
///
/// Every non-blank input line is a query. With --paramstyle each query line is followed by CSV
/// records with parameter values; the first record is a header of `name [type]` fields and the
/// block ends with a blank line.
#[derive(Debug, StructOpt)]
struct Cli {
    #[structopt(flatten)]
    logging: LoggingOpt,

    /// Read parameter records after each query; qmark binds `?` by header order, named binds `:name` by header name
    #[structopt(long, value_name = "STYLE", possible_values = ParamStyle::VARIANTS)]
    paramstyle: Option<ParamStyle>,

    /// Print column types in header as `name type`
    #[structopt(long)]
    typed_header: bool,

    /// Use tab as field delimiter for input and output
    #[structopt(short = "t")]
    tsv: bool,

    /// Commit after each statement instead of running all in one transaction; required for DDL on Visual FoxPro
    #[structopt(long)]
    autocommit: bool,

    #[structopt(subcommand)]
    source: DataSource,
}

fn main() -> Result<(), Problem> {
    let args = Cli::from_args();
    init_logger(&args.logging, vec![module_path!(), "basq"]);

    let delimiter = if args.tsv { b'\t' } else { b',' };
    let stdin = io::stdin();
    let mut input = InputReader::with_delimiter(stdin.lock(), delimiter);
    let stdout = io::stdout();
    let mut writer = CsvRowWriter::new(stdout.lock(), delimiter, args.typed_header);

    let odbc = Odbc::initialize().or_failed_to("initialize ODBC");
    let db = odbc
        .connect_with_options(&args.source.connection_string(), args.source.options())
        .or_failed_to("connect to database");

    if args.autocommit {
        let mut db = db;
        run(&mut db.handle(), &mut input, &mut writer, args.paramstyle)?;
    } else {
        let mut db = db.disable_autocommit().or_failed_to("start transaction");
        db.in_transaction(|handle| run(handle, &mut input, &mut writer, args.paramstyle))??;
    }

    Ok(())
}
