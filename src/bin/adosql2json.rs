use basq::datasource::DataSource;
use basq::input::InputReader;
use basq::output::{JsonRowWriter, RowLayout};
use basq::text::{unescape, Replacement, TextFilter, Trim};
use basq::script;
use basq::{Odbc, Options};
use cotton::prelude::*;
use log::debug;
use std::io;

/// Execute SQL queries read from stdin, one per line, and print each result as JSON document
#[derive(Debug, StructOpt)]
struct Cli {
    #[structopt(flatten)]
    logging: LoggingOpt,

    /// Represent each data row as list or dict; with list field names and types are given separately
    #[structopt(long, value_name = "ROWTYPE", default_value = "list", possible_values = RowLayout::VARIANTS)]
    rowtype: RowLayout,

    /// Trim leading and trailing characters of string values
    #[structopt(long, conflicts_with = "rtrim")]
    trim: bool,

    /// Trim trailing characters of string values
    #[structopt(long)]
    rtrim: bool,

    /// Characters to trim; backslash escapes are recognized
    #[structopt(long, value_name = "CHARS", default_value = " ", parse(try_from_str = unescape))]
    chop: String,

    /// Replace first character of STR with rest of it in string values; can be repeated
    #[structopt(long, value_name = "STR", number_of_values = 1, parse(try_from_str = unescape))]
    replace: Vec<String>,

    #[structopt(subcommand)]
    source: DataSource,
}

impl Cli {
    fn text_filter(&self) -> Result<TextFilter, Problem> {
        let trim = if self.trim {
            Some(Trim::Both)
        } else if self.rtrim {
            Some(Trim::Right)
        } else {
            None
        };

        Ok(TextFilter {
            replacements: self
                .replace
                .iter()
                .map(|argument| Replacement::parse(argument))
                .collect::<Result<_, _>>()?,
            trim,
            chop: self.chop.chars().collect(),
        })
    }
}

fn main() -> Result<(), Problem> {
    let args = Cli::from_args();
    init_logger(&args.logging, vec![module_path!(), "basq"]);

    let filter = args.text_filter()?;
    debug!("String filter: {:?}", filter);

    let stdin = io::stdin();
    let mut input = InputReader::new(stdin.lock());
    let stdout = io::stdout();
    let mut writer = JsonRowWriter::new(stdout.lock(), args.rowtype, filter);

    let options = Options {
        integral_numerics: true,
        ..args.source.options()
    };

    let odbc = Odbc::initialize().or_failed_to("initialize ODBC");
    let mut db = odbc
        .connect_with_options(&args.source.connection_string(), options)
        .or_failed_to("connect to database");
    script::run_documents(&mut db.handle(), &mut input, &mut writer)?;

    Ok(())
}
