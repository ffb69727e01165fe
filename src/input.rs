//! Query script read from standard input.
//!
//! A script is a sequence of query lines. For parameterized scripts each query line is followed by
//! CSV records (header first) terminated by a blank line or end of input.
use log::trace;
use std::error::Error;
use std::fmt;
use std::io;
use std::io::BufRead;

#[derive(Debug)]
pub enum InputError {
    IoError(io::Error),
    CsvError(csv::Error),
    UnterminatedQuote { line: usize },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InputError::IoError(_) => write!(f, "failed to read input"),
            InputError::CsvError(_) => write!(f, "failed to parse input record"),
            InputError::UnterminatedQuote { line } => {
                write!(f, "input ended inside quoted field started at line {}", line)
            }
        }
    }
}

impl Error for InputError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InputError::IoError(err) => Some(err),
            InputError::CsvError(err) => Some(err),
            InputError::UnterminatedQuote { .. } => None,
        }
    }
}

impl From<io::Error> for InputError {
    fn from(err: io::Error) -> InputError {
        InputError::IoError(err)
    }
}

impl From<csv::Error> for InputError {
    fn from(err: csv::Error) -> InputError {
        InputError::CsvError(err)
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// `true` if record text ends inside a quoted field.
///
/// A quote opens quoted field only at the start of a field; elsewhere it is literal.
fn in_quoted_field(text: &str, delimiter: u8) -> bool {
    let delimiter = char::from(delimiter);
    let mut quoted = false;
    let mut field_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                } else {
                    quoted = false;
                }
            }
        } else if c == delimiter {
            field_start = true;
            continue;
        } else if c == '"' && field_start {
            quoted = true;
        }
        field_start = false;
    }

    quoted
}

fn strip_line_terminator(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

pub struct InputReader<R: BufRead> {
    reader: R,
    delimiter: u8,
    line: usize,
}

impl<R: BufRead> fmt::Debug for InputReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InputReader")
            .field("delimiter", &(self.delimiter as char))
            .field("line", &self.line)
            .finish()
    }
}

impl<R: BufRead> InputReader<R> {
    pub fn new(reader: R) -> InputReader<R> {
        InputReader::with_delimiter(reader, b',')
    }

    pub fn with_delimiter(reader: R, delimiter: u8) -> InputReader<R> {
        InputReader {
            reader,
            delimiter,
            line: 0,
        }
    }

    /// Number of lines read so far.
    pub fn line(&self) -> usize {
        self.line
    }

    fn read_line(&mut self) -> Result<Option<String>, InputError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(line))
    }

    /// Next non-blank line without its terminator.
    pub fn next_query(&mut self) -> Result<Option<String>, InputError> {
        while let Some(line) = self.read_line()? {
            if !is_blank(&line) {
                return Ok(Some(strip_line_terminator(line)));
            }
        }
        Ok(None)
    }

    /// Next CSV record of current block; `None` on blank line or end of input.
    pub fn next_record(&mut self) -> Result<Option<Vec<String>>, InputError> {
        let mut text = match self.read_line()? {
            Some(line) if !is_blank(&line) => line,
            _ => return Ok(None),
        };

        // quoted fields may contain line breaks
        let start = self.line;
        while in_quoted_field(&text, self.delimiter) {
            match self.read_line()? {
                Some(line) => text.push_str(&line),
                None => return Err(InputError::UnterminatedQuote { line: start }),
            }
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(text.as_bytes());

        let mut record = csv::StringRecord::new();
        reader.read_record(&mut record)?;
        let record = record.iter().map(ToOwned::to_owned).collect::<Vec<_>>();
        trace!("Input record at line {}: {:?}", start, record);

        Ok(Some(record))
    }
}
