//! Filters applied to string column values before JSON output.
use std::error::Error;
use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum TextError {
    TrailingBackslash(String),
    InvalidHexEscape(String),
    EmptyReplacement,
}

impl fmt::Display for TextError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TextError::TrailingBackslash(text) => write!(f, "trailing \\ in '{}'", text),
            TextError::InvalidHexEscape(text) => write!(f, "invalid \\x escape in '{}'", text),
            TextError::EmptyReplacement => write!(f, "replacement must start with character to replace"),
        }
    }
}

impl Error for TextError {}

/// Resolve backslash escapes of command line argument.
///
/// `\xNN` is the character U+00NN (Latin-1), not a raw byte; `\xe9` gives `é`, never a UTF-8 fragment.
/// Unknown escapes are kept as they are.
pub fn unescape(text: &str) -> Result<String, TextError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            None => return Err(TextError::TrailingBackslash(text.to_owned())),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('0') => out.push('\0'),
            Some('x') => {
                let code = chars
                    .next()
                    .and_then(|h| h.to_digit(16))
                    .and_then(|h| chars.next().and_then(|l| l.to_digit(16)).map(|l| h * 16 + l))
                    .and_then(std::char::from_u32)
                    .ok_or_else(|| TextError::InvalidHexEscape(text.to_owned()))?;
                out.push(code);
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trim {
    Both,
    Right,
}

/// Replaces every occurrence of a character with a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub from: char,
    pub to: String,
}

impl Replacement {
    /// First character of `argument` is replaced with the rest of it.
    pub fn parse(argument: &str) -> Result<Replacement, TextError> {
        let mut chars = argument.chars();
        let from = chars.next().ok_or(TextError::EmptyReplacement)?;
        Ok(Replacement {
            from,
            to: chars.as_str().to_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFilter {
    pub replacements: Vec<Replacement>,
    pub trim: Option<Trim>,
    pub chop: Vec<char>,
}

impl Default for TextFilter {
    fn default() -> TextFilter {
        TextFilter {
            replacements: Vec::new(),
            trim: None,
            chop: vec![' '],
        }
    }
}

impl TextFilter {
    pub fn is_noop(&self) -> bool {
        self.replacements.is_empty() && self.trim.is_none()
    }

    /// Replacements run first, in order given, then trimming.
    pub fn apply(&self, mut text: String) -> String {
        for replacement in &self.replacements {
            if text.contains(replacement.from) {
                text = text.replace(replacement.from, &replacement.to);
            }
        }

        let chop = self.chop.as_slice();
        match self.trim {
            None => text,
            Some(Trim::Both) => text.trim_matches(chop).to_owned(),
            Some(Trim::Right) => {
                let len = text.trim_end_matches(chop).len();
                text.truncate(len);
                text
            }
        }
    }
}
