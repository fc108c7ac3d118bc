//! Types for error reporting.
//!
//! Every error the preprocessor raises is fatal; there is no recovery and no
//! accumulation. An [`Error`] cites the innermost open source file and the
//! line the offending construct began on.

use std::fmt;

use thiserror::Error;

/// Where in the input an error was raised: the innermost lexer frame's file
/// name and its current line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub filename: String,
    pub line: u64,
}

impl Site {
    pub fn new(filename: impl Into<String>, line: u64) -> Self {
        Self {
            filename: filename.into(),
            line,
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.line)
    }
}

/// Classification of fatal preprocessing errors.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("unterminated {0}")]
    Unterminated(&'static str),
    #[error("invalid escape sequence")]
    BadEscape,
    #[error("invalid integer constant")]
    BadNumber,
    #[error("invalid character constant")]
    BadCharConst,
    #[error("{0}")]
    DirectiveSyntax(String),
    #[error("{0}")]
    ArityMismatch(String),
    #[error("{0}")]
    ConditionalImbalance(String),
    #[error("{0}")]
    IncludeFailure(String),
    #[error("token concatenation must result in one token: `{0}`")]
    PasteFailure(String),
    #[error("{0}")]
    Expression(String),
    #[error("cannot read source file {path}: {message}")]
    CharSource { path: String, message: String },
    #[error("unrecognized character {0:?}")]
    UnrecognizedChar(char),
}

/// A fatal preprocessing error. The first one raised terminates the run.
#[derive(Debug, Error)]
#[error("{site}: {kind}")]
pub struct Error {
    pub site: Site,
    pub kind: ErrorKind,
}

impl Error {
    pub fn new(site: Site, kind: ErrorKind) -> Self {
        Self { site, kind }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_cites_file_and_line() {
        let error = Error::new(
            Site::new("stdio.h", 42),
            ErrorKind::Unterminated("string literal"),
        );
        assert_eq!(error.to_string(), "stdio.h:42: unterminated string literal");
    }

    #[test]
    fn include_failure_message() {
        let error = Error::new(
            Site::new("main.c", 3),
            ErrorKind::IncludeFailure("cannot locate header file: missing.h".into()),
        );
        assert_eq!(
            error.to_string(),
            "main.c:3: cannot locate header file: missing.h"
        );
    }
}
