use std::fmt;

use reqwest::StatusCode;

use crate::record::Row;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    Status(StatusCode, String),
    Config(String),
    Configuration(ConfigurationError),
    RowShape {
        line: u64,
        expected: usize,
        found: usize,
    },
    Submission(SubmissionError),
    DataTooLarge(usize, usize),
    Timeout(std::time::Duration),
    /// Rows the server accepted on append but later failed to ingest.
    RowsRejected {
        channel: String,
        rows: u64,
        message: Option<String>,
    },
    Key(String),
    JwtSign(String),
}

/// Problems with the input file or job settings detected before any row is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    MissingHeader,
    DuplicateColumn(String),
    UnknownTimestampColumn(String),
}

/// A batch write rejected by the target store. Terminal for the run.
#[derive(Debug)]
pub struct SubmissionError {
    pub table: String,
    pub batch: usize,
    pub batch_size: usize,
    pub first_row: Option<Row>,
    pub source: Box<Error>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Csv(e) => write!(f, "csv error: {e}"),
            Error::Json(e) => write!(f, "json error: {e}"),
            Error::Http(e) => write!(f, "http error: {e}"),
            Error::Status(status, body) => write!(f, "unexpected status {status}: {body}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Configuration(e) => write!(f, "configuration error: {e}"),
            Error::RowShape {
                line,
                expected,
                found,
            } => write!(
                f,
                "line {line}: expected {expected} fields to match the header, found {found}"
            ),
            Error::Submission(e) => write!(f, "{e}"),
            Error::DataTooLarge(size, max) => {
                write!(f, "request of {size} bytes exceeds the {max} byte limit")
            }
            Error::Timeout(d) => write!(f, "timed out after {d:?}"),
            Error::RowsRejected {
                channel,
                rows,
                message,
            } => write!(
                f,
                "channel '{channel}' rejected {rows} rows after append: {}",
                message.as_deref().unwrap_or("no error message")
            ),
            Error::Key(msg) => write!(f, "key error: {msg}"),
            Error::JwtSign(msg) => write!(f, "jwt error: {msg}"),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::MissingHeader => write!(f, "input has no header or is empty"),
            ConfigurationError::DuplicateColumn(name) => {
                write!(f, "column '{name}' appears more than once in the header")
            }
            ConfigurationError::UnknownTimestampColumn(name) => write!(
                f,
                "timestamp column '{name}' was not found in the header"
            ),
        }
    }
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "insert of batch {} ({} rows) into '{}' failed: {}",
            self.batch, self.batch_size, self.table, self.source
        )
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Csv(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::Submission(e) => Some(e.source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Csv(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<ConfigurationError> for Error {
    fn from(err: ConfigurationError) -> Self {
        Error::Configuration(err)
    }
}

impl From<SubmissionError> for Error {
    fn from(err: SubmissionError) -> Self {
        Error::Submission(err)
    }
}
