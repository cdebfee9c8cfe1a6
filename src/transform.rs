use std::fmt;

use jiff::civil::DateTime;
use tracing::warn;

use crate::errors::ConfigurationError;
use crate::record::{Header, Record};

/// Output layout for normalized timestamps. The input's wall-clock value is
/// labelled UTC as is; no zone conversion happens.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A timestamp field that did not match the expected format and was nulled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldParseWarning {
    pub line: u64,
    pub column: String,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for FieldParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: could not parse '{}' in column '{}' ({}); inserting NULL",
            self.line, self.value, self.column, self.reason
        )
    }
}

/// Rewrites designated columns from a fixed input format to [`CANONICAL_FORMAT`].
#[derive(Debug, Clone)]
pub struct TimestampNormalizer {
    columns: Vec<(usize, String)>,
    format: String,
}

impl TimestampNormalizer {
    /// Resolves `columns` against the header once; any unknown name fails here,
    /// before a single data row has been read.
    pub fn new(
        header: &Header,
        columns: &[String],
        format: &str,
    ) -> Result<Self, ConfigurationError> {
        let columns = columns
            .iter()
            .map(|name| {
                header
                    .position(name)
                    .map(|idx| (idx, name.clone()))
                    .ok_or_else(|| ConfigurationError::UnknownTimestampColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            columns,
            format: format.to_string(),
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(_, name)| name.as_str())
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Normalizes the designated fields of `record` in place. Empty or
    /// unparseable values become null; unparseable ones are logged and handed
    /// to `on_warning`. Returns the number of warnings raised.
    pub fn apply<F>(&self, record: &mut Record, mut on_warning: F) -> usize
    where
        F: FnMut(FieldParseWarning),
    {
        let line = record.line();
        let mut added = 0;
        for (idx, name) in &self.columns {
            let Some(field) = record.value_mut(*idx) else {
                continue;
            };
            let normalized = match field.as_deref() {
                None | Some("") => None,
                Some(raw) => match normalize_timestamp(raw, &self.format) {
                    Ok(ts) => Some(ts),
                    Err(err) => {
                        let warning = FieldParseWarning {
                            line,
                            column: name.clone(),
                            value: raw.to_string(),
                            reason: err.to_string(),
                        };
                        warn!("{warning}");
                        on_warning(warning);
                        added += 1;
                        None
                    }
                },
            };
            *field = normalized;
        }
        added
    }
}

/// Parses `value` with the strptime-style `format` and renders it canonically.
pub fn normalize_timestamp(value: &str, format: &str) -> Result<String, jiff::Error> {
    let dt = DateTime::strptime(format, value)?;
    Ok(dt.strftime(CANONICAL_FORMAT).to_string())
}
