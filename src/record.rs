use std::sync::Arc;

use crate::errors::{ConfigurationError, Error};

/// Field values of one record, aligned to the header's column order.
/// `None` is an explicit null, distinct from an empty string.
pub type Row = Vec<Option<String>>;

/// Ordered column set shared by every record of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    pub fn new(columns: Vec<String>) -> Result<Self, ConfigurationError> {
        if columns.is_empty() {
            return Err(ConfigurationError::MissingHeader);
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(ConfigurationError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    header: Arc<Header>,
    line: u64,
    values: Row,
}

impl Record {
    /// Builds a record, rejecting rows whose field count differs from the header.
    pub fn new(header: Arc<Header>, line: u64, values: Row) -> Result<Self, Error> {
        if values.len() != header.len() {
            return Err(Error::RowShape {
                line,
                expected: header.len(),
                found: values.len(),
            });
        }
        Ok(Self {
            header,
            line,
            values,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// 1-based line in the source file where this record starts.
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.header
            .position(column)
            .and_then(|idx| self.value(idx))
    }

    pub fn value(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    pub(crate) fn value_mut(&mut self, idx: usize) -> Option<&mut Option<String>> {
        self.values.get_mut(idx)
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    pub fn into_row(self) -> Row {
        self.values
    }
}
