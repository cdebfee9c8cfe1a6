use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};
use tracing::info;

use crate::config::Delimiter;
use crate::errors::Error;
use crate::record::{Header, Record};

/// Lazy, single-pass reader of header-delimited records.
///
/// The underlying reader (the open file for [`RowSource::open`]) is owned by
/// the source and released when it is dropped, whether iteration finished or
/// the run aborted part way through.
pub struct RowSource<R = File> {
    reader: csv::Reader<R>,
    header: Arc<Header>,
    record: StringRecord,
}

impl RowSource<File> {
    pub fn open(path: impl AsRef<Path>, delimiter: Delimiter) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path)?;
        info!("reading {}", path.display());
        Self::from_reader(file, delimiter)
    }
}

impl<R: Read> RowSource<R> {
    pub fn from_reader(reader: R, delimiter: Delimiter) -> Result<Self, Error> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter.as_byte())
            .has_headers(true)
            // field counts are checked against the header in Record::new
            .flexible(true)
            .from_reader(reader);

        let columns = reader
            .headers()?
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>();
        let header = Header::new(columns)?;
        info!("columns detected: {:?}", header.columns());

        Ok(Self {
            reader,
            header: Arc::new(header),
            record: StringRecord::new(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl<R: Read> Iterator for RowSource<R> {
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.record) {
            Ok(true) => {
                let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                let values = self.record.iter().map(|f| Some(f.to_string())).collect();
                Some(Record::new(Arc::clone(&self.header), line, values))
            }
            Ok(false) => None,
            Err(err) => Some(Err(err.into())),
        }
    }
}
