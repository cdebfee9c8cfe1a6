use std::fs::File;
use std::io::Read;

use tracing::{debug, error, info};

use crate::config::LoadSettings;
use crate::errors::{Error, SubmissionError};
use crate::record::{Header, Record, Row};
use crate::source::RowSource;
use crate::store::TableStore;
use crate::transform::{FieldParseWarning, TimestampNormalizer};

/// Parse warnings kept on the report; the rest are only logged and counted.
pub const MAX_WARNING_SAMPLES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Reading,
    Transforming,
    Submitting,
    /// Terminal. A new run has to start from the beginning of the file.
    Aborted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Successfully submitted batches.
    pub batches: usize,
    pub rows_inserted: usize,
    /// Timestamp fields that failed to parse and were inserted as NULL.
    pub parse_warning_count: usize,
    /// The first [`MAX_WARNING_SAMPLES`] of those warnings.
    pub warning_samples: Vec<FieldParseWarning>,
}

/// Drains a [`RowSource`] in fixed-size chunks and inserts each chunk with a
/// single store call. The first failed insert aborts the run.
pub struct BatchLoader<'a, S: ?Sized> {
    store: &'a mut S,
    table: String,
    batch_size: usize,
    normalizer: Option<TimestampNormalizer>,
    state: LoadState,
}

impl<'a, S: TableStore + ?Sized> BatchLoader<'a, S> {
    pub fn new(store: &'a mut S, table: impl Into<String>, batch_size: usize) -> Result<Self, Error> {
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        Ok(Self {
            store,
            table: table.into(),
            batch_size,
            normalizer: None,
            state: LoadState::Idle,
        })
    }

    pub fn with_normalizer(mut self, normalizer: Option<TimestampNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn run<R: Read>(&mut self, mut source: RowSource<R>) -> Result<LoadReport, Error> {
        if self.state == LoadState::Aborted {
            return Err(Error::Config(
                "loader was aborted; start a new run from the beginning of the file".into(),
            ));
        }
        let columns = source.header().columns().to_vec();
        let mut report = LoadReport::default();
        let mut pending: Vec<Record> = Vec::with_capacity(self.batch_size);

        loop {
            self.transition(LoadState::Reading);
            for item in source.by_ref().take(self.batch_size) {
                match item {
                    Ok(record) => pending.push(record),
                    Err(err) => {
                        self.transition(LoadState::Aborted);
                        error!(
                            "reading '{}' failed after {} inserted rows; {} rows read for the next batch were not submitted: {}",
                            self.table,
                            report.rows_inserted,
                            pending.len(),
                            err
                        );
                        return Err(err);
                    }
                }
            }
            if pending.is_empty() {
                break;
            }

            self.transition(LoadState::Transforming);
            if let Some(normalizer) = &self.normalizer {
                let samples = &mut report.warning_samples;
                for record in pending.iter_mut() {
                    report.parse_warning_count += normalizer.apply(record, |warning| {
                        if samples.len() < MAX_WARNING_SAMPLES {
                            samples.push(warning);
                        }
                    });
                }
            }
            let batch: Vec<Row> = pending.drain(..).map(Record::into_row).collect();

            self.transition(LoadState::Submitting);
            let batch_no = report.batches + 1;
            if let Err(err) = self.store.insert(&self.table, &columns, &batch) {
                self.transition(LoadState::Aborted);
                error!(
                    "insert of batch {} ({} rows) into '{}' failed: {}",
                    batch_no,
                    batch.len(),
                    self.table,
                    err
                );
                if let Some(first) = batch.first() {
                    error!("first row in failed batch: {:?}", first);
                }
                return Err(SubmissionError {
                    table: self.table.clone(),
                    batch: batch_no,
                    batch_size: batch.len(),
                    first_row: batch.into_iter().next(),
                    source: Box::new(err),
                }
                .into());
            }
            report.batches = batch_no;
            report.rows_inserted += batch.len();
            info!(
                "inserted batch of {} rows into '{}'; total inserted: {}",
                batch.len(),
                self.table,
                report.rows_inserted
            );
            self.transition(LoadState::Idle);
        }

        if let Err(err) = self.store.finish() {
            self.transition(LoadState::Aborted);
            error!("finishing load into '{}' failed: {}", self.table, err);
            return Err(err);
        }
        self.transition(LoadState::Idle);
        info!(
            "load complete: table='{}' batches={} rows={} null_timestamps={}",
            self.table,
            report.batches,
            report.rows_inserted,
            report.parse_warning_count
        );
        Ok(report)
    }

    fn transition(&mut self, next: LoadState) {
        if self.state != next {
            debug!("loader state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

/// A source and transform that passed every startup check.
///
/// Building one does no I/O against the target store, so a bad header or an
/// unknown timestamp column fails before a connection is ever made.
pub struct PreparedLoad<R = File> {
    source: RowSource<R>,
    normalizer: Option<TimestampNormalizer>,
    table: String,
    batch_size: usize,
}

impl PreparedLoad<File> {
    pub fn open(settings: &LoadSettings) -> Result<Self, Error> {
        settings.validate()?;
        let source = RowSource::open(&settings.file, settings.delimiter)?;
        Self::from_source(source, settings)
    }
}

impl<R: Read> PreparedLoad<R> {
    pub fn from_source(source: RowSource<R>, settings: &LoadSettings) -> Result<Self, Error> {
        settings.validate()?;
        let normalizer = if settings.timestamp_columns.is_empty() {
            None
        } else {
            let normalizer = TimestampNormalizer::new(
                source.header(),
                &settings.timestamp_columns,
                &settings.timestamp_format,
            )?;
            info!(
                "timestamp columns {:?} expected as '{}'",
                settings.timestamp_columns, settings.timestamp_format
            );
            Some(normalizer)
        };
        Ok(Self {
            source,
            normalizer,
            table: settings.table.clone(),
            batch_size: settings.batch_size,
        })
    }

    pub fn header(&self) -> &Header {
        self.source.header()
    }

    pub fn run<S: TableStore + ?Sized>(self, store: &mut S) -> Result<LoadReport, Error> {
        BatchLoader::new(store, self.table, self.batch_size)?
            .with_normalizer(self.normalizer)
            .run(self.source)
    }
}

/// Runs a whole load: `connect` is only called once the settings, header and
/// timestamp columns have passed every startup check.
pub fn load_with<S, F>(settings: &LoadSettings, connect: F) -> Result<LoadReport, Error>
where
    S: TableStore,
    F: FnOnce() -> Result<S, Error>,
{
    let prepared = PreparedLoad::open(settings)?;
    let mut store = connect()?;
    prepared.run(&mut store)
}
