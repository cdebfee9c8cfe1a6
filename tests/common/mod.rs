#![allow(dead_code)]

use std::io::Write as _;
use std::sync::{Arc, Mutex};

use snowpipe_csv_load::{Error, Row, TableStore};
use tempfile::NamedTempFile;
use tracing_subscriber::{Registry, fmt, layer::SubscriberExt};

struct VecWriter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl std::io::Write for VecWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.lines.lock().unwrap();
        guard.push(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber that records every formatted log line.
pub fn with_captured_logs<F, T>(f: F) -> (Vec<String>, T)
where
    F: FnOnce() -> T,
{
    let lines = Arc::new(Mutex::new(Vec::new()));
    let writer_lines = lines.clone();
    let subscriber = Registry::default().with(
        fmt::Layer::default()
            .with_writer(move || VecWriter {
                lines: writer_lines.clone(),
            })
            .with_target(false)
            .with_level(true)
            .with_ansi(false),
    );
    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = lines.lock().unwrap().clone();
    (logs, result)
}

pub fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

pub fn numbered_csv(rows: usize) -> String {
    let mut data = String::from("id,name\n");
    for i in 1..=rows {
        data.push_str(&format!("{i},row{i}\n"));
    }
    data
}

/// Records the size of every insert; optionally fails the n-th call.
#[derive(Default)]
pub struct CountingStore {
    pub batch_sizes: Vec<usize>,
    pub columns: Vec<Vec<String>>,
    pub fail_on_call: Option<usize>,
}

impl CountingStore {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.batch_sizes.len()
    }
}

impl TableStore for CountingStore {
    fn insert(&mut self, _table: &str, columns: &[String], rows: &[Row]) -> Result<(), Error> {
        self.batch_sizes.push(rows.len());
        self.columns.push(columns.to_vec());
        if self.fail_on_call == Some(self.batch_sizes.len()) {
            return Err(Error::Status(
                reqwest::StatusCode::CONFLICT,
                "duplicate primary key".into(),
            ));
        }
        Ok(())
    }
}
