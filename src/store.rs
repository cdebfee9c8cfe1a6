use tracing::debug;

use crate::errors::Error;
use crate::record::Row;

/// The one capability the loader needs from a target table store.
pub trait TableStore {
    /// Inserts `rows` into `table`. Each row is aligned to `columns`. The call
    /// is treated as atomic: either every row lands or the call fails.
    fn insert(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<(), Error>;

    /// Called once after the last successful batch.
    fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// One recorded `insert` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Keeps every insert in memory. Plain append semantics: nothing is
/// deduplicated, so loading the same file twice stores every row twice.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inserts: Vec<Insert>,
    finished: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inserts(&self) -> &[Insert] {
        &self.inserts
    }

    pub fn rows<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Row> + 'a {
        self.inserts
            .iter()
            .filter(move |i| i.table == table)
            .flat_map(|i| i.rows.iter())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).count()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl TableStore for MemoryStore {
    fn insert(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<(), Error> {
        debug!("memory insert: table='{}' rows={}", table, rows.len());
        self.inserts.push(Insert {
            table: table.to_string(),
            columns: columns.to_vec(),
            rows: rows.to_vec(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.finished = true;
        Ok(())
    }
}
