//! Snowflake as a target table store, via the Snowpipe Streaming REST API.

mod channel;
mod client;
mod crypto;
mod types;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::info;

pub use channel::{DEFAULT_CLOSE_TIMEOUT, MAX_REQUEST_SIZE, StreamingIngestChannel, encode_rows};
pub use client::StreamingIngestClient;

use crate::config::{Config, ConfigLocation, LoadSettings, read_config};
use crate::errors::Error;
use crate::record::Row;
use crate::store::TableStore;

/// Blocking [`TableStore`] over the async streaming client.
///
/// Owns a current-thread runtime and drives every request to completion
/// before returning, so the loader stays strictly sequential. One channel is
/// opened per table on first insert and closed in [`TableStore::finish`].
pub struct SnowpipeStore {
    runtime: Runtime,
    client: StreamingIngestClient,
    pipe: Option<String>,
    channel_name: String,
    channels: HashMap<String, StreamingIngestChannel>,
    close_timeout: Duration,
}

impl SnowpipeStore {
    /// Reads the connection config from `location` and authenticates.
    pub fn connect(location: ConfigLocation, settings: &LoadSettings) -> Result<Self, Error> {
        let runtime = build_runtime()?;
        let config = runtime.block_on(read_config(location))?;
        Self::with_runtime(runtime, config, settings)
    }

    pub fn with_config(config: Config, settings: &LoadSettings) -> Result<Self, Error> {
        Self::with_runtime(build_runtime()?, config, settings)
    }

    fn with_runtime(
        runtime: Runtime,
        config: Config,
        settings: &LoadSettings,
    ) -> Result<Self, Error> {
        if settings.database.is_empty() {
            return Err(Error::Config("target database is not set".into()));
        }
        let client = runtime.block_on(StreamingIngestClient::new(
            &settings.database,
            &settings.schema,
            config,
        ))?;
        Ok(Self {
            runtime,
            client,
            pipe: settings.pipe.clone().filter(|p| !p.is_empty()),
            channel_name: settings.channel_name(),
            channels: HashMap::new(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        })
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn client(&self) -> &StreamingIngestClient {
        &self.client
    }
}

fn build_runtime() -> Result<Runtime, Error> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn pipe_for(pipe: Option<&str>, table: &str) -> String {
    match pipe {
        Some(p) => p.to_string(),
        None => format!("{}-STREAMING", table.to_uppercase()),
    }
}

impl TableStore for SnowpipeStore {
    fn insert(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<(), Error> {
        let channel = match self.channels.entry(table.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let pipe = pipe_for(self.pipe.as_deref(), table);
                let opened = self
                    .runtime
                    .block_on(self.client.open_channel(&pipe, &self.channel_name))?;
                e.insert(opened)
            }
        };
        self.runtime.block_on(channel.append_rows(columns, rows))
    }

    fn finish(&mut self) -> Result<(), Error> {
        for (table, channel) in self.channels.iter_mut() {
            info!(
                "waiting for '{}' to commit offset {}",
                table,
                channel.last_pushed_offset()
            );
            self.runtime
                .block_on(channel.close_with_timeout(self.close_timeout))?;
        }
        self.channels.clear();
        Ok(())
    }
}
