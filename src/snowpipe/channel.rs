use std::time::Duration;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use tracing::{error, info, warn};

use crate::Error;
use crate::record::Row;

use super::client::{StreamingIngestClient, USER_AGENT, check_status};
use super::types::{AppendRowsResponse, BulkChannelStatusResponse, OpenChannelResponse};

pub const MAX_REQUEST_SIZE: usize = 16 * 1024 * 1024; // 16MB

pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// An open append stream into one pipe. Each `append_rows` call is one request
/// and advances the offset token by one.
pub struct StreamingIngestChannel {
    client: StreamingIngestClient,
    pipe_name: String,
    channel_name: String,
    continuation_token: String,
    last_committed_offset_token: u64,
    last_pushed_offset_token: u64,
    // the server's error count is cumulative over the channel's lifetime
    rows_error_baseline: u64,
    rows_error_count: u64,
    last_error_message: Option<String>,
}

impl StreamingIngestChannel {
    pub(super) fn from_response(
        client: StreamingIngestClient,
        pipe_name: &str,
        channel_name: &str,
        resp: OpenChannelResponse,
    ) -> Result<Self, Error> {
        let token = parse_offset(resp.channel_status.last_committed_offset_token.as_deref())?;
        let errors = error_count(resp.channel_status.rows_error_count);
        Ok(StreamingIngestChannel {
            client,
            pipe_name: pipe_name.to_string(),
            channel_name: channel_name.to_string(),
            continuation_token: resp.next_continuation_token,
            last_committed_offset_token: token,
            last_pushed_offset_token: token,
            rows_error_baseline: errors,
            rows_error_count: errors,
            last_error_message: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.channel_name
    }

    pub fn last_pushed_offset(&self) -> u64 {
        self.last_pushed_offset_token
    }

    pub fn last_committed_offset(&self) -> u64 {
        self.last_committed_offset_token
    }

    /// Rows rejected by the server since this channel was opened, as of the
    /// last status refresh.
    pub fn rejected_rows(&self) -> u64 {
        self.rows_error_count.saturating_sub(self.rows_error_baseline)
    }

    /// Sends `rows` as a single newline-delimited JSON request. Bodies above
    /// [`MAX_REQUEST_SIZE`] are refused rather than split, so one call stays
    /// one append.
    pub async fn append_rows(&mut self, columns: &[String], rows: &[Row]) -> Result<(), Error> {
        let data = encode_rows(columns, rows)?;
        if data.len() > MAX_REQUEST_SIZE {
            error!(
                "Data size {} exceeds maximum request size {}",
                data.len(),
                MAX_REQUEST_SIZE
            );
            return Err(Error::DataTooLarge(data.len(), MAX_REQUEST_SIZE));
        }

        info!(
            "append rows: channel='{}' rows={} bytes={}",
            self.channel_name,
            rows.len(),
            data.len()
        );
        let offset = self.last_pushed_offset_token + 1;
        let url = format!(
            "{}/v2/streaming/data/databases/{}/schemas/{}/pipes/{}/channels/{}/rows",
            self.client.ingest_base()?,
            urlencoding::encode(&self.client.db_name),
            urlencoding::encode(&self.client.schema_name),
            urlencoding::encode(&self.pipe_name),
            urlencoding::encode(&self.channel_name),
        );
        let resp = self
            .client
            .http()
            .post(&url)
            .query(&[
                ("continuationToken", self.continuation_token.as_str()),
                ("offsetToken", offset.to_string().as_str()),
            ])
            .header(
                "Authorization",
                format!("Bearer {}", self.client.scoped_token()?),
            )
            .header("Content-Type", "application/x-ndjson")
            .header("User-Agent", USER_AGENT)
            .body(data)
            .send()
            .await?;
        let resp: AppendRowsResponse = check_status(resp).await?.json().await?;

        self.last_pushed_offset_token = offset;
        self.continuation_token = resp.next_continuation_token;
        info!(
            "append rows ok: channel='{}' pushed_offset={}",
            self.channel_name, self.last_pushed_offset_token
        );
        Ok(())
    }

    /// Refreshes and returns the committed offset token from the server.
    pub async fn refresh_committed_offset(&mut self) -> Result<u64, Error> {
        let url = format!(
            "{}:bulk-channel-status",
            self.client.pipe_url(&self.pipe_name)?
        );
        let resp = self
            .client
            .http()
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.client.scoped_token()?),
            )
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .json(&serde_json::json!({ "channel_names": [self.channel_name] }))
            .send()
            .await?;
        let resp: BulkChannelStatusResponse = check_status(resp).await?.json().await?;

        let Some(status) = resp.channel_statuses.get(&self.channel_name) else {
            return Err(Error::Config(format!(
                "channel '{}' missing from status response",
                self.channel_name
            )));
        };
        self.last_committed_offset_token =
            parse_offset(status.last_committed_offset_token.as_deref())?;
        self.rows_error_count = error_count(status.rows_error_count);
        if status.last_error_message.is_some() {
            self.last_error_message = status.last_error_message.clone();
        }
        info!(
            "channel status: name='{}' committed={} pushed={} rejected={}",
            self.channel_name,
            self.last_committed_offset_token,
            self.last_pushed_offset_token,
            self.rejected_rows()
        );
        Ok(self.last_committed_offset_token)
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        self.close_with_timeout(DEFAULT_CLOSE_TIMEOUT).await
    }

    /// Waits until everything pushed has been committed, then drops the channel.
    /// Fails with [`Error::RowsRejected`] if the server rejected any row that
    /// was appended through this channel.
    pub async fn close_with_timeout(&mut self, timeout: Duration) -> Result<(), Error> {
        let start = tokio::time::Instant::now();
        let mut last_warn_minute = 0u64;
        while self.last_committed_offset_token < self.last_pushed_offset_token {
            self.refresh_committed_offset().await?;
            if self.last_committed_offset_token >= self.last_pushed_offset_token {
                break;
            }

            let elapsed = start.elapsed();
            let elapsed_mins = elapsed.as_secs() / 60;
            if elapsed_mins >= 1 && elapsed_mins > last_warn_minute {
                last_warn_minute = elapsed_mins;
                warn!(
                    "Channel '{}' close is still waiting after {} minute(s); committed={} pushed={}",
                    self.channel_name,
                    elapsed_mins,
                    self.last_committed_offset_token,
                    self.last_pushed_offset_token
                );
            }
            if elapsed >= timeout {
                error!(
                    "Channel '{}' close timed out after {:?}; committed={} pushed={}",
                    self.channel_name,
                    timeout,
                    self.last_committed_offset_token,
                    self.last_pushed_offset_token
                );
                return Err(Error::Timeout(timeout));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let url = format!(
            "{}/channels/{}",
            self.client.pipe_url(&self.pipe_name)?,
            urlencoding::encode(&self.channel_name)
        );
        let resp = self
            .client
            .http()
            .delete(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.client.scoped_token()?),
            )
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        check_status(resp).await?;
        info!("channel closed: name='{}'", self.channel_name);

        let rejected = self.rejected_rows();
        if rejected > 0 {
            error!(
                "channel '{}' rejected {} rows after append; last error: {}",
                self.channel_name,
                rejected,
                self.last_error_message.as_deref().unwrap_or("<none>")
            );
            return Err(Error::RowsRejected {
                channel: self.channel_name.clone(),
                rows: rejected,
                message: self.last_error_message.clone(),
            });
        }
        Ok(())
    }
}

fn parse_offset(token: Option<&str>) -> Result<u64, Error> {
    match token {
        None | Some("") => Ok(0),
        Some(t) => t
            .parse()
            .map_err(|_| Error::Config(format!("invalid offset token '{}'", t))),
    }
}

fn error_count(count: Option<i64>) -> u64 {
    count.unwrap_or(0).max(0) as u64
}

/// One row rendered as a JSON object keyed by column name, in column order.
struct RowObject<'a> {
    columns: &'a [String],
    values: &'a [Option<String>],
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Newline-delimited JSON body for an append request.
pub fn encode_rows(columns: &[String], rows: &[Row]) -> Result<String, Error> {
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&serde_json::to_string(&RowObject {
            columns,
            values: row,
        })?);
    }
    Ok(out)
}
