use std::collections::HashMap;

use serde::Deserialize;

#[derive(Deserialize)]
pub struct OpenChannelResponse {
    pub next_continuation_token: String,
    #[serde(default)]
    pub channel_status: ChannelStatus,
}

#[derive(Deserialize)]
pub struct AppendRowsResponse {
    pub next_continuation_token: String,
}

#[derive(Deserialize, Default)]
pub struct BulkChannelStatusResponse {
    #[serde(default)]
    pub channel_statuses: HashMap<String, ChannelStatus>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ChannelStatus {
    pub channel_status_code: String,
    pub last_committed_offset_token: Option<String>,
    pub rows_inserted: Option<i64>,
    pub rows_parsed: Option<i64>,
    pub rows_error_count: Option<i64>,
    pub last_error_message: Option<String>,
}
