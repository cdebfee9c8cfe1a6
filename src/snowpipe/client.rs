use reqwest::{Client, Response};
use tracing::{error, info};

use crate::{Config, Error};

use super::channel::StreamingIngestChannel;
use super::crypto;
use super::types::OpenChannelResponse;

pub(super) const USER_AGENT: &str = concat!("snowpipe-csv-load/", env!("CARGO_PKG_VERSION"));

/// Authenticated handle on one Snowflake database/schema.
#[derive(Clone)]
pub struct StreamingIngestClient {
    http: Client,
    pub db_name: String,
    pub schema_name: String,
    pub account: String,
    control_host: String,
    jwt_token: String,
    auth_token_type: String,
    pub ingest_host: Option<String>,
    pub scoped_token: Option<String>,
}

impl StreamingIngestClient {
    /// Create a new client: discovers the ingest host and exchanges the
    /// control-plane JWT for a scoped token.
    /// # Arguments
    /// * `db_name` - The name of the database
    /// * `schema_name` - The name of the schema
    /// * `config` - Account identity, typically from `Config::from_file` or `Config::from_env`
    pub async fn new(db_name: &str, schema_name: &str, config: Config) -> Result<Self, Error> {
        let control_host = if config.url.starts_with("http") {
            config.url.clone()
        } else {
            format!("https://{}", config.url)
        };
        reqwest::Url::parse(&control_host).map_err(|e| {
            Error::Config(format!(
                "Invalid control host URL '{}': {}",
                control_host, e
            ))
        })?;
        let jwt_token = match config.jwt_token.as_ref() {
            Some(token) if !token.is_empty() => token.clone(),
            _ => crypto::generate_assertion(&config)?,
        };
        let mut client = StreamingIngestClient {
            http: Client::new(),
            db_name: db_name.to_string(),
            schema_name: schema_name.to_string(),
            account: config.account.clone(),
            control_host: control_host.trim_end_matches('/').to_string(),
            jwt_token,
            auth_token_type: String::from("KEYPAIR_JWT"),
            ingest_host: None,
            scoped_token: None,
        };
        client.discover_ingest_host().await?;
        client.get_scoped_token().await?;
        Ok(client)
    }

    async fn discover_ingest_host(&mut self) -> Result<(), Error> {
        let url = format!("{}/v2/streaming/hostname", self.control_host);
        let resp = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.jwt_token))
            .header(
                "X-Snowflake-Authorization-Token-Type",
                self.auth_token_type.as_str(),
            )
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_success() {
            info!("discover ingest host ok: host='{}'", body);
            self.ingest_host = Some(body.trim().to_string());
            Ok(())
        } else {
            error!(
                "discover ingest host failed: status={} body='{}'",
                status, body
            );
            Err(Error::Status(status, body))
        }
    }

    async fn get_scoped_token(&mut self) -> Result<(), Error> {
        let url = format!("{}/oauth/token", self.control_host);
        let scope = self
            .ingest_host
            .as_deref()
            .ok_or_else(|| Error::Config("ingest host not discovered".into()))?;
        let resp = self
            .http
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Authorization", format!("Bearer {}", self.jwt_token))
            .header("User-Agent", USER_AGENT)
            .body(format!(
                "grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer&scope={}",
                urlencoding::encode(scope)
            ))
            .send()
            .await?;
        let tok = check_status(resp).await?.text().await?;
        info!("scoped token acquired (len={})", tok.len());
        self.scoped_token = Some(tok);
        Ok(())
    }

    pub async fn open_channel(
        &self,
        pipe_name: &str,
        channel_name: &str,
    ) -> Result<StreamingIngestChannel, Error> {
        let url = format!(
            "{}/channels/{}",
            self.pipe_url(pipe_name)?,
            urlencoding::encode(channel_name)
        );
        let resp = self
            .http
            .put(&url)
            .header("Authorization", format!("Bearer {}", self.scoped_token()?))
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .body("{}")
            .send()
            .await?;
        let resp: OpenChannelResponse = check_status(resp).await?.json().await?;

        info!(
            "channel opened: name='{}' db='{}' schema='{}' pipe='{}'",
            channel_name, self.db_name, self.schema_name, pipe_name
        );

        StreamingIngestChannel::from_response(self.clone(), pipe_name, channel_name, resp)
    }

    pub(super) fn http(&self) -> &Client {
        &self.http
    }

    pub(super) fn scoped_token(&self) -> Result<&str, Error> {
        self.scoped_token
            .as_deref()
            .ok_or_else(|| Error::Config("scoped token not acquired".into()))
    }

    /// Base URL of the ingest plane, with a scheme and no trailing slash.
    pub(super) fn ingest_base(&self) -> Result<String, Error> {
        let ingest = self
            .ingest_host
            .as_deref()
            .ok_or_else(|| Error::Config("ingest host not discovered".into()))?;
        Ok(if ingest.contains("://") {
            ingest.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", ingest.trim_end_matches('/'))
        })
    }

    /// `{base}/v2/streaming/databases/{db}/schemas/{schema}/pipes/{pipe}`
    pub(super) fn pipe_url(&self, pipe_name: &str) -> Result<String, Error> {
        Ok(format!(
            "{}/v2/streaming/databases/{}/schemas/{}/pipes/{}",
            self.ingest_base()?,
            urlencoding::encode(&self.db_name),
            urlencoding::encode(&self.schema_name),
            urlencoding::encode(pipe_name)
        ))
    }
}

/// Maps a non-2xx response to `Error::Status`, keeping the body for diagnostics.
pub(super) async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Status(status, body))
}
