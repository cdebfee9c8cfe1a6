//! Connection and job configuration.
//!
//! Connection identity (`Config`) can come from a JSON file, `SNOWFLAKE_*`
//! environment variables or an AWS Secrets Manager secret. Job settings
//! (`LoadSettings`) come from a JSON file and/or command-line overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use aws_config::BehaviorVersion;
use serde::Deserialize;

use crate::errors::Error;

pub const DEFAULT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";
pub const DEFAULT_SCHEMA: &str = "PUBLIC";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    File(String),
    Env,
    Secret,
}

impl FromStr for ConfigLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(Error::Config("empty connection location".into())),
            "env" | "ENV" => Ok(ConfigLocation::Env),
            "secret" | "SECRET" => Ok(ConfigLocation::Secret),
            path => Ok(ConfigLocation::File(path.to_string())),
        }
    }
}

/// Snowflake account identity used to authenticate against the control plane.
#[derive(Clone, Deserialize)]
pub struct Config {
    pub user: String,
    #[serde(default)]
    pub login: Option<String>,
    pub account: String,
    pub url: String,
    #[serde(default)]
    pub jwt_token: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<String>,
    #[serde(default)]
    pub public_key_fp: Option<String>,
    #[serde(default)]
    pub jwt_exp_secs: Option<u64>,
}

impl Config {
    #[allow(clippy::too_many_arguments)]
    pub fn from_values(
        user: &str,
        login: Option<String>,
        account: &str,
        url: &str,
        jwt_token: Option<String>,
        private_key: Option<String>,
        private_key_path: Option<String>,
        private_key_passphrase: Option<String>,
        public_key_fp: Option<String>,
        jwt_exp_secs: Option<u64>,
    ) -> Self {
        Self {
            user: user.to_string(),
            login,
            account: account.to_string(),
            url: url.to_string(),
            jwt_token,
            private_key,
            private_key_path,
            private_key_passphrase,
            public_key_fp,
            jwt_exp_secs,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn from_env() -> Result<Self, Error> {
        Ok(Config {
            user: required_env("SNOWFLAKE_USERNAME")?,
            login: std::env::var("SNOWFLAKE_LOGIN").ok(),
            account: required_env("SNOWFLAKE_ACCOUNT")?,
            url: required_env("SNOWFLAKE_URL")?,
            jwt_token: std::env::var("SNOWFLAKE_JWT_TOKEN").ok(),
            private_key: None,
            private_key_path: std::env::var("SNOWFLAKE_PRIVATE_KEY_PATH").ok(),
            private_key_passphrase: std::env::var("SNOWFLAKE_PRIVATE_KEY_PASSPHRASE").ok(),
            public_key_fp: None,
            jwt_exp_secs: None,
        })
    }

    /// PEM contents of the signing key, inline or read from `private_key_path`.
    pub fn private_key(&self) -> Result<String, Error> {
        if let Some(key) = self.private_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        match self.private_key_path.as_ref() {
            Some(path) => Ok(std::fs::read_to_string(path)?),
            None => Err(Error::Config(
                "Either jwt_token, private_key or private_key_path must be set".into(),
            )),
        }
    }
}

fn required_env(name: &str) -> Result<String, Error> {
    std::env::var(name).map_err(|_| Error::Config(format!("Missing {name} env var")))
}

pub(crate) async fn read_config(loc: ConfigLocation) -> Result<Config, Error> {
    let config = match loc {
        ConfigLocation::File(path) => Config::from_file(path)?,
        ConfigLocation::Env => Config::from_env()?,
        ConfigLocation::Secret => read_config_from_secret().await?,
    };
    Ok(config)
}

async fn read_config_from_secret() -> Result<Config, Error> {
    let secret_arn = required_env("PROFILE_CONFIG_SECRET_ARN")?;
    let client = aws_sdk_secretsmanager::Client::new(
        &aws_config::load_defaults(BehaviorVersion::latest()).await,
    );
    let resp = client
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .map_err(|e| Error::Config(format!("Failed to get secret: {}", e)))?;
    let secret = resp
        .secret_string()
        .ok_or_else(|| Error::Config("Failed to get secret string, returned None".to_string()))?;
    Ok(serde_json::from_str(secret)?)
}

/// Field separator of the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Delimiter {
    #[default]
    Comma,
    Semicolon,
}

impl Delimiter {
    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
        }
    }
}

impl FromStr for Delimiter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "," | "comma" => Ok(Delimiter::Comma),
            ";" | "semicolon" => Ok(Delimiter::Semicolon),
            other => Err(Error::Config(format!(
                "Unknown delimiter '{}'; expected ',' or ';'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Delimiter {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Everything a single load run needs to know, read once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadSettings {
    #[serde(default)]
    pub file: PathBuf,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub pipe: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub delimiter: Delimiter,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub timestamp_columns: Vec<String>,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

impl LoadSettings {
    pub fn new(file: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            table: table.into(),
            database: String::new(),
            schema: default_schema(),
            pipe: None,
            channel: None,
            delimiter: Delimiter::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            timestamp_columns: Vec::new(),
            timestamp_format: default_timestamp_format(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.file.as_os_str().is_empty() {
            return Err(Error::Config("input file path is not set".into()));
        }
        if self.table.trim().is_empty() {
            return Err(Error::Config("target table name is not set".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if !self.timestamp_columns.is_empty() && self.timestamp_format.is_empty() {
            return Err(Error::Config(
                "timestamp_format must be set when timestamp_columns are given".into(),
            ));
        }
        Ok(())
    }

    /// Pipe to stream into; Snowflake's default pipe for a table is `<TABLE>-STREAMING`.
    pub fn pipe_name(&self) -> String {
        match self.pipe.as_ref().filter(|p| !p.is_empty()) {
            Some(pipe) => pipe.clone(),
            None => format!("{}-STREAMING", self.table.to_uppercase()),
        }
    }

    pub fn channel_name(&self) -> String {
        match self.channel.as_ref().filter(|c| !c.is_empty()) {
            Some(channel) => channel.clone(),
            None => format!("csv-load-{}", uuid::Uuid::new_v4()),
        }
    }
}
