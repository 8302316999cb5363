//! Relay configuration
//!
//! Settings are resolved once at startup from three layers: the plugin
//! settings store (a JSON object file), the process environment, and
//! built-in defaults, in that order of precedence. The resulting [`Config`]
//! is never mutated; a settings change requires building a new `App`.

use crate::{Error, Result};
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const KAFKA_CLIENT_ID: &str = "KAFKA_CLIENT_ID";
pub const KAFKA_BROKERS: &str = "KAFKA_BROKERS";
pub const KAFKA_POSTS_TOPIC: &str = "KAFKA_POSTS_TOPIC";
pub const KAFKA_IMAGES_TOPIC: &str = "KAFKA_IMAGES_TOPIC";
pub const S3_ENDPOINT: &str = "S3_ENDPOINT";
pub const S3_REGION: &str = "S3_REGION";
pub const S3_ACCESS_KEY_ID: &str = "S3_ACCESS_KEY_ID";
pub const S3_SECRET_ACCESS_KEY: &str = "S3_SECRET_ACCESS_KEY";
pub const S3_BUCKET: &str = "S3_BUCKET";
pub const S3_PUBLIC_ENDPOINT: &str = "S3_PUBLIC_ENDPOINT";
pub const PUBLISH_TIMEOUT_MS: &str = "PUBLISH_TIMEOUT_MS";
pub const UPLOAD_TIMEOUT_MS: &str = "UPLOAD_TIMEOUT_MS";

/// Environment variable naming the settings store file.
pub const SETTINGS_FILE_ENV: &str = "RELAY_SETTINGS_FILE";

const DEFAULT_CLIENT_ID: &str = "nodebb";
const DEFAULT_BROKERS: &str = "localhost:9092";
const DEFAULT_POSTS_TOPIC: &str = "nodebb-posts";
const DEFAULT_IMAGES_TOPIC: &str = "nodebb-images";
const DEFAULT_S3_ENDPOINT: &str = "http://localhost:9000";
pub const DEFAULT_S3_REGION: &str = "us-east-1";
const DEFAULT_BUCKET: &str = "nodebb-uploads";
const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 30_000;

/// Values persisted by the forum's plugin settings page.
///
/// Keys are the lowercase form of the environment variable names, e.g.
/// `kafka_brokers` overrides `KAFKA_BROKERS`.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_lowercase(), value.to_string());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let parsed: BTreeMap<String, Value> = serde_json::from_str(json)?;
        let mut values = BTreeMap::new();

        for (key, value) in parsed {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => continue,
                other => {
                    return Err(Error::Config(format!(
                        "Setting '{}' must be a scalar, got {}",
                        key, other
                    )))
                }
            };
            values.insert(key.to_lowercase(), text);
        }

        Ok(Self { values })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub kafka_client_id: String,
    pub kafka_brokers: Vec<String>,
    pub posts_topic: String,
    pub images_topic: String,
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_access_key_id: String,
    pub s3_secret_access_key: String,
    pub s3_bucket: String,
    pub public_endpoint: String,
    pub publish_timeout: Duration,
    pub upload_timeout: Duration,
}

impl Config {
    /// Load from `.env`, the process environment, and an optional settings file.
    ///
    /// When `settings_path` is `None`, `RELAY_SETTINGS_FILE` is consulted.
    pub fn load(settings_path: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e.into());
            }
        }

        let settings = match settings_path {
            Some(path) => Settings::from_file(path)?,
            None => match std::env::var(SETTINGS_FILE_ENV) {
                Ok(path) if !path.trim().is_empty() => Settings::from_file(Path::new(&path))?,
                _ => Settings::new(),
            },
        };

        Self::resolve(&settings, |name| std::env::var(name).ok())
    }

    /// Merge the three layers and validate the result.
    pub fn resolve<F>(settings: &Settings, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| -> Option<String> {
            settings
                .get(name)
                .map(str::to_string)
                .or_else(|| env(name).filter(|v| !v.trim().is_empty()))
                .map(|v| v.trim().to_string())
        };
        let required = |name: &str| -> Result<String> {
            lookup(name).ok_or_else(|| Error::Config(format!("{} not set", name)))
        };

        let s3_endpoint = lookup(S3_ENDPOINT).unwrap_or_else(|| DEFAULT_S3_ENDPOINT.to_string());
        let public_endpoint = lookup(S3_PUBLIC_ENDPOINT).unwrap_or_else(|| s3_endpoint.clone());

        let config = Self {
            kafka_client_id: lookup(KAFKA_CLIENT_ID)
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            kafka_brokers: parse_brokers(
                &lookup(KAFKA_BROKERS).unwrap_or_else(|| DEFAULT_BROKERS.to_string()),
            )?,
            posts_topic: lookup(KAFKA_POSTS_TOPIC)
                .unwrap_or_else(|| DEFAULT_POSTS_TOPIC.to_string()),
            images_topic: lookup(KAFKA_IMAGES_TOPIC)
                .unwrap_or_else(|| DEFAULT_IMAGES_TOPIC.to_string()),
            s3_endpoint: validate_endpoint(S3_ENDPOINT, &s3_endpoint)?,
            s3_region: lookup(S3_REGION).unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            s3_access_key_id: required(S3_ACCESS_KEY_ID)?,
            s3_secret_access_key: required(S3_SECRET_ACCESS_KEY)?,
            s3_bucket: lookup(S3_BUCKET).unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            public_endpoint: validate_endpoint(S3_PUBLIC_ENDPOINT, &public_endpoint)?,
            publish_timeout: parse_millis(PUBLISH_TIMEOUT_MS, lookup(PUBLISH_TIMEOUT_MS))?
                .unwrap_or(Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS)),
            upload_timeout: parse_millis(UPLOAD_TIMEOUT_MS, lookup(UPLOAD_TIMEOUT_MS))?
                .unwrap_or(Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS)),
        };

        if config.posts_topic == config.images_topic {
            tracing::warn!(
                "Posts and images share topic '{}'; consumers must inspect payload shape",
                config.posts_topic
            );
        }

        Ok(config)
    }
}

fn parse_brokers(raw: &str) -> Result<Vec<String>> {
    let brokers: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect();

    if brokers.is_empty() {
        return Err(Error::Config(format!("{} is empty", KAFKA_BROKERS)));
    }

    for broker in &brokers {
        let valid = broker
            .rsplit_once(':')
            .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
            .unwrap_or(false);
        if !valid {
            return Err(Error::Config(format!(
                "Invalid broker address '{}'. Expected host:port",
                broker
            )));
        }
    }

    Ok(brokers)
}

fn validate_endpoint(name: &str, raw: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| Error::Config(format!("{} '{}' is not a valid URL: {}", name, raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::Config(format!(
            "{} '{}' must be an absolute http(s) URL",
            name, raw
        )));
    }

    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_millis(name: &str, raw: Option<String>) -> Result<Option<Duration>> {
    match raw {
        None => Ok(None),
        Some(value) => match value.parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
            _ => Err(Error::Config(format!(
                "{} must be a positive integer, got '{}'",
                name, value
            ))),
        },
    }
}
