//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Crashes are most likely
//! to originate from this code, intentionally.
//!
//! Every field has a default, so an empty document -- or no document at all --
//! yields the reference run: 200 batches of 50 records of 1000 bytes into
//! `MetricsTest` in `us-east-1`, 200 milliseconds apart.

use std::{
    env::{self, VarError},
    fs,
    net::SocketAddr,
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Duration,
};

use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::debug;

/// Environment variable that, when set, holds the full YAML configuration.
pub const CONFIG_ENV_VAR: &str = "KINESIS_TRAFFIC_CONFIG";

/// Maximum number of records accepted by a single `PutRecords` call.
pub const MAX_RECORDS_PER_REQUEST: u32 = 500;
/// Maximum size of one record, payload plus partition key.
pub const MAX_RECORD_BYTES: u64 = 1024 * 1024;
/// Maximum size of one `PutRecords` request, payloads plus partition keys.
pub const MAX_REQUEST_BYTES: u64 = 5 * 1024 * 1024;
/// Maximum length of a stream name.
pub const MAX_STREAM_NAME_LEN: usize = 128;

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<std::io::Error>,
    },
    /// Stream name is empty, too long or has characters the service rejects
    #[error("Invalid stream name {0:?}, must be 1 to 128 characters of [a-zA-Z0-9_.-]")]
    StreamName(String),
    /// Region is empty
    #[error("Region must not be empty")]
    EmptyRegion,
    /// Batch holds more records than one request accepts
    #[error("Batch size {0} exceeds the PutRecords limit of {MAX_RECORDS_PER_REQUEST} records")]
    BatchTooLarge(u32),
    /// A single record would exceed the service's record limit
    #[error("Record of {0} bytes exceeds the limit of {MAX_RECORD_BYTES} bytes")]
    RecordTooLarge(u64),
    /// A whole batch would exceed the service's request limit
    #[error("Batch of {0} bytes exceeds the PutRecords limit of {MAX_REQUEST_BYTES} bytes")]
    RequestTooLarge(u64),
    /// Payload filler is not a single byte
    #[error("Filler {0:?} must be an ASCII character")]
    Filler(char),
    /// The configuration variable is set but is not valid unicode
    #[error("Environment variable {CONFIG_ENV_VAR} is not valid unicode")]
    EnvNotUnicode,
}

fn default_stream_name() -> String {
    "MetricsTest".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_iterations() -> NonZeroU32 {
    NonZeroU32::new(200).expect("200 is non-zero")
}

fn default_batch_size() -> NonZeroU32 {
    NonZeroU32::new(50).expect("50 is non-zero")
}

fn default_record_size() -> byte_unit::Byte {
    byte_unit::Byte::from_u64(1000)
}

fn default_interval_ms() -> u64 {
    200
}

fn default_filler() -> char {
    char::from(crate::record::DEFAULT_FILLER)
}

/// Main configuration struct for this program
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The stream records are written to
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    /// The region hosting the stream
    #[serde(default = "default_region")]
    pub region: String,
    /// Overrides the service endpoint, useful against local emulators
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Number of batches to submit
    #[serde(default = "default_iterations")]
    pub iterations: NonZeroU32,
    /// Records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: NonZeroU32,
    /// Payload bytes per record
    #[serde(default = "default_record_size")]
    pub record_size: byte_unit::Byte,
    /// Pause between batches, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Character payloads are filled with
    #[serde(default = "default_filler")]
    pub filler: char,
    /// Print records rather than sending them
    #[serde(default)]
    pub dry_run: bool,
    /// The method by which to express telemetry
    #[serde(default)]
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub telemetry: Option<Telemetry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_name: default_stream_name(),
            region: default_region(),
            endpoint_url: None,
            iterations: default_iterations(),
            batch_size: default_batch_size(),
            record_size: default_record_size(),
            interval_ms: default_interval_ms(),
            filler: default_filler(),
            dry_run: false,
            telemetry: None,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
/// Defines the manner of telemetry export.
pub enum Telemetry {
    /// Expose internal telemetry for scraping at a prometheus poll endpoint.
    Prometheus {
        /// Address and port for prometheus exporter
        addr: SocketAddr,
        /// Additional labels to include in every metric
        #[serde(default)]
        global_labels: FxHashMap<String, String>,
    },
}

impl Config {
    /// Parse a configuration from YAML and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML, has unknown fields
    /// or fails [`Config::validate`].
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        // An empty document deserializes as unit, not as an empty map.
        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check this configuration against the limits of the `PutRecords` API.
    ///
    /// # Errors
    ///
    /// Returns the first violated limit.
    pub fn validate(&self) -> Result<(), Error> {
        if !valid_stream_name(&self.stream_name) {
            return Err(Error::StreamName(self.stream_name.clone()));
        }
        if self.region.trim().is_empty() {
            return Err(Error::EmptyRegion);
        }
        if !self.filler.is_ascii() {
            return Err(Error::Filler(self.filler));
        }

        let batch_size = self.batch_size.get();
        if batch_size > MAX_RECORDS_PER_REQUEST {
            return Err(Error::BatchTooLarge(batch_size));
        }

        let record_size = self.record_size.as_u64();
        let longest_key = decimal_len(batch_size);
        let largest_record = record_size.saturating_add(longest_key);
        if largest_record > MAX_RECORD_BYTES {
            return Err(Error::RecordTooLarge(largest_record));
        }

        let keys: u64 = (1..=batch_size).map(decimal_len).sum();
        let request = record_size
            .saturating_mul(u64::from(batch_size))
            .saturating_add(keys);
        if request > MAX_REQUEST_BYTES {
            return Err(Error::RequestTooLarge(request));
        }

        Ok(())
    }

    /// Payload bytes per record.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn record_size_bytes(&self) -> usize {
        // validate bounds this by MAX_RECORD_BYTES
        self.record_size.as_u64() as usize
    }

    /// The filler as a byte, ASCII per [`Config::validate`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn filler_byte(&self) -> u8 {
        self.filler as u8
    }

    /// Pause between batches.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn valid_stream_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_STREAM_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn decimal_len(value: u32) -> u64 {
    u64::from(value.checked_ilog10().unwrap_or(0) + 1)
}

/// Load configuration, preferring [`CONFIG_ENV_VAR`], then the file at
/// `path`, then the defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the configuration is
/// invalid.
pub fn load(path: Option<&Path>) -> Result<Config, Error> {
    load_from(env_contents(env::var(CONFIG_ENV_VAR))?, path)
}

fn env_contents(var: Result<String, VarError>) -> Result<Option<String>, Error> {
    match var {
        Ok(contents) => Ok(Some(contents)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(Error::EnvNotUnicode),
    }
}

/// Load configuration from the contents of [`CONFIG_ENV_VAR`], if set, else
/// from the file at `path`, else the defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the configuration is
/// invalid.
pub fn load_from(env_value: Option<String>, path: Option<&Path>) -> Result<Config, Error> {
    if let Some(contents) = env_value {
        debug!("Using config from env var '{CONFIG_ENV_VAR}'");
        return Config::from_yaml(&contents);
    }
    match path {
        Some(path) => load_config_from_path(path),
        None => {
            debug!("No configuration supplied, using defaults");
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Load configuration from a single YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the configuration is
/// invalid.
pub fn load_config_from_path(path: &Path) -> Result<Config, Error> {
    debug!("Attempting to open configuration file at: {}", path.display());
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;
    Config::from_yaml(&contents)
}
