//! Configuration loading from flags, environment and an optional TOML file
//!
//! Each setting is taken from the first source that provides it:
//! 1. command line flag (e.g. `--sqs-queue-url`, or the camel-case alias `--sqsQueueUrl`)
//! 2. environment variable (e.g. `SQS_QUEUE_URL`)
//! 3. TOML file given with `--config` / `CONFIG_FILE`
//! 4. built-in default (only for optional settings)

use crate::domain::types::SwitchIndex;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SWITCH_NUMBER: u32 = 12;
pub const DEFAULT_MILL_TIME: Duration = Duration::from_secs(9);
pub const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 60;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Mill bridge - switches a Hue relay on for a while whenever an SQS message arrives
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "mill-bridge", version, about)]
pub struct ConfigArgs {
    /// Path to an optional TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// SQS queue URL
    #[arg(long, env = "SQS_QUEUE_URL", alias = "sqsQueueUrl")]
    pub sqs_queue_url: Option<String>,

    /// Hue bridge address
    #[arg(long, env = "HUE_BRIDGE_HOST", alias = "hueBridgeHost")]
    pub hue_bridge_host: Option<String>,

    /// Hue bridge user
    #[arg(long, env = "HUE_BRIDGE_USER", alias = "hueBridgeUser", hide_env_values = true)]
    pub hue_bridge_user: Option<String>,

    /// Hue index of the switch [default: 12]
    #[arg(long, env = "HUE_BRIDGE_SWITCH_NUMBER", alias = "hueBridgeSwitchNumber")]
    pub hue_bridge_switch_number: Option<u32>,

    /// Mill duration, e.g. "9s" or "1m30s" [default: 9s]
    #[arg(long, env = "MILL_TIME", alias = "millTime", value_parser = parse_go_duration)]
    pub mill_time: Option<Duration>,

    /// Timeout for each Hue bridge HTTP request in milliseconds [default: 5000]
    #[arg(long, env = "HUE_BRIDGE_TIMEOUT_MS")]
    pub hue_bridge_timeout_ms: Option<u64>,

    /// Interval between metrics log lines in seconds, 0 disables [default: 60]
    #[arg(long, env = "METRICS_INTERVAL_SECS")]
    pub metrics_interval_secs: Option<u64>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Errors for missing or malformed settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {setting}: pass --{flag} or set {env}")]
    Missing { setting: &'static str, flag: &'static str, env: &'static str },
    #[error("invalid {setting} {value:?}: {source}")]
    InvalidDuration {
        setting: &'static str,
        value: String,
        #[source]
        source: DurationError,
    },
}

/// Errors from [`parse_go_duration`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("negative durations are not allowed")]
    Negative,
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("missing unit after {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {0:?}")]
    UnknownUnit(String),
    #[error("duration out of range")]
    Overflow,
}

/// Parse a Go-style duration string such as `9s`, `1.5s`, `1m30s` or `250ms`
///
/// Accepted units: `ns`, `us` (`µs`), `ms`, `s`, `m`, `h`. The bare string `0` is zero.
pub fn parse_go_duration(input: &str) -> Result<Duration, DurationError> {
    // Same upper bound as Go's time.Duration (int64 nanoseconds)
    const MAX_NANOS: u128 = i64::MAX as u128;
    // Fraction digits beyond this can't change the nanosecond result
    const MAX_FRACTION_DIGITS: usize = 20;

    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }
    if s.starts_with('-') {
        return Err(DurationError::Negative);
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    let is_number_char = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = s;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number_char(c)).unwrap_or(rest.len());
        let number = &rest[..number_end];
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number_char).unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        if number.is_empty() {
            return Err(DurationError::InvalidNumber(unit.to_string()));
        }

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(DurationError::InvalidNumber(number.to_string()));
        }

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3600 * 1_000_000_000,
            "" => return Err(DurationError::MissingUnit(number.to_string())),
            other => return Err(DurationError::UnknownUnit(other.to_string())),
        };

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| DurationError::Overflow)?
        };
        total = whole
            .checked_mul(unit_nanos)
            .and_then(|n| total.checked_add(n))
            .ok_or(DurationError::Overflow)?;

        if !fraction.is_empty() {
            let digits = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
            let numerator: u128 =
                digits.parse().map_err(|_| DurationError::InvalidNumber(number.to_string()))?;
            let scale = 10u128.pow(digits.len() as u32);
            total = numerator
                .checked_mul(unit_nanos)
                .map(|n| n / scale)
                .and_then(|n| total.checked_add(n))
                .ok_or(DurationError::Overflow)?;
        }

        if total > MAX_NANOS {
            return Err(DurationError::Overflow);
        }
    }

    Ok(Duration::from_nanos(total as u64))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqsSection {
    #[serde(default)]
    pub queue_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HueSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub switch_number: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MillSection {
    /// Go-style duration string
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSection {
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub sqs: SqsSection,
    #[serde(default)]
    pub hue: HueSection,
    #[serde(default)]
    pub mill: MillSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

impl TomlConfig {
    /// Load a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Main configuration struct used throughout the application
#[derive(Clone)]
pub struct Config {
    sqs_queue_url: String,
    hue_bridge_host: String,
    hue_bridge_user: String,
    hue_bridge_switch_number: SwitchIndex,
    mill_time: Duration,
    hue_bridge_timeout_ms: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("sqs_queue_url", &self.sqs_queue_url)
            .field("hue_bridge_host", &self.hue_bridge_host)
            .field("hue_bridge_user", &"<redacted>")
            .field("hue_bridge_switch_number", &self.hue_bridge_switch_number)
            .field("mill_time", &self.mill_time)
            .field("hue_bridge_timeout_ms", &self.hue_bridge_timeout_ms)
            .field("metrics_interval_secs", &self.metrics_interval_secs)
            .field("config_file", &self.config_file)
            .finish()
    }
}

/// First non-blank value wins
fn pick(flag_or_env: Option<&String>, file: Option<&String>) -> Option<String> {
    flag_or_env
        .into_iter()
        .chain(file)
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

impl Config {
    /// Load configuration from parsed arguments, reading the TOML file if one is given
    pub fn load(args: &ConfigArgs) -> anyhow::Result<Self> {
        let (file, config_file) = match &args.config {
            Some(path) => (TomlConfig::from_file(path)?, path.display().to_string()),
            None => (TomlConfig::default(), "none".to_string()),
        };

        let mut config = Self::resolve(args, &file)?;
        config.config_file = config_file;
        Ok(config)
    }

    /// Merge flags/environment (already folded together by clap) over file values and defaults
    pub fn resolve(args: &ConfigArgs, file: &TomlConfig) -> Result<Self, ConfigError> {
        let sqs_queue_url = pick(args.sqs_queue_url.as_ref(), file.sqs.queue_url.as_ref()).ok_or(
            ConfigError::Missing {
                setting: "SQS queue URL",
                flag: "sqs-queue-url",
                env: "SQS_QUEUE_URL",
            },
        )?;
        let hue_bridge_host = pick(args.hue_bridge_host.as_ref(), file.hue.host.as_ref()).ok_or(
            ConfigError::Missing {
                setting: "Hue bridge host",
                flag: "hue-bridge-host",
                env: "HUE_BRIDGE_HOST",
            },
        )?;
        let hue_bridge_user = pick(args.hue_bridge_user.as_ref(), file.hue.user.as_ref()).ok_or(
            ConfigError::Missing {
                setting: "Hue bridge user",
                flag: "hue-bridge-user",
                env: "HUE_BRIDGE_USER",
            },
        )?;

        let mill_time = match (args.mill_time, file.mill.time.as_deref()) {
            (Some(duration), _) => duration,
            (None, Some(raw)) => {
                parse_go_duration(raw).map_err(|source| ConfigError::InvalidDuration {
                    setting: "mill time",
                    value: raw.to_string(),
                    source,
                })?
            }
            (None, None) => DEFAULT_MILL_TIME,
        };

        Ok(Self {
            sqs_queue_url,
            hue_bridge_host,
            hue_bridge_user,
            hue_bridge_switch_number: SwitchIndex(
                args.hue_bridge_switch_number
                    .or(file.hue.switch_number)
                    .unwrap_or(DEFAULT_SWITCH_NUMBER),
            ),
            mill_time,
            hue_bridge_timeout_ms: args
                .hue_bridge_timeout_ms
                .or(file.hue.timeout_ms)
                .unwrap_or(DEFAULT_BRIDGE_TIMEOUT_MS),
            metrics_interval_secs: args
                .metrics_interval_secs
                .or(file.metrics.interval_secs)
                .unwrap_or(DEFAULT_METRICS_INTERVAL_SECS),
            config_file: "none".to_string(),
        })
    }

    pub fn sqs_queue_url(&self) -> &str {
        &self.sqs_queue_url
    }

    pub fn hue_bridge_host(&self) -> &str {
        &self.hue_bridge_host
    }

    pub fn hue_bridge_user(&self) -> &str {
        &self.hue_bridge_user
    }

    pub fn hue_bridge_switch_number(&self) -> SwitchIndex {
        self.hue_bridge_switch_number
    }

    pub fn mill_time(&self) -> Duration {
        self.mill_time
    }

    pub fn hue_bridge_timeout_ms(&self) -> u64 {
        self.hue_bridge_timeout_ms
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
