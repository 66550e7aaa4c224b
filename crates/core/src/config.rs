use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReporterError, Result};
use crate::time::TimeUnit;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReporterConfig {
    pub rate_unit: TimeUnit,
    pub duration_unit: TimeUnit,
    pub skip_idle_metrics: bool,
    #[serde(with = "period_format")]
    pub period: Duration,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            rate_unit: TimeUnit::Seconds,
            duration_unit: TimeUnit::Milliseconds,
            skip_idle_metrics: false,
            period: Duration::from_secs(10),
            include: Vec::new(),
            exclude: Vec::new(),
            tags: BTreeMap::new(),
        }
    }
}

impl ReporterConfig {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    /// Defaults overlaid with a single config file. Unlike `load`, a missing file is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        let overrides = load_file_overrides(path)?.ok_or_else(|| {
            ReporterError::Config(format!("config file not found: {}", path.display()))
        })?;
        apply_overrides(&mut cfg, overrides, "config file")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    tags: Option<TagsOverride>,
    rate_unit: Option<String>,
    duration_unit: Option<String>,
    skip_idle_metrics: Option<bool>,
    period: Option<String>,
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

/// Tags come as a TOML table in files and as `k=v,k2=v2` in the environment.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagsOverride {
    Table(BTreeMap<String, String>),
    List(String),
}

pub fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("METRICS_INFLUX_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("metrics-influx/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| ReporterError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| ReporterError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    let skip_idle_metrics = match env::var("METRICS_INFLUX_SKIP_IDLE") {
        Ok(v) => Some(parse_bool(&v).ok_or_else(|| {
            ReporterError::Config(format!(
                "bad METRICS_INFLUX_SKIP_IDLE in environment: expected a boolean, got {v}"
            ))
        })?),
        Err(_) => None,
    };

    Ok(ConfigOverrides {
        tags: env::var("METRICS_INFLUX_TAGS").ok().map(TagsOverride::List),
        rate_unit: env::var("METRICS_INFLUX_RATE_UNIT").ok(),
        duration_unit: env::var("METRICS_INFLUX_DURATION_UNIT").ok(),
        skip_idle_metrics,
        period: env::var("METRICS_INFLUX_PERIOD").ok(),
        include: env::var("METRICS_INFLUX_INCLUDE")
            .ok()
            .map(|v| split_list(&v)),
        exclude: env::var("METRICS_INFLUX_EXCLUDE")
            .ok()
            .map(|v| split_list(&v)),
    })
}

fn apply_overrides(cfg: &mut ReporterConfig, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.tags {
        cfg.tags = match v {
            TagsOverride::Table(table) => table,
            TagsOverride::List(raw) => parse_tags(&raw).map_err(|e| {
                ReporterError::Config(format!("bad tags in {source}: {e} (value={raw})"))
            })?,
        };
    }
    if let Some(v) = overrides.rate_unit {
        cfg.rate_unit = v.parse().map_err(|e| {
            ReporterError::Config(format!("bad rate_unit in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.duration_unit {
        cfg.duration_unit = v.parse().map_err(|e| {
            ReporterError::Config(format!("bad duration_unit in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.skip_idle_metrics {
        cfg.skip_idle_metrics = v;
    }
    if let Some(v) = overrides.period {
        let period = humantime::parse_duration(&v).map_err(|e| {
            ReporterError::Config(format!("bad period in {source}: {e} (value={v})"))
        })?;
        if period.is_zero() {
            return Err(ReporterError::Config(format!(
                "bad period in {source}: must be greater than zero"
            )));
        }
        cfg.period = period;
    }
    if let Some(v) = overrides.include {
        cfg.include = v;
    }
    if let Some(v) = overrides.exclude {
        cfg.exclude = v;
    }
    Ok(())
}

/// Parses `key=value` pairs separated by commas.
pub fn parse_tags(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(ReporterError::Config(
                "tag entries must use key=value syntax".to_string(),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ReporterError::Config("tag key cannot be empty".to_string()));
        }
        out.insert(key.to_string(), value.trim().to_string());
    }
    Ok(out)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serializes `period` as a humantime string so a printed config can be read back.
mod period_format {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
