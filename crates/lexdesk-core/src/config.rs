use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Result};

/// Timing knobs for the upload drivers.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Upper bound (exclusive) of the per-tick progress increment.
    pub max_increment: f64,
    /// Minimum wait between two ticks of the same driver.
    pub tick_min_ms: u64,
    /// Random extra wait added on top of `tick_min_ms`.
    pub tick_jitter_ms: u64,
    /// Capacity of the upload event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_increment: 15.0,
            tick_min_ms: 800,
            tick_jitter_ms: 400,
            event_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Full application configuration, read from the process environment with
/// `.env` as fallback.
#[derive(Debug, Clone)]
pub struct Config {
    pub web_bind: String,
    pub web_port: u16,
    pub log_format: LogFormat,
    pub simulation: SimulationConfig,
}

pub fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(path) else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().trim_matches('"');
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

/// Where settings are looked up: process env first, then `.env`.
struct Sources<'a> {
    env: &'a HashMap<String, String>,
    dotenv: &'a HashMap<String, String>,
}

impl Sources<'_> {
    fn get(&self, key: &str) -> Option<String> {
        self.env.get(key).or_else(|| self.dotenv.get(key)).cloned()
    }

    fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(v) => Ok(v),
                Err(_) => bail!("{key} is not a number: {raw:?}"),
            },
            None => Ok(default),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let dotenv = parse_dotenv(Path::new(".env"));
        Self::from_sources(&env, &dotenv)
    }

    /// Build from `.env` entries alone, ignoring the process environment.
    pub fn from_dotenv(dotenv: &HashMap<String, String>) -> Result<Self> {
        Self::from_sources(&HashMap::new(), dotenv)
    }

    /// Build from explicit env and `.env` maps. A key set in `env` wins.
    pub fn from_sources(
        env: &HashMap<String, String>,
        dotenv: &HashMap<String, String>,
    ) -> Result<Self> {
        let src = Sources { env, dotenv };
        let defaults = SimulationConfig::default();

        let max_increment = src.get_f64("UPLOAD_MAX_INCREMENT", defaults.max_increment)?;
        if !max_increment.is_finite() || max_increment <= 0.0 {
            bail!("UPLOAD_MAX_INCREMENT must be a positive number, got {max_increment}");
        }

        let event_channel_capacity =
            src.get_parsed("EVENT_CHANNEL_CAPACITY", defaults.event_channel_capacity);
        if event_channel_capacity == 0 {
            bail!("EVENT_CHANNEL_CAPACITY must be at least 1");
        }

        let log_format = match src.get_str("LOG_FORMAT", "text").as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Config {
            web_bind: src.get_str("WEB_BIND", "127.0.0.1"),
            web_port: src.get_parsed("WEB_PORT", 3131),
            log_format,
            simulation: SimulationConfig {
                max_increment,
                tick_min_ms: src.get_parsed("UPLOAD_TICK_MIN_MS", defaults.tick_min_ms),
                tick_jitter_ms: src.get_parsed("UPLOAD_TICK_JITTER_MS", defaults.tick_jitter_ms),
                event_channel_capacity,
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.web_bind, self.web_port)
    }
}
