use std::path::{Path, PathBuf};
use std::time::Duration;

use strict_yaml_rust::{StrictYaml, StrictYamlLoader};

use crate::{ClientOptions, Endpoint, SampleFormat};

const KEYS: &[&str] = &[
    "uri",
    "sampleformat",
    "logfilter",
    "logfile",
    "retry-delay",
    "queue-depth",
    "pace-nonblocking",
];

/// Everything needed to open a bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub endpoint: Endpoint,
    pub format: SampleFormat,
    pub client: ClientOptions,
    /// Pace transfers even when the host opened the device non-blocking.
    pub pace_nonblocking: bool,
    pub logfilter: String,
    pub logfile: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            format: SampleFormat::default(),
            client: ClientOptions::default(),
            pace_nonblocking: true,
            logfilter: "info".to_owned(),
            logfile: None,
        }
    }
}

impl BridgeConfig {
    pub fn open<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let contents = std::fs::read_to_string(&path)?;
        let mut config = Self::from_yaml(&contents)?;
        // relative log files are relative to the config file
        if let Some(ref mut logfile) = config.logfile {
            if logfile.is_relative() {
                let base = path.as_ref().parent().unwrap_or(Path::new("."));
                *logfile = base.join(&*logfile);
            }
        }
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let mut config = Self::default();
        let datawhole = StrictYamlLoader::load_from_str(contents)?;
        let data = match datawhole.get(0) {
            Some(data) => data,
            // an empty document is all defaults
            None => return Ok(config),
        };
        let hash = data
            .as_hash()
            .ok_or_else(|| anyhow::anyhow!("config should be a dictionary"))?;
        for key in hash.keys() {
            let key = key
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("config keys should be strings"))?;
            if !KEYS.contains(&key) {
                anyhow::bail!("unknown config key {:?}", key);
            }
        }

        if let Some(uri) = get_str(data, "uri")? {
            config.endpoint = Endpoint::from_str(uri)?;
        }
        if let Some(fmt) = get_str(data, "sampleformat")? {
            config.format = SampleFormat::from_str(fmt)?;
        }
        if let Some(filter) = get_str(data, "logfilter")? {
            config.logfilter = filter.to_owned();
        }
        if let Some(file) = get_str(data, "logfile")? {
            config.logfile = Some(file.into());
        }
        if let Some(delay) = get_str(data, "retry-delay")? {
            let secs: f64 = delay
                .parse()
                .map_err(|_| anyhow::anyhow!("retry-delay should be a number of seconds"))?;
            // a zero delay would spin on an unreachable sink
            if secs.is_nan() || secs <= 0.0 {
                anyhow::bail!("retry-delay should be a positive number of seconds");
            }
            config.client.retry_delay = Duration::try_from_secs_f64(secs)
                .map_err(|_| anyhow::anyhow!("retry-delay of {} seconds is too long", secs))?;
        }
        if let Some(depth) = get_str(data, "queue-depth")? {
            let depth: usize = depth
                .parse()
                .map_err(|_| anyhow::anyhow!("queue-depth should be a whole number"))?;
            if depth == 0 {
                anyhow::bail!("queue-depth should be at least 1");
            }
            config.client.queue_depth = depth;
        }
        if let Some(pace) = get_str(data, "pace-nonblocking")? {
            config.pace_nonblocking = parse_bool(pace)?;
        }
        Ok(config)
    }
}

fn get_str<'a>(data: &'a StrictYaml, key: &str) -> anyhow::Result<Option<&'a str>> {
    let value = &data[key];
    if value.is_badvalue() {
        return Ok(None);
    }
    value
        .as_str()
        .map(Some)
        .ok_or_else(|| anyhow::anyhow!("{} should be a string", key))
}

fn parse_bool(s: &str) -> anyhow::Result<bool> {
    Ok(match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => true,
        "false" | "no" | "off" | "0" => false,
        _ => anyhow::bail!("expected a boolean, got {:?}", s),
    })
}
