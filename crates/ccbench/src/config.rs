//! Benchmark campaign configuration.
//!
//! Everything except the four interactive parameters (bandwidth, loss,
//! delay, repetitions) can be overridden from an optional TOML file. Omitted
//! keys fall back to the defaults below.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::model::IpVersion;

pub const DEFAULT_VARIANTS: [&str; 6] = ["reno", "cubic", "bbr", "vegas", "veno", "westwood"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BenchConfigInput {
    pub variants: Vec<String>,
    pub ip_versions: Vec<String>,
    pub namespace_prefix: Option<String>,
    pub iperf: IperfConfigInput,
    pub paths: PathsConfigInput,
    pub web: WebConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IperfConfigInput {
    pub port_v4: Option<u16>,
    pub port_v6: Option<u16>,
    pub duration_secs: Option<u64>,
    pub server_startup_ms: Option<u64>,
    pub cpu_sample_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfigInput {
    pub dataset_dir: Option<PathBuf>,
    pub output_log: Option<PathBuf>,
    pub charts_dir: Option<PathBuf>,
    pub tables_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebConfigInput {
    pub listen_addr: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IperfSettings {
    pub port_v4: u16,
    pub port_v6: u16,
    pub duration: Duration,
    pub server_startup: Duration,
    pub cpu_sample: Duration,
}

impl IperfSettings {
    pub fn port(&self, ip_version: IpVersion) -> u16 {
        match ip_version {
            IpVersion::V4 => self.port_v4,
            IpVersion::V6 => self.port_v6,
        }
    }
}

impl Default for IperfSettings {
    fn default() -> Self {
        Self {
            port_v4: 5201,
            port_v6: 5202,
            duration: Duration::from_secs(3),
            server_startup: Duration::from_secs(2),
            cpu_sample: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub dataset_dir: PathBuf,
    pub output_log: PathBuf,
    pub charts_dir: PathBuf,
    pub tables_dir: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("dataset"),
            output_log: PathBuf::from("output/full_output.log"),
            charts_dir: PathBuf::from("graficos"),
            tables_dir: PathBuf::from("tabelas"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchConfig {
    pub variants: Vec<String>,
    pub ip_versions: Vec<IpVersion>,
    pub namespace_prefix: String,
    pub iperf: IperfSettings,
    pub paths: OutputPaths,
    pub listen_addr: SocketAddr,
}

/// `ccb` plus the process id, so concurrent or stale runs never share
/// namespace names.
pub fn default_namespace_prefix() -> String {
    format!("ccb{:x}", std::process::id() % 0xFFFF)
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            variants: DEFAULT_VARIANTS.iter().map(|v| v.to_string()).collect(),
            ip_versions: IpVersion::ALL.to_vec(),
            namespace_prefix: default_namespace_prefix(),
            iperf: IperfSettings::default(),
            paths: OutputPaths::default(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl BenchConfigInput {
    pub fn resolve(self) -> Result<BenchConfig, ConfigError> {
        let defaults = BenchConfig::default();

        let variants = if self.variants.is_empty() {
            defaults.variants
        } else {
            let mut out: Vec<String> = Vec::new();
            for v in self.variants {
                let v = v.trim().to_ascii_lowercase();
                if !valid_name(&v) {
                    return Err(ConfigError::Invalid(format!("bad TCP variant name '{v}'")));
                }
                if !out.contains(&v) {
                    out.push(v);
                }
            }
            out
        };

        let ip_versions = if self.ip_versions.is_empty() {
            defaults.ip_versions
        } else {
            let mut out = Vec::new();
            for v in &self.ip_versions {
                let ip: IpVersion = v.parse().map_err(ConfigError::Invalid)?;
                if !out.contains(&ip) {
                    out.push(ip);
                }
            }
            out
        };

        let namespace_prefix = match self.namespace_prefix {
            Some(p) if !valid_name(p.trim()) => {
                return Err(ConfigError::Invalid(format!("bad namespace prefix '{p}'")));
            }
            Some(p) => p.trim().to_string(),
            None => defaults.namespace_prefix,
        };

        let d = defaults.iperf;
        let iperf = IperfSettings {
            port_v4: self.iperf.port_v4.unwrap_or(d.port_v4),
            port_v6: self.iperf.port_v6.unwrap_or(d.port_v6),
            duration: self
                .iperf
                .duration_secs
                .map(Duration::from_secs)
                .unwrap_or(d.duration),
            server_startup: self
                .iperf
                .server_startup_ms
                .map(Duration::from_millis)
                .unwrap_or(d.server_startup),
            cpu_sample: self
                .iperf
                .cpu_sample_ms
                .map(Duration::from_millis)
                .unwrap_or(d.cpu_sample),
        };
        if iperf.duration.is_zero() {
            return Err(ConfigError::Invalid("iperf duration must be at least 1s".into()));
        }
        if iperf.port_v4 == 0 || iperf.port_v6 == 0 {
            return Err(ConfigError::Invalid("iperf ports must be non-zero".into()));
        }

        let p = defaults.paths;
        let paths = OutputPaths {
            dataset_dir: self.paths.dataset_dir.unwrap_or(p.dataset_dir),
            output_log: self.paths.output_log.unwrap_or(p.output_log),
            charts_dir: self.paths.charts_dir.unwrap_or(p.charts_dir),
            tables_dir: self.paths.tables_dir.unwrap_or(p.tables_dir),
        };

        let listen_addr = match self.web.listen_addr {
            Some(addr) => addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("bad listen address '{addr}': {e}")))?,
            None => defaults.listen_addr,
        };

        Ok(BenchConfig {
            variants,
            ip_versions,
            namespace_prefix,
            iperf,
            paths,
            listen_addr,
        })
    }
}

impl BenchConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let input: BenchConfigInput = toml::from_str(text)?;
        input.resolve()
    }

    /// Loads the config file if one is given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
