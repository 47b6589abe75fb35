use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine_logging::engine_info;
use orchestrator_core::AnalysisType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DispatchSettings, HttpSettings, OrchestratorSettings, ProbeSettings};

pub const DEFAULT_CONFIG_FILENAME: &str = "orchestrator.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// On-disk settings. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub base_url: String,
    pub health_path: String,
    pub probe_ttl_secs: u64,
    pub probe_timeout_secs: u64,
    pub probe_wait_limit_ms: u64,
    pub probe_poll_interval_ms: u64,
    /// 0 disables the report cache.
    pub report_cache_ttl_secs: u64,
    pub connect_timeout_secs: u64,
    pub check_availability: bool,
    pub timeout_overrides_ms: BTreeMap<AnalysisType, u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let http = HttpSettings::default();
        let probe = ProbeSettings::default();
        Self {
            base_url: http.base_url,
            health_path: probe.health_path,
            probe_ttl_secs: probe.ttl.as_secs(),
            probe_timeout_secs: probe.request_timeout.as_secs(),
            probe_wait_limit_ms: millis(probe.wait_limit),
            probe_poll_interval_ms: millis(probe.poll_interval),
            report_cache_ttl_secs: 600,
            connect_timeout_secs: http.connect_timeout.as_secs(),
            check_availability: true,
            timeout_overrides_ms: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// A missing file is not an error: defaults apply.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                engine_info!("no config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config = ron::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        engine_info!("loaded config from {:?}", path);
        Ok(config)
    }

    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            http: HttpSettings {
                base_url: self.base_url.clone(),
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            },
            probe: ProbeSettings {
                health_path: self.health_path.clone(),
                ttl: Duration::from_secs(self.probe_ttl_secs),
                request_timeout: Duration::from_secs(self.probe_timeout_secs),
                poll_interval: Duration::from_millis(self.probe_poll_interval_ms),
                wait_limit: Duration::from_millis(self.probe_wait_limit_ms),
            },
            dispatch: DispatchSettings {
                timeout_overrides: self
                    .timeout_overrides_ms
                    .iter()
                    .map(|(analysis_type, ms)| (*analysis_type, Duration::from_millis(*ms)))
                    .collect(),
                report_cache_ttl: (self.report_cache_ttl_secs > 0)
                    .then(|| Duration::from_secs(self.report_cache_ttl_secs)),
                check_availability: self.check_availability,
            },
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
