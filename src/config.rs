use serde::Deserialize;
use std::{collections::BTreeMap, env, fs, io, path::Path, path::PathBuf, time::Duration};
use thiserror::Error;

pub const DEFAULT_SECRETS_PATH: &str = "secrets.toml";
pub const DEFAULT_MONITORED_CONTRACT: &str = "ABILITY_SJ";
pub const DEFAULT_MAIN_CONTRACTS: [&str; 6] = [
    "ABILITY_SJ",
    "TEL_JI",
    "ABILITY_OS",
    "TEL_INTERIOR",
    "TEL_PC_SC",
    "TELEMONT",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid secrets file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Everything the console needs, resolved from the secrets file plus
/// environment overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_url: String,
    pub api_headers: BTreeMap<String, String>,
    pub request_timeout: Duration,
    pub api_cache_ttl: Duration,
    pub reference_cache_ttl: Duration,
    pub reference_path: PathBuf,
    pub monitored_contract: String,
    pub main_contracts: Vec<String>,
    pub sla: SlaThresholds,
    pub large_scale_threshold: f64,
    pub output_dir: PathBuf,
    pub passwords: BTreeMap<String, String>,
    pub roles: BTreeMap<String, String>,
    pub scopes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SlaThresholds {
    pub critical_hours: f64,
    pub overdue_hours: f64,
    /// Tighter overdue threshold for B2B incidents; `None` disables it.
    pub b2b_overdue_hours: Option<f64>,
}

impl Default for SlaThresholds {
    fn default() -> Self {
        Self {
            critical_hours: 24.0,
            overdue_hours: 8.0,
            b2b_overdue_hours: Some(4.0),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    #[serde(default)]
    api: ApiSection,
    #[serde(default)]
    dashboard: DashboardSection,
    #[serde(default)]
    passwords: BTreeMap<String, String>,
    #[serde(default)]
    roles: BTreeMap<String, String>,
    #[serde(default)]
    scopes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSection {
    #[serde(default)]
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DashboardSection {
    timeout_seconds: u64,
    api_cache_seconds: u64,
    reference_cache_seconds: u64,
    reference_path: PathBuf,
    monitored_contract: String,
    main_contracts: Vec<String>,
    sla: SlaThresholds,
    large_scale_threshold: f64,
    output_dir: PathBuf,
}

impl Default for DashboardSection {
    fn default() -> Self {
        Self {
            timeout_seconds: 25,
            api_cache_seconds: 600,
            reference_cache_seconds: 3600,
            reference_path: PathBuf::from("CNL_BASE_MONITORAMENTO.csv"),
            monitored_contract: DEFAULT_MONITORED_CONTRACT.to_owned(),
            main_contracts: DEFAULT_MAIN_CONTRACTS.iter().map(|c| c.to_string()).collect(),
            sla: SlaThresholds::default(),
            large_scale_threshold: 100.0,
            output_dir: PathBuf::from("exports"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_secrets(SecretsFile::default())
    }
}

impl AppConfig {
    /// Load the secrets file at `path`, falling back to defaults when it does
    /// not exist, then apply `SIGMAOPS_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "secrets file not found, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        let secrets: SecretsFile = toml::from_str(raw)?;
        Ok(Self::from_secrets(secrets))
    }

    fn from_secrets(secrets: SecretsFile) -> Self {
        let dash = secrets.dashboard;
        Self {
            api_url: secrets.api.url.trim().to_owned(),
            api_headers: secrets.api.headers,
            request_timeout: Duration::from_secs(dash.timeout_seconds),
            api_cache_ttl: Duration::from_secs(dash.api_cache_seconds),
            reference_cache_ttl: Duration::from_secs(dash.reference_cache_seconds),
            reference_path: dash.reference_path,
            monitored_contract: dash.monitored_contract.trim().to_uppercase(),
            main_contracts: dash
                .main_contracts
                .iter()
                .map(|c| c.trim().to_uppercase())
                .collect(),
            sla: dash.sla,
            large_scale_threshold: dash.large_scale_threshold,
            output_dir: dash.output_dir,
            passwords: secrets.passwords,
            roles: secrets.roles,
            scopes: secrets.scopes,
        }
    }

    fn apply_env(&mut self) {
        if let Ok(url) = env::var("SIGMAOPS_API_URL") {
            self.api_url = url.trim().to_owned();
        }
        if let Ok(key) = env::var("SIGMAOPS_API_KEY") {
            self.api_headers.insert("X-API-Key".to_owned(), key);
        }
    }
}
