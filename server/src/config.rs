use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HTTP_RATE_LIMIT_PER_SECOND: u64 = 50;
pub const DEFAULT_HTTP_RATE_LIMIT_BURST: u32 = 100;
pub const DEFAULT_UPLOAD_RATE_LIMIT_PER_MINUTE: u64 = 30;
pub const DEFAULT_UPLOAD_RATE_LIMIT_BURST: u32 = 5;
pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 64 * 1024;
pub const DEFAULT_PROOF_MAX_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_PROOF_DIR: &str = "proofs";
pub const DEFAULT_PROOF_BASE_URL: &str = "/proofs";

/// Where bets, participants and stakes live for the lifetime of the process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    /// SQLite database file.
    #[default]
    Live,
    /// In-memory store seeded from a JSON fixture.
    Fixture,
}

impl FromStr for DataSourceKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "fixture" => Ok(Self::Fixture),
            other => Err(format!("unknown data source: {other} (expected live or fixture)")),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerConfig {
    pub data_source: DataSourceKind,
    pub sqlite_path: Option<PathBuf>,
    pub fixture_path: Option<PathBuf>,
    pub directory_path: Option<PathBuf>,
    pub proof_dir: PathBuf,
    pub proof_base_url: String,
    pub proof_max_bytes: usize,
    pub sweep_interval_ms: Option<u64>,
    pub http_rate_limit_per_second: Option<u64>,
    pub http_rate_limit_burst: Option<u32>,
    pub upload_rate_limit_per_minute: Option<u64>,
    pub upload_rate_limit_burst: Option<u32>,
    pub http_body_limit_bytes: Option<usize>,
    /// Browser origins allowed to call the API; `*` allows any.
    pub allowed_origins: Vec<String>,
    /// Accept requests without an `Origin` header (server-to-server callers).
    pub allow_no_origin: bool,
    #[serde(skip)]
    pub metrics_auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_source: DataSourceKind::Live,
            sqlite_path: None,
            fixture_path: None,
            directory_path: None,
            proof_dir: PathBuf::from(DEFAULT_PROOF_DIR),
            proof_base_url: DEFAULT_PROOF_BASE_URL.to_string(),
            proof_max_bytes: DEFAULT_PROOF_MAX_BYTES,
            sweep_interval_ms: Some(DEFAULT_SWEEP_INTERVAL_MS),
            http_rate_limit_per_second: Some(DEFAULT_HTTP_RATE_LIMIT_PER_SECOND),
            http_rate_limit_burst: Some(DEFAULT_HTTP_RATE_LIMIT_BURST),
            upload_rate_limit_per_minute: Some(DEFAULT_UPLOAD_RATE_LIMIT_PER_MINUTE),
            upload_rate_limit_burst: Some(DEFAULT_UPLOAD_RATE_LIMIT_BURST),
            http_body_limit_bytes: Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
            allowed_origins: Vec::new(),
            allow_no_origin: false,
            metrics_auth_token: None,
        }
    }
}

impl ServerConfig {
    /// Config for in-process tests: fixture data, no rate limits, no sweeper,
    /// no origin required.
    pub fn for_tests(proof_dir: PathBuf) -> Self {
        Self {
            data_source: DataSourceKind::Fixture,
            proof_dir,
            sweep_interval_ms: None,
            http_rate_limit_per_second: None,
            http_rate_limit_burst: None,
            upload_rate_limit_per_minute: None,
            upload_rate_limit_burst: None,
            allow_no_origin: true,
            ..Self::default()
        }
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Reject combinations that cannot start.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.data_source {
            DataSourceKind::Live if self.sqlite_path.is_none() => {
                anyhow::bail!("--sqlite-path is required with --data-source live")
            }
            DataSourceKind::Fixture if self.sqlite_path.is_some() => {
                anyhow::bail!("--sqlite-path cannot be combined with --data-source fixture")
            }
            _ => {}
        }
        if self.proof_max_bytes == 0 {
            anyhow::bail!("proof_max_bytes must be > 0");
        }
        if self.proof_base_url.trim().is_empty() {
            anyhow::bail!("proof_base_url must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_parsing() {
        assert_eq!("live".parse::<DataSourceKind>(), Ok(DataSourceKind::Live));
        assert_eq!(" Fixture ".parse::<DataSourceKind>(), Ok(DataSourceKind::Fixture));
        assert!("postgres".parse::<DataSourceKind>().is_err());
    }

    #[test]
    fn test_live_requires_sqlite_path() {
        let config = ServerConfig::default();
        assert!(config.validate().is_err());

        let config = ServerConfig {
            sqlite_path: Some(PathBuf::from("stake.db")),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fixture_rejects_sqlite_path() {
        let config = ServerConfig {
            data_source: DataSourceKind::Fixture,
            sqlite_path: Some(PathBuf::from("stake.db")),
            ..ServerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sqlite-path"), "{err}");
    }

    #[test]
    fn test_zero_sweep_interval_disables_sweeper() {
        let config = ServerConfig {
            sweep_interval_ms: Some(0),
            ..ServerConfig::default()
        };
        assert_eq!(config.sweep_interval(), None);
        assert_eq!(
            ServerConfig::default().sweep_interval(),
            Some(Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS))
        );
    }
}
