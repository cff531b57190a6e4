use crate::services::storage_service::TransferLimits;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub session_ttl_secs: u64,
    pub max_upload_bytes: u64,
    pub max_chunk_bytes: u64,
    pub metadata_timeout_ms: u64,
    pub sweep_interval_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Resumable file storage API")]
pub struct Args {
    /// Host to bind to (overrides DRIVE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides DRIVE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root directory for file content (overrides DRIVE_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides DRIVE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Session lifetime in seconds (overrides DRIVE_STORE_SESSION_TTL_SECS)
    #[arg(long)]
    pub session_ttl_secs: Option<u64>,

    /// Largest accepted upload (overrides DRIVE_STORE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// Largest chunk accepted or served (overrides DRIVE_STORE_MAX_CHUNK_BYTES)
    #[arg(long)]
    pub max_chunk_bytes: Option<u64>,

    /// Metadata call deadline (overrides DRIVE_STORE_METADATA_TIMEOUT_MS)
    #[arg(long)]
    pub metadata_timeout_ms: Option<u64>,

    /// Seconds between session sweeps (overrides DRIVE_STORE_SWEEP_INTERVAL_SECS)
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `name`, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args)?;
        Ok((cfg, migrate))
    }

    /// CLI values win over the environment, which wins over defaults.
    fn merge(args: Args) -> Result<Self> {
        let defaults = TransferLimits::default();

        let cfg = Self {
            host: match args.host {
                Some(host) => host,
                None => env_or("DRIVE_STORE_HOST", "0.0.0.0".to_string())?,
            },
            port: match args.port {
                Some(port) => port,
                None => env_or("DRIVE_STORE_PORT", 3000)?,
            },
            storage_dir: match args.storage_dir {
                Some(dir) => dir,
                None => env_or("DRIVE_STORE_STORAGE_DIR", "./data/files".to_string())?,
            },
            database_url: match args.database_url {
                Some(url) => url,
                None => env_or(
                    "DRIVE_STORE_DATABASE_URL",
                    "sqlite://./data/meta/drive_store.db".to_string(),
                )?,
            },
            session_ttl_secs: match args.session_ttl_secs {
                Some(v) => v,
                None => env_or(
                    "DRIVE_STORE_SESSION_TTL_SECS",
                    defaults.session_ttl.num_seconds().unsigned_abs(),
                )?,
            },
            max_upload_bytes: match args.max_upload_bytes {
                Some(v) => v,
                None => env_or("DRIVE_STORE_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            },
            max_chunk_bytes: match args.max_chunk_bytes {
                Some(v) => v,
                None => env_or("DRIVE_STORE_MAX_CHUNK_BYTES", defaults.max_chunk_bytes)?,
            },
            metadata_timeout_ms: match args.metadata_timeout_ms {
                Some(v) => v,
                None => env_or(
                    "DRIVE_STORE_METADATA_TIMEOUT_MS",
                    defaults.metadata_timeout.as_millis() as u64,
                )?,
            },
            sweep_interval_secs: match args.sweep_interval_secs {
                Some(v) => v,
                None => env_or("DRIVE_STORE_SWEEP_INTERVAL_SECS", 300)?,
            },
        };

        if cfg.session_ttl_secs == 0 {
            anyhow::bail!("session TTL must be positive");
        }
        if cfg.max_chunk_bytes == 0 || cfg.max_upload_bytes == 0 {
            anyhow::bail!("size limits must be positive");
        }
        if cfg.sweep_interval_secs == 0 {
            anyhow::bail!("sweep interval must be positive");
        }
        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn limits(&self) -> Result<TransferLimits> {
        let ttl = i64::try_from(self.session_ttl_secs).context("session TTL too large")?;
        Ok(TransferLimits {
            session_ttl: chrono::Duration::try_seconds(ttl).context("session TTL too large")?,
            max_upload_bytes: self.max_upload_bytes,
            max_chunk_bytes: self.max_chunk_bytes,
            metadata_timeout: Duration::from_millis(self.metadata_timeout_ms),
        })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
