use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::GlobalArgs;
use crate::mirror::ImageMirror;
use crate::remote::FirestoreOptions;

/// File name of the cache database inside the data directory.
pub const DB_FILE_NAME: &str = "characters.db";

/// Probe target used when `--probe-addr` is not given.
const DEFAULT_PROBE_PORT: u16 = 443;

/// Application configuration.
pub struct Config {
    pub data_dir: PathBuf,
    pub base_url: String,
    pub project_id: Option<String>,
    pub api_key: Option<String>,
    pub collection: String,
    pub probe_addr: String,

    pub probe_timeout: Duration,
    pub http_timeout: Duration,

    pub offline: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("collection", &self.collection)
            .field("probe_addr", &self.probe_addr)
            .field("offline", &self.offline)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// `host:port` of the base URL, falling back to port 443.
fn probe_addr_for(base_url: &str) -> anyhow::Result<String> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| anyhow::anyhow!("Invalid --base-url '{}': {}", base_url, e))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("--base-url '{}' has no host", base_url))?;
    let port = url.port_or_known_default().unwrap_or(DEFAULT_PROBE_PORT);
    Ok(format!("{host}:{port}"))
}

impl Config {
    pub fn from_cli(args: GlobalArgs) -> anyhow::Result<Self> {
        let mut data_dir = expand_tilde(&args.data_dir);
        if data_dir.is_relative() {
            data_dir = std::env::current_dir()?.join(data_dir);
        }

        let probe_addr = match args.probe_addr {
            Some(addr) if !addr.trim().is_empty() => addr,
            _ => probe_addr_for(&args.base_url)?,
        };

        if args.http_timeout_secs == 0 {
            anyhow::bail!("--http-timeout-secs must be greater than zero");
        }

        Ok(Self {
            data_dir,
            base_url: args.base_url,
            project_id: args.project_id.filter(|p| !p.trim().is_empty()),
            api_key: args.api_key.filter(|k| !k.trim().is_empty()),
            collection: args.collection,
            probe_addr,
            probe_timeout: Duration::from_secs(args.probe_timeout_secs.max(1)),
            http_timeout: Duration::from_secs(args.http_timeout_secs),
            offline: args.offline,
            no_progress_bar: args.no_progress_bar,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    /// Database plus its WAL and SHM side files.
    pub fn db_files(&self) -> [PathBuf; 3] {
        let db = self.db_path();
        [
            db.clone(),
            db.with_extension("db-wal"),
            db.with_extension("db-shm"),
        ]
    }

    /// Live and staging image directories.
    pub fn image_dirs(&self) -> [PathBuf; 2] {
        let mirror = ImageMirror::new(&self.data_dir);
        [
            mirror.live_dir().to_path_buf(),
            mirror.staging_dir().to_path_buf(),
        ]
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Remote settings, or `None` when no project id was configured.
    pub fn firestore_options(&self) -> Option<FirestoreOptions> {
        let project_id = self.project_id.clone()?;
        Some(FirestoreOptions {
            base_url: self.base_url.clone(),
            project_id,
            collection: self.collection.clone(),
            api_key: self.api_key.clone(),
        })
    }
}
