//! Configuration loading for muninnd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.muninn/config.toml` (user)
//! 3. `/etc/muninn/config.toml` (system)

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
use crate::gateway::{Muninn, MuninnBuilder};
use crate::lifecycle::{DEFAULT_GENERATION, DEFAULT_PRECACHE_CONCURRENCY};
use crate::manifest::AssetManifest;
use crate::router::DEFAULT_DYNAMIC_ENDPOINT;
use crate::{MuninnError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub origin: OriginConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8787).
    #[serde(default = "default_address")]
    pub address: String,
    /// Largest request body accepted from clients (default: 10 MiB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// The site being fronted.
#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
    /// Origin URL, e.g. `https://vardi.example`.
    pub url: String,
    /// Network fetch timeout in seconds (default: none).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Where generations are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    #[default]
    Disk,
}

/// Generation and install settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Generation tag of this deployment.
    #[serde(default = "default_generation")]
    pub generation: String,
    #[serde(default)]
    pub storage: StorageKind,
    /// Directory for disk storage (default: platform cache dir).
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_skip_waiting")]
    pub skip_waiting: bool,
    #[serde(default = "default_precache_concurrency")]
    pub precache_concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation: default_generation(),
            storage: StorageKind::default(),
            dir: None,
            skip_waiting: default_skip_waiting(),
            precache_concurrency: default_precache_concurrency(),
        }
    }
}

fn default_generation() -> String {
    DEFAULT_GENERATION.to_string()
}

fn default_skip_waiting() -> bool {
    true
}

fn default_precache_concurrency() -> usize {
    DEFAULT_PRECACHE_CONCURRENCY
}

/// Network-first endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_network_first")]
    pub network_first: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            network_first: default_network_first(),
        }
    }
}

fn default_network_first() -> Vec<String> {
    vec![DEFAULT_DYNAMIC_ENDPOINT.to_string()]
}

/// Precache manifest source. `file` wins over `assets`; with neither, the
/// built-in site manifest is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestConfig {
    #[serde(default)]
    pub assets: Option<Vec<String>>,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl ManifestConfig {
    pub fn load(&self) -> Result<AssetManifest> {
        match (&self.file, &self.assets) {
            (Some(path), _) => AssetManifest::load(path),
            (None, Some(assets)) => Ok(AssetManifest::new(assets.iter().cloned())),
            (None, None) => Ok(AssetManifest::site_default()),
        }
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.muninn/config.toml`
    /// 3. `/etc/muninn/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            MuninnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content).map_err(|e| {
            MuninnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MuninnError::Configuration(e.to_string()))
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(MuninnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".muninn").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/muninn/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(MuninnError::Configuration(
            "No config file found. Create ~/.muninn/config.toml or /etc/muninn/config.toml"
                .to_string(),
        ))
    }

    /// Storage backend selected by `[cache]`.
    pub fn storage(&self) -> Arc<dyn CacheStorage> {
        match self.cache.storage {
            StorageKind::Memory => Arc::new(MemoryCacheStorage::new()),
            StorageKind::Disk => match &self.cache.dir {
                Some(dir) => Arc::new(DiskCacheStorage::new(dir.clone())),
                None => Arc::new(DiskCacheStorage::default_location()),
            },
        }
    }

    /// Gateway builder populated from this configuration.
    pub fn gateway_builder(&self) -> Result<MuninnBuilder> {
        let mut builder = Muninn::builder()
            .origin(&self.origin.url)
            .generation(&self.cache.generation)
            .manifest(self.manifest.load()?)
            .storage(self.storage())
            .precache_concurrency(self.cache.precache_concurrency)
            .skip_waiting(self.cache.skip_waiting);
        if let Some(secs) = self.origin.timeout_secs {
            builder = builder.timeout(secs);
        }
        Ok(builder.network_first_paths(self.routing.network_first.iter().cloned()))
    }
}
