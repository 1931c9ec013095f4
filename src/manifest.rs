//! Asset manifest: the URLs that must be available offline.
//!
//! A manifest is an ordered list of site-relative paths (or absolute
//! same-origin URLs) materialized into a cache generation on install.
//! Duplicates are harmless; they collapse onto one cache key.
//!
//! Manifests can be embedded ([`AssetManifest::site_default`]) or loaded
//! from a JSON file in either of two shapes:
//!
//! ```json
//! ["/", "/index.html", "/app.js"]
//! ```
//!
//! ```json
//! { "assets": ["/", "/index.html", "/app.js"] }
//! ```

use std::path::Path;

use reqwest::Url;
use serde::Deserialize;

use crate::{MuninnError, Result};

/// Pages, scripts, styles, translations and data snapshots of the
/// Latvian B1 vocabulary site.
pub const SITE_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/week1.html",
    "/app.js",
    "/src/render.js",
    "/src/state.js",
    "/src/match.js",
    "/src/forge.js",
    "/i18n/en.json",
    "/i18n/lv.json",
    "/styles.css",
    "/data/lv-en/forge.json",
    "/data/lv-en/units.json",
    "/data/lv-en/units/b1-paligdarbibas-vardi.json",
    "/data/lv-en/units/braukt-ar-priedekliem.json",
    "/data/lv-en/units/iet-ar-priedekliem.json",
    "/data/lv-en/units/kapt-ar-priedekliem.json",
    "/data/lv-en/units/lidot-ar-priedekliem.json",
    "/data/lv-en/units/mainit-mainities-gimene.json",
    "/data/lv-en/units/nakt-ar-priedekliem.json",
    "/data/lv-en/units/nest-ar-priedekliem.json",
    "/data/lv-en/units/refleksivie-un-dzives-notikumi.json",
];

/// Ordered, immutable list of precache URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    assets: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawManifest {
    Wrapped { assets: Vec<String> },
    Bare(Vec<String>),
}

impl AssetManifest {
    pub fn new<I, S>(assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            assets: assets.into_iter().map(Into::into).collect(),
        }
    }

    /// The manifest shipped with the crate.
    pub fn site_default() -> Self {
        Self::new(SITE_ASSETS.iter().copied())
    }

    /// Parse a JSON manifest (bare array or `{ "assets": [...] }`).
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(json).map_err(|e| {
            MuninnError::Configuration(format!("failed to parse asset manifest: {e}"))
        })?;
        let assets = match raw {
            RawManifest::Wrapped { assets } | RawManifest::Bare(assets) => assets,
        };
        Ok(Self { assets })
    }

    /// Load a JSON manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MuninnError::Configuration(format!(
                "failed to read asset manifest {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Resolve every entry against `origin`.
    ///
    /// Entries that resolve to another origin are rejected.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>> {
        self.assets
            .iter()
            .map(|asset| {
                let url = origin.join(asset).map_err(|e| MuninnError::InvalidUrl {
                    url: asset.clone(),
                    message: e.to_string(),
                })?;
                if url.origin() != origin.origin() {
                    return Err(MuninnError::InvalidUrl {
                        url: asset.clone(),
                        message: format!("not same-origin with {origin}"),
                    });
                }
                Ok(url)
            })
            .collect()
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::site_default()
    }
}
