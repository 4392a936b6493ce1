//! Configuration for the server
//!
//! The config is usually loaded from a TOML file with [`Config::load`]. Every
//! field has a default suitable for local development, so an empty file (or
//! no file at all) is a valid config.
//!
//! ```toml
//! bind_addr = "0.0.0.0:8000"
//! max_body_bytes = 1048576
//!
//! [store]
//! kind = "mongodb"
//! url = "mongodb://localhost:27017"
//! database = "Next_JS_Portfolio"
//!
//! [store.collections]
//! blogs = "AI_Blogs"
//! users = "mycollection"
//! counters = "ip_requests"
//!
//! [cors]
//! allow_origins = ["http://localhost:3000"]
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tower_http::cors::CorsLayer;

use crate::middleware::cors_layer;
use crate::router::DEFAULT_BODY_LIMIT;
use crate::store::{self, Store};

/// Overrides [`StoreConfig::url`] when set.
pub const MONGODB_URL_ENV: &str = "MONGODB_CONNECTION_URL";

const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000);

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub bind_addr: SocketAddr,
    /// Request bodies longer than this are rejected with `413`.
    pub max_body_bytes: usize,
    pub store: StoreConfig,
    pub cors: CorsConfig,
}

/// Which document store backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Mongodb,
    /// In-process store. Data is lost on exit.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// MongoDB connection string. Ignored for [`StoreKind::Memory`].
    pub url: String,
    pub database: String,
    pub collections: CollectionNames,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionNames {
    pub blogs: String,
    pub users: String,
    pub counters: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to make cross-origin requests.
    pub allow_origins: Vec<String>,
}

impl Config {
    /// Load the config from a file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Config> {
        let s = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("failed to read {}", path.as_ref().to_string_lossy()))?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> Result<Config> {
        toml::from_str(s).context("invalid config")
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(MONGODB_URL_ENV).filter(|u| !u.is_empty()) {
            self.store.url = url;
        }
    }

    /// Opens the configured store.
    pub async fn open_store(&self) -> store::Result<Store> {
        match self.store.kind {
            StoreKind::Mongodb => Store::mongodb(&self.store.url, &self.store.database).await,
            StoreKind::Memory => Ok(Store::in_memory()),
        }
    }

    /// Builds the CORS layer for the configured origins.
    pub fn cors(&self) -> Result<CorsLayer> {
        cors_layer(&self.cors.allow_origins)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            max_body_bytes: DEFAULT_BODY_LIMIT,
            store: StoreConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Mongodb,
            url: "mongodb://localhost:27017".to_string(),
            database: "Next_JS_Portfolio".to_string(),
            collections: CollectionNames::default(),
        }
    }
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            blogs: "AI_Blogs".to_string(),
            users: "mycollection".to_string(),
            counters: "ip_requests".to_string(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "https://malcmind.com".to_string(),
            ],
        }
    }
}
