use config::{Config, File};
use overlay_error::OVResult;
use serde::{self, Deserialize, Serialize};
use std::{ops::Deref, sync::Arc, time::Duration};
use sysinfo::System;

use crate::constants::{DATA_DIR, ENV_PREFIX};

#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    pub fn new(config_path: String) -> OVResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path.as_str()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("web.cors.whitelist.origins")
                    .with_list_parse_key("web.cors.whitelist.methods")
                    .with_list_parse_key("web.cors.whitelist.headers"),
            );
        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }

    /// Build settings from already-parsed values, bypassing file and environment sources.
    pub fn from_inner(inner: Inner) -> Self {
        Self(Arc::new(inner))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_inner(Inner::default())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Inner {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub web: Web,
    #[serde(default)]
    pub db: Db,
    #[serde(default)]
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct General {
    /// Runtime root directory for all relative paths.
    ///
    /// `./data` and `./logs` resolve against it; the process changes its
    /// working directory here at startup.
    ///
    /// Environment override: `OV__GENERAL__RUNTIME_DIR=/var/lib/overlay`
    #[serde(default = "General::runtime_dir_default")]
    pub runtime_dir: String,
    /// `trace`, `debug`, `info`, `warn` or `error`. Unset means `debug` in
    /// debug builds and `info` otherwise.
    ///
    /// Environment override: `OV__GENERAL__LOG_LEVEL=warn`
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for General {
    fn default() -> Self {
        General {
            runtime_dir: General::runtime_dir_default(),
            log_level: None,
        }
    }
}

impl General {
    fn runtime_dir_default() -> String {
        ".".into()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Web {
    #[serde(default = "Web::router_prefix_default")]
    pub router_prefix: String,
    #[serde(default = "Web::host_default")]
    pub host: String,
    #[serde(default = "Web::port_default")]
    pub port: u16,
    #[serde(default = "Web::workers_default")]
    pub workers: i32,
    /// Upper bound for an uploaded overlay image, in bytes.
    #[serde(default = "Web::max_upload_bytes_default")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub cors: Cors,
}

impl Default for Web {
    fn default() -> Self {
        Web {
            router_prefix: Web::router_prefix_default(),
            host: Web::host_default(),
            port: Web::port_default(),
            workers: Web::workers_default(),
            max_upload_bytes: Web::max_upload_bytes_default(),
            cors: Default::default(),
        }
    }
}

impl Web {
    fn router_prefix_default() -> String {
        "/api".into()
    }

    fn port_default() -> u16 {
        8090
    }

    fn host_default() -> String {
        "0.0.0.0".into()
    }

    fn workers_default() -> i32 {
        0 // CPU count
    }

    fn max_upload_bytes_default() -> usize {
        10 * 1024 * 1024
    }

    /// Get actual number of workers based on configuration
    pub fn get_worker_count(&self) -> usize {
        match self.workers {
            0 => System::new_all().cpus().len().max(1),
            n if n > 0 => n as usize,
            n => std::cmp::max(
                1,
                (System::new_all().cpus().len() as i32 / n.abs()) as usize,
            ),
        }
    }
}

#[derive(Default, Debug, Clone, Deserialize, Serialize)]
pub struct Cors {
    #[serde(default)]
    pub mode: CorsMode,
    #[serde(default)]
    pub whitelist: Whitelist,
}

#[derive(Default, Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorsMode {
    #[default]
    AllowAll,
    Whitelist,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Whitelist {
    #[serde(default = "Whitelist::origins_default")]
    pub origins: Vec<String>,
    #[serde(default = "Whitelist::methods_default")]
    pub methods: Vec<String>,
    #[serde(default = "Whitelist::headers_default")]
    pub headers: Vec<String>,
}

impl Default for Whitelist {
    fn default() -> Self {
        Whitelist {
            origins: Whitelist::origins_default(),
            methods: Whitelist::methods_default(),
            headers: Whitelist::headers_default(),
        }
    }
}

impl Whitelist {
    fn origins_default() -> Vec<String> {
        vec!["*".into()]
    }

    fn methods_default() -> Vec<String> {
        vec![
            "GET".into(),
            "POST".into(),
            "PUT".into(),
            "PATCH".into(),
            "DELETE".into(),
        ]
    }

    fn headers_default() -> Vec<String> {
        vec!["Content-Type".into(), "If-None-Match".into()]
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Db {
    #[serde(default)]
    pub sqlite: Sqlite,
}

/// SQL database type enum
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    #[default]
    Sqlite,
}

/// Database configuration: where the file lives and how to connect to it.
pub trait DbConfig: Send + Sync {
    /// Returns the type of SQL database.
    fn db_type(&self) -> SqlType;

    /// Returns the database file path.
    fn db_path(&self) -> String;

    /// Generates a URL for the database connection.
    fn to_url(&self) -> String;

    /// Returns the directory containing the database file.
    fn db_dir(&self) -> String;

    /// Whether the database lives only in memory.
    fn is_memory(&self) -> bool;
}

pub const SQLITE_MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Sqlite {
    #[serde(default = "Sqlite::path_default")]
    pub path: String,
    #[serde(default = "Sqlite::timeout_default")]
    pub timeout: u64,
    #[serde(default = "Sqlite::idle_timeout_default")]
    pub idle_timeout: u64,
    #[serde(default = "Sqlite::max_lifetime_default")]
    pub max_lifetime: u64,
    #[serde(default = "Sqlite::max_connections_default")]
    pub max_connections: u32,
    #[serde(default = "Sqlite::auto_create_default")]
    pub auto_create: bool,
}

impl Default for Sqlite {
    fn default() -> Self {
        Sqlite {
            path: Sqlite::path_default(),
            timeout: Sqlite::timeout_default(),
            idle_timeout: Sqlite::idle_timeout_default(),
            max_lifetime: Sqlite::max_lifetime_default(),
            max_connections: Sqlite::max_connections_default(),
            auto_create: Sqlite::auto_create_default(),
        }
    }
}

impl DbConfig for Sqlite {
    fn db_type(&self) -> SqlType {
        SqlType::Sqlite
    }

    fn db_path(&self) -> String {
        self.path.clone()
    }

    fn to_url(&self) -> String {
        if self.is_memory() {
            return "sqlite::memory:".into();
        }
        if self.auto_create {
            // mode=rwc creates the file when missing
            format!("sqlite:{}/{}?mode=rwc", DATA_DIR, self.path)
        } else {
            format!("sqlite:{}/{}", DATA_DIR, self.path)
        }
    }

    fn db_dir(&self) -> String {
        DATA_DIR.into()
    }

    fn is_memory(&self) -> bool {
        self.path == SQLITE_MEMORY_PATH
    }
}

impl Sqlite {
    /// In-memory database, one pooled connection so every query sees the same data.
    pub fn memory() -> Self {
        Sqlite {
            path: SQLITE_MEMORY_PATH.into(),
            max_connections: 1,
            ..Default::default()
        }
    }

    fn path_default() -> String {
        "overlay.db".into()
    }

    fn timeout_default() -> u64 {
        5000
    }

    fn idle_timeout_default() -> u64 {
        5000
    }

    fn max_lifetime_default() -> u64 {
        5000
    }

    fn max_connections_default() -> u32 {
        16
    }

    fn auto_create_default() -> bool {
        true
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OverlaySettings {
    /// Quiet period after the last parameter edit before the draft is persisted.
    #[serde(default = "OverlaySettings::param_debounce_ms_default")]
    pub param_debounce_ms: u64,
    /// Buffer size of the change hub; slower subscribers re-fetch after lagging.
    #[serde(default = "OverlaySettings::hub_capacity_default")]
    pub hub_capacity: usize,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        OverlaySettings {
            param_debounce_ms: OverlaySettings::param_debounce_ms_default(),
            hub_capacity: OverlaySettings::hub_capacity_default(),
        }
    }
}

impl OverlaySettings {
    fn param_debounce_ms_default() -> u64 {
        600
    }

    fn hub_capacity_default() -> usize {
        256
    }

    #[inline]
    pub fn param_debounce(&self) -> Duration {
        Duration::from_millis(self.param_debounce_ms)
    }
}
