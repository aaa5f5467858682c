//! Process-wide settings.
//!
//! Settings are layered from built-in defaults, an optional configuration file
//! and `DOCMAP_*` environment variables (e.g. `DOCMAP_ALLOW_DYNAMIC_FIELDS=false`,
//! `DOCMAP_PERSISTENCE__FILE=docs.db`). A [`crate::session::Session`] snapshots
//! the process-wide settings when it is created.

use std::sync::RwLock;

use config::{Config, Environment, File};
use lazy_static::lazy_static;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::{DocmapError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Permits reading and writing attributes that no field declares.
    pub allow_dynamic_fields: bool,
    pub persistence: PersistenceMode,
    /// Filter handed to the tracing subscriber when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allow_dynamic_fields: true,
            persistence: PersistenceMode::InMemory,
            log_filter: String::from("docmap=info"),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Settings> {
        let mut builder = Config::builder()
            .set_default("allow_dynamic_fields", true)?
            .set_default("persistence", "in_memory")?
            .set_default("log_filter", "docmap=info")?;
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix("DOCMAP").separator("__"))
            .build()?;
        Ok(settings.try_deserialize::<Settings>()?)
    }
}

lazy_static! {
    static ref SETTINGS: RwLock<Settings> = RwLock::new(Settings::default());
}

pub fn current() -> Settings {
    match SETTINGS.read() {
        Ok(settings) => settings.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub fn configure(settings: Settings) -> Result<()> {
    let mut current = SETTINGS
        .write()
        .map_err(|e| DocmapError::Lock(e.to_string()))?;
    *current = settings;
    Ok(())
}

/// Installs a fmt subscriber; `RUST_LOG` wins over the configured filter.
/// Calling it more than once is harmless.
pub fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.clone()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
