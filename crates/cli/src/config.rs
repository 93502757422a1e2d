//! Configuration loading.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use inframan_core::OrchestratorConfig;

/// Load configuration with precedence:
/// 1. Built-in defaults
/// 2. The configuration file, if given (TOML, YAML or JSON by extension)
/// 3. Environment variables (`INFRAMAN_<SECTION>__<KEY>`)
pub fn load(path: Option<&Path>) -> Result<OrchestratorConfig> {
    build(path, None)
}

fn build(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<OrchestratorConfig> {
    let defaults = Config::try_from(&OrchestratorConfig::default())
        .context("failed to serialize default configuration")?;
    let mut builder = Config::builder().add_source(defaults);

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("INFRAMAN")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env),
    );

    let config = builder
        .build()
        .with_context(|| match path {
            Some(path) => format!("failed to load configuration from {}", path.display()),
            None => "failed to load configuration".to_string(),
        })?;
    Ok(config.try_deserialize()?)
}
