//! Loader configuration.
//!
//! Defaults reproduce the layout of a stock device install; a TOML file or
//! environment variables can override any of them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default configuration values.
pub mod defaults {
    pub const PRIMARY_LIBRARY: &str = "libcgkit_plugin_offlineSupRes.so";

    pub const SYSTEM_PATHS: &[&str] = &[
        "/system/lib64",
        "/vendor/lib64",
        "/vendor/lib64/hw",
        "/system/vendor/lib64",
    ];

    pub const APP_PATHS: &[&str] = &[
        "/data/app/~~*/dev.eden.eden_emulator*/lib/arm64",
        "/data/data/dev.eden.eden_emulator/lib",
    ];

    /// Graphics core, AI core, AI infrastructure.
    pub const AUXILIARY_LIBRARIES: &[&str] =
        &["libigs_client.so", "libai_client.so", "libai_infra.so"];

    pub const ASSETS_DIR: &str = "/data/data/dev.eden.eden_emulator/assets/huawei_osr";
}

/// Environment variable names.
pub mod env_vars {
    pub const PRIMARY_LIBRARY: &str = "OSRKIT_PRIMARY_LIBRARY";
    pub const ASSETS_DIR: &str = "OSRKIT_ASSETS_DIR";
    pub const CONFIG: &str = "OSRKIT_CONFIG";
    pub const LOG_JSON: &str = "OSRKIT_LOG_JSON";
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Everything the session needs to find and set up the plugin chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Logical name of the primary plugin library.
    pub primary_library: String,
    /// Roots searched for auxiliary libraries, in order.
    pub system_paths: Vec<String>,
    /// Roots searched for the primary library, in order.
    pub app_paths: Vec<String>,
    /// Libraries primed into the global namespace before the primary.
    pub auxiliary_libraries: Vec<String>,
    /// Passed to the plugin's assets setup entry point.
    pub assets_dir: String,
    /// Exact-match redirections added to the built-in table.
    pub extra_redirects: BTreeMap<String, String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            primary_library: defaults::PRIMARY_LIBRARY.to_string(),
            system_paths: strings(defaults::SYSTEM_PATHS),
            app_paths: strings(defaults::APP_PATHS),
            auxiliary_libraries: strings(defaults::AUXILIARY_LIBRARIES),
            assets_dir: defaults::ASSETS_DIR.to_string(),
            extra_redirects: BTreeMap::new(),
        }
    }
}

impl LoaderConfig {
    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `OSRKIT_PRIMARY_LIBRARY` and `OSRKIT_ASSETS_DIR` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(primary) = non_empty_env(env_vars::PRIMARY_LIBRARY) {
            self.primary_library = primary;
        }
        if let Some(assets) = non_empty_env(env_vars::ASSETS_DIR) {
            self.assets_dir = assets;
        }
        self
    }

    pub fn with_primary_library(mut self, name: impl Into<String>) -> Self {
        self.primary_library = name.into();
        self
    }

    pub fn with_system_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.system_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_app_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.app_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auxiliary_libraries<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auxiliary_libraries = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_assets_dir(mut self, dir: impl Into<String>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    pub fn with_redirect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.extra_redirects.insert(from.into(), to.into());
        self
    }

    /// Reject configurations the loader cannot act on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_library_name("primary_library", &self.primary_library)?;
        for name in &self.auxiliary_libraries {
            check_library_name("auxiliary_libraries", name)?;
        }
        for (from, to) in &self.extra_redirects {
            check_library_name("extra_redirects", from)?;
            check_library_name("extra_redirects", to)?;
        }
        if self.assets_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("assets_dir must not be empty".into()));
        }
        if self.assets_dir.contains('\0') {
            return Err(ConfigError::Invalid("assets_dir contains a NUL byte".into()));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn check_library_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{} contains an empty name", field)));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(ConfigError::Invalid(format!(
            "{}: '{}' must be a bare file name",
            field, name
        )));
    }
    Ok(())
}
