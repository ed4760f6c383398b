// Configuration loading for Rampart resilience components

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;

pub use env::{DEFAULT_PREFIX, EnvOverlay};
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{BreakerSettings, CacheSettings, RateLimitSettings, ResilienceSettings, RetrySettings, Validate};

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where to read a `.env` file from.
#[derive(Debug, Clone)]
enum Dotenv {
    Skip,
    Discover,
    Path(PathBuf),
}

/// Load a `.env` file into the process environment.
///
/// With no path, a missing `.env` is not an error.
pub fn load_dotenv(path: Option<&Path>) -> ConfigResult<()> {
    if let Some(path) = path {
        dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
    } else {
        dotenvy::dotenv().ok();
    }
    Ok(())
}

/// Builds a [`ResilienceSettings`] from a file, `.env` and the environment.
///
/// Sources are layered: file values first, then `PREFIX_*` variables from an
/// env-format file, then process environment variables.
///
/// ```rust,no_run
/// use rampart_config::SettingsLoader;
///
/// let settings = SettingsLoader::new()
///     .file("rampart.toml")
///     .dotenv()
///     .load()
///     .unwrap();
/// let breaker = settings.breaker_config("payments");
/// ```
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    overlay: Option<EnvOverlay>,
    dotenv: Dotenv,
}

impl SettingsLoader {
    /// Loader that reads `RAMPART_*` variables and no file.
    pub fn new() -> Self {
        Self {
            file: None,
            overlay: Some(EnvOverlay::default()),
            dotenv: Dotenv::Skip,
        }
    }

    /// Read a TOML, JSON or env file; the format follows the file name.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.overlay = Some(EnvOverlay::new(prefix));
        self
    }

    /// Ignore process environment variables.
    pub fn without_env(mut self) -> Self {
        self.overlay = None;
        self
    }

    /// Load `.env` from the working directory (or a parent) if one exists.
    pub fn dotenv(mut self) -> Self {
        self.dotenv = Dotenv::Discover;
        self
    }

    /// Load a specific `.env` file; a missing file is an error.
    pub fn dotenv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv = Dotenv::Path(path.into());
        self
    }

    /// Resolve, deserialize and validate the settings.
    pub fn load(&self) -> ConfigResult<ResilienceSettings> {
        match &self.dotenv {
            Dotenv::Skip => {}
            Dotenv::Discover => load_dotenv(None)?,
            Dotenv::Path(path) => load_dotenv(Some(path))?,
        }

        let mut doc = Value::Object(serde_json::Map::new());
        if let Some(path) = &self.file {
            let loader = ConfigLoader::auto(path)?;
            let parsed = loader.load_file(path)?;
            if loader.format() == FileFormat::Env {
                let overlay = self.overlay.clone().unwrap_or_default();
                if let Value::Object(vars) = parsed {
                    let vars = vars
                        .into_iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k, v.to_string())));
                    overlay.apply_vars(&mut doc, vars)?;
                }
            } else {
                doc = parsed;
            }
        }

        if let Some(overlay) = &self.overlay {
            let applied = overlay.apply(&mut doc)?;
            debug!(prefix = overlay.prefix(), applied, "Applied environment overrides");
        }

        let settings = ResilienceSettings::from_value(doc)?;
        settings.validate()?;

        debug!(
            file = ?self.file,
            failure_threshold = settings.breaker.failure_threshold,
            max_retries = settings.retry.max_retries,
            "Loaded resilience settings"
        );
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}
