//! Layered configuration for the dashboard.
//!
//! Settings are resolved from, lowest to highest priority:
//! 1. defaults embedded in the structs,
//! 2. the TOML file (`config/finparcel.toml`, or `FINPARCEL_CONFIG`),
//! 3. a `.env` file,
//! 4. environment variables such as `FINPARCEL__POSTI__PASSWORD`.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File};
use finparcel_core::{Carriers, Credentials, RunConfig};
use serde::Deserialize;
use tracing::{debug, info, warn};

const CONFIG_ENV_VAR: &str = "FINPARCEL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/finparcel.toml";
const ENV_PREFIX: &str = "FINPARCEL";
const ENV_SEPARATOR: &str = "__";

/// Number of translated labels, one per status except `Unknown`.
const STATUS_LABELS: usize = 7;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub posti: AccountConfig,
    pub matkahuolto: AccountConfig,
    /// Maximum number of parcels shown, 0 for all.
    pub limit: usize,
    /// Minutes between scheduled refreshes.
    pub update_interval: u64,
    /// Hide delivered parcels after this many days; negative shows them forever.
    pub show_delivered_days: i64,
    pub language: String,
    pub show_from_to: bool,
    pub log_dir: PathBuf,
    pub translations: Translations,
    /// Where the settings came from, reported once logging is up.
    #[serde(skip)]
    pub origin: ConfigOrigin,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ConfigOrigin {
    /// File that was looked up.
    pub path: PathBuf,
    pub file_found: bool,
    /// Why no `.env` file was loaded, if none was.
    pub dotenv_error: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            posti: AccountConfig::default(),
            matkahuolto: AccountConfig::default(),
            limit: 7,
            update_interval: 180,
            show_delivered_days: 7,
            language: "en".to_owned(),
            show_from_to: true,
            log_dir: PathBuf::from("logs"),
            translations: Translations::default(),
            origin: ConfigOrigin::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AccountConfig {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Translations {
    /// Labels for `Delivered` through `Exception`, in taxonomy order.
    pub statuses: Vec<String>,
    pub loading: String,
    pub no_parcels: String,
    pub error: String,
}

impl Default for Translations {
    fn default() -> Self {
        Self {
            statuses: [
                "Delivered",
                "Info received",
                "Pending",
                "In transit",
                "Being delivered",
                "Ready for pickup",
                "Exception",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            loading: "Loading parcel data...".to_owned(),
            no_parcels: "No parcel data found".to_owned(),
            error: "Error loading parcel data".to_owned(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default sources.
    ///
    /// Runs before logging exists, so nothing is logged here; see [`Self::log_origin`].
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let dotenv_error = dotenvy::dotenv().err().map(|err| err.to_string());

        let path = env::var(CONFIG_ENV_VAR)
            .map_or_else(|_missing| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

        let mut config = Self::load_from_path(&path)?;
        config.origin.dotenv_error = dotenv_error;
        Ok(config)
    }

    /// Load configuration from a specific file plus environment overrides.
    pub(crate) fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::load_layers(path, environment())
    }

    fn load_layers(path: &Path, environment: Environment) -> Result<Self, ConfigError> {
        let file_found = path.exists();
        let mut builder = config::Config::builder();
        if file_found {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(environment);

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        config.origin.path = path.to_path_buf();
        config.origin.file_found = file_found;
        Ok(config)
    }

    /// Report where the settings were loaded from.
    pub(crate) fn log_origin(&self) {
        let origin = &self.origin;
        if let Some(err) = &origin.dotenv_error {
            debug!(error = %err, "No .env file loaded");
        }
        if origin.file_found {
            info!("Loaded configuration from: {}", origin.path.display());
        } else {
            warn!(
                "Configuration file not found at {}, using defaults and environment overrides",
                origin.path.display()
            );
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval == 0 {
            return Err(ConfigError::Invalid(
                "update_interval must be at least one minute".to_owned(),
            ));
        }
        if self.translations.statuses.len() != STATUS_LABELS {
            return Err(ConfigError::Invalid(format!(
                "translations.statuses needs {STATUS_LABELS} entries, found {}",
                self.translations.statuses.len()
            )));
        }
        if self.language.trim().is_empty() {
            return Err(ConfigError::Invalid("language must not be empty".to_owned()));
        }
        Ok(())
    }

    /// Per-run settings handed to the pipeline.
    pub(crate) fn run_config(&self) -> RunConfig {
        RunConfig {
            language: self.language.trim().to_owned(),
            limit: self.limit,
            show_delivered_days: self.show_delivered_days,
            ..RunConfig::default()
        }
        .with_credentials(Carriers::Posti, self.posti.credentials())
        .with_credentials(Carriers::Matkahuolto, self.matkahuolto.credentials())
    }

    pub(crate) fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval.saturating_mul(60))
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

impl AccountConfig {
    fn credentials(&self) -> Credentials {
        Credentials::new(self.user_name.trim(), self.password.as_str())
    }
}
