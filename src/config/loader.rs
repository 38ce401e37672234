//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, merging of environment sections and process
//! environment overrides.

use super::error::{ConfigResult, ConfigurationError};
use super::AffinityConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CONFIG_FILE_NAMES: &[&str] = &["affinity.yaml", "affinity.yml"];
const ENVIRONMENT_SECTIONS: &[&str] = &["development", "test", "production"];
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Loaded configuration together with where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AffinityConfig,
    environment: String,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection.
    ///
    /// A missing configuration file is not fatal here: built-in defaults are
    /// used and environment overrides still apply.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        match Self::load_from_directory_with_env(None, &environment) {
            Err(ConfigurationError::ConfigFileNotFound { searched_paths }) => {
                warn!(
                    ?searched_paths,
                    "No configuration file found, using built-in defaults"
                );
                Self::from_defaults(&environment)
            }
            other => other,
        }
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config_file = Self::find_config_file(&config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;
        let mut config = Self::parse_with_environment(
            &yaml_content,
            environment,
            &config_file.display().to_string(),
        )?;
        Self::apply_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        info!(
            environment = environment,
            config_file = %config_file.display(),
            min_support = config.mining.min_support,
            scoring_method = config.scoring.method.as_deref().unwrap_or("confidence_x_lift"),
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            source: Some(config_file),
        }))
    }

    /// Defaults plus process environment overrides, no file involved
    pub fn from_defaults(environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        let mut config = AffinityConfig::default();
        Self::apply_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            source: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &AffinityConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// File the configuration was read from, `None` when built from defaults
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Parse YAML and merge the section named `environment` over the base values
    pub fn parse_with_environment(
        yaml_content: &str,
        environment: &str,
        origin: &str,
    ) -> ConfigResult<AffinityConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(origin, e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String((*section).to_string()));
            }
        }

        // An empty document parses as null; treat it as "all defaults"
        if yaml_data.is_null() {
            return Ok(AffinityConfig::default());
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                origin,
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Apply `MIN_SUPPORT`-style overrides using `lookup` to read variables
    pub fn apply_overrides<F>(config: &mut AffinityConfig, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            key: &str,
        ) -> ConfigResult<Option<T>>
        where
            T::Err: std::fmt::Display,
        {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                    ConfigurationError::environment_variable_error(
                        key,
                        format!("cannot parse '{raw}': {e}"),
                    )
                }),
            }
        }

        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        let mining = &mut config.mining;
        if let Some(v) = parsed(lookup, "MIN_SUPPORT")? {
            mining.min_support = v;
        }
        if let Some(v) = parsed(lookup, "MIN_CONFIDENCE")? {
            mining.min_confidence = v;
        }
        if let Some(v) = parsed(lookup, "MIN_LIFT")? {
            mining.min_lift = v;
        }
        if let Some(v) = parsed(lookup, "MAX_RECOMMENDATIONS")? {
            mining.max_recommendations = v;
        }
        if let Some(v) = parsed(lookup, "DECAY_RATE")? {
            mining.decay_rate = v;
        }
        if let Some(v) = parsed(lookup, "PIPELINE_TIMEOUT_SECONDS")? {
            mining.pipeline_timeout_seconds = v;
        }

        if let Some(method) = lookup("SCORING_METHOD") {
            config.scoring.method = Some(method);
        }
        let temporal = &mut config.scoring.temporal_weights;
        if let Some(v) = parsed(lookup, "TEMPORAL_CONFIDENCE_WEIGHT")? {
            temporal.confidence = v;
        }
        if let Some(v) = parsed(lookup, "TEMPORAL_LIFT_WEIGHT")? {
            temporal.lift = v;
        }
        if let Some(v) = parsed(lookup, "TEMPORAL_SUPPORT_WEIGHT")? {
            temporal.support = v;
        }
        if let Some(v) = parsed(lookup, "TEMPORAL_STABILITY_WEIGHT")? {
            temporal.stability = v;
        }
        if let Some(v) = parsed(lookup, "TEMPORAL_TREND_WEIGHT")? {
            temporal.trend = v;
        }

        if let Some(v) = parsed(lookup, "USE_TEMPORAL_SIGNALS")? {
            config.temporal.enabled = v;
        }
        if let Some(segmentation) = lookup("TIME_SEGMENTATION") {
            config.temporal.segmentation = segmentation;
        }

        let database = &mut config.database;
        if let Some(url) = lookup("DATABASE_URL") {
            database.url = Some(url);
        }
        if let Some(table) = lookup("ORDER_TABLE") {
            database.order_table = table;
        }
        if let Some(table) = lookup("ITEM_MASTER_TABLE") {
            database.item_master_table = table;
        }
        if let Some(table) = lookup("RECOMMENDATIONS_TABLE") {
            database.recommendations_table = table;
        }

        Ok(())
    }

    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!("Configuration file larger than {MAX_CONFIG_FILE_SIZE} bytes"),
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    fn detect_environment() -> String {
        env::var("AFFINITY_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("AFFINITY_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }
}
