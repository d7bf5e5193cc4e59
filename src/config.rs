use crate::error::{ConfigError, ConfigResult};
use crate::models::{FeatureColumn, PipelineConfig};
use std::env;
use std::str::FromStr;
use url::Url;

/// Configuration manager trait for loading and validating pipeline configuration
pub trait ConfigManager {
    /// Load configuration from environment variables
    fn load_config() -> ConfigResult<PipelineConfig>;

    /// Validate a loaded configuration
    fn validate_config(config: &PipelineConfig) -> ConfigResult<()> {
        config.validate().map_err(ConfigError::ValidationFailed)
    }
}

/// Default configuration manager implementation
pub struct DefaultConfigManager;

impl DefaultConfigManager {
    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn load_config_from<F>(lookup: F) -> ConfigResult<PipelineConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            var(name).ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: name.to_string(),
            })
        };

        let defaults = PipelineConfig::default();

        let oracle_base_url = var("ORACLE_BASE_URL").unwrap_or(defaults.oracle_base_url);
        Url::parse(&oracle_base_url).map_err(|_| ConfigError::InvalidValue {
            field: "ORACLE_BASE_URL".to_string(),
            value: oracle_base_url.clone(),
        })?;

        let feature_columns = match var("CLUSTER_FEATURES") {
            Some(raw) => split_list(&raw)
                .iter()
                .map(|name| {
                    FeatureColumn::from_str(name).map_err(|_| ConfigError::InvalidValue {
                        field: "CLUSTER_FEATURES".to_string(),
                        value: name.clone(),
                    })
                })
                .collect::<ConfigResult<Vec<_>>>()?,
            None => defaults.feature_columns,
        };

        let config = PipelineConfig {
            spotify_client_id: required("SPOTIFY_CLIENT_ID")?,
            spotify_client_secret: required("SPOTIFY_CLIENT_SECRET")?,
            spotify_refresh_token: required("SPOTIFY_REFRESH_TOKEN")?,
            oracle_api_key: var("DEEPSEEK_API_KEY"),
            oracle_base_url,
            oracle_model: var("ORACLE_MODEL").unwrap_or(defaults.oracle_model),
            oracle_timeout_secs: parse_or(&var, "ORACLE_TIMEOUT_SECS", defaults.oracle_timeout_secs)?,
            lastfm_api_key: var("LASTFM_API_KEY"),
            skip_lastfm: parse_flag(&var, "SKIP_LASTFM", defaults.skip_lastfm)?,
            track_limit: parse_or(&var, "TRACK_LIMIT", defaults.track_limit)?,
            cluster_count: parse_or(&var, "CLUSTER_COUNT", defaults.cluster_count)?,
            pca_components: parse_or(&var, "PCA_COMPONENTS", defaults.pca_components)?,
            feature_columns,
            high_energy_keywords: var("HIGH_ENERGY_KEYWORDS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.high_energy_keywords),
            low_energy_keywords: var("LOW_ENERGY_KEYWORDS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.low_energy_keywords),
            validation_batch_size: parse_or(&var, "VALIDATION_BATCH_SIZE", defaults.validation_batch_size)?,
            min_party_score: parse_or(&var, "MIN_PARTY_SCORE", defaults.min_party_score)?,
            enrichment_delay_ms: parse_or(&var, "ENRICHMENT_DELAY_MS", defaults.enrichment_delay_ms)?,
            output_dir: var("OUTPUT_DIR").unwrap_or(defaults.output_dir),
            create_spotify_playlist: parse_flag(
                &var,
                "CREATE_SPOTIFY_PLAYLIST",
                defaults.create_spotify_playlist,
            )?,
            max_retry_attempts: parse_or(&var, "MAX_RETRY_ATTEMPTS", defaults.max_retry_attempts)?,
            retry_base_delay_ms: parse_or(&var, "RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms)?,
            retry_max_delay_ms: parse_or(&var, "RETRY_MAX_DELAY_MS", defaults.retry_max_delay_ms)?,
        };

        Self::validate_config(&config)?;

        Ok(config)
    }
}

impl ConfigManager for DefaultConfigManager {
    fn load_config() -> ConfigResult<PipelineConfig> {
        Self::load_config_from(|name| env::var(name).ok())
    }
}

fn parse_or<T, F>(var: &F, name: &str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            field: name.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

fn parse_flag<F>(var: &F, name: &str, default: bool) -> ConfigResult<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw,
            }),
        },
        None => Ok(default),
    }
}

/// Split a comma-separated list, dropping blanks
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Utility functions for configuration management
pub mod utils {
    use super::*;

    /// Load configuration with detailed error reporting
    pub fn load_config_with_details() -> ConfigResult<PipelineConfig> {
        // Load .env file if it exists
        let _ = dotenv::dotenv();

        match DefaultConfigManager::load_config() {
            Ok(config) => {
                log::info!("Configuration loaded successfully");
                log::debug!("Track limit: {}", config.track_limit);
                log::debug!("Cluster count: {}", config.cluster_count);
                log::debug!(
                    "Cluster features: {}",
                    config
                        .feature_columns
                        .iter()
                        .map(|c| c.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                log::debug!("Validation batch size: {}", config.validation_batch_size);
                log::debug!("Minimum party score: {}", config.min_party_score);
                if config.oracle_api_key.is_none() {
                    log::warn!("DEEPSEEK_API_KEY not set - AI validation will use fallback scores");
                }
                if !config.enrichment_enabled() {
                    log::info!("Last.fm enrichment disabled");
                }
                Ok(config)
            }
            Err(e) => {
                log::error!("Failed to load configuration: {:?}", e);
                match &e {
                    ConfigError::MissingEnvironmentVariable { var_name } => {
                        log::error!("Please set the {} environment variable", var_name);
                    }
                    ConfigError::InvalidValue { field, value } => {
                        log::error!("Invalid value '{}' for field '{}'", value, field);
                    }
                    ConfigError::ValidationFailed(msg) => {
                        log::error!("Configuration validation failed: {}", msg);
                    }
                }
                Err(e)
            }
        }
    }

    /// Print configuration template for environment variables
    pub fn print_config_template() {
        println!("# Party Playlist Generator Configuration Template");
        println!("# Copy these environment variables and set appropriate values");
        println!();
        println!("export SPOTIFY_CLIENT_ID=\"your_spotify_client_id_here\"");
        println!("export SPOTIFY_CLIENT_SECRET=\"your_spotify_client_secret_here\"");
        println!("export SPOTIFY_REFRESH_TOKEN=\"your_spotify_refresh_token_here\"");
        println!();
        println!("# Optional collaborators:");
        println!("export DEEPSEEK_API_KEY=\"your_deepseek_api_key_here\"  # AI validation");
        println!("export LASTFM_API_KEY=\"your_lastfm_api_key_here\"      # tag enrichment");
        println!();
        println!("# Optional configuration (with defaults):");
        println!("export ORACLE_BASE_URL=\"https://api.deepseek.com\"");
        println!("export ORACLE_MODEL=\"deepseek-chat\"");
        println!("export ORACLE_TIMEOUT_SECS=\"60\"");
        println!("export SKIP_LASTFM=\"false\"");
        println!("export TRACK_LIMIT=\"100\"");
        println!("export CLUSTER_COUNT=\"5\"");
        println!("export PCA_COMPONENTS=\"5\"");
        println!("export CLUSTER_FEATURES=\"popularity,duration_ms,release_year,name_energy,artist_popularity\"");
        println!("export HIGH_ENERGY_KEYWORDS=\"dance,party,electric,beat,club,remix,uptempo,energy,pump,groove\"");
        println!("export LOW_ENERGY_KEYWORDS=\"ballad,acoustic,slow,quiet,piano,soft,gentle,lullaby,ambient\"");
        println!("export VALIDATION_BATCH_SIZE=\"10\"");
        println!("export MIN_PARTY_SCORE=\"6.0\"");
        println!("export ENRICHMENT_DELAY_MS=\"200\"");
        println!("export OUTPUT_DIR=\"output\"");
        println!("export CREATE_SPOTIFY_PLAYLIST=\"false\"");
        println!("export MAX_RETRY_ATTEMPTS=\"3\"");
        println!("export RETRY_BASE_DELAY_MS=\"1000\"");
        println!("export RETRY_MAX_DELAY_MS=\"30000\"");
    }
}
