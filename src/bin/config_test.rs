use log::{error, info, warn};
use groove::config::utils::{load_config_with_details, print_config_template};

fn masked(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}*** (length: {})", prefix, secret.len())
}

fn main() {
    // Load .env file if it exists
    let _ = dotenv::dotenv();

    // Initialize logging
    env_logger::init();

    info!("Party Playlist Configuration Validator");
    info!("======================================");

    if std::path::Path::new(".env").exists() {
        info!("✅ .env file found");
    } else {
        warn!("⚠️  .env file not found - using system environment variables");
    }

    match load_config_with_details() {
        Ok(config) => {
            info!("✅ Configuration loaded successfully!");
            info!("");
            info!("Configuration Summary:");
            info!("=====================");

            info!("Spotify Configuration:");
            info!("  Client ID: {}", config.spotify_client_id);
            info!("  Client Secret: {}", masked(&config.spotify_client_secret));
            info!("  Refresh Token: {}", masked(&config.spotify_refresh_token));

            info!("");
            info!("AI Validation:");
            match &config.oracle_api_key {
                Some(key) => info!("  API Key: {}", masked(key)),
                None => info!("  API Key: not set (fallback scores)"),
            }
            info!("  Endpoint: {}", config.oracle_base_url);
            info!("  Model: {}", config.oracle_model);
            info!("  Timeout: {}s", config.oracle_timeout_secs);
            info!("  Batch Size: {}", config.validation_batch_size);
            info!("  Minimum Party Score: {}", config.min_party_score);

            info!("");
            info!("Last.fm Enrichment:");
            match &config.lastfm_api_key {
                Some(key) => info!("  API Key: {}", masked(key)),
                None => info!("  API Key: not set"),
            }
            info!("  Enabled: {}", config.enrichment_enabled());
            info!("  Request Delay: {}ms", config.enrichment_delay_ms);

            info!("");
            info!("Clustering:");
            info!("  Track Limit: {}", config.track_limit);
            info!("  Clusters: {}", config.cluster_count);
            info!("  PCA Components: {}", config.pca_components);
            let features: Vec<&str> = config.feature_columns.iter().map(|c| c.name()).collect();
            info!("  Features: {}", features.join(", "));
            info!("  High-energy keywords: {}", config.high_energy_keywords.join(", "));
            info!("  Low-energy keywords: {}", config.low_energy_keywords.join(", "));

            info!("");
            info!("Output:");
            info!("  Directory: {}", config.output_dir);
            info!("  Create Spotify Playlist: {}", config.create_spotify_playlist);
            info!("  Max Retry Attempts: {}", config.max_retry_attempts);
            info!("  Base Retry Delay: {}ms", config.retry_base_delay_ms);
            info!("  Max Retry Delay: {}ms", config.retry_max_delay_ms);

            info!("");
            info!("Validation Checks:");
            info!("=================");
            let mut warnings = 0;

            if config.spotify_client_id.len() != 32 {
                warn!("⚠️  Spotify client ID is not 32 characters - this might be incorrect");
                warnings += 1;
            } else {
                info!("✅ Spotify client ID format looks correct");
            }

            if config.spotify_client_secret.len() != 32 {
                warn!("⚠️  Spotify client secret is not 32 characters - this might be incorrect");
                warnings += 1;
            } else {
                info!("✅ Spotify client secret format looks correct");
            }

            if !config.spotify_refresh_token.starts_with("AQ") {
                warn!("⚠️  Spotify refresh token doesn't start with 'AQ' - this might be incorrect");
                warnings += 1;
            } else {
                info!("✅ Spotify refresh token format looks correct");
            }

            if config.cluster_count > config.track_limit {
                warn!(
                    "⚠️  {} clusters cannot be formed from at most {} tracks",
                    config.cluster_count, config.track_limit
                );
                warnings += 1;
            }

            if config.min_party_score > 10.0 {
                warn!("⚠️  Minimum party score is above 10 - only 'yes' recommendations will be selected");
                warnings += 1;
            }

            info!("");
            if warnings == 0 {
                info!("🎉 All configuration checks passed!");
            } else {
                warn!("⚠️  {} warning(s) found - these might cause issues", warnings);
            }
        }
        Err(e) => {
            error!("❌ Configuration validation failed: {}", e);
            error!("");
            error!("Expected environment variables:");
            print_config_template();
            std::process::exit(1);
        }
    }
}
