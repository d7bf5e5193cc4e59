use chrono::Local;
use log::{error, info};
use groove::config::utils::load_config_with_details;
use groove::judgment::JudgmentBatcher;
use groove::lastfm::{genre_summary, EnrichmentSource, LastFmClient};
use groove::playlist_exporter::PlaylistExporter;
use groove::spotify_client::SpotifyClient;
use groove::PartyPipeline;

fn main() {
    // Load .env file if it exists
    let _ = dotenv::dotenv();

    // Initialize logging
    env_logger::init();

    info!("Music style analysis (no AI validation)");

    let config = match load_config_with_details() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let spotify = match SpotifyClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to Spotify: {}", e);
            std::process::exit(1);
        }
    };

    let enrichment: Option<Box<dyn EnrichmentSource>> = match &config.lastfm_api_key {
        Some(api_key) if config.enrichment_enabled() => match LastFmClient::new(api_key.clone()) {
            Ok(client) => Some(Box::new(client)),
            Err(e) => {
                error!("Last.fm enrichment disabled: {}", e);
                None
            }
        },
        _ => None,
    };

    let exporter = PlaylistExporter::from_config(&config);
    let pipeline = PartyPipeline::new(config, Box::new(spotify), enrichment, JudgmentBatcher::new(None));

    let analysis = match pipeline.analyze() {
        Ok(analysis) => analysis,
        Err(e) => {
            error!("Analysis failed: {}", e);
            std::process::exit(1);
        }
    };

    info!("");
    info!("Music Style Clusters:");
    for cluster in &analysis.clusters {
        info!(
            "  Cluster {}: {} ({} tracks, {})",
            cluster.cluster_id,
            cluster.style_description,
            cluster.size,
            cluster.era_formatted()
        );
        for sample in &cluster.sample_tracks {
            info!("    - {} by {}", sample.name, sample.artist);
        }
    }
    if analysis.excluded > 0 {
        info!("{} tracks were left out for missing features", analysis.excluded);
    }

    let genres = genre_summary(&analysis.tracks);
    if !genres.is_empty() {
        info!("");
        info!("Top genres:");
        for (genre, count) in genres.iter().take(10) {
            info!("  {}: {} tracks", genre, count);
        }
    }

    match exporter.export_report(&analysis.tracks, &analysis.clusters, &Local::now()) {
        Ok(path) => info!("Analysis report saved to {}", path.display()),
        Err(e) => {
            error!("Failed to write analysis report: {}", e);
            std::process::exit(1);
        }
    }
}
