use groove::config::utils::load_config_with_details;
use groove::judgment::{JudgmentBatcher, ScoringOracle};
use groove::lastfm::{EnrichmentSource, LastFmClient};
use groove::models::PipelineConfig;
use groove::oracle::ChatOracle;
use groove::playlist_exporter::PlaylistExporter;
use groove::spotify_client::SpotifyClient;
use groove::validation_log::ValidationLog;
use groove::{PartyPipeline, PipelineResult};
use std::rc::Rc;

fn build_batcher(config: &PipelineConfig) -> PipelineResult<JudgmentBatcher> {
    let oracle = ChatOracle::from_config(config)?.map(|oracle| Box::new(oracle) as Box<dyn ScoringOracle>);
    let mut batcher = JudgmentBatcher::new(oracle);

    if batcher.is_available() {
        match ValidationLog::create(&config.output_dir) {
            Ok(log) => batcher = batcher.with_sink(Box::new(log)),
            Err(e) => log::warn!("Validation log disabled: {}", e),
        }
    }

    Ok(batcher)
}

fn build_enrichment(config: &PipelineConfig) -> Option<Box<dyn EnrichmentSource>> {
    if !config.enrichment_enabled() {
        return None;
    }

    let api_key = config.lastfm_api_key.clone()?;
    match LastFmClient::new(api_key) {
        Ok(client) => Some(Box::new(client)),
        Err(e) => {
            log::warn!("Last.fm enrichment disabled: {}", e);
            None
        }
    }
}

fn run(config: PipelineConfig) -> PipelineResult<()> {
    let spotify = Rc::new(SpotifyClient::from_config(&config)?);
    let batcher = build_batcher(&config)?;
    let enrichment = build_enrichment(&config);
    let exporter = PlaylistExporter::from_config(&config);
    let create_spotify_playlist = config.create_spotify_playlist;

    let pipeline = PartyPipeline::new(config, Box::new(Rc::clone(&spotify)), enrichment, batcher);
    let playlist = pipeline.run()?;

    if playlist.tracks.is_empty() {
        log::warn!("No tracks qualified for the party playlist");
    }

    let files = exporter.export_all(&playlist)?;
    log::info!("Playlist written to {}", files.text.display());
    log::info!("JSON written to {}", files.json.display());
    log::info!("Report written to {}", files.report.display());

    if create_spotify_playlist && !playlist.tracks.is_empty() {
        let description = format!(
            "{} tracks, {}",
            playlist.stats.total_tracks,
            playlist.stats.duration_formatted()
        );
        let track_ids: Vec<String> = playlist.tracks.iter().map(|t| t.id.clone()).collect();

        let created = spotify.create_playlist(exporter.name(), &description, false, &track_ids)?;
        log::info!(
            "Spotify playlist created: {}",
            created.url.as_deref().unwrap_or(&created.id)
        );
    }

    Ok(())
}

fn main() {
    // Load .env file if it exists
    let _ = dotenv::dotenv();

    // Initialize logging
    env_logger::init();

    // Load and validate configuration
    let config = match load_config_with_details() {
        Ok(config) => {
            log::info!("Starting party playlist generation...");
            config
        }
        Err(e) => {
            log::error!("Failed to start due to configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config) {
        log::error!("Playlist generation failed: {}", e);
        std::process::exit(1);
    }

    log::info!("Party playlist generation complete");
}
