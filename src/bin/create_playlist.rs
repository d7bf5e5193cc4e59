use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use groove::config::utils::load_config_with_details;
use groove::playlist_exporter::SavedPlaylist;
use groove::spotify_client::SpotifyClient;
use std::path::PathBuf;

/// Names of tracks without an ID listed before the rest are summarized
const LISTED_MISSING: usize = 3;

#[derive(Parser, Debug)]
#[command(name = "create_playlist")]
#[command(about = "Create a Spotify playlist from an exported party playlist JSON file")]
struct Args {
    /// Playlist JSON written by the groove run
    #[arg(short = 'f', long)]
    playlist_file: PathBuf,

    /// Name for the Spotify playlist (default: exported name plus timestamp)
    #[arg(short = 'n', long)]
    playlist_name: Option<String>,

    /// Make the playlist public
    #[arg(long)]
    public: bool,

    /// Description for the playlist (default: track count, length and average score)
    #[arg(short, long)]
    description: Option<String>,
}

fn main() {
    // Load .env file if it exists
    let _ = dotenv::dotenv();

    // Initialize logging
    env_logger::init();

    let args = Args::parse();

    let playlist = match SavedPlaylist::load(&args.playlist_file) {
        Ok(playlist) => playlist,
        Err(e) => {
            error!("❌ {}", e);
            error!("Use a JSON file written by the groove run");
            std::process::exit(1);
        }
    };

    let missing = playlist.tracks_without_id();
    if !missing.is_empty() {
        warn!("⚠️  {} tracks are missing Spotify IDs and will be skipped", missing.len());
        for name in missing.iter().take(LISTED_MISSING) {
            warn!("  - {}", name);
        }
        if missing.len() > LISTED_MISSING {
            warn!("  - ... and {} more", missing.len() - LISTED_MISSING);
        }
    }

    let track_ids = playlist.track_ids();
    if track_ids.is_empty() {
        error!("❌ No valid Spotify track IDs found in playlist");
        std::process::exit(1);
    }

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

    let name = args
        .playlist_name
        .unwrap_or_else(|| playlist.default_name(&Local::now()));
    let description = args
        .description
        .unwrap_or_else(|| playlist.default_description());

    info!(
        "Creating {} Spotify playlist '{}' with {} tracks...",
        if args.public { "public" } else { "private" },
        name,
        track_ids.len()
    );

    match spotify.create_playlist(&name, &description, args.public, &track_ids) {
        Ok(created) => {
            info!("✅ Created playlist: {}", name);
            info!("  Tracks added: {} of {}", created.tracks_added, track_ids.len());
            if let Some(url) = &created.url {
                info!("  URL: {}", url);
            }
        }
        Err(e) => {
            error!("❌ Failed to create playlist: {}", e);
            std::process::exit(1);
        }
    }
}
