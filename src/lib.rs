pub mod clustering;
pub mod config;
pub mod error;
pub mod features;
pub mod judgment;
pub mod lastfm;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod playlist_exporter;
pub mod selector;
pub mod spotify_client;
pub mod utils;
pub mod validation_log;

pub use error::{PipelineError, PipelineResult};
pub use models::{PartyPlaylist, PipelineConfig, Track};
pub use pipeline::PartyPipeline;
