use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use crate::error::ClusterError;

/// A single song as it moves through the pipeline.
///
/// Source fields are filled by the track source, derived fields by the
/// feature builder, `cluster` by the clusterer and `judgment` by the
/// judgment batcher. `id` is the identity key throughout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Track {
    /// Spotify track ID
    pub id: String,
    /// Track name
    pub name: String,
    /// Artist names, comma-separated
    pub artist: String,
    pub album: Option<String>,
    /// Track popularity (0-100)
    pub popularity: Option<u8>,
    pub duration_ms: Option<u32>,
    /// Album release date as reported by the source ("1999", "1999-03", "1999-03-12")
    pub release_date: Option<String>,
    pub explicit: Option<bool>,
    /// Spotify web player URL
    pub external_url: Option<String>,
    /// Secondary metadata from the enrichment source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,

    pub release_year: Option<i32>,
    /// Lexical energy estimate from the title (0.0-1.0)
    pub name_energy: Option<f64>,
    pub artist_popularity: Option<f64>,
    /// Tag-derived danceability estimate (0.0-1.0), only with enrichment tags
    pub danceability: Option<f64>,

    pub cluster: Option<usize>,
    #[serde(flatten)]
    pub judgment: Option<Judgment>,
}

impl Track {
    /// Create a track with only the required fields set
    pub fn new(id: impl Into<String>, name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artist: artist.into(),
            ..Default::default()
        }
    }

    /// Get duration in minutes and seconds format
    pub fn duration_formatted(&self) -> Option<String> {
        self.duration_ms.map(|ms| {
            let total_seconds = ms / 1000;
            format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
        })
    }

    pub fn party_score(&self) -> Option<f64> {
        self.judgment.as_ref().map(|j| j.party_score)
    }

    pub fn recommendation(&self) -> Option<Recommendation> {
        self.judgment.as_ref().map(|j| j.recommendation)
    }
}

/// Last.fm tag with its relative weight (0-100)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagWeight {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarTrack {
    pub artist: String,
    pub track: String,
    #[serde(rename = "match")]
    pub match_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarArtist {
    pub name: String,
    #[serde(rename = "match")]
    pub match_score: f64,
}

/// Optional metadata bundle layered onto a track by the enrichment source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Enrichment {
    pub playcount: Option<u64>,
    pub listeners: Option<u64>,
    #[serde(default)]
    pub tags: Vec<TagWeight>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub similar_tracks: Vec<SimilarTrack>,
    pub artist_playcount: Option<u64>,
    pub artist_listeners: Option<u64>,
    #[serde(default)]
    pub artist_tags: Vec<String>,
    #[serde(default)]
    pub similar_artists: Vec<SimilarArtist>,
    /// Open slot for source-specific data that has no typed field
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.playcount.is_none()
            && self.listeners.is_none()
            && self.tags.is_empty()
            && self.genres.is_empty()
            && self.similar_tracks.is_empty()
            && self.artist_playcount.is_none()
            && self.artist_listeners.is_none()
            && self.artist_tags.is_empty()
            && self.similar_artists.is_empty()
            && self.extra.is_empty()
    }
}

/// Qualitative verdict from the scoring oracle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Yes,
    No,
    Maybe,
}

impl Recommendation {
    /// Map an oracle label onto a recommendation. Anything unrecognised is `Maybe`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "yes" => Recommendation::Yes,
            "no" => Recommendation::No,
            _ => Recommendation::Maybe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Yes => "yes",
            Recommendation::No => "no",
            Recommendation::Maybe => "maybe",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Party-suitability judgment attached to every track leaving the batcher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Judgment {
    #[serde(rename = "ai_party_score")]
    pub party_score: f64,
    #[serde(rename = "ai_reasoning")]
    pub reasoning: String,
    #[serde(rename = "ai_recommendation")]
    pub recommendation: Recommendation,
}

impl Judgment {
    pub const FALLBACK_SCORE: f64 = 5.0;

    /// The neutral judgment used whenever the oracle could not score a track
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            party_score: Self::FALLBACK_SCORE,
            reasoning: reason.into(),
            recommendation: Recommendation::Maybe,
        }
    }
}

/// Numeric track attributes that can take part in clustering
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    Popularity,
    DurationMs,
    ReleaseYear,
    NameEnergy,
    ArtistPopularity,
    Danceability,
}

impl FeatureColumn {
    pub const DEFAULT_COLUMNS: [FeatureColumn; 5] = [
        FeatureColumn::Popularity,
        FeatureColumn::DurationMs,
        FeatureColumn::ReleaseYear,
        FeatureColumn::NameEnergy,
        FeatureColumn::ArtistPopularity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::Popularity => "popularity",
            FeatureColumn::DurationMs => "duration_ms",
            FeatureColumn::ReleaseYear => "release_year",
            FeatureColumn::NameEnergy => "name_energy",
            FeatureColumn::ArtistPopularity => "artist_popularity",
            FeatureColumn::Danceability => "danceability",
        }
    }

    /// Read this feature from a track, `None` when not populated
    pub fn value(&self, track: &Track) -> Option<f64> {
        match self {
            FeatureColumn::Popularity => track.popularity.map(f64::from),
            FeatureColumn::DurationMs => track.duration_ms.map(f64::from),
            FeatureColumn::ReleaseYear => track.release_year.map(f64::from),
            FeatureColumn::NameEnergy => track.name_energy,
            FeatureColumn::ArtistPopularity => track.artist_popularity,
            FeatureColumn::Danceability => track.danceability,
        }
    }
}

impl FromStr for FeatureColumn {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "popularity" => Ok(FeatureColumn::Popularity),
            "duration_ms" | "duration" => Ok(FeatureColumn::DurationMs),
            "release_year" | "year" => Ok(FeatureColumn::ReleaseYear),
            "name_energy" | "energy" => Ok(FeatureColumn::NameEnergy),
            "artist_popularity" => Ok(FeatureColumn::ArtistPopularity),
            "danceability" => Ok(FeatureColumn::Danceability),
            other => Err(ClusterError::UnknownFeature(other.to_string())),
        }
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleTrack {
    pub name: String,
    pub artist: String,
}

/// Derived description of one style cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub size: usize,
    pub style_description: String,
    /// Mean of each configured feature column, in configured order
    pub avg_features: Vec<(FeatureColumn, f64)>,
    /// First three tracks of the cluster in input order
    pub sample_tracks: Vec<SampleTrack>,
    pub avg_popularity: Option<f64>,
    pub total_duration_min: f64,
    pub era_start: Option<i32>,
    pub era_end: Option<i32>,
}

impl ClusterSummary {
    pub fn era_formatted(&self) -> String {
        match (self.era_start, self.era_end) {
            (Some(start), Some(end)) if start == end => start.to_string(),
            (Some(start), Some(end)) => format!("{}-{}", start, end),
            _ => "unknown".to_string(),
        }
    }
}

/// Aggregate statistics for a list of tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistStats {
    pub total_tracks: usize,
    pub unique_artists: usize,
    /// Total duration of all tracks in milliseconds
    pub total_duration_ms: u64,
    pub average_popularity: Option<f64>,
    /// Mean party score over tracks that carry a judgment
    pub average_party_score: Option<f64>,
    pub explicit_tracks: usize,
}

impl PlaylistStats {
    /// Calculate statistics from a list of tracks
    pub fn from_tracks(tracks: &[Track]) -> Self {
        let total_duration_ms: u64 = tracks
            .iter()
            .filter_map(|t| t.duration_ms)
            .map(u64::from)
            .sum();

        let unique_artists = tracks
            .iter()
            .map(|t| t.artist.as_str())
            .collect::<HashSet<_>>()
            .len();

        let popularities: Vec<f64> = tracks
            .iter()
            .filter_map(|t| t.popularity)
            .map(f64::from)
            .collect();

        let scores: Vec<f64> = tracks.iter().filter_map(|t| t.party_score()).collect();

        Self {
            total_tracks: tracks.len(),
            unique_artists,
            total_duration_ms,
            average_popularity: mean(&popularities),
            average_party_score: mean(&scores),
            explicit_tracks: tracks.iter().filter(|t| t.explicit == Some(true)).count(),
        }
    }

    pub fn duration_minutes(&self) -> f64 {
        self.total_duration_ms as f64 / 60_000.0
    }

    /// Get total duration in hours, minutes, and seconds format
    pub fn duration_formatted(&self) -> String {
        let total_seconds = self.total_duration_ms / 1000;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Result of a full pipeline run
#[derive(Debug, Clone)]
pub struct PartyPlaylist {
    /// Selected tracks, best score first
    pub tracks: Vec<Track>,
    /// Every track that went through validation, in clustered order
    pub judged: Vec<Track>,
    pub clusters: Vec<ClusterSummary>,
    pub stats: PlaylistStats,
    pub generated_at: SystemTime,
}

impl PartyPlaylist {
    pub fn new(tracks: Vec<Track>, judged: Vec<Track>, clusters: Vec<ClusterSummary>) -> Self {
        let stats = PlaylistStats::from_tracks(&tracks);
        Self {
            tracks,
            judged,
            clusters,
            stats,
            generated_at: SystemTime::now(),
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

/// Configuration for the party playlist pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    /// Spotify refresh token for long-term user access
    pub spotify_refresh_token: String,
    /// Oracle API key; `None` disables AI validation
    pub oracle_api_key: Option<String>,
    pub oracle_base_url: String,
    pub oracle_model: String,
    pub oracle_timeout_secs: u64,
    /// Last.fm API key; `None` disables enrichment
    pub lastfm_api_key: Option<String>,
    pub skip_lastfm: bool,
    /// Maximum number of unique tracks to analyze
    pub track_limit: usize,
    pub cluster_count: usize,
    /// Upper bound on dimensionality after projection
    pub pca_components: usize,
    pub feature_columns: Vec<FeatureColumn>,
    pub high_energy_keywords: Vec<String>,
    pub low_energy_keywords: Vec<String>,
    pub validation_batch_size: usize,
    pub min_party_score: f64,
    /// Delay between enrichment lookups in milliseconds
    pub enrichment_delay_ms: u64,
    pub output_dir: String,
    pub create_spotify_playlist: bool,
    /// Maximum number of retry attempts for API calls
    pub max_retry_attempts: u32,
    /// Base retry delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub retry_max_delay_ms: u64,
}

pub const DEFAULT_HIGH_ENERGY_KEYWORDS: [&str; 10] = [
    "dance", "party", "electric", "beat", "club", "remix", "uptempo", "energy", "pump", "groove",
];

pub const DEFAULT_LOW_ENERGY_KEYWORDS: [&str; 9] = [
    "ballad", "acoustic", "slow", "quiet", "piano", "soft", "gentle", "lullaby", "ambient",
];

impl PipelineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
            spotify_refresh_token: String::new(),
            oracle_api_key: None,
            oracle_base_url: "https://api.deepseek.com".to_string(),
            oracle_model: "deepseek-chat".to_string(),
            oracle_timeout_secs: 60,
            lastfm_api_key: None,
            skip_lastfm: false,
            track_limit: 100,
            cluster_count: 5,
            pca_components: 5,
            feature_columns: FeatureColumn::DEFAULT_COLUMNS.to_vec(),
            high_energy_keywords: DEFAULT_HIGH_ENERGY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            low_energy_keywords: DEFAULT_LOW_ENERGY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            validation_batch_size: 10,
            min_party_score: 6.0,
            enrichment_delay_ms: 200,
            output_dir: "output".to_string(),
            create_spotify_playlist: false,
            max_retry_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30000,
        }
    }

    /// Validate that all required fields are set
    pub fn validate(&self) -> Result<(), String> {
        if self.spotify_client_id.is_empty() {
            return Err("Spotify client ID is required".to_string());
        }
        if self.spotify_client_secret.is_empty() {
            return Err("Spotify client secret is required".to_string());
        }
        if self.spotify_refresh_token.is_empty() {
            return Err("Spotify refresh token is required".to_string());
        }
        if self.track_limit == 0 {
            return Err("Track limit must be greater than 0".to_string());
        }
        if self.cluster_count == 0 {
            return Err("Cluster count must be greater than 0".to_string());
        }
        if self.pca_components == 0 {
            return Err("PCA components must be greater than 0".to_string());
        }
        if self.feature_columns.is_empty() {
            return Err("At least one cluster feature is required".to_string());
        }
        if self.validation_batch_size == 0 {
            return Err("Validation batch size must be greater than 0".to_string());
        }
        if !self.min_party_score.is_finite() {
            return Err("Minimum party score must be a number".to_string());
        }
        if self.max_retry_attempts == 0 {
            return Err("Max retry attempts must be greater than 0".to_string());
        }
        if self.retry_base_delay_ms == 0 {
            return Err("Retry base delay must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Whether the Last.fm enrichment stage should run
    pub fn enrichment_enabled(&self) -> bool {
        !self.skip_lastfm && self.lastfm_api_key.is_some()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_from_label() {
        assert_eq!(Recommendation::from_label("YES"), Recommendation::Yes);
        assert_eq!(Recommendation::from_label(" no "), Recommendation::No);
        assert_eq!(Recommendation::from_label("maybe"), Recommendation::Maybe);
        assert_eq!(Recommendation::from_label("absolutely"), Recommendation::Maybe);
    }

    #[test]
    fn test_feature_column_parsing() {
        assert_eq!("release_year".parse::<FeatureColumn>(), Ok(FeatureColumn::ReleaseYear));
        assert_eq!(" Popularity ".parse::<FeatureColumn>(), Ok(FeatureColumn::Popularity));
        assert_eq!(
            "tempo".parse::<FeatureColumn>(),
            Err(ClusterError::UnknownFeature("tempo".to_string()))
        );
    }

    #[test]
    fn test_feature_column_value() {
        let mut track = Track::new("1", "Song", "Artist");
        track.popularity = Some(80);
        assert_eq!(FeatureColumn::Popularity.value(&track), Some(80.0));
        assert_eq!(FeatureColumn::NameEnergy.value(&track), None);
    }

    #[test]
    fn test_judgment_serializes_with_ai_prefix() {
        let mut track = Track::new("1", "Song", "Artist");
        track.judgment = Some(Judgment::fallback("validation unavailable"));

        let value = serde_json::to_value(&track).unwrap();
        assert_eq!(value["ai_party_score"], 5.0);
        assert_eq!(value["ai_recommendation"], "maybe");
        assert_eq!(value["ai_reasoning"], "validation unavailable");
    }

    #[test]
    fn test_playlist_stats_from_tracks() {
        let mut a = Track::new("a", "A", "Artist 1");
        a.duration_ms = Some(180_000);
        a.popularity = Some(60);
        a.judgment = Some(Judgment::fallback("x"));
        let mut b = Track::new("b", "B", "Artist 1");
        b.duration_ms = Some(120_000);
        b.explicit = Some(true);
        b.judgment = Some(Judgment {
            party_score: 9.0,
            reasoning: "great".to_string(),
            recommendation: Recommendation::Yes,
        });

        let stats = PlaylistStats::from_tracks(&[a, b]);
        assert_eq!(stats.total_tracks, 2);
        assert_eq!(stats.unique_artists, 1);
        assert_eq!(stats.total_duration_ms, 300_000);
        assert_eq!(stats.duration_minutes(), 5.0);
        assert_eq!(stats.duration_formatted(), "5m 0s");
        assert_eq!(stats.average_popularity, Some(60.0));
        assert_eq!(stats.average_party_score, Some(7.0));
        assert_eq!(stats.explicit_tracks, 1);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::default();
        assert!(config.validate().is_err());

        config.spotify_client_id = "id".to_string();
        config.spotify_client_secret = "secret".to_string();
        config.spotify_refresh_token = "token".to_string();
        assert!(config.validate().is_ok());

        config.validation_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enrichment_is_empty() {
        let mut enrichment = Enrichment::default();
        assert!(enrichment.is_empty());
        enrichment.genres.push("disco".to_string());
        assert!(!enrichment.is_empty());
    }
}
