use thiserror::Error;

/// Main error type for the party playlist pipeline
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Track error: {0}")]
    Track(#[from] TrackError),
    #[error("Clustering error: {0}")]
    Cluster(#[from] ClusterError),
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),
    #[error("Spotify error: {0}")]
    Spotify(#[from] SpotifyError),
    #[error("Enrichment error: {0}")]
    Enrichment(#[from] EnrichmentError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Per-track data problems
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    #[error("Track '{name}' has no stable identifier")]
    MissingIdentity { name: String },
}

/// Style clustering errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClusterError {
    #[error("No tracks have a complete feature vector for clustering")]
    InsufficientData,
    #[error("Cannot form {requested} clusters from {available} tracks")]
    InvalidClusterCount { requested: usize, available: usize },
    #[error("Unknown feature column: {0}")]
    UnknownFeature(String),
}

/// Scoring oracle errors
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("Validation unavailable: no oracle credential configured")]
    Unavailable,
    #[error("Oracle call failed: {0}")]
    CallFailed(String),
    #[error("Response parsing error: {0}")]
    ResponseParse(String),
}

/// Spotify-related errors
#[derive(Debug, Clone, Error)]
pub enum SpotifyError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("API request failed: {status} - {message}")]
    ApiRequestFailed { status: u16, message: String },
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("JSON parsing error: {0}")]
    JsonParsingError(String),
    #[error("No valid track IDs to add to playlist")]
    NoTracks,
}

/// Metadata enrichment errors. These never leave the enrichment layer.
#[derive(Debug, Clone, Error)]
pub enum EnrichmentError {
    #[error("Last.fm request failed: {0}")]
    RequestFailed(String),
    #[error("Last.fm API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("Last.fm response could not be parsed: {0}")]
    Parse(String),
}

/// Configuration-related errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {var_name}")]
    MissingEnvironmentVariable { var_name: String },
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Playlist export errors
#[derive(Debug, Clone, Error)]
pub enum ExportError {
    #[error("Failed to create output directory {path}: {message}")]
    CreateDirFailed { path: String, message: String },
    #[error("Failed to write {path}: {message}")]
    WriteFailed { path: String, message: String },
    #[error("Failed to serialize playlist: {0}")]
    SerializeFailed(String),
    #[error("Failed to read {path}: {message}")]
    ReadFailed { path: String, message: String },
    #[error("Invalid playlist file {path}: {message}")]
    InvalidPlaylist { path: String, message: String },
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type aliases for specific error types
pub type TrackResult<T> = Result<T, TrackError>;
pub type ClusterResult<T> = Result<T, ClusterError>;
pub type OracleResult<T> = Result<T, OracleError>;
pub type SpotifyResult<T> = Result<T, SpotifyError>;
pub type EnrichmentResult<T> = Result<T, EnrichmentError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type ExportResult<T> = Result<T, ExportError>;
