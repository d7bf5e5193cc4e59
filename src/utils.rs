use log::{debug, warn};
use std::thread::sleep;
use std::time::Duration;

use crate::error::SpotifyError;

/// Retry configuration for API calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0) to add randomness to delays
    pub jitter_factor: f64,
}

impl RetryConfig {
    /// Create a new retry configuration with default values
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }

    /// Create a retry configuration from pipeline config values
    pub fn from_pipeline_config(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }

    /// Calculate the delay for a given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.base_delay_ms as f64;
        let exponential_delay = base_delay * self.backoff_multiplier.powi(attempt as i32);

        let jitter = if self.jitter_factor > 0.0 {
            let jitter_range = exponential_delay * self.jitter_factor;
            (rand::random::<f64>() - 0.5) * 2.0 * jitter_range
        } else {
            0.0
        };

        let final_delay = (exponential_delay + jitter).min(self.max_delay_ms as f64);
        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a blocking operation with retry logic and exponential backoff.
///
/// Only errors reporting themselves as `Retryable` are retried; anything
/// else is returned immediately.
pub fn retry_with_backoff<F, T, E>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt + 1);
                }
                return Ok(result);
            }
            Err(error) => {
                warn!(
                    "{} failed on attempt {} of {}: {}",
                    operation_name,
                    attempt + 1,
                    max_attempts,
                    error
                );

                if attempt + 1 >= max_attempts || !error.is_retryable() {
                    return Err(error);
                }

                let delay = config.calculate_delay(attempt);
                debug!("Retrying {} in {:?}", operation_name, delay);
                sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for SpotifyError {
    /// Rate limits, server-side failures and transport errors are transient
    fn is_retryable(&self) -> bool {
        match self {
            SpotifyError::RateLimitExceeded | SpotifyError::NetworkError(_) => true,
            SpotifyError::ApiRequestFailed { status, .. } => (500..=599).contains(status),
            SpotifyError::AuthenticationFailed(_)
            | SpotifyError::JsonParsingError(_)
            | SpotifyError::NoTracks => false,
        }
    }
}

/// Utility functions for logging pipeline progress
pub mod logging {
    use log::{info, warn};

    pub fn log_tracks_fetched(fetched: usize, unique: usize) {
        info!("Fetched {} tracks, {} unique after deduplication", fetched, unique);
    }

    pub fn log_tracks_enriched(enriched: usize, total: usize) {
        info!("Enriched {} of {} tracks with Last.fm metadata", enriched, total);
    }

    pub fn log_clusters_formed(track_count: usize, excluded: usize, cluster_count: usize) {
        info!(
            "Clustered {} tracks into {} styles ({} excluded for missing features)",
            track_count, cluster_count, excluded
        );
    }

    pub fn log_batch_judged(batch_number: usize, batch_count: usize, track_count: usize) {
        info!(
            "Judged batch {}/{} ({} tracks)",
            batch_number, batch_count, track_count
        );
    }

    pub fn log_batch_fallback(batch_number: usize, cause: &str) {
        warn!("Batch {} fell back to neutral scores: {}", batch_number, cause);
    }

    pub fn log_playlist_selected(selected: usize, judged: usize, min_score: f64) {
        info!(
            "Selected {} of {} tracks for the party playlist (min score {})",
            selected, judged, min_score
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_calculate_delay_caps_at_max() {
        let config = RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::new()
        };
        assert_eq!(config.calculate_delay(0), Duration::from_millis(1000));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(2000));
        assert_eq!(config.calculate_delay(10), Duration::from_millis(30000));
    }

    #[test]
    fn test_retry_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<u32, SpotifyError> = retry_with_backoff(
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(SpotifyError::NetworkError("network unreachable".to_string()))
                } else {
                    Ok(42)
                }
            },
            &fast_config(3),
            "test op",
        );
        assert!(matches!(result, Ok(42)));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_retry_stops_on_permanent_error() {
        let calls = Cell::new(0);
        let result: Result<(), SpotifyError> = retry_with_backoff(
            || {
                calls.set(calls.get() + 1);
                Err(SpotifyError::AuthenticationFailed("401 unauthorized".to_string()))
            },
            &fast_config(5),
            "test op",
        );
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_server_errors_are_retried() {
        let calls = Cell::new(0);
        let result: Result<(), SpotifyError> = retry_with_backoff(
            || {
                calls.set(calls.get() + 1);
                Err(SpotifyError::ApiRequestFailed {
                    status: 500,
                    message: "Internal Server Error".to_string(),
                })
            },
            &fast_config(3),
            "test op",
        );
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_spotify_error_retryability() {
        let server_error = |status| SpotifyError::ApiRequestFailed {
            status,
            message: String::new(),
        };
        assert!(server_error(500).is_retryable());
        assert!(server_error(503).is_retryable());
        assert!(SpotifyError::RateLimitExceeded.is_retryable());
        assert!(SpotifyError::NetworkError("connection reset".to_string()).is_retryable());

        assert!(!server_error(404).is_retryable());
        assert!(!SpotifyError::ApiRequestFailed {
            status: 400,
            message: "upstream said 503 connection timeout".to_string(),
        }
        .is_retryable());
        assert!(!SpotifyError::JsonParsingError("expected value".to_string()).is_retryable());
        assert!(!SpotifyError::AuthenticationFailed("bad token".to_string()).is_retryable());
    }
}
