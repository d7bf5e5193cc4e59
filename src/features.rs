use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::error::{TrackError, TrackResult};
use crate::lastfm::danceability_from_tags;
use crate::models::{PipelineConfig, Track};

/// Year assumed when a release date is missing or unreadable
pub const DEFAULT_RELEASE_YEAR: i32 = 2020;

const BASE_NAME_ENERGY: f64 = 0.5;
const NAME_ENERGY_STEP: f64 = 0.1;

static YEAR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d{4})").unwrap());

/// Derives the numeric attributes used for clustering and prompting
pub struct FeatureBuilder {
    high_energy_keywords: Vec<String>,
    low_energy_keywords: Vec<String>,
}

impl FeatureBuilder {
    pub fn new(high_energy_keywords: Vec<String>, low_energy_keywords: Vec<String>) -> Self {
        Self {
            high_energy_keywords: lowercase_all(high_energy_keywords),
            low_energy_keywords: lowercase_all(low_energy_keywords),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.high_energy_keywords.clone(),
            config.low_energy_keywords.clone(),
        )
    }

    /// Read the year from the leading four digits of a release date
    pub fn parse_release_year(&self, release_date: Option<&str>) -> i32 {
        release_date
            .and_then(|date| YEAR_PATTERN.captures(date))
            .and_then(|captures| captures.get(1))
            .and_then(|year| year.as_str().parse::<i32>().ok())
            .unwrap_or(DEFAULT_RELEASE_YEAR)
    }

    /// Estimate how energetic a title sounds, from 0.0 (calm) to 1.0 (wild)
    pub fn name_energy(&self, name: &str) -> f64 {
        let name = name.to_lowercase();

        let high = self
            .high_energy_keywords
            .iter()
            .filter(|keyword| name.contains(keyword.as_str()))
            .count();
        let low = self
            .low_energy_keywords
            .iter()
            .filter(|keyword| name.contains(keyword.as_str()))
            .count();

        let energy = BASE_NAME_ENERGY + NAME_ENERGY_STEP * (high as f64 - low as f64);
        energy.clamp(0.0, 1.0)
    }

    /// Populate the derived fields of one track
    pub fn build(&self, mut track: Track) -> TrackResult<Track> {
        if track.id.trim().is_empty() {
            return Err(TrackError::MissingIdentity {
                name: track.name.clone(),
            });
        }

        track.release_year = Some(self.parse_release_year(track.release_date.as_deref()));
        track.name_energy = Some(self.name_energy(&track.name));
        track.artist_popularity = track.popularity.map(f64::from);
        track.danceability = track
            .enrichment
            .as_ref()
            .filter(|enrichment| !enrichment.tags.is_empty())
            .map(danceability_from_tags);

        Ok(track)
    }

    /// Build features for every track, dropping tracks without an identity
    pub fn build_all(&self, tracks: Vec<Track>) -> Vec<Track> {
        let total = tracks.len();
        let built: Vec<Track> = tracks
            .into_iter()
            .filter_map(|track| match self.build(track) {
                Ok(track) => Some(track),
                Err(e) => {
                    warn!("Dropping track: {}", e);
                    None
                }
            })
            .collect();

        debug!("Derived features for {} of {} tracks", built.len(), total);
        built
    }
}

fn lowercase_all(words: Vec<String>) -> Vec<String> {
    words.into_iter().map(|w| w.to_lowercase()).collect()
}

/// Remove repeated track IDs, keeping the first occurrence in source order.
/// Tracks without an ID are dropped.
pub fn dedup_tracks(tracks: Vec<Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|track| !track.id.trim().is_empty() && seen.insert(track.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Enrichment, TagWeight, DEFAULT_HIGH_ENERGY_KEYWORDS, DEFAULT_LOW_ENERGY_KEYWORDS};

    fn builder() -> FeatureBuilder {
        FeatureBuilder::from_config(&PipelineConfig::default())
    }

    #[test]
    fn test_parse_release_year() {
        let builder = builder();
        assert_eq!(builder.parse_release_year(Some("1999-03-12")), 1999);
        assert_eq!(builder.parse_release_year(Some("1987")), 1987);
        assert_eq!(builder.parse_release_year(Some("")), DEFAULT_RELEASE_YEAR);
        assert_eq!(builder.parse_release_year(Some("unknown")), DEFAULT_RELEASE_YEAR);
        assert_eq!(builder.parse_release_year(Some("99-01-01")), DEFAULT_RELEASE_YEAR);
        assert_eq!(builder.parse_release_year(None), DEFAULT_RELEASE_YEAR);
    }

    #[test]
    fn test_empty_release_date_defaults_to_2020() {
        let mut track = Track::new("1", "Song", "Artist");
        track.release_date = Some(String::new());
        let track = builder().build(track).unwrap();
        assert_eq!(track.release_year, Some(2020));
    }

    #[test]
    fn test_name_energy() {
        let builder = builder();
        assert_eq!(builder.name_energy("Yesterday"), 0.5);
        assert!((builder.name_energy("Dance the Night (Club Remix)") - 0.8).abs() < 1e-9);
        assert!((builder.name_energy("Slow Piano Ballad") - 0.2).abs() < 1e-9);
        assert!((builder.name_energy("Acoustic Dance") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_name_energy_is_clamped() {
        let builder = FeatureBuilder::new(
            DEFAULT_HIGH_ENERGY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_LOW_ENERGY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        );
        let wild = "Dance Party Electric Beat Club Remix Uptempo Energy Pump Groove";
        assert_eq!(builder.name_energy(wild), 1.0);

        let calm = "Quiet Soft Gentle Slow Piano Ballad Acoustic Lullaby Ambient";
        assert_eq!(builder.name_energy(calm), 0.0);
    }

    #[test]
    fn test_keywords_are_configuration() {
        let builder = FeatureBuilder::new(vec!["FIESTA".to_string()], vec![]);
        assert!((builder.name_energy("Fiesta Time") - 0.6).abs() < 1e-9);
        assert_eq!(builder.name_energy("Dance"), 0.5);
    }

    #[test]
    fn test_build_populates_fields() {
        let mut track = Track::new("1", "Party Rock", "LMFAO");
        track.popularity = Some(77);
        track.release_date = Some("2011-01-01".to_string());

        let track = builder().build(track).unwrap();
        assert_eq!(track.release_year, Some(2011));
        assert!((track.name_energy.unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(track.artist_popularity, Some(77.0));
        assert_eq!(track.danceability, None);
    }

    #[test]
    fn test_build_uses_enrichment_tags_for_danceability() {
        let mut track = Track::new("1", "Song", "Artist");
        track.enrichment = Some(Enrichment {
            tags: vec![TagWeight {
                name: "disco".to_string(),
                weight: 1.0,
            }],
            ..Default::default()
        });

        let track = builder().build(track).unwrap();
        assert!(track.danceability.is_some());
    }

    #[test]
    fn test_build_rejects_missing_identity() {
        let track = Track::new("  ", "Nameless", "Nobody");
        assert_eq!(
            builder().build(track),
            Err(TrackError::MissingIdentity {
                name: "Nameless".to_string()
            })
        );
    }

    #[test]
    fn test_build_all_drops_only_unidentified_tracks() {
        let tracks = vec![
            Track::new("a", "One", "X"),
            Track::new("", "Two", "Y"),
            Track::new("c", "Three", "Z"),
        ];
        let built = builder().build_all(tracks);
        let ids: Vec<&str> = built.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence_in_order() {
        let mut first_b = Track::new("b", "First B", "Artist");
        first_b.popularity = Some(10);
        let mut second_b = Track::new("b", "Second B", "Artist");
        second_b.popularity = Some(90);

        let tracks = vec![
            first_b,
            Track::new("a", "A", "Artist"),
            second_b,
            Track::new("", "No id", "Artist"),
            Track::new("a", "A again", "Artist"),
            Track::new("c", "C", "Artist"),
        ];

        let unique = dedup_tracks(tracks);
        let ids: Vec<&str> = unique.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(unique[0].name, "First B");
        assert_eq!(unique[0].popularity, Some(10));
    }
}
