//! Last.fm enrichment.
//!
//! Looks up community tags, play counts and similar tracks/artists for a
//! track. Every failure stays inside this module: a lookup that goes wrong
//! simply yields no enrichment for that track.

use log::debug;
use reqwest::blocking::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::thread::sleep;
use std::time::Duration;

use crate::error::{EnrichmentError, EnrichmentResult};
use crate::models::{Enrichment, SimilarArtist, SimilarTrack, TagWeight, Track};

const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";

const TRACK_TAG_LIMIT: usize = 10;
const GENRE_LIMIT: usize = 5;
const SIMILAR_TRACK_LIMIT: usize = 5;
const ARTIST_TAG_LIMIT: usize = 5;
const SIMILAR_ARTIST_LIMIT: usize = 3;

/// Secondary metadata collaborator
pub trait EnrichmentSource {
    /// Look up metadata for a track. `None` when nothing is known or the
    /// lookup failed.
    fn enrich(&self, name: &str, artist: &str) -> Option<Enrichment>;
}

/// Last.fm API client (read-only, API key auth)
pub struct LastFmClient {
    http_client: Client,
    api_key: String,
}

impl LastFmClient {
    pub fn new(api_key: String) -> EnrichmentResult<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("groove/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EnrichmentError::RequestFailed(e.to_string()))?;

        Ok(Self { http_client, api_key })
    }

    fn call(&self, method: &str, params: &[(&str, &str)]) -> EnrichmentResult<Value> {
        let mut query: Vec<(&str, &str)> = vec![
            ("method", method),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
            ("autocorrect", "1"),
        ];
        query.extend_from_slice(params);

        let response = self
            .http_client
            .get(LASTFM_API_BASE)
            .query(&query)
            .send()
            .map_err(|e| EnrichmentError::RequestFailed(e.to_string()))?;

        let body: Value = response
            .json()
            .map_err(|e| EnrichmentError::Parse(e.to_string()))?;

        if let Some(code) = body.get("error").and_then(Value::as_i64) {
            return Err(EnrichmentError::Api {
                code,
                message: body["message"].as_str().unwrap_or("unknown error").to_string(),
            });
        }

        Ok(body)
    }

    fn track_info(&self, name: &str, artist: &str, enrichment: &mut Enrichment) -> EnrichmentResult<()> {
        let body = self.call("track.getInfo", &[("artist", artist), ("track", name)])?;
        let track = &body["track"];
        enrichment.playcount = lenient_u64(&track["playcount"]);
        enrichment.listeners = lenient_u64(&track["listeners"]);
        if let Some(duration_ms) = lenient_u64(&track["duration"]).filter(|d| *d > 0) {
            enrichment
                .extra
                .insert("duration_seconds".to_string(), Value::from(duration_ms / 1000));
        }
        Ok(())
    }

    fn track_tags(&self, name: &str, artist: &str, enrichment: &mut Enrichment) -> EnrichmentResult<()> {
        let body = self.call("track.getTopTags", &[("artist", artist), ("track", name)])?;
        enrichment.tags = parse_tags(&body["toptags"]["tag"], TRACK_TAG_LIMIT);
        enrichment.genres = enrichment
            .tags
            .iter()
            .take(GENRE_LIMIT)
            .map(|t| t.name.clone())
            .collect();
        Ok(())
    }

    fn similar_tracks(&self, name: &str, artist: &str, enrichment: &mut Enrichment) -> EnrichmentResult<()> {
        let limit = SIMILAR_TRACK_LIMIT.to_string();
        let body = self.call(
            "track.getSimilar",
            &[("artist", artist), ("track", name), ("limit", &limit)],
        )?;
        enrichment.similar_tracks = as_list(&body["similartracks"]["track"])
            .iter()
            .filter_map(|item| {
                Some(SimilarTrack {
                    artist: item["artist"]["name"].as_str()?.to_string(),
                    track: item["name"].as_str()?.to_string(),
                    match_score: lenient_f64(&item["match"]).unwrap_or(0.0),
                })
            })
            .take(SIMILAR_TRACK_LIMIT)
            .collect();
        Ok(())
    }

    fn artist_details(&self, artist: &str, enrichment: &mut Enrichment) -> EnrichmentResult<()> {
        let info = self.call("artist.getInfo", &[("artist", artist)])?;
        let stats = &info["artist"]["stats"];
        enrichment.artist_playcount = lenient_u64(&stats["playcount"]);
        enrichment.artist_listeners = lenient_u64(&stats["listeners"]);

        let tags = self.call("artist.getTopTags", &[("artist", artist)])?;
        enrichment.artist_tags = parse_tags(&tags["toptags"]["tag"], ARTIST_TAG_LIMIT)
            .into_iter()
            .map(|t| t.name)
            .collect();

        let limit = SIMILAR_ARTIST_LIMIT.to_string();
        let similar = self.call("artist.getSimilar", &[("artist", artist), ("limit", &limit)])?;
        enrichment.similar_artists = as_list(&similar["similarartists"]["artist"])
            .iter()
            .filter_map(|item| {
                Some(SimilarArtist {
                    name: item["name"].as_str()?.to_string(),
                    match_score: lenient_f64(&item["match"]).unwrap_or(0.0),
                })
            })
            .take(SIMILAR_ARTIST_LIMIT)
            .collect();
        Ok(())
    }
}

impl EnrichmentSource for LastFmClient {
    fn enrich(&self, name: &str, artist: &str) -> Option<Enrichment> {
        let mut enrichment = Enrichment::default();

        let lookups = [
            ("track info", self.track_info(name, artist, &mut enrichment)),
            ("track tags", self.track_tags(name, artist, &mut enrichment)),
            ("similar tracks", self.similar_tracks(name, artist, &mut enrichment)),
            ("artist details", self.artist_details(artist, &mut enrichment)),
        ];
        for (what, result) in lookups.iter() {
            if let Err(e) = result {
                debug!("Last.fm {} lookup failed for '{}' by '{}': {}", what, name, artist, e);
            }
        }

        if enrichment.is_empty() {
            None
        } else {
            Some(enrichment)
        }
    }
}

/// Enrich tracks one at a time, pausing `delay` between lookups
pub fn enrich_tracks(source: &dyn EnrichmentSource, tracks: Vec<Track>, delay: Duration) -> Vec<Track> {
    let total = tracks.len();
    let mut enriched = Vec::with_capacity(total);

    for (index, mut track) in tracks.into_iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            sleep(delay);
        }
        track.enrichment = source.enrich(&track.name, &track.artist);
        enriched.push(track);
    }

    let with_data = enriched.iter().filter(|t| t.enrichment.is_some()).count();
    debug!("Last.fm returned metadata for {} of {} tracks", with_data, total);
    enriched
}

/// Count the top three genres of every enriched track, most common first
pub fn genre_summary(tracks: &[Track]) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for genre in tracks
        .iter()
        .filter_map(|t| t.enrichment.as_ref())
        .flat_map(|e| e.genres.iter().take(3))
    {
        let count = counts.entry(genre.clone()).or_insert_with(|| {
            order.push(genre.clone());
            0
        });
        *count += 1;
    }

    let mut summary: Vec<(String, usize)> = order
        .into_iter()
        .map(|genre| {
            let count = counts[&genre];
            (genre, count)
        })
        .collect();
    summary.sort_by(|a, b| b.1.cmp(&a.1));
    summary
}

fn dance_tag_weight(tag: &str) -> Option<f64> {
    let weight = match tag {
        "dance" | "house" | "disco" | "club" | "edm" | "reggaeton" => 0.9,
        "electronic" | "techno" | "funk" | "trance" | "latin" | "afrobeat" | "upbeat" | "party" => 0.8,
        "pop" | "dubstep" | "hip hop" | "hip-hop" | "r&b" | "rnb" | "energetic" => 0.7,
        "rap" => 0.6,
        _ => return None,
    };
    Some(weight)
}

fn chill_tag_weight(tag: &str) -> Option<f64> {
    let weight = match tag {
        "ambient" | "relaxing" | "classical" | "sad" | "melancholy" => 0.1,
        "chill" | "mellow" | "instrumental" | "ballad" => 0.2,
        "folk" | "acoustic" => 0.3,
        "jazz" => 0.4,
        _ => return None,
    };
    Some(weight)
}

/// Estimate danceability (0.0-1.0) from weighted community tags.
///
/// Starts from a neutral 0.5 with weight 1; every recognised tag pulls the
/// estimate toward its own danceability in proportion to its weight.
pub fn danceability_from_tags(enrichment: &Enrichment) -> f64 {
    let mut score = 0.5;
    let mut weight_sum = 0.0;

    for tag in &enrichment.tags {
        let name = tag.name.to_lowercase();
        if let Some(value) = dance_tag_weight(&name).or_else(|| chill_tag_weight(&name)) {
            score += value * tag.weight;
            weight_sum += tag.weight;
        }
    }

    if weight_sum > 0.0 {
        score /= weight_sum + 1.0;
    }

    score.clamp(0.0, 1.0)
}

/// Render enrichment as a compact one-line context for prompts.
/// Empty when the bundle has nothing worth mentioning.
pub fn format_for_prompt(enrichment: &Enrichment) -> String {
    let mut parts = Vec::new();

    if let Some(playcount) = enrichment.playcount.filter(|p| *p > 0) {
        parts.push(format!("Last.fm plays: {}", format_thousands(playcount)));
    }
    if let Some(listeners) = enrichment.listeners.filter(|l| *l > 0) {
        parts.push(format!("Listeners: {}", format_thousands(listeners)));
    }
    if !enrichment.genres.is_empty() {
        let genres: Vec<&str> = enrichment.genres.iter().take(3).map(String::as_str).collect();
        parts.push(format!("Genres: {}", genres.join(", ")));
    }
    if let Some(listeners) = enrichment.artist_listeners.filter(|l| *l > 0) {
        parts.push(format!("Artist listeners: {}", format_thousands(listeners)));
    }
    if !enrichment.artist_tags.is_empty() {
        let tags: Vec<&str> = enrichment.artist_tags.iter().take(2).map(String::as_str).collect();
        parts.push(format!("Artist style: {}", tags.join(", ")));
    }
    if !enrichment.similar_tracks.is_empty() {
        let similar: Vec<String> = enrichment
            .similar_tracks
            .iter()
            .take(2)
            .map(|s| format!("{} - {}", s.track, s.artist))
            .collect();
        parts.push(format!("Similar: {}", similar.join("; ")));
    }

    parts.join(" | ")
}

/// 1234567 -> "1,234,567"
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn parse_tags(value: &Value, limit: usize) -> Vec<TagWeight> {
    as_list(value)
        .iter()
        .filter_map(|tag| {
            Some(TagWeight {
                name: tag["name"].as_str()?.to_string(),
                weight: lenient_f64(&tag["count"]).unwrap_or(1.0),
            })
        })
        .take(limit)
        .collect()
}

// Last.fm returns a bare object instead of a one-element array
fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(_) => vec![value.clone()],
        _ => Vec::new(),
    }
}

// Numbers frequently arrive as strings
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
