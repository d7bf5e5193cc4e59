use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::rc::Rc;

use crate::error::{SpotifyError, SpotifyResult};
use crate::models::{PipelineConfig, Track};
use crate::utils::{retry_with_backoff, RetryConfig};

const API_URL: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Spotify caps top-track and saved-track pages at 50 items
const PAGE_LIMIT: usize = 50;
/// Spotify accepts at most 100 URIs per add-items request
const ADD_TRACKS_CHUNK: usize = 100;

/// Primary collaborator supplying raw tracks
pub trait TrackSource {
    fn fetch(&self, limit: usize) -> SpotifyResult<Vec<Track>>;
}

/// Playlist created on the user's account
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPlaylist {
    pub id: String,
    pub url: Option<String>,
    pub tracks_added: usize,
}

pub struct SpotifyClient {
    http_client: Client,
    access_token: String,
    retry_config: RetryConfig,
}

impl SpotifyClient {
    /// Exchange the refresh token for an access token and build a client
    pub fn new(
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
        retry_config: RetryConfig,
    ) -> SpotifyResult<SpotifyClient> {
        let http_client = Client::new();
        let access_token = retry_with_backoff(
            || Self::refresh_access_token(&http_client, client_id, client_secret, refresh_token),
            &retry_config,
            "Spotify token refresh",
        )?;
        info!("Authenticated with Spotify");

        Ok(SpotifyClient {
            http_client,
            access_token,
            retry_config,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> SpotifyResult<SpotifyClient> {
        Self::new(
            &config.spotify_client_id,
            &config.spotify_client_secret,
            &config.spotify_refresh_token,
            RetryConfig::from_pipeline_config(
                config.max_retry_attempts,
                config.retry_base_delay_ms,
                config.retry_max_delay_ms,
            ),
        )
    }

    fn refresh_access_token(
        http_client: &Client,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> SpotifyResult<String> {
        let credentials = STANDARD.encode(format!("{}:{}", client_id, client_secret));
        let params = [("grant_type", "refresh_token"), ("refresh_token", refresh_token)];

        let response = http_client
            .post(TOKEN_URL)
            .header(AUTHORIZATION, format!("Basic {}", credentials))
            .form(&params)
            .send()
            .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SpotifyError::ApiRequestFailed {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SpotifyError::AuthenticationFailed(format!("{} - {}", status.as_u16(), body)));
        }

        let body: Value = response
            .json()
            .map_err(|e| SpotifyError::JsonParsingError(e.to_string()))?;

        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SpotifyError::AuthenticationFailed("no access token in response".to_string()))
    }

    fn build_headers(&self) -> SpotifyResult<HeaderMap> {
        let authorization = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|e| SpotifyError::AuthenticationFailed(e.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Send a request with retries; `build` is called afresh for every attempt
    fn send<F>(&self, operation_name: &str, build: F) -> SpotifyResult<Value>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let headers = self.build_headers()?;
        retry_with_backoff(
            || {
                let response = build(&self.http_client)
                    .headers(headers.clone())
                    .send()
                    .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;
                read_response(response)
            },
            &self.retry_config,
            operation_name,
        )
    }

    pub fn get_current_user_id(&self) -> SpotifyResult<String> {
        let body = self.send("Get current user", |client| client.get(format!("{API_URL}/me")))?;
        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SpotifyError::JsonParsingError("user profile has no id".to_string()))
    }

    /// Fetch the user's top tracks. `time_range` is short_term, medium_term or long_term.
    pub fn get_top_tracks(&self, limit: usize, time_range: &str) -> SpotifyResult<Vec<Track>> {
        let limit = limit.min(PAGE_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let body = self.send("Get top tracks", |client| {
            client
                .get(format!("{API_URL}/me/top/tracks"))
                .query(&[("limit", limit.to_string()), ("time_range", time_range.to_string())])
        })?;

        let tracks: Vec<Track> = items(&body).iter().filter_map(parse_track).collect();
        info!("Fetched {} top tracks", tracks.len());
        Ok(tracks)
    }

    /// Fetch up to `limit` saved tracks, paging through the library
    pub fn get_saved_tracks(&self, limit: usize) -> SpotifyResult<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut offset = 0;

        while tracks.len() < limit {
            let page_size = PAGE_LIMIT.min(limit - tracks.len());
            let body = self.send("Get saved tracks", |client| {
                client
                    .get(format!("{API_URL}/me/tracks"))
                    .query(&[("limit", page_size), ("offset", offset)])
            })?;

            let page = items(&body);
            if page.is_empty() {
                break;
            }
            tracks.extend(page.iter().filter_map(|item| parse_track(&item["track"])));
            offset += page_size;
        }

        info!("Fetched {} saved tracks", tracks.len());
        Ok(tracks)
    }

    /// Create a playlist for the current user holding `track_ids`.
    ///
    /// Tracks go in chunks of 100. A chunk Spotify rejects is logged and
    /// skipped; `tracks_added` counts only the chunks that went through.
    pub fn create_playlist(
        &self,
        name: &str,
        description: &str,
        public: bool,
        track_ids: &[String],
    ) -> SpotifyResult<CreatedPlaylist> {
        let uris: Vec<String> = track_ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .map(|id| format!("spotify:track:{}", id))
            .collect();
        if uris.is_empty() {
            return Err(SpotifyError::NoTracks);
        }

        let user_id = self.get_current_user_id()?;
        let payload = json!({
            "name": name,
            "description": description,
            "public": public,
        });
        let playlist = self.send("Create playlist", |client| {
            client
                .post(format!("{API_URL}/users/{user_id}/playlists"))
                .json(&payload)
        })?;

        let playlist_id = playlist["id"]
            .as_str()
            .ok_or_else(|| SpotifyError::JsonParsingError("created playlist has no id".to_string()))?
            .to_string();

        let tracks_added = add_in_chunks(&uris, |chunk| {
            let body = json!({ "uris": chunk });
            self.send("Add playlist tracks", |client| {
                client
                    .post(format!("{API_URL}/playlists/{playlist_id}/tracks"))
                    .json(&body)
            })?;
            debug!("Added {} tracks to playlist {}", chunk.len(), playlist_id);
            Ok(())
        });

        let url = playlist["external_urls"]["spotify"].as_str().map(str::to_string);
        info!("Created playlist '{}' with {} of {} tracks", name, tracks_added, uris.len());

        Ok(CreatedPlaylist {
            id: playlist_id,
            url,
            tracks_added,
        })
    }
}

impl TrackSource for SpotifyClient {
    /// Top tracks followed by saved tracks, half the limit from each
    fn fetch(&self, limit: usize) -> SpotifyResult<Vec<Track>> {
        let share = PAGE_LIMIT.min(limit / 2);
        let mut tracks = self.get_top_tracks(share, "medium_term")?;
        tracks.extend(self.get_saved_tracks(share)?);
        Ok(tracks)
    }
}

impl<T: TrackSource + ?Sized> TrackSource for Rc<T> {
    fn fetch(&self, limit: usize) -> SpotifyResult<Vec<Track>> {
        (**self).fetch(limit)
    }
}

fn read_response(response: Response) -> SpotifyResult<Value> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SpotifyError::RateLimitExceeded);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(SpotifyError::AuthenticationFailed(response.text().unwrap_or_default()));
    }
    if !status.is_success() {
        return Err(SpotifyError::ApiRequestFailed {
            status: status.as_u16(),
            message: response.text().unwrap_or_default(),
        });
    }

    // Add-items and similar endpoints may answer with an empty body
    let text = response
        .text()
        .map_err(|e| SpotifyError::NetworkError(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| SpotifyError::JsonParsingError(e.to_string()))
}

/// Feed `uris` to `add` in chunks of 100, carrying on past failed chunks.
/// Returns how many URIs were added.
fn add_in_chunks<F>(uris: &[String], mut add: F) -> usize
where
    F: FnMut(&[String]) -> SpotifyResult<()>,
{
    let mut added = 0;
    for (index, chunk) in uris.chunks(ADD_TRACKS_CHUNK).enumerate() {
        match add(chunk) {
            Ok(()) => added += chunk.len(),
            Err(e) => warn!("Failed to add batch {} of tracks: {}", index + 1, e),
        }
    }
    added
}

fn items(body: &Value) -> &[Value] {
    body["items"].as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// Convert a Spotify track object into a `Track`. `None` for local files
/// and other entries without an ID.
pub fn parse_track(item: &Value) -> Option<Track> {
    let id = item["id"].as_str().filter(|id| !id.is_empty())?;
    let name = item["name"].as_str().unwrap_or_default();
    let artist = item["artists"]
        .as_array()
        .map(|artists| {
            artists
                .iter()
                .filter_map(|a| a["name"].as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let mut track = Track::new(id, name, artist);
    track.album = item["album"]["name"].as_str().map(str::to_string);
    track.popularity = item["popularity"].as_u64().map(|p| p.min(100) as u8);
    track.duration_ms = item["duration_ms"].as_u64().and_then(|d| u32::try_from(d).ok());
    track.release_date = item["album"]["release_date"].as_str().map(str::to_string);
    track.explicit = item["explicit"].as_bool();
    track.external_url = item["external_urls"]["spotify"].as_str().map(str::to_string);
    Some(track)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track() {
        let item = json!({
            "id": "4uLU6hMCjMI75M1A2tKUQC",
            "name": "Never Gonna Give You Up",
            "artists": [{"name": "Rick Astley"}, {"name": "Guest"}],
            "album": {"name": "Whenever You Need Somebody", "release_date": "1987-11-12"},
            "popularity": 81,
            "duration_ms": 213573,
            "explicit": false,
            "external_urls": {"spotify": "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"}
        });

        let track = parse_track(&item).unwrap();
        assert_eq!(track.id, "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(track.artist, "Rick Astley, Guest");
        assert_eq!(track.album.as_deref(), Some("Whenever You Need Somebody"));
        assert_eq!(track.popularity, Some(81));
        assert_eq!(track.duration_ms, Some(213573));
        assert_eq!(track.release_date.as_deref(), Some("1987-11-12"));
        assert_eq!(track.explicit, Some(false));
        assert!(track.external_url.is_some());
        assert!(track.judgment.is_none());
    }

    #[test]
    fn test_parse_track_skips_entries_without_id() {
        let local_file = json!({"id": null, "name": "My Demo", "artists": []});
        assert!(parse_track(&local_file).is_none());
    }

    #[test]
    fn test_parse_track_tolerates_missing_fields() {
        let track = parse_track(&json!({"id": "abc", "name": "Bare"})).unwrap();
        assert_eq!(track.artist, "");
        assert_eq!(track.popularity, None);
        assert_eq!(track.release_date, None);
    }

    #[test]
    fn test_parse_track_drops_out_of_range_duration() {
        let track = parse_track(&json!({"id": "abc", "name": "Endless", "duration_ms": 5_000_000_000u64})).unwrap();
        assert_eq!(track.duration_ms, None);
    }

    #[test]
    fn test_add_in_chunks_continues_past_failed_chunk() {
        let uris: Vec<String> = (0..250).map(|i| format!("spotify:track:{}", i)).collect();
        let mut sizes = Vec::new();

        let added = add_in_chunks(&uris, |chunk| {
            sizes.push(chunk.len());
            if sizes.len() == 2 {
                Err(SpotifyError::ApiRequestFailed {
                    status: 400,
                    message: "Invalid track uri".to_string(),
                })
            } else {
                Ok(())
            }
        });

        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(added, 150);
    }

    #[test]
    fn test_items() {
        let body = json!({"items": [{"id": "1"}, {"id": "2"}]});
        assert_eq!(items(&body).len(), 2);
        assert!(items(&json!({})).is_empty());
    }
}
