use chrono::{DateTime, Local};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ExportError, ExportResult};
use crate::lastfm::genre_summary;
use crate::models::{ClusterSummary, PartyPlaylist, PipelineConfig, PlaylistStats, Track};

pub const DEFAULT_PLAYLIST_NAME: &str = "AI-Generated Wedding Party Playlist";

const HIGH_SCORE_THRESHOLD: f64 = 7.0;
const TOP_TRACK_COUNT: usize = 10;
const TOP_GENRE_COUNT: usize = 10;

/// Paths of the files written for one run
#[derive(Debug, Clone)]
pub struct ExportedFiles {
    pub text: PathBuf,
    pub json: PathBuf,
    pub report: PathBuf,
}

#[derive(Serialize)]
struct PlaylistDocument<'a> {
    metadata: PlaylistMetadata<'a>,
    tracks: &'a [Track],
}

#[derive(Serialize)]
struct PlaylistMetadata<'a> {
    name: &'a str,
    generated_on: String,
    total_tracks: usize,
    total_duration_minutes: f64,
    unique_artists: usize,
    average_party_score: Option<f64>,
}

/// Writes playlists and analysis reports under an output directory
pub struct PlaylistExporter {
    output_dir: PathBuf,
    name: String,
}

impl PlaylistExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            name: DEFAULT_PLAYLIST_NAME.to_string(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.output_dir)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_output_dir(&self) -> ExportResult<()> {
        if !self.output_dir.exists() {
            fs::create_dir_all(&self.output_dir).map_err(|e| ExportError::CreateDirFailed {
                path: self.output_dir.display().to_string(),
                message: e.to_string(),
            })?;
            info!("Created output directory: {}", self.output_dir.display());
        }
        Ok(())
    }

    fn write(&self, file_name: String, content: &str) -> ExportResult<PathBuf> {
        self.ensure_output_dir()?;
        let path = self.output_dir.join(file_name);
        fs::write(&path, content).map_err(|e| ExportError::WriteFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(path)
    }

    pub fn export_text(&self, tracks: &[Track], generated: &DateTime<Local>) -> ExportResult<PathBuf> {
        let path = self.write(
            format!("wedding_party_playlist_{}.txt", file_stamp(generated)),
            &render_text_playlist(&self.name, tracks, generated),
        )?;
        info!("Text playlist saved to: {}", path.display());
        Ok(path)
    }

    pub fn export_json(&self, tracks: &[Track], generated: &DateTime<Local>) -> ExportResult<PathBuf> {
        let stats = PlaylistStats::from_tracks(tracks);
        let document = PlaylistDocument {
            metadata: PlaylistMetadata {
                name: &self.name,
                generated_on: generated.to_rfc3339(),
                total_tracks: stats.total_tracks,
                total_duration_minutes: stats.duration_minutes(),
                unique_artists: stats.unique_artists,
                average_party_score: stats.average_party_score,
            },
            tracks,
        };
        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| ExportError::SerializeFailed(e.to_string()))?;

        let path = self.write(format!("wedding_party_playlist_{}.json", file_stamp(generated)), &content)?;
        info!("JSON playlist saved to: {}", path.display());
        Ok(path)
    }

    pub fn export_report(
        &self,
        tracks: &[Track],
        clusters: &[ClusterSummary],
        generated: &DateTime<Local>,
    ) -> ExportResult<PathBuf> {
        let path = self.write(
            format!("playlist_analysis_report_{}.txt", file_stamp(generated)),
            &render_report(tracks, clusters, generated),
        )?;
        info!("Analysis report saved to: {}", path.display());
        Ok(path)
    }

    /// Write the selected playlist (text and JSON) and a report over all judged tracks
    pub fn export_all(&self, playlist: &PartyPlaylist) -> ExportResult<ExportedFiles> {
        let generated: DateTime<Local> = playlist.generated_at.into();
        Ok(ExportedFiles {
            text: self.export_text(&playlist.tracks, &generated)?,
            json: self.export_json(&playlist.tracks, &generated)?,
            report: self.export_report(&playlist.judged, &playlist.clusters, &generated)?,
        })
    }
}

/// One track entry read back from an exported playlist
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SavedTrack {
    pub id: Option<String>,
    pub name: Option<String>,
    pub duration_ms: Option<u64>,
    pub ai_party_score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SavedMetadata {
    pub name: Option<String>,
}

/// A playlist JSON document written by `export_json`, read back for
/// publishing to Spotify. Only `tracks` is required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SavedPlaylist {
    #[serde(default)]
    pub metadata: SavedMetadata,
    pub tracks: Vec<SavedTrack>,
}

impl SavedPlaylist {
    pub fn load(path: impl AsRef<Path>) -> ExportResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ExportError::ReadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let playlist: SavedPlaylist = serde_json::from_str(&content).map_err(|e| ExportError::InvalidPlaylist {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        info!("Loaded {} tracks from {}", playlist.tracks.len(), path.display());
        Ok(playlist)
    }

    /// Spotify IDs in playlist order, skipping tracks without one
    pub fn track_ids(&self) -> Vec<String> {
        self.tracks
            .iter()
            .filter_map(|track| track.id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Names of the tracks that carry no Spotify ID
    pub fn tracks_without_id(&self) -> Vec<&str> {
        self.tracks
            .iter()
            .filter(|track| track.id.as_deref().map_or(true, |id| id.trim().is_empty()))
            .map(|track| track.name.as_deref().unwrap_or("Unknown"))
            .collect()
    }

    pub fn default_name(&self, now: &DateTime<Local>) -> String {
        let base = self.metadata.name.as_deref().unwrap_or(DEFAULT_PLAYLIST_NAME);
        format!("{} - {}", base, file_stamp(now))
    }

    /// Tracks without a score count as 0 towards the average
    pub fn default_description(&self) -> String {
        let total = self.tracks.len();
        let minutes = self.tracks.iter().filter_map(|t| t.duration_ms).sum::<u64>() as f64 / 60_000.0;
        let average = if total == 0 {
            0.0
        } else {
            self.tracks.iter().filter_map(|t| t.ai_party_score).sum::<f64>() / total as f64
        };
        format!(
            "AI-curated party playlist with {} tracks ({:.1} min total). Average party score: {:.1}/10.",
            total, minutes, average
        )
    }
}

fn file_stamp(generated: &DateTime<Local>) -> String {
    generated.format("%Y%m%d_%H%M%S").to_string()
}

pub fn render_text_playlist(name: &str, tracks: &[Track], generated: &DateTime<Local>) -> String {
    let stats = PlaylistStats::from_tracks(tracks);
    let mut out = String::new();

    let _ = writeln!(out, "{}", name);
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out, "Generated on: {}", generated.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Total tracks: {}", stats.total_tracks);
    let _ = writeln!(out, "Total duration: {:.1} minutes", stats.duration_minutes());
    let _ = writeln!(out, "{}\n", "=".repeat(50));

    for (i, track) in tracks.iter().enumerate() {
        let _ = writeln!(out, "{:2}. {}", i + 1, track.name);
        let _ = writeln!(out, "    Artist: {}", track.artist);
        let _ = writeln!(out, "    Album: {}", track.album.as_deref().unwrap_or("Unknown"));
        if let Some(duration) = track.duration_formatted() {
            let _ = writeln!(out, "    Length: {}", duration);
        }
        if let Some(judgment) = &track.judgment {
            let _ = writeln!(out, "    AI Party Score: {}/10", judgment.party_score);
            let _ = writeln!(out, "    AI Reasoning: {}", judgment.reasoning);
        }
        if let Some(cluster) = track.cluster {
            let _ = writeln!(out, "    Music Style: Cluster {}", cluster);
        }

        let mut features = Vec::new();
        if let Some(danceability) = track.danceability {
            features.push(format!("Danceability: {:.2}", danceability));
        }
        if let Some(energy) = track.name_energy {
            features.push(format!("Title energy: {:.2}", energy));
        }
        if !features.is_empty() {
            let _ = writeln!(out, "    Features: {}", features.join(", "));
        }
        if let Some(url) = &track.external_url {
            let _ = writeln!(out, "    Spotify: {}", url);
        }
        out.push('\n');
    }

    out
}

pub fn render_report(tracks: &[Track], clusters: &[ClusterSummary], generated: &DateTime<Local>) -> String {
    let stats = PlaylistStats::from_tracks(tracks);
    let mut out = String::new();

    let _ = writeln!(out, "Wedding Playlist Analysis Report");
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "Generated on: {}\n", generated.format("%Y-%m-%d %H:%M:%S"));

    let _ = writeln!(out, "OVERALL STATISTICS");
    let _ = writeln!(out, "{}", "-".repeat(30));
    let _ = writeln!(out, "Total tracks analyzed: {}", stats.total_tracks);
    let _ = writeln!(out, "Unique artists: {}", stats.unique_artists);
    let _ = writeln!(out, "Total duration: {:.1} minutes", stats.duration_minutes());
    if let Some(popularity) = stats.average_popularity {
        let _ = writeln!(out, "Average popularity: {:.1}/100", popularity);
    }
    let _ = writeln!(out, "Explicit tracks: {}", stats.explicit_tracks);

    let scores: Vec<f64> = tracks.iter().filter_map(Track::party_score).collect();
    if let Some(average) = stats.average_party_score {
        let high = scores.iter().filter(|s| **s >= HIGH_SCORE_THRESHOLD).count();
        let _ = writeln!(out, "Average AI party score: {:.1}/10", average);
        let _ = writeln!(out, "High-scoring tracks (7+): {}", high);

        let mut breakdown: BTreeMap<&str, usize> = BTreeMap::new();
        for recommendation in tracks.iter().filter_map(Track::recommendation) {
            *breakdown.entry(recommendation.as_str()).or_insert(0) += 1;
        }
        let _ = writeln!(out, "\nAI Recommendations breakdown:");
        for (label, count) in &breakdown {
            let _ = writeln!(out, "  {}: {} tracks", label.to_uppercase(), count);
        }
    }

    let genres = genre_summary(tracks);
    if !genres.is_empty() {
        let _ = writeln!(out, "\nTOP GENRES");
        let _ = writeln!(out, "{}", "-".repeat(30));
        for (genre, count) in genres.iter().take(TOP_GENRE_COUNT) {
            let _ = writeln!(out, "{}: {} tracks", genre, count);
        }
    }

    if !clusters.is_empty() {
        let _ = writeln!(out, "\nMUSIC STYLE CLUSTERS");
        let _ = writeln!(out, "{}", "-".repeat(30));
        for cluster in clusters {
            let _ = writeln!(out, "\nCluster {}: {}", cluster.cluster_id, cluster.style_description);
            let _ = writeln!(out, "  Tracks: {}", cluster.size);
            let _ = writeln!(out, "  Era: {}", cluster.era_formatted());
            let _ = writeln!(out, "  Duration: {:.1} minutes", cluster.total_duration_min);
            if let Some(popularity) = cluster.avg_popularity {
                let _ = writeln!(out, "  Avg Popularity: {:.1}/100", popularity);
            }
            let features: Vec<String> = cluster
                .avg_features
                .iter()
                .map(|(column, value)| format!("{}={:.2}", column, value))
                .collect();
            let _ = writeln!(out, "  Feature means: {}", features.join(", "));
            let _ = writeln!(out, "  Sample tracks:");
            for sample in &cluster.sample_tracks {
                let _ = writeln!(out, "    - {} by {}", sample.name, sample.artist);
            }
        }
    }

    if !scores.is_empty() {
        let _ = writeln!(out, "\nTOP AI-RECOMMENDED TRACKS");
        let _ = writeln!(out, "{}", "-".repeat(30));

        let mut ranked: Vec<&Track> = tracks.iter().filter(|t| t.judgment.is_some()).collect();
        ranked.sort_by(|a, b| {
            let (a, b) = (a.party_score().unwrap_or(0.0), b.party_score().unwrap_or(0.0));
            b.total_cmp(&a)
        });
        for (i, track) in ranked.iter().take(TOP_TRACK_COUNT).enumerate() {
            let _ = writeln!(
                out,
                "{:2}. {} - {} (Score: {}/10)",
                i + 1,
                track.name,
                track.artist,
                track.party_score().unwrap_or(0.0)
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureColumn, Judgment, Recommendation, SampleTrack};
    use tempfile::TempDir;

    fn judged(id: &str, score: f64, recommendation: Recommendation) -> Track {
        let mut track = Track::new(id, format!("Song {}", id), format!("Artist {}", id));
        track.album = Some("Album".to_string());
        track.duration_ms = Some(180_000);
        track.popularity = Some(60);
        track.cluster = Some(0);
        track.judgment = Some(Judgment {
            party_score: score,
            reasoning: format!("Reason {}", id),
            recommendation,
        });
        track
    }

    fn cluster() -> ClusterSummary {
        ClusterSummary {
            cluster_id: 0,
            size: 2,
            style_description: "Mainstream modern".to_string(),
            avg_features: vec![(FeatureColumn::Popularity, 60.0)],
            sample_tracks: vec![SampleTrack {
                name: "Song a".to_string(),
                artist: "Artist a".to_string(),
            }],
            avg_popularity: Some(60.0),
            total_duration_min: 6.0,
            era_start: Some(2018),
            era_end: Some(2021),
        }
    }

    #[test]
    fn test_text_playlist() {
        let tracks = vec![judged("a", 9.0, Recommendation::Yes)];
        let text = render_text_playlist(DEFAULT_PLAYLIST_NAME, &tracks, &Local::now());

        assert!(text.starts_with(DEFAULT_PLAYLIST_NAME));
        assert!(text.contains("Total tracks: 1"));
        assert!(text.contains("Total duration: 3.0 minutes"));
        assert!(text.contains(" 1. Song a"));
        assert!(text.contains("    AI Party Score: 9/10"));
        assert!(text.contains("    AI Reasoning: Reason a"));
        assert!(text.contains("    Music Style: Cluster 0"));
    }

    #[test]
    fn test_report_sections() {
        let tracks = vec![
            judged("a", 9.0, Recommendation::Yes),
            judged("b", 4.0, Recommendation::No),
            judged("c", 7.0, Recommendation::Maybe),
        ];
        let report = render_report(&tracks, &[cluster()], &Local::now());

        assert!(report.contains("Total tracks analyzed: 3"));
        assert!(report.contains("Average AI party score: 6.7/10"));
        assert!(report.contains("High-scoring tracks (7+): 2"));
        assert!(report.contains("  YES: 1 tracks"));
        assert!(report.contains("  NO: 1 tracks"));
        assert!(report.contains("Cluster 0: Mainstream modern"));
        assert!(report.contains("  Era: 2018-2021"));
        assert!(report.contains("    - Song a by Artist a"));

        let top = report.split("TOP AI-RECOMMENDED TRACKS").nth(1).unwrap();
        let a = top.find("Song a").unwrap();
        let c = top.find("Song c").unwrap();
        let b = top.find("Song b").unwrap();
        assert!(a < c && c < b);
    }

    #[test]
    fn test_report_without_judgments() {
        let tracks = vec![Track::new("a", "Song", "Artist")];
        let report = render_report(&tracks, &[], &Local::now());
        assert!(!report.contains("Average AI party score"));
        assert!(!report.contains("TOP AI-RECOMMENDED TRACKS"));
        assert!(!report.contains("MUSIC STYLE CLUSTERS"));
    }

    #[test]
    fn test_export_all_writes_files() {
        let dir = TempDir::new().unwrap();
        let exporter = PlaylistExporter::new(dir.path().join("output"));

        let selected = vec![judged("a", 9.0, Recommendation::Yes)];
        let judged_tracks = vec![selected[0].clone(), judged("b", 2.0, Recommendation::No)];
        let playlist = PartyPlaylist::new(selected, judged_tracks, vec![cluster()]);

        let files = exporter.export_all(&playlist).unwrap();
        assert!(files.text.exists());
        assert!(files.report.exists());

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&files.json).unwrap()).unwrap();
        assert_eq!(json["metadata"]["name"], DEFAULT_PLAYLIST_NAME);
        assert_eq!(json["metadata"]["total_tracks"], 1);
        assert_eq!(json["metadata"]["total_duration_minutes"], 3.0);
        assert_eq!(json["tracks"][0]["id"], "a");
        assert_eq!(json["tracks"][0]["ai_party_score"], 9.0);
        assert_eq!(json["tracks"][0]["ai_recommendation"], "yes");

        let file_name = files.json.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("wedding_party_playlist_"));

        let report = fs::read_to_string(&files.report).unwrap();
        assert!(report.contains("Total tracks analyzed: 2"));
    }

    #[test]
    fn test_saved_playlist_reads_exported_json() {
        let dir = TempDir::new().unwrap();
        let exporter = PlaylistExporter::new(dir.path());
        let mut unnamed = judged("", 4.0, Recommendation::Maybe);
        unnamed.name = "Local Demo".to_string();
        let tracks = vec![
            judged("a", 9.0, Recommendation::Yes),
            unnamed,
            judged("b", 8.0, Recommendation::Yes),
        ];

        let path = exporter.export_json(&tracks, &Local::now()).unwrap();
        let saved = SavedPlaylist::load(&path).unwrap();

        assert_eq!(saved.metadata.name.as_deref(), Some(DEFAULT_PLAYLIST_NAME));
        assert_eq!(saved.track_ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(saved.tracks_without_id(), vec!["Local Demo"]);
        assert_eq!(
            saved.default_description(),
            "AI-curated party playlist with 3 tracks (9.0 min total). Average party score: 7.0/10."
        );
        assert!(saved.default_name(&Local::now()).starts_with("AI-Generated Wedding Party Playlist - "));
    }

    #[test]
    fn test_saved_playlist_requires_tracks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("playlist.json");
        fs::write(&path, r#"{"metadata": {"name": "Party"}}"#).unwrap();
        assert!(matches!(
            SavedPlaylist::load(&path),
            Err(ExportError::InvalidPlaylist { .. })
        ));

        fs::write(&path, r#"{"tracks": [{"name": "No id"}]}"#).unwrap();
        let saved = SavedPlaylist::load(&path).unwrap();
        assert_eq!(saved.metadata, SavedMetadata::default());
        assert!(saved.track_ids().is_empty());
        assert_eq!(saved.tracks_without_id(), vec!["No id"]);

        assert!(matches!(
            SavedPlaylist::load(dir.path().join("missing.json")),
            Err(ExportError::ReadFailed { .. })
        ));
    }
}
