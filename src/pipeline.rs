//! End-to-end orchestration.
//!
//! `PartyPipeline` owns its collaborators and runs the stages strictly in
//! sequence: fetch, deduplicate, enrich, derive features, cluster, judge and
//! select. Only clustering problems and track-source failures abort a run.

use log::info;
use std::time::Duration;

use crate::clustering::StyleClusterer;
use crate::error::PipelineResult;
use crate::features::{dedup_tracks, FeatureBuilder};
use crate::judgment::JudgmentBatcher;
use crate::lastfm::{enrich_tracks, EnrichmentSource};
use crate::models::{ClusterSummary, PartyPlaylist, PipelineConfig, Track};
use crate::selector::select;
use crate::spotify_client::TrackSource;
use crate::utils::logging;

/// Clustered tracks before judgment
#[derive(Debug, Clone)]
pub struct StyleAnalysis {
    /// Clustered tracks, ordered by cluster then input order
    pub tracks: Vec<Track>,
    pub clusters: Vec<ClusterSummary>,
    /// Tracks left out of clustering for missing features
    pub excluded: usize,
}

pub struct PartyPipeline {
    config: PipelineConfig,
    source: Box<dyn TrackSource>,
    enrichment: Option<Box<dyn EnrichmentSource>>,
    features: FeatureBuilder,
    clusterer: StyleClusterer,
    batcher: JudgmentBatcher,
}

impl PartyPipeline {
    pub fn new(
        config: PipelineConfig,
        source: Box<dyn TrackSource>,
        enrichment: Option<Box<dyn EnrichmentSource>>,
        batcher: JudgmentBatcher,
    ) -> Self {
        let features = FeatureBuilder::from_config(&config);
        let clusterer = StyleClusterer::from_config(&config);
        Self {
            config,
            source,
            enrichment,
            features,
            clusterer,
            batcher,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch tracks, drop duplicate IDs (first wins) and cap at the track limit
    pub fn collect_tracks(&self) -> PipelineResult<Vec<Track>> {
        let fetched = self.source.fetch(self.config.track_limit)?;
        let fetched_count = fetched.len();

        let mut tracks = dedup_tracks(fetched);
        tracks.truncate(self.config.track_limit);
        logging::log_tracks_fetched(fetched_count, tracks.len());

        Ok(tracks)
    }

    fn enrich(&self, tracks: Vec<Track>) -> Vec<Track> {
        match &self.enrichment {
            Some(source) => {
                let total = tracks.len();
                let delay = Duration::from_millis(self.config.enrichment_delay_ms);
                let enriched = enrich_tracks(source.as_ref(), tracks, delay);
                let count = enriched.iter().filter(|t| t.enrichment.is_some()).count();
                logging::log_tracks_enriched(count, total);
                enriched
            }
            None => {
                info!("No enrichment source configured, skipping Last.fm lookups");
                tracks
            }
        }
    }

    /// Run everything up to and including clustering
    pub fn analyze(&self) -> PipelineResult<StyleAnalysis> {
        let tracks = self.collect_tracks()?;
        let tracks = self.enrich(tracks);
        let tracks = self.features.build_all(tracks);
        let candidates = tracks.len();

        let (tracks, clusters) = self.clusterer.cluster(tracks, self.config.cluster_count)?;
        let excluded = candidates - tracks.len();
        logging::log_clusters_formed(tracks.len(), excluded, clusters.len());

        Ok(StyleAnalysis {
            tracks,
            clusters,
            excluded,
        })
    }

    /// Run the full pipeline and return the selected party playlist
    pub fn run(&self) -> PipelineResult<PartyPlaylist> {
        let analysis = self.analyze()?;

        let judged = self
            .batcher
            .validate(analysis.tracks, self.config.validation_batch_size);
        let selected = select(judged.clone(), self.config.min_party_score);

        let playlist = PartyPlaylist::new(selected, judged, analysis.clusters);
        info!(
            "Party playlist ready: {} tracks, {}",
            playlist.track_count(),
            playlist.stats.duration_formatted()
        );
        Ok(playlist)
    }
}
