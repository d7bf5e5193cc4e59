use crate::models::{Recommendation, Track};
use crate::utils::logging;

/// Pick the party tracks out of a judged list.
///
/// A track qualifies when its score reaches `min_score` or the oracle said
/// "yes" outright. Qualifying tracks come back best score first; equal
/// scores keep their input order. Tracks without a judgment never qualify.
pub fn select(judged: Vec<Track>, min_score: f64) -> Vec<Track> {
    let judged_count = judged.len();

    let mut selected: Vec<Track> = judged
        .into_iter()
        .filter(|track| match &track.judgment {
            Some(judgment) => {
                judgment.party_score >= min_score || judgment.recommendation == Recommendation::Yes
            }
            None => false,
        })
        .collect();

    // sort_by is stable
    selected.sort_by(|a, b| {
        let a = a.party_score().unwrap_or(f64::MIN);
        let b = b.party_score().unwrap_or(f64::MIN);
        b.total_cmp(&a)
    });

    logging::log_playlist_selected(selected.len(), judged_count, min_score);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Judgment;

    fn judged(id: &str, score: f64, recommendation: &str) -> Track {
        let mut track = Track::new(id, id, "Artist");
        track.judgment = Some(Judgment {
            party_score: score,
            reasoning: String::new(),
            recommendation: Recommendation::from_label(recommendation),
        });
        track
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_yes_overrides_low_score() {
        let tracks = vec![judged("a", 9.0, "no"), judged("b", 3.0, "yes"), judged("c", 7.0, "maybe")];
        let selected = select(tracks, 6.0);
        assert_eq!(ids(&selected), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_below_threshold_without_yes_is_dropped() {
        let tracks = vec![judged("a", 5.9, "maybe"), judged("b", 6.0, "no"), judged("c", 1.0, "no")];
        let selected = select(tracks, 6.0);
        assert_eq!(ids(&selected), vec!["b"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let tracks = vec![
            judged("first", 7.0, "maybe"),
            judged("top", 9.0, "yes"),
            judged("second", 7.0, "no"),
            judged("third", 7.0, "yes"),
        ];
        let selected = select(tracks, 6.0);
        assert_eq!(ids(&selected), vec!["top", "first", "second", "third"]);
    }

    #[test]
    fn test_unjudged_tracks_are_skipped() {
        let tracks = vec![Track::new("raw", "Raw", "Artist"), judged("a", 8.0, "yes")];
        assert_eq!(ids(&select(tracks, 0.0)), vec!["a"]);
        assert!(select(Vec::new(), 6.0).is_empty());
    }
}
