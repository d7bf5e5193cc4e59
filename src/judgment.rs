//! Party-suitability judgment.
//!
//! Tracks are sent to the scoring oracle in fixed-size batches. Whatever the
//! oracle does, every track leaves this module with a judgment: replies that
//! cannot be used are replaced by `Judgment::fallback`.

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{OracleError, OracleResult};
use crate::lastfm::format_for_prompt;
use crate::models::{Judgment, Recommendation, Track};
use crate::utils::logging;
use crate::validation_log::{ValidationLogEntry, ValidationSink};

pub const SYSTEM_INSTRUCTION: &str = "You are a music expert specializing in party and wedding playlists. \
Analyze tracks for their suitability in creating an energetic, fun party atmosphere.";

/// Reasoning given to every track when no oracle is configured
pub const UNAVAILABLE_REASON: &str = "validation unavailable";

const NO_REASONING: &str = "No reasoning provided";

const PROMPT_HEADER: &str = "Analyze the following tracks for their suitability in a wedding/party playlist.
Consider factors like danceability, energy, mood, and overall party atmosphere.

For each track, provide:
1. party_score (1-10): How suitable is this track for a party? (1=terrible, 10=perfect)
2. reasoning: Brief explanation of why it fits or doesn't fit
3. recommendation: \"yes\", \"no\", or \"maybe\"

Tracks to analyze:
";

const PROMPT_SCHEMA: &str = "
Please respond in JSON format:
[
  {
    \"track_number\": 1,
    \"party_score\": 8,
    \"reasoning\": \"High energy and danceability make this perfect for dancing\",
    \"recommendation\": \"yes\"
  },
  ...
]";

/// External judge that scores a rendered batch
pub trait ScoringOracle {
    /// Send the system instruction and batch prompt, returning the raw reply text
    fn score(&self, system: &str, prompt: &str) -> OracleResult<String>;
}

/// Splits tracks into batches, asks the oracle about each and repairs
/// whatever comes back.
pub struct JudgmentBatcher {
    oracle: Option<Box<dyn ScoringOracle>>,
    sink: Option<Box<dyn ValidationSink>>,
}

impl JudgmentBatcher {
    /// `None` means no oracle credential is configured
    pub fn new(oracle: Option<Box<dyn ScoringOracle>>) -> Self {
        Self { oracle, sink: None }
    }

    pub fn with_sink(mut self, sink: Box<dyn ValidationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn is_available(&self) -> bool {
        self.oracle.is_some()
    }

    /// Judge every track, preserving order. Never fails.
    pub fn validate(&self, tracks: Vec<Track>, batch_size: usize) -> Vec<Track> {
        let oracle = match self.oracle.as_deref() {
            Some(oracle) => oracle,
            None => {
                warn!("{}; all {} tracks get neutral scores", OracleError::Unavailable, tracks.len());
                return tracks
                    .into_iter()
                    .map(|track| with_judgment(track, Judgment::fallback(UNAVAILABLE_REASON)))
                    .collect();
            }
        };

        let batch_size = batch_size.max(1);
        let batch_count = (tracks.len() + batch_size - 1) / batch_size;
        let mut judged = Vec::with_capacity(tracks.len());
        let mut remaining = tracks.into_iter();

        for batch_number in 1..=batch_count {
            let batch: Vec<Track> = remaining.by_ref().take(batch_size).collect();
            let judgments = self.judge_batch(oracle, batch_number, &batch);
            logging::log_batch_judged(batch_number, batch_count, batch.len());

            judged.extend(batch.into_iter().zip(judgments).map(|(track, j)| with_judgment(track, j)));
        }

        judged
    }

    /// Judge one batch, returning exactly one judgment per track
    fn judge_batch(&self, oracle: &dyn ScoringOracle, batch_number: usize, batch: &[Track]) -> Vec<Judgment> {
        let prompt = build_prompt(batch);
        let mut entry = ValidationLogEntry::new(batch_number, batch, prompt.as_str());

        let outcome = match oracle.score(SYSTEM_INSTRUCTION, &prompt) {
            Ok(reply) => {
                let parsed = parse_reply(&reply);
                entry.raw_response = Some(reply);
                parsed
            }
            Err(e) => Err(e),
        };

        let judgments = match outcome {
            Ok(parsed) => {
                if parsed.len() < batch.len() {
                    debug!(
                        "Batch {} reply covered {} of {} tracks",
                        batch_number,
                        parsed.len(),
                        batch.len()
                    );
                }
                complete_judgments(parsed, batch.len())
            }
            Err(e) => {
                let cause = e.to_string();
                logging::log_batch_fallback(batch_number, &cause);
                entry.error = Some(cause.clone());
                vec![Judgment::fallback(cause); batch.len()]
            }
        };

        if let Some(sink) = &self.sink {
            entry.results = judgments.clone();
            sink.record(&entry);
        }

        judgments
    }
}

fn with_judgment(mut track: Track, judgment: Judgment) -> Track {
    track.judgment = Some(judgment);
    track
}

/// Match parsed results to tracks by position. Missing tail entries fall
/// back; surplus entries are dropped.
pub fn complete_judgments(mut parsed: Vec<Judgment>, track_count: usize) -> Vec<Judgment> {
    let returned = parsed.len();
    parsed.truncate(track_count);
    while parsed.len() < track_count {
        parsed.push(Judgment::fallback(format!(
            "Unable to analyze: oracle returned {} results for {} tracks",
            returned, track_count
        )));
    }
    parsed
}

/// Render one track as a single prompt line. Optional context is only
/// included when present.
pub fn render_track_description(number: usize, track: &Track) -> String {
    let mut details = Vec::new();
    if let Some(popularity) = track.popularity {
        details.push(format!("popularity {}/100", popularity));
    }
    if let Some(year) = track.release_year {
        details.push(format!("released {}", year));
    }
    if let Some(duration) = track.duration_formatted() {
        details.push(format!("length {}", duration));
    }
    if let Some(energy) = track.name_energy {
        details.push(format!("title energy {:.2}", energy));
    }
    if let Some(danceability) = track.danceability {
        details.push(format!("tag danceability {:.2}", danceability));
    }

    let mut line = format!("{}. \"{}\" by {}", number, track.name, track.artist);
    if !details.is_empty() {
        line.push_str(&format!(" ({})", details.join(", ")));
    }

    if let Some(enrichment) = &track.enrichment {
        let context = format_for_prompt(enrichment);
        if !context.is_empty() {
            line.push_str(" | Last.fm: ");
            line.push_str(&context);
        }
    }

    line
}

/// Build the user message for one batch, tracks numbered from 1
pub fn build_prompt(batch: &[Track]) -> String {
    let mut prompt = String::from(PROMPT_HEADER);
    for (i, track) in batch.iter().enumerate() {
        prompt.push('\n');
        prompt.push_str(&render_track_description(i + 1, track));
    }
    prompt.push('\n');
    prompt.push_str(PROMPT_SCHEMA);
    prompt
}

#[derive(Debug, Deserialize)]
struct ReplyEntry {
    party_score: Option<Value>,
    reasoning: Option<String>,
    recommendation: Option<String>,
}

impl ReplyEntry {
    fn into_judgment(self) -> OracleResult<Judgment> {
        let party_score = match self.party_score {
            None | Some(Value::Null) => Judgment::FALLBACK_SCORE,
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|score| score.is_finite())
                .ok_or_else(|| OracleError::ResponseParse(format!("unusable party_score {}", n)))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|score| score.is_finite())
                .ok_or_else(|| OracleError::ResponseParse(format!("unusable party_score \"{}\"", s)))?,
            Some(other) => {
                return Err(OracleError::ResponseParse(format!("unusable party_score {}", other)));
            }
        };

        Ok(Judgment {
            party_score,
            reasoning: self.reasoning.unwrap_or_else(|| NO_REASONING.to_string()),
            recommendation: self
                .recommendation
                .as_deref()
                .map(Recommendation::from_label)
                .unwrap_or(Recommendation::Maybe),
        })
    }
}

/// Decode the span from the first `[` to the last `]` of a reply as the
/// result array.
pub fn parse_reply(reply: &str) -> OracleResult<Vec<Judgment>> {
    let start = reply
        .find('[')
        .ok_or_else(|| OracleError::ResponseParse("no JSON array found in reply".to_string()))?;
    let end = reply
        .rfind(']')
        .filter(|end| *end > start)
        .ok_or_else(|| OracleError::ResponseParse("no JSON array found in reply".to_string()))?;

    let entries: Vec<ReplyEntry> = serde_json::from_str(&reply[start..=end])
        .map_err(|e| OracleError::ResponseParse(e.to_string()))?;

    entries.into_iter().map(ReplyEntry::into_judgment).collect()
}
