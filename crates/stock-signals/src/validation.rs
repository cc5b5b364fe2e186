//! Normalization of oracle replies before they are persisted

use thiserror::Error;
use tracing::warn;

use crate::model::Confidence;
use crate::oracle::OracleReply;

pub const MIN_SCORE: f64 = -10.0;
pub const MAX_SCORE: f64 = 10.0;

/// Narrative stored when the oracle gave none
pub const UNAVAILABLE_NARRATIVE: &str = "analysis unavailable";

/// A reply field that had to be corrected
///
/// Only ever logged; never returned to callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationWarning {
    #[error("score {raw} out of range [-10, 10], clamped to {clamped}")]
    ScoreClamped { raw: f64, clamped: f64 },

    #[error("score missing or not a number, using 0")]
    ScoreMissing,

    #[error("invalid confidence '{0}', using low")]
    InvalidConfidence(String),

    #[error("confidence missing, using low")]
    ConfidenceMissing,

    #[error("narrative missing")]
    NarrativeMissing,
}

/// A reply reduced to the fields every signal row needs
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSignal {
    pub score: f64,
    pub confidence: Confidence,
    pub narrative: String,
    pub warnings: Vec<ValidationWarning>,
}

/// Clamp a score into [-10, 10]; NaN becomes 0
pub fn clamp_score(raw: f64) -> (f64, Option<ValidationWarning>) {
    if raw.is_nan() {
        return (0.0, Some(ValidationWarning::ScoreMissing));
    }
    let clamped = raw.clamp(MIN_SCORE, MAX_SCORE);
    if (clamped - raw).abs() > f64::EPSILON || raw.is_infinite() {
        (clamped, Some(ValidationWarning::ScoreClamped { raw, clamped }))
    } else {
        (clamped, None)
    }
}

pub fn normalize_confidence(raw: Option<&str>) -> (Confidence, Option<ValidationWarning>) {
    match raw {
        None => (Confidence::Low, Some(ValidationWarning::ConfidenceMissing)),
        Some(label) => match label.parse() {
            Ok(confidence) => (confidence, None),
            Err(_) => (Confidence::Low, Some(ValidationWarning::InvalidConfidence(label.to_string()))),
        },
    }
}

/// Validate a category reply, logging each correction
pub fn validate_reply(reply: &OracleReply) -> ValidatedSignal {
    let mut warnings = Vec::new();

    let score = match reply.score() {
        Some(raw) => {
            let (score, warning) = clamp_score(raw);
            warnings.extend(warning);
            score
        }
        None => {
            warnings.push(ValidationWarning::ScoreMissing);
            0.0
        }
    };

    let (confidence, warning) = normalize_confidence(reply.confidence());
    warnings.extend(warning);

    let narrative = reply.narrative().map_or_else(
        || {
            warnings.push(ValidationWarning::NarrativeMissing);
            UNAVAILABLE_NARRATIVE.to_string()
        },
        str::to_string,
    );

    for warning in &warnings {
        warn!(%warning, "Corrected oracle reply");
    }

    ValidatedSignal {
        score,
        confidence,
        narrative,
        warnings,
    }
}

/// Neutral result used when the oracle could not answer
pub fn fallback_signal() -> ValidatedSignal {
    ValidatedSignal {
        score: 0.0,
        confidence: Confidence::Low,
        narrative: UNAVAILABLE_NARRATIVE.to_string(),
        warnings: Vec::new(),
    }
}
