use serde::{Deserialize, Serialize};

use crate::error::InterviewError;

use super::{clamp_dimension, round2, DimensionScores, ScoringWeights, DIMENSION_MAX};

/// Scale factor from the 0–5 dimension range to the 0–100 final score.
const FINAL_SCALE: f64 = 100.0 / DIMENSION_MAX;

/// Skill category derived from a final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Band::Beginner => "Beginner",
            Band::Intermediate => "Intermediate",
            Band::Advanced => "Advanced",
            Band::Expert => "Expert",
        })
    }
}

/// Upper bounds (inclusive) of the lower three bands; anything above
/// `advanced_max` is Expert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandBreakpoints {
    pub beginner_max: f64,
    pub intermediate_max: f64,
    pub advanced_max: f64,
}

impl Default for BandBreakpoints {
    fn default() -> Self {
        Self {
            beginner_max: 40.0,
            intermediate_max: 65.0,
            advanced_max: 85.0,
        }
    }
}

impl BandBreakpoints {
    pub fn validate(&self) -> Result<(), InterviewError> {
        let b = [self.beginner_max, self.intermediate_max, self.advanced_max];
        let ascending = b.windows(2).all(|w| w[0] < w[1]);
        let inside = b.iter().all(|v| *v > 0.0 && *v < 100.0);
        if !(ascending && inside) {
            return Err(InterviewError::config(format!(
                "band breakpoints must be strictly ascending within (0, 100), got {:?}",
                b
            )));
        }
        Ok(())
    }

    /// Boundary values belong to the lower band.
    pub fn band_for(&self, score: f64) -> Band {
        if score <= self.beginner_max {
            Band::Beginner
        } else if score <= self.intermediate_max {
            Band::Intermediate
        } else if score <= self.advanced_max {
            Band::Advanced
        } else {
            Band::Expert
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub blended: DimensionScores,
    pub final_score: f64,
    pub band: Band,
}

/// Blend deterministic and optional semantic scores into a 0–100 score and band.
///
/// Each blended dimension is the mean of both signals, kept within
/// `max_delta` of the deterministic value.
pub fn aggregate(
    deterministic: &DimensionScores,
    semantic: Option<&DimensionScores>,
    weights: &ScoringWeights,
    max_delta: f64,
    bands: &BandBreakpoints,
) -> Result<Aggregate, InterviewError> {
    weights.validate()?;
    let delta = max_delta.max(0.0);

    let blended = match semantic {
        None => deterministic.clamped(),
        Some(sem) => deterministic.zip_with(sem, |d, s| {
            let d = clamp_dimension(d);
            let mean = (d + clamp_dimension(s)) / 2.0;
            clamp_dimension(mean.clamp(d - delta, d + delta))
        }),
    };

    let weighted: f64 = blended
        .as_array()
        .iter()
        .zip(weights.as_array())
        .map(|(score, weight)| score * weight)
        .sum();
    // Banded before rounding.
    let raw = (weighted * FINAL_SCALE).clamp(0.0, 100.0);
    let final_score = round2(raw);

    Ok(Aggregate {
        blended,
        final_score,
        band: bands.band_for(raw),
    })
}
