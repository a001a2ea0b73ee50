//! Maps a feedback summary and participation counts to a performance percentage.
//!
//! The curve is intentionally compressive: a perfect star rating with no
//! participation lands at 65, and the best reachable result is 94, so the
//! 95 ceiling never binds in practice. Changing any constant here changes
//! every stored score.

use crate::feedback::StarRating;

pub const MAX_PERFORMANCE_PERCENTAGE: u8 = 95;

const STAR_WEIGHT: f64 = 0.70;
const PARTICIPATION_WEIGHT: f64 = 0.15;
const WORD_WEIGHT: f64 = 0.15;

/// 5 points per utterance, capped at 85.
const POINTS_PER_UTTERANCE: f64 = 5.0;
const PARTICIPATION_CAP: f64 = 85.0;

/// 1 point per 10 words, capped at 80.
const WORDS_PER_POINT: f64 = 10.0;
const WORD_CAP: f64 = 80.0;

const CURVE_EXPONENT: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub star_score: f64,
    pub participation_score: f64,
    pub word_score: f64,
    pub weighted: f64,
    pub curved: f64,
    pub percentage: u8,
}

pub fn score_breakdown(
    summary: &str,
    utterance_count: usize,
    total_word_count: usize,
) -> ScoreBreakdown {
    let rating = StarRating::parse(summary);
    let star_score = rating.value() as f64 / 5.0 * 100.0;
    let participation_score = (utterance_count as f64 * POINTS_PER_UTTERANCE).min(PARTICIPATION_CAP);
    let word_score = (total_word_count as f64 / WORDS_PER_POINT).min(WORD_CAP);

    let weighted = STAR_WEIGHT * star_score
        + PARTICIPATION_WEIGHT * participation_score
        + WORD_WEIGHT * word_score;
    let curved = (weighted / 100.0).powf(CURVE_EXPONENT) * 100.0;
    let percentage = curved.round().min(MAX_PERFORMANCE_PERCENTAGE as f64).max(0.0) as u8;

    ScoreBreakdown {
        star_score,
        participation_score,
        word_score,
        weighted,
        curved,
        percentage,
    }
}

pub fn performance_percentage(summary: &str, utterance_count: usize, total_word_count: usize) -> u8 {
    score_breakdown(summary, utterance_count, total_word_count).percentage
}
