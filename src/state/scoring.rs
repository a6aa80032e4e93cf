//! Pure scoring engine: answer points from question data, answer time, and
//! the participant's recent performance. No state of its own.

use crate::dao::models::{Difficulty, QuestionEntity};

/// Accuracy above which the adaptive multiplier rewards a participant.
const ADAPTIVE_HIGH_ACCURACY: f64 = 0.8;
/// Accuracy below which the adaptive multiplier cushions a participant.
const ADAPTIVE_LOW_ACCURACY: f64 = 0.4;

/// Score multiplier attached to a difficulty tier.
pub fn difficulty_multiplier(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Easy => 0.8,
        Difficulty::Medium => 1.0,
        Difficulty::Hard => 1.3,
        Difficulty::Expert => 1.6,
    }
}

/// Running-accuracy scalar rewarding high performers and cushioning strugglers.
///
/// Accuracy is computed over answers recorded before the current submission;
/// a participant with no prior answers is neutral.
pub fn adaptive_multiplier(prior_correct: u32, prior_answered: u32) -> f64 {
    if prior_answered == 0 {
        return 1.0;
    }

    let accuracy = f64::from(prior_correct) / f64::from(prior_answered);
    if accuracy > ADAPTIVE_HIGH_ACCURACY {
        1.2
    } else if accuracy < ADAPTIVE_LOW_ACCURACY {
        0.8
    } else {
        1.0
    }
}

/// Bonus that decays linearly from half the base points to zero at the limit.
pub fn speed_bonus(base_points: u32, time_taken_secs: f64, time_limit_secs: u32) -> f64 {
    if time_limit_secs == 0 {
        return 0.0;
    }

    let remaining = (1.0 - time_taken_secs / f64::from(time_limit_secs)).max(0.0);
    (f64::from(base_points) * 0.5 * remaining).round()
}

/// Points for one answer. Incorrect answers always score zero.
pub fn score_answer(
    question: &QuestionEntity,
    correct: bool,
    time_taken_secs: f64,
    prior_correct: u32,
    prior_answered: u32,
) -> u32 {
    if !correct {
        return 0;
    }

    let base = f64::from(question.base_points);
    let bonus = speed_bonus(question.base_points, time_taken_secs, question.time_limit_secs);
    let points = (base + bonus)
        * difficulty_multiplier(question.difficulty)
        * adaptive_multiplier(prior_correct, prior_answered);

    points.round() as u32
}
