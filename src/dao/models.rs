//! Entities exchanged with the external persistent store.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Difficulty tier assigned to a question by its author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Warm-up tier, scores below par.
    Easy,
    /// Baseline tier.
    Medium,
    /// Above-par tier.
    Hard,
    /// Highest tier.
    Expert,
}

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionEntity {
    /// Display text of the option.
    pub text: String,
    /// Whether this option is the canonical correct one.
    #[serde(default)]
    pub correct: bool,
}

/// Read-only quiz question as authored in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEntity {
    /// Question prompt shown to participants.
    pub text: String,
    /// Option set; exactly one option is marked correct.
    pub options: Vec<OptionEntity>,
    /// Optional explanation revealed after the question closes.
    #[serde(default)]
    pub explanation: Option<String>,
    /// Difficulty tier driving the score multiplier.
    pub difficulty: Difficulty,
    /// Points awarded before bonuses and multipliers.
    pub base_points: u32,
    /// Seconds participants have to answer.
    pub time_limit_secs: u32,
}

impl QuestionEntity {
    /// Text of the canonical correct option, if the question has one.
    pub fn correct_option(&self) -> Option<&OptionEntity> {
        self.options.iter().find(|option| option.correct)
    }

    /// Index of the canonical correct option, if the question has one.
    pub fn correct_index(&self) -> Option<usize> {
        self.options.iter().position(|option| option.correct)
    }
}

/// Quiz content referenced by a room, read-only to the session engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizEntity {
    /// Primary key of the quiz document.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Ordered question list.
    pub questions: Vec<QuestionEntity>,
}

/// Per-question detail stored alongside a participant's result.
#[derive(Debug, Clone)]
pub struct AnswerDetailEntity {
    /// Index of the question within the quiz.
    pub question_index: usize,
    /// Option text the participant selected, if any was resolvable.
    pub selected: Option<String>,
    /// Canonical correct option text.
    pub correct: String,
    /// Whether the selection matched the canonical answer.
    pub is_correct: bool,
    /// Seconds the participant took to answer.
    pub time_taken_secs: f64,
    /// Points awarded for this answer.
    pub points: u32,
}

/// Final per-participant result record persisted when a quiz ends.
#[derive(Debug, Clone)]
pub struct ResultEntity {
    /// Primary key of the result document.
    pub id: Uuid,
    /// Quiz that was played.
    pub quiz_id: Uuid,
    /// Code of the room the quiz was played in.
    pub room_code: String,
    /// Stable identity of the participant.
    pub user_id: Uuid,
    /// Display name at the time of play.
    pub username: String,
    /// Total points scored.
    pub score: u32,
    /// Maximum achievable score for the quiz.
    pub max_score: u32,
    /// Score as a percentage of the maximum, in `[0, 100]`.
    pub percentage: f64,
    /// Number of correctly answered questions.
    pub correct_count: u32,
    /// Number of questions in the quiz.
    pub total_questions: u32,
    /// Sum of answer times in seconds.
    pub total_time_secs: f64,
    /// Mean answer time in seconds over answered questions.
    pub average_time_secs: f64,
    /// Final 1-based rank within the room.
    pub rank: u32,
    /// Full per-question breakdown.
    pub answers: Vec<AnswerDetailEntity>,
    /// When the quiz finished.
    pub finished_at: OffsetDateTime,
}

/// Increments applied to a user's lifetime aggregate statistics.
#[derive(Debug, Clone, Copy)]
pub struct UserStatsDelta {
    /// Quizzes completed (always 1 per finished session).
    pub quizzes_played: u32,
    /// Points to add to the lifetime total.
    pub score: u32,
    /// Candidate for the lifetime highest single-quiz score.
    pub highest_score: u32,
    /// Correct answers to add.
    pub correct_answers: u32,
    /// Answered questions to add (denominator for lifetime accuracy).
    pub questions_answered: u32,
}
