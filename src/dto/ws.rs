//! WebSocket message types: actions accepted from clients and events
//! broadcast back to them.
//!
//! Both directions are tagged enums; the `type` field carries the kebab-case
//! message name. Unknown inbound types deserialize to [`ClientAction::Unknown`]
//! so one misbehaving client cannot poison the read loop.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::auth::UserIdentity;
use crate::dao::models::{Difficulty, QuestionEntity};
use crate::dto::room::{RoomConfigInput, RoomSummary};
use crate::error::ServiceError;
use crate::state::leaderboard::LeaderboardEntry;
use crate::state::lifecycle::{FinishReason, RoomStatus};
use crate::state::room::AnswerValue;

/// Messages accepted from WebSocket clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientAction {
    /// First message on every socket; resolves the caller's identity.
    Identify {
        /// Opaque auth token.
        token: String,
    },
    /// Create a room for a quiz and become its host.
    CreateRoom {
        /// Quiz to play.
        quiz_id: Uuid,
        /// Optional room settings.
        #[serde(default)]
        config: RoomConfigInput,
    },
    /// Join (or rejoin) an existing room.
    Join {
        /// Code of the room to join.
        room_code: String,
    },
    /// Toggle the lobby ready flag.
    Ready {
        /// Room the flag applies to.
        room_code: String,
        /// Desired ready state.
        ready: bool,
    },
    /// Host-only: leave the lobby and start the countdown.
    StartQuiz {
        /// Room to start.
        room_code: String,
    },
    /// Submit an answer for the currently open question.
    SubmitAnswer {
        /// Room the answer belongs to.
        room_code: String,
        /// Question being answered.
        question_index: usize,
        /// Selected option index or free text.
        value: AnswerValue,
        /// Client-reported seconds taken.
        time_taken_secs: f64,
    },
    /// Host-only: skip the review pause and open the next question.
    NextQuestion {
        /// Room to advance.
        room_code: String,
    },
    /// Host-only: end the quiz early and finalize results.
    EndQuiz {
        /// Room to end.
        room_code: String,
    },
    /// Host-only: freeze the current question.
    Pause {
        /// Room to pause.
        room_code: String,
    },
    /// Host-only: reopen the frozen question with a fresh answer window.
    Resume {
        /// Room to resume.
        room_code: String,
    },
    /// Host-only: remove a participant from the room.
    Kick {
        /// Room the target is in.
        room_code: String,
        /// Participant to remove.
        user_id: Uuid,
    },
    /// Detach from a room without closing the socket.
    Leave {
        /// Room to leave.
        room_code: String,
    },
    /// Any message type this server does not understand.
    #[serde(other)]
    Unknown,
}

/// A question as shown to participants: no correctness markers.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionPublic {
    /// Zero-based index within the quiz.
    pub index: usize,
    /// Number of questions in the quiz.
    pub total_questions: usize,
    /// Question prompt.
    pub text: String,
    /// Option texts in authored order, correctness stripped.
    pub options: Vec<String>,
    /// Difficulty tier, visible so clients can display the stakes.
    pub difficulty: Difficulty,
    /// Points before bonuses and multipliers.
    pub base_points: u32,
    /// Seconds the answer window stays open.
    pub time_limit_secs: u32,
}

impl QuestionPublic {
    /// Sanitize a stored question for broadcast.
    pub fn new(index: usize, total_questions: usize, question: &QuestionEntity) -> Self {
        Self {
            index,
            total_questions,
            text: question.text.clone(),
            options: question
                .options
                .iter()
                .map(|option| option.text.clone())
                .collect(),
            difficulty: question.difficulty,
            base_points: question.base_points,
            time_limit_secs: question.time_limit_secs,
        }
    }
}

/// Reveal payload shared by the two question-close events.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct QuestionReveal {
    /// Question that just closed.
    pub question_index: usize,
    /// Text of the canonical correct option.
    pub correct_answer: String,
    /// Index of the correct option, when the question is multiple choice.
    pub correct_index: Option<usize>,
    /// Author-provided explanation, if any.
    pub explanation: Option<String>,
    /// How many participants answered before the close.
    pub answered_count: usize,
}

/// Events pushed to WebSocket clients.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Identity was resolved; the socket may now act.
    Identified {
        /// Resolved identity echoed back.
        user: UserIdentity,
    },
    /// Room was created; the caller is its host.
    RoomCreated {
        /// Snapshot of the new room.
        room: RoomSummary,
    },
    /// Full room snapshot sent to a (re)joining participant.
    RoomState {
        /// Current room status.
        status: RoomStatus,
        /// Question currently shown, if any.
        question: Option<QuestionPublic>,
        /// Seconds left on the open answer window.
        seconds_remaining: Option<u64>,
        /// Live standings at sync time.
        standings: Vec<LeaderboardEntry>,
    },
    /// Someone joined or rejoined the room.
    ParticipantJoined {
        /// Stable id of the participant.
        user_id: Uuid,
        /// Display name.
        username: String,
        /// Whether this reattached an existing participant.
        rejoined: bool,
        /// Active participants after the join.
        participant_count: usize,
    },
    /// A lobby participant toggled their ready flag.
    ParticipantReady {
        /// Stable id of the participant.
        user_id: Uuid,
        /// Desired ready state.
        ready: bool,
    },
    /// One tick of the pre-quiz countdown.
    Countdown {
        /// Seconds until the first question.
        seconds_left: u32,
    },
    /// Countdown finished; gameplay begins.
    QuizStarted {
        /// Number of questions about to be played.
        question_count: usize,
    },
    /// A question opened for answers.
    NewQuestion {
        /// Sanitized question payload.
        question: QuestionPublic,
    },
    /// Private feedback to a submitter, immediately after their answer.
    AnswerFeedback {
        /// Question the feedback is for.
        question_index: usize,
        /// Whether the answer was correct.
        correct: bool,
        /// Points awarded.
        points: u32,
        /// Submitter's total score after the award.
        score: u32,
        /// Submitter's streak after the award.
        streak: u32,
        /// Canonical correct answer text.
        correct_answer: String,
    },
    /// Question closed because every connected participant answered.
    QuestionComplete {
        /// Reveal payload.
        #[serde(flatten)]
        reveal: QuestionReveal,
    },
    /// Question closed because its deadline passed.
    QuestionTimeUp {
        /// Reveal payload.
        #[serde(flatten)]
        reveal: QuestionReveal,
    },
    /// Standings changed.
    LeaderboardUpdate {
        /// Ranked live standings.
        standings: Vec<LeaderboardEntry>,
    },
    /// A participant's connection dropped.
    ParticipantDisconnected {
        /// Stable id of the participant.
        user_id: Uuid,
        /// Display name.
        username: String,
    },
    /// A participant was removed by the host.
    ParticipantKicked {
        /// Stable id of the participant.
        user_id: Uuid,
        /// Display name.
        username: String,
    },
    /// Host paused the quiz.
    Paused,
    /// Host resumed the quiz; a fresh question broadcast follows.
    Resumed,
    /// Quiz finished; these are the final results.
    QuizEnded {
        /// Why the quiz ended.
        reason: FinishReason,
        /// Final standings, disconnected participants included.
        standings: Vec<LeaderboardEntry>,
        /// Wall-clock quiz duration in seconds.
        duration_secs: Option<u64>,
    },
    /// An action failed; the socket stays open.
    Error {
        /// Stable machine-readable code.
        code: String,
        /// Human-readable description.
        message: String,
    },
}

impl ServerEvent {
    /// Build the error event for a failed action.
    pub fn error(err: &ServiceError) -> Self {
        Self::Error {
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn client_actions_deserialize_from_kebab_case_tags() {
        let action: ClientAction = serde_json::from_value(json!({
            "type": "submit-answer",
            "room_code": "QUIZ42",
            "question_index": 1,
            "value": 2,
            "time_taken_secs": 4.5,
        }))
        .unwrap();
        match action {
            ClientAction::SubmitAnswer {
                room_code,
                question_index,
                value,
                time_taken_secs,
            } => {
                assert_eq!(room_code, "QUIZ42");
                assert_eq!(question_index, 1);
                assert_eq!(value, AnswerValue::Choice(2));
                assert!((time_taken_secs - 4.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn text_answers_deserialize_untagged() {
        let action: ClientAction = serde_json::from_value(json!({
            "type": "submit-answer",
            "room_code": "QUIZ42",
            "question_index": 0,
            "value": "Mars",
            "time_taken_secs": 1.0,
        }))
        .unwrap();
        assert!(matches!(
            action,
            ClientAction::SubmitAnswer {
                value: AnswerValue::Text(_),
                ..
            }
        ));
    }

    #[test]
    fn unknown_action_types_are_tolerated() {
        let action: ClientAction =
            serde_json::from_value(json!({ "type": "emote", "emoji": "🎉" })).unwrap();
        assert!(matches!(action, ClientAction::Unknown));
    }

    #[test]
    fn create_room_config_defaults_when_absent() {
        let action: ClientAction = serde_json::from_value(json!({
            "type": "create-room",
            "quiz_id": Uuid::new_v4(),
        }))
        .unwrap();
        match action {
            ClientAction::CreateRoom { config, .. } => {
                assert!(config.max_participants.is_none());
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn sanitized_question_carries_no_correctness() {
        let quiz = crate::dao::memory::sample_quiz();
        let public = QuestionPublic::new(0, quiz.questions.len(), &quiz.questions[0]);
        let value = serde_json::to_value(&public).unwrap();
        assert!(value.get("correct").is_none());
        assert_eq!(value["options"], json!(["Venus", "Mars", "Jupiter", "Mercury"]));
    }

    #[test]
    fn server_events_serialize_with_type_tags() {
        let event = ServerEvent::Countdown { seconds_left: 3 };
        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "countdown");
        assert_eq!(value["seconds_left"], 3);

        let event = ServerEvent::QuestionTimeUp {
            reveal: QuestionReveal {
                question_index: 2,
                correct_answer: "Mars".into(),
                correct_index: Some(1),
                explanation: None,
                answered_count: 4,
            },
        };
        let value: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "question-time-up");
        assert_eq!(value["question_index"], 2);
        assert_eq!(value["correct_index"], 1);
        assert!(value.get("explanation").is_none());
    }
}
