//! Room and participant state plus the answer validation rules.
//!
//! Everything here is pure in-memory mutation; the per-room worker in
//! `services::room_actor` owns a `Room`, serialises access to it, and drives
//! timers and broadcasts around these methods.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{UserId, UserIdentity};
use crate::dao::models::{QuestionEntity, QuizEntity};
use crate::error::ServiceError;
use crate::state::lifecycle::RoomStatus;
use crate::state::Connection;
use crate::state::scoring;

/// Room-level settings chosen by the host at creation.
#[derive(Debug, Clone, Copy)]
pub struct RoomConfig {
    /// Maximum number of concurrently connected participants.
    pub max_participants: usize,
    /// Whether joining is allowed once the quiz has left the lobby.
    pub allow_late_join: bool,
}

/// Where the currently tracked question is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionPhase {
    /// Selected but not yet shown (countdown, pause).
    Pending,
    /// Open for answers.
    Active,
    /// Closed; the reveal has been broadcast.
    Answered,
    /// Review pause before the next question opens.
    Review,
}

/// Descriptor of the question a room is currently on.
#[derive(Debug, Clone, Copy)]
pub struct CurrentQuestion {
    /// Index into the quiz's question list.
    pub index: usize,
    /// Lifecycle phase of that question.
    pub phase: QuestionPhase,
    /// When the question opened for answers.
    pub opened_at: Option<OffsetDateTime>,
    /// When the answer window closes.
    pub deadline: Option<OffsetDateTime>,
}

/// Answer payload submitted by a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Option selected by index (multiple choice).
    Choice(usize),
    /// Free-text answer matched against the canonical option.
    Text(String),
}

/// Immutable record of one submitted answer.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Question the answer belongs to.
    pub question_index: usize,
    /// What was submitted.
    pub value: AnswerValue,
    /// Resolved correctness.
    pub correct: bool,
    /// Seconds taken, clamped to the question's time limit.
    pub time_taken_secs: f64,
    /// Points awarded (zero when incorrect).
    pub points: u32,
    /// Submission timestamp.
    pub submitted_at: OffsetDateTime,
}

/// Connectivity / participation status of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    /// In the lobby.
    Joined,
    /// Flagged themselves ready in the lobby.
    Ready,
    /// Actively playing.
    Playing,
    /// Finished the quiz.
    Finished,
    /// Connection lost; history retained for rejoin.
    Disconnected,
    /// Removed by the host; may not rejoin.
    Kicked,
}

/// One user's membership and running state within a room.
#[derive(Debug)]
pub struct Participant {
    /// Resolved identity of the user.
    pub identity: UserIdentity,
    /// Live connection, if any.
    pub conn: Option<Connection>,
    /// Total points scored, monotonically non-decreasing while active.
    pub score: u32,
    /// Correctly answered questions.
    pub correct_answers: u32,
    /// Consecutive-correct counter; resets on any incorrect or timeout.
    pub streak: u32,
    /// Per-question answers keyed by question index; at most one per index.
    pub answers: BTreeMap<usize, Answer>,
    /// Current status.
    pub status: ParticipantStatus,
    /// Whether this participant created the room.
    pub is_host: bool,
    /// When the participant first joined.
    pub joined_at: OffsetDateTime,
    /// Last connectivity change.
    pub last_active: OffsetDateTime,
}

impl Participant {
    /// Build a fresh participant with a zeroed scoreboard.
    pub fn new(
        identity: UserIdentity,
        conn: Option<Connection>,
        is_host: bool,
        status: ParticipantStatus,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            identity,
            conn,
            score: 0,
            correct_answers: 0,
            streak: 0,
            answers: BTreeMap::new(),
            status,
            is_host,
            joined_at: now,
            last_active: now,
        }
    }

    /// Whether this participant appears in live rankings and counts towards
    /// capacity and the early-close check.
    pub fn counts_for_ranking(&self) -> bool {
        matches!(
            self.status,
            ParticipantStatus::Joined | ParticipantStatus::Ready | ParticipantStatus::Playing
        )
    }

    /// Whether the participant was removed by the host.
    pub fn is_kicked(&self) -> bool {
        self.status == ParticipantStatus::Kicked
    }

    /// Push an event to the participant's connection, if one is attached.
    pub fn send(&self, event: &crate::dto::ws::ServerEvent) {
        if let Some(conn) = &self.conn {
            let _ = conn.tx.send(event.clone());
        }
    }
}

/// Whether a join created a new participant or reattached an old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A brand-new participant record was appended.
    Joined,
    /// An existing record was reattached (reconnect).
    Rejoined,
}

/// Data returned to the scheduler when an answer is accepted.
#[derive(Debug, Clone)]
pub struct AcceptedAnswer {
    /// Whether the answer matched the canonical option.
    pub correct: bool,
    /// Points awarded.
    pub points: u32,
    /// Participant's total score after the award.
    pub score: u32,
    /// Participant's streak after the award.
    pub streak: u32,
    /// Canonical correct option text, for private feedback.
    pub correct_text: String,
}

/// One live instance of a quiz being played synchronously by a group.
#[derive(Debug)]
pub struct Room {
    /// Unique human-readable code identifying the room.
    pub code: String,
    /// Quiz content being played, read-only.
    pub quiz: QuizEntity,
    /// Identity of the host.
    pub host_id: UserId,
    /// Host-chosen settings.
    pub config: RoomConfig,
    /// Ordered roster keyed by user id; order is join order.
    pub participants: IndexMap<UserId, Participant>,
    /// Overall room status.
    pub status: RoomStatus,
    /// Question currently being tracked, if any.
    pub current: Option<CurrentQuestion>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// When the quiz left the lobby.
    pub started_at: Option<OffsetDateTime>,
    /// When the room reached a terminal status.
    pub ended_at: Option<OffsetDateTime>,
}

impl Room {
    /// Create a room in the lobby with the host as its first participant.
    pub fn new(
        code: String,
        quiz: QuizEntity,
        config: RoomConfig,
        host: UserIdentity,
        host_conn: Connection,
    ) -> Self {
        let host_id = host.id;
        let mut participants = IndexMap::new();
        participants.insert(
            host_id,
            Participant::new(host, Some(host_conn), true, ParticipantStatus::Joined),
        );

        Self {
            code,
            quiz,
            host_id,
            config,
            participants,
            status: RoomStatus::Waiting,
            current: None,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Participants currently counting towards capacity.
    pub fn active_count(&self) -> usize {
        self.participants
            .values()
            .filter(|participant| participant.counts_for_ranking())
            .count()
    }

    /// Add a participant or reattach a disconnected one.
    ///
    /// Rejoining preserves score, streak, and the full answer history; only
    /// the connection handle and status change. Reattachment is exempt from
    /// the capacity and late-join checks, which gate new records only.
    pub fn join(
        &mut self,
        identity: UserIdentity,
        conn: Connection,
    ) -> Result<JoinOutcome, ServiceError> {
        let mid_game = !matches!(self.status, RoomStatus::Waiting);

        if let Some(existing) = self.participants.get_mut(&identity.id) {
            if existing.is_kicked() {
                return Err(ServiceError::NotAuthorized(
                    "you were removed from this room".into(),
                ));
            }

            existing.conn = Some(conn);
            existing.last_active = OffsetDateTime::now_utc();
            existing.status = if mid_game {
                ParticipantStatus::Playing
            } else {
                ParticipantStatus::Joined
            };
            return Ok(JoinOutcome::Rejoined);
        }

        if mid_game && !self.config.allow_late_join {
            return Err(ServiceError::RoomClosedToLateJoin(self.code.clone()));
        }
        if self.active_count() >= self.config.max_participants {
            return Err(ServiceError::RoomFull(self.code.clone()));
        }

        let status = if mid_game {
            ParticipantStatus::Playing
        } else {
            ParticipantStatus::Joined
        };
        self.participants.insert(
            identity.id,
            Participant::new(identity, Some(conn), false, status),
        );
        Ok(JoinOutcome::Joined)
    }

    /// Ensure the caller is the host, for host-only operations.
    pub fn ensure_host(&self, user_id: UserId) -> Result<(), ServiceError> {
        if user_id == self.host_id {
            Ok(())
        } else {
            Err(ServiceError::NotAuthorized(
                "only the host may perform this action".into(),
            ))
        }
    }

    /// Flip every lobby participant to `playing` when the quiz starts.
    pub fn begin_playing(&mut self) {
        for participant in self.participants.values_mut() {
            if matches!(
                participant.status,
                ParticipantStatus::Joined | ParticipantStatus::Ready
            ) {
                participant.status = ParticipantStatus::Playing;
            }
        }
    }

    /// Toggle a lobby participant's ready flag.
    pub fn set_ready(&mut self, user_id: UserId, ready: bool) -> Result<(), ServiceError> {
        let participant = self
            .participants
            .get_mut(&user_id)
            .ok_or(ServiceError::NotAParticipant)?;

        participant.status = match (participant.status, ready) {
            (ParticipantStatus::Joined, true) => ParticipantStatus::Ready,
            (ParticipantStatus::Ready, false) => ParticipantStatus::Joined,
            (status, _) => status,
        };
        Ok(())
    }

    /// Mark a participant disconnected, keeping all history for rejoin.
    ///
    /// When `conn_id` is given, the flip only happens if it still matches the
    /// attached connection: a stale socket closing after a rejoin must not
    /// knock the fresh connection offline.
    pub fn mark_disconnected(&mut self, user_id: UserId, conn_id: Option<Uuid>) -> bool {
        let Some(participant) = self.participants.get_mut(&user_id) else {
            return false;
        };
        if participant.is_kicked() {
            return false;
        }
        if let (Some(expected), Some(conn)) = (conn_id, &participant.conn) {
            if conn.id != expected {
                return false;
            }
        }

        participant.conn = None;
        participant.status = ParticipantStatus::Disconnected;
        participant.last_active = OffsetDateTime::now_utc();
        true
    }

    /// Remove a participant from play at the host's request.
    pub fn kick(&mut self, requester: UserId, target: UserId) -> Result<(), ServiceError> {
        self.ensure_host(requester)?;
        if requester == target {
            return Err(ServiceError::InvalidInput("the host cannot kick themselves".into()));
        }

        let participant = self
            .participants
            .get_mut(&target)
            .ok_or(ServiceError::NotAParticipant)?;
        participant.status = ParticipantStatus::Kicked;
        participant.conn = None;
        participant.last_active = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Question entity for an index, if it exists.
    pub fn question(&self, index: usize) -> Option<&QuestionEntity> {
        self.quiz.questions.get(index)
    }

    /// Open a question for answers and stamp its deadline.
    pub fn open_question(&mut self, index: usize) {
        let now = OffsetDateTime::now_utc();
        let limit = self
            .question(index)
            .map(|question| question.time_limit_secs)
            .unwrap_or_default();
        self.current = Some(CurrentQuestion {
            index,
            phase: QuestionPhase::Active,
            opened_at: Some(now),
            deadline: Some(now + time::Duration::seconds(i64::from(limit))),
        });
    }

    /// Validate and record one answer, scoring it and updating the submitter.
    ///
    /// At most one answer per question index per participant is ever stored;
    /// this is the anti-duplicate guarantee the leaderboard relies on.
    pub fn submit_answer(
        &mut self,
        user_id: UserId,
        question_index: usize,
        value: AnswerValue,
        time_taken_secs: f64,
    ) -> Result<AcceptedAnswer, ServiceError> {
        if self.status != RoomStatus::Active {
            return Err(ServiceError::SessionNotActive);
        }

        let current = self
            .current
            .ok_or(ServiceError::QuestionNotActive(question_index))?;
        if current.index != question_index || current.phase != QuestionPhase::Active {
            return Err(ServiceError::QuestionNotActive(question_index));
        }

        let question = self
            .question(question_index)
            .ok_or(ServiceError::QuestionNotActive(question_index))?
            .clone();

        let participant = self
            .participants
            .get_mut(&user_id)
            .filter(|participant| participant.status == ParticipantStatus::Playing)
            .ok_or(ServiceError::NotAParticipant)?;

        if participant.answers.contains_key(&question_index) {
            return Err(ServiceError::DuplicateAnswer(question_index));
        }

        let correct_option = question
            .correct_option()
            .ok_or_else(|| ServiceError::InvalidInput("question has no correct option".into()))?;

        let correct = match &value {
            AnswerValue::Choice(index) => {
                let option = question.options.get(*index).ok_or_else(|| {
                    ServiceError::InvalidInput(format!("option index {index} out of range"))
                })?;
                option.correct
            }
            AnswerValue::Text(text) => text.trim().eq_ignore_ascii_case(&correct_option.text),
        };

        let time_taken_secs = time_taken_secs.clamp(0.0, f64::from(question.time_limit_secs));
        let prior_answered = participant.answers.len() as u32;
        let prior_correct = participant.correct_answers;
        let points = scoring::score_answer(
            &question,
            correct,
            time_taken_secs,
            prior_correct,
            prior_answered,
        );

        participant.answers.insert(
            question_index,
            Answer {
                question_index,
                value,
                correct,
                time_taken_secs,
                points,
                submitted_at: OffsetDateTime::now_utc(),
            },
        );

        if correct {
            participant.score += points;
            participant.correct_answers += 1;
            participant.streak += 1;
        } else {
            participant.streak = 0;
        }

        Ok(AcceptedAnswer {
            correct,
            points,
            score: participant.score,
            streak: participant.streak,
            correct_text: correct_option.text.clone(),
        })
    }

    /// Whether every connected participant has answered the given question.
    ///
    /// Disconnected participants are excluded so one dropped connection cannot
    /// hold a question open forever. Returns `false` for an empty roster.
    pub fn all_active_answered(&self, question_index: usize) -> bool {
        let mut any = false;
        for participant in self.participants.values() {
            if !participant.counts_for_ranking() {
                continue;
            }
            any = true;
            if !participant.answers.contains_key(&question_index) {
                return false;
            }
        }
        any
    }

    /// Number of participants that answered the given question.
    pub fn answered_count(&self, question_index: usize) -> usize {
        self.participants
            .values()
            .filter(|participant| participant.answers.contains_key(&question_index))
            .count()
    }

    /// Reset the streak of every playing participant that let the question
    /// time out without answering.
    pub fn reset_streaks_for_unanswered(&mut self, question_index: usize) {
        for participant in self.participants.values_mut() {
            if participant.status == ParticipantStatus::Playing
                && !participant.answers.contains_key(&question_index)
            {
                participant.streak = 0;
            }
        }
    }

    /// Send an event to every attached connection in the room.
    pub fn broadcast(&self, event: &crate::dto::ws::ServerEvent) {
        for participant in self.participants.values() {
            participant.send(event);
        }
    }

    /// Send an event to one participant, if connected.
    pub fn send_to(&self, user_id: UserId, event: &crate::dto::ws::ServerEvent) {
        if let Some(participant) = self.participants.get(&user_id) {
            participant.send(event);
        }
    }

    /// Maximum achievable score over the whole quiz.
    ///
    /// Models perfect play: every question answered instantly and correctly,
    /// so from the second question on the running accuracy is 100% and the
    /// adaptive multiplier rewards. No real score can exceed this.
    pub fn max_score(&self) -> u32 {
        self.quiz
            .questions
            .iter()
            .enumerate()
            .map(|(index, question)| {
                let prior = index as u32;
                scoring::score_answer(question, true, 0.0, prior, prior)
            })
            .sum()
    }

    /// Seconds between start and end, when both are known.
    pub fn duration_secs(&self) -> Option<u64> {
        let (started, ended) = (self.started_at?, self.ended_at?);
        Some((ended - started).whole_seconds().max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::memory::sample_quiz;
    use crate::state::Connection;
    use tokio::sync::mpsc;

    fn identity(name: &str) -> UserIdentity {
        UserIdentity {
            id: Uuid::new_v4(),
            username: name.to_owned(),
            avatar: None,
        }
    }

    fn connection() -> Connection {
        let (tx, _rx) = mpsc::unbounded_channel();
        Connection {
            id: Uuid::new_v4(),
            tx,
        }
    }

    fn room(max_participants: usize) -> Room {
        Room::new(
            "QUIZ42".into(),
            sample_quiz(),
            RoomConfig {
                max_participants,
                allow_late_join: false,
            },
            identity("host"),
            connection(),
        )
    }

    fn playing_room() -> (Room, UserIdentity) {
        let mut room = room(4);
        let player = identity("player");
        room.join(player.clone(), connection()).unwrap();
        room.status = RoomStatus::Active;
        room.begin_playing();
        room.open_question(0);
        (room, player)
    }

    #[test]
    fn capacity_boundary_rejects_only_the_overflow_join() {
        let mut room = room(2);
        // Host occupies one slot; one more join succeeds.
        assert_eq!(
            room.join(identity("second"), connection()).unwrap(),
            JoinOutcome::Joined
        );
        // The (capacity+1)-th participant is rejected.
        let err = room.join(identity("third"), connection()).unwrap_err();
        assert!(matches!(err, ServiceError::RoomFull(_)));
    }

    #[test]
    fn late_join_disabled_rejects_new_participants_mid_game() {
        let mut room = room(8);
        room.status = RoomStatus::Active;
        let err = room.join(identity("late"), connection()).unwrap_err();
        assert!(matches!(err, ServiceError::RoomClosedToLateJoin(_)));
    }

    #[test]
    fn duplicate_answer_is_rejected() {
        let (mut room, player) = playing_room();
        room.submit_answer(player.id, 0, AnswerValue::Choice(1), 5.0)
            .unwrap();
        let err = room
            .submit_answer(player.id, 0, AnswerValue::Choice(0), 6.0)
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateAnswer(0)));
        assert_eq!(room.participants[&player.id].answers.len(), 1);
    }

    #[test]
    fn answers_against_inactive_questions_are_rejected() {
        let (mut room, player) = playing_room();
        let err = room
            .submit_answer(player.id, 2, AnswerValue::Choice(0), 1.0)
            .unwrap_err();
        assert!(matches!(err, ServiceError::QuestionNotActive(2)));

        room.current.as_mut().unwrap().phase = QuestionPhase::Answered;
        let err = room
            .submit_answer(player.id, 0, AnswerValue::Choice(0), 1.0)
            .unwrap_err();
        assert!(matches!(err, ServiceError::QuestionNotActive(0)));
    }

    #[test]
    fn text_answers_match_case_insensitively() {
        let (mut room, player) = playing_room();
        let accepted = room
            .submit_answer(player.id, 0, AnswerValue::Text("  mars ".into()), 3.0)
            .unwrap();
        assert!(accepted.correct);
        assert_eq!(accepted.correct_text, "Mars");
    }

    #[test]
    fn incorrect_answer_resets_streak_and_scores_zero() {
        let (mut room, player) = playing_room();
        let accepted = room
            .submit_answer(player.id, 0, AnswerValue::Choice(1), 2.0)
            .unwrap();
        assert!(accepted.correct);
        assert!(accepted.streak == 1 && accepted.points > 0);

        room.open_question(1);
        let accepted = room
            .submit_answer(player.id, 1, AnswerValue::Choice(0), 2.0)
            .unwrap();
        assert!(!accepted.correct);
        assert_eq!(accepted.points, 0);
        assert_eq!(accepted.streak, 0);
    }

    #[test]
    fn rejoin_preserves_score_and_answer_history() {
        let (mut room, player) = playing_room();
        room.submit_answer(player.id, 0, AnswerValue::Choice(1), 2.0)
            .unwrap();
        let score_before = room.participants[&player.id].score;

        assert!(room.mark_disconnected(player.id, None));
        assert_eq!(
            room.participants[&player.id].status,
            ParticipantStatus::Disconnected
        );

        let outcome = room.join(player.clone(), connection()).unwrap();
        assert_eq!(outcome, JoinOutcome::Rejoined);
        let participant = &room.participants[&player.id];
        assert_eq!(participant.status, ParticipantStatus::Playing);
        assert_eq!(participant.score, score_before);
        assert_eq!(participant.answers.len(), 1);
    }

    #[test]
    fn stale_connection_close_does_not_disconnect_rejoined_participant() {
        let (mut room, player) = playing_room();
        let old_conn_id = room.participants[&player.id].conn.as_ref().unwrap().id;

        let fresh = connection();
        let fresh_id = fresh.id;
        room.join(player.clone(), fresh).unwrap();

        assert!(!room.mark_disconnected(player.id, Some(old_conn_id)));
        assert_eq!(
            room.participants[&player.id].conn.as_ref().unwrap().id,
            fresh_id
        );
    }

    #[test]
    fn disconnected_participants_do_not_block_early_close() {
        let (mut room, player) = playing_room();
        room.mark_disconnected(player.id, None);
        // Host is the only connected participant left; once they answer the
        // question is fully submitted.
        let host_id = room.host_id;
        room.submit_answer(host_id, 0, AnswerValue::Choice(1), 1.0)
            .unwrap();
        assert!(room.all_active_answered(0));
    }

    #[test]
    fn perfect_play_reaches_exactly_the_max_score() {
        let (mut room, player) = playing_room();
        // Correct options of the sample quiz, answered instantly.
        for (index, choice) in [(0usize, 1usize), (1, 2), (2, 1)] {
            room.open_question(index);
            let accepted = room
                .submit_answer(player.id, index, AnswerValue::Choice(choice), 0.0)
                .unwrap();
            assert!(accepted.correct);
        }

        let score = room.participants[&player.id].score;
        assert_eq!(score, room.max_score());
    }

    #[test]
    fn rejoin_is_allowed_even_after_the_room_filled_up() {
        let mut room = room(2);
        let player = identity("player");
        room.join(player.clone(), connection()).unwrap();

        // The player drops and their slot is taken by someone else.
        assert!(room.mark_disconnected(player.id, None));
        room.join(identity("replacement"), connection()).unwrap();
        assert_eq!(room.active_count(), 2);

        // Reattaching an existing record is exempt from the capacity check;
        // a transient network blip must not lock a participant out.
        let outcome = room.join(player, connection()).unwrap();
        assert_eq!(outcome, JoinOutcome::Rejoined);
        assert_eq!(room.active_count(), 3);
    }

    #[test]
    fn kicked_participants_cannot_rejoin() {
        let (mut room, player) = playing_room();
        let host_id = room.host_id;
        room.kick(host_id, player.id).unwrap();
        let err = room.join(player, connection()).unwrap_err();
        assert!(matches!(err, ServiceError::NotAuthorized(_)));
    }

    #[test]
    fn kick_is_host_only() {
        let (mut room, player) = playing_room();
        let host_id = room.host_id;
        let err = room.kick(player.id, host_id).unwrap_err();
        assert!(matches!(err, ServiceError::NotAuthorized(_)));
    }
}
