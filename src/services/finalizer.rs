//! Session finalization: turning a finished room into persistent records.
//!
//! Record construction is synchronous and happens inside the room worker;
//! the persistence fan-out is async and runs detached from it. Each
//! participant's write is isolated, so one failing save never loses the
//! records of the others.

use std::sync::Arc;

use futures::future::join_all;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::models::{AnswerDetailEntity, ResultEntity, UserStatsDelta};
use crate::dao::store::QuizStore;
use crate::state::leaderboard::LeaderboardEntry;
use crate::state::room::{AnswerValue, Room};

/// Everything that needs to be written for one participant.
#[derive(Debug, Clone)]
pub struct ParticipantRecord {
    /// Full result document.
    pub result: ResultEntity,
    /// Lifetime aggregate increments.
    pub delta: UserStatsDelta,
}

/// Build the persistent records for a finished room.
///
/// Kicked participants are skipped entirely, and so is anyone who never
/// submitted an answer: spectators leave no result and no stats bump.
pub fn build_results(
    room: &Room,
    standings: &[LeaderboardEntry],
    finished_at: OffsetDateTime,
) -> Vec<ParticipantRecord> {
    let max_score = room.max_score();
    let total_questions = room.quiz.questions.len() as u32;

    room.participants
        .values()
        .filter(|participant| !participant.is_kicked())
        .filter(|participant| !participant.answers.is_empty())
        .map(|participant| {
            let rank = standings
                .iter()
                .find(|entry| entry.user_id == participant.identity.id)
                .map(|entry| entry.position)
                .unwrap_or(0);

            let answers: Vec<AnswerDetailEntity> = participant
                .answers
                .values()
                .map(|answer| {
                    let question = room.question(answer.question_index);
                    let selected = match &answer.value {
                        AnswerValue::Choice(index) => question
                            .and_then(|question| question.options.get(*index))
                            .map(|option| option.text.clone()),
                        AnswerValue::Text(text) => Some(text.clone()),
                    };
                    AnswerDetailEntity {
                        question_index: answer.question_index,
                        selected,
                        correct: question
                            .and_then(|question| question.correct_option())
                            .map(|option| option.text.clone())
                            .unwrap_or_default(),
                        is_correct: answer.correct,
                        time_taken_secs: answer.time_taken_secs,
                        points: answer.points,
                    }
                })
                .collect();

            let total_time_secs: f64 = answers.iter().map(|answer| answer.time_taken_secs).sum();
            let average_time_secs = if answers.is_empty() {
                0.0
            } else {
                total_time_secs / answers.len() as f64
            };
            let percentage = if max_score == 0 {
                0.0
            } else {
                f64::from(participant.score) / f64::from(max_score) * 100.0
            };

            ParticipantRecord {
                result: ResultEntity {
                    id: Uuid::new_v4(),
                    quiz_id: room.quiz.id,
                    room_code: room.code.clone(),
                    user_id: participant.identity.id,
                    username: participant.identity.username.clone(),
                    score: participant.score,
                    max_score,
                    percentage,
                    correct_count: participant.correct_answers,
                    total_questions,
                    total_time_secs,
                    average_time_secs,
                    rank,
                    answers,
                    finished_at,
                },
                delta: UserStatsDelta {
                    quizzes_played: 1,
                    score: participant.score,
                    highest_score: participant.score,
                    correct_answers: participant.correct_answers,
                    questions_answered: participant.answers.len() as u32,
                },
            }
        })
        .collect()
}

/// Persist every participant record, isolating failures per participant.
pub async fn persist(store: Arc<dyn QuizStore>, room_code: &str, records: Vec<ParticipantRecord>) {
    let total = records.len();
    let writes = records.into_iter().map(|record| {
        let store = store.clone();
        async move {
            let user_id = record.result.user_id;
            let saved = store.save_result(record.result).await;
            match saved {
                Ok(()) => match store.bump_user_stats(user_id, record.delta).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(%user_id, error = %err, "failed to update user statistics");
                        false
                    }
                },
                Err(err) => {
                    warn!(%user_id, error = %err, "failed to persist participant result");
                    false
                }
            }
        }
    });

    let persisted = join_all(writes).await.into_iter().filter(|ok| *ok).count();
    info!(room_code, persisted, total, "result persistence completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserIdentity;
    use crate::dao::memory::{MemoryStore, sample_quiz};
    use crate::state::Connection;
    use crate::state::leaderboard::final_standings;
    use crate::state::lifecycle::RoomStatus;
    use crate::state::room::RoomConfig;
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
        Connection::new(tx)
    }

    /// Room with a host and one player, both having played question 0.
    fn played_room() -> (Room, UserIdentity) {
        let mut room = Room::new(
            "QUIZ42".into(),
            sample_quiz(),
            RoomConfig {
                max_participants: 8,
                allow_late_join: false,
            },
            identity("host"),
            connection(),
        );
        let player = identity("ada");
        room.join(player.clone(), connection()).unwrap();
        room.status = RoomStatus::Active;
        room.begin_playing();
        room.open_question(0);

        let host_id = room.host_id;
        room.submit_answer(host_id, 0, AnswerValue::Choice(1), 2.0)
            .unwrap();
        room.submit_answer(player.id, 0, AnswerValue::Choice(0), 4.0)
            .unwrap();
        (room, player)
    }

    #[test]
    fn records_carry_rank_percentage_and_answer_details() {
        let (room, player) = played_room();
        let standings = final_standings(&room.participants);
        let records = build_results(&room, &standings, OffsetDateTime::now_utc());
        assert_eq!(records.len(), 2);

        let host = records
            .iter()
            .find(|record| record.result.username == "host")
            .unwrap();
        assert_eq!(host.result.rank, 1);
        assert_eq!(host.result.correct_count, 1);
        assert_eq!(host.result.total_questions, 3);
        assert!(host.result.percentage > 0.0);
        assert_eq!(host.result.answers.len(), 1);
        assert_eq!(host.result.answers[0].selected.as_deref(), Some("Mars"));
        assert!(host.result.answers[0].is_correct);
        assert_eq!(host.delta.questions_answered, 1);

        let loser = records
            .iter()
            .find(|record| record.result.user_id == player.id)
            .unwrap();
        assert_eq!(loser.result.rank, 2);
        assert_eq!(loser.result.score, 0);
        assert_eq!(loser.result.percentage, 0.0);
        assert!(!loser.result.answers[0].is_correct);
        assert_eq!(loser.result.answers[0].selected.as_deref(), Some("Venus"));
    }

    #[test]
    fn disconnected_without_answers_are_not_persisted() {
        let (mut room, _player) = played_room();
        let ghost = identity("ghost");
        // Late join is off, so flip back to a lobby join for the setup.
        room.status = RoomStatus::Waiting;
        room.join(ghost.clone(), connection()).unwrap();
        room.status = RoomStatus::Active;
        room.mark_disconnected(ghost.id, None);

        let standings = final_standings(&room.participants);
        let records = build_results(&room, &standings, OffsetDateTime::now_utc());
        assert_eq!(records.len(), 2);
        assert!(
            records
                .iter()
                .all(|record| record.result.user_id != ghost.id)
        );
    }

    #[test]
    fn connected_spectators_without_answers_are_not_persisted() {
        let (mut room, _player) = played_room();
        let lurker = identity("lurker");
        room.status = RoomStatus::Waiting;
        room.join(lurker.clone(), connection()).unwrap();
        room.status = RoomStatus::Active;
        room.begin_playing();

        // Still connected at quiz end, but never answered anything.
        let standings = final_standings(&room.participants);
        let records = build_results(&room, &standings, OffsetDateTime::now_utc());
        assert_eq!(records.len(), 2);
        assert!(
            records
                .iter()
                .all(|record| record.result.user_id != lurker.id)
        );
    }

    #[test]
    fn perfect_play_scores_exactly_one_hundred_percent() {
        let mut room = Room::new(
            "QUIZ42".into(),
            sample_quiz(),
            RoomConfig {
                max_participants: 8,
                allow_late_join: false,
            },
            identity("host"),
            connection(),
        );
        let host_id = room.host_id;
        room.status = RoomStatus::Active;
        room.begin_playing();
        for (index, choice) in [(0usize, 1usize), (1, 2), (2, 1)] {
            room.open_question(index);
            room.submit_answer(host_id, index, AnswerValue::Choice(choice), 0.0)
                .unwrap();
        }

        let standings = final_standings(&room.participants);
        let records = build_results(&room, &standings, OffsetDateTime::now_utc());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result.percentage, 100.0);
        assert_eq!(records[0].result.score, records[0].result.max_score);
    }

    #[tokio::test]
    async fn one_failing_save_does_not_lose_the_others() {
        let (room, player) = played_room();
        let store = Arc::new(MemoryStore::new());
        store.fail_results_for(player.id);

        let standings = final_standings(&room.participants);
        let records = build_results(&room, &standings, OffsetDateTime::now_utc());
        persist(store.clone() as Arc<dyn QuizStore>, &room.code, records).await;

        let results = store.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].user_id, room.host_id);
        assert!(store.stats_for(room.host_id).is_some());
        // The failing participant's stats are not bumped either.
        assert!(store.stats_for(player.id).is_none());
    }
}
