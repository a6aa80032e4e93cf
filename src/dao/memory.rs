//! In-memory [`QuizStore`] used for development and tests.
//!
//! Quiz content can be seeded from a JSON library file; a small built-in quiz
//! is always available so the server is playable out of the box.

use std::io;
use std::path::Path;
use std::sync::Mutex;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::dao::models::{QuizEntity, ResultEntity, UserStatsDelta};
use crate::dao::storage::{StorageError, StorageResult};
use crate::dao::store::QuizStore;

/// Lifetime aggregates tracked per user by the memory backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserStats {
    /// Total quizzes completed.
    pub quizzes_played: u32,
    /// Lifetime points total.
    pub total_score: u32,
    /// Highest single-quiz score.
    pub highest_score: u32,
    /// Lifetime correct answers.
    pub correct_answers: u32,
    /// Lifetime answered questions.
    pub questions_answered: u32,
}

/// Process-local store backend keeping everything in concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    quizzes: DashMap<Uuid, QuizEntity>,
    results: Mutex<Vec<ResultEntity>>,
    stats: DashMap<Uuid, UserStats>,
    /// Fault injection: result saves for these users fail, exercising the
    /// isolated-failure path of the finalizer.
    failing_users: DashMap<Uuid, ()>,
}

/// JSON shape of a quiz library file.
#[derive(Debug, Deserialize)]
struct QuizLibrary {
    quizzes: Vec<QuizEntity>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load quiz documents from a JSON library file, replacing nothing on failure.
    pub fn load_library(&self, path: &Path) -> io::Result<usize> {
        let contents = std::fs::read_to_string(path)?;
        let library: QuizLibrary = serde_json::from_str(&contents)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        let count = library.quizzes.len();
        for quiz in library.quizzes {
            self.quizzes.insert(quiz.id, quiz);
        }
        info!(path = %path.display(), count, "loaded quiz library");
        Ok(count)
    }

    /// Insert a quiz document, returning its id.
    pub fn insert_quiz(&self, quiz: QuizEntity) -> Uuid {
        let id = quiz.id;
        self.quizzes.insert(id, quiz);
        id
    }

    /// Snapshot of all persisted result records.
    pub fn results(&self) -> Vec<ResultEntity> {
        self.results.lock().expect("results lock poisoned").clone()
    }

    /// Lifetime aggregates for a user, if any were recorded.
    pub fn stats_for(&self, user_id: Uuid) -> Option<UserStats> {
        self.stats.get(&user_id).map(|entry| *entry.value())
    }

    /// Make future result saves fail for the given user.
    pub fn fail_results_for(&self, user_id: Uuid) {
        self.failing_users.insert(user_id, ());
    }
}

impl QuizStore for MemoryStore {
    fn fetch_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let quiz = self.quizzes.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(quiz) })
    }

    fn save_result(&self, result: ResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        if self.failing_users.contains_key(&result.user_id) {
            let user_id = result.user_id;
            return Box::pin(async move {
                Err(StorageError::unavailable(
                    format!("result save rejected for user `{user_id}`"),
                    io::Error::other("injected fault"),
                ))
            });
        }

        self.results
            .lock()
            .expect("results lock poisoned")
            .push(result);
        Box::pin(async move { Ok(()) })
    }

    fn bump_user_stats(
        &self,
        user_id: Uuid,
        delta: UserStatsDelta,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let mut entry = self.stats.entry(user_id).or_default();
        entry.quizzes_played += delta.quizzes_played;
        entry.total_score += delta.score;
        entry.highest_score = entry.highest_score.max(delta.highest_score);
        entry.correct_answers += delta.correct_answers;
        entry.questions_answered += delta.questions_answered;
        drop(entry);
        Box::pin(async move { Ok(()) })
    }
}

/// Built-in demo quiz so a fresh server has something playable.
pub fn sample_quiz() -> QuizEntity {
    use crate::dao::models::{Difficulty, OptionEntity, QuestionEntity};

    let option = |text: &str, correct: bool| OptionEntity {
        text: text.to_owned(),
        correct,
    };

    QuizEntity {
        id: Uuid::new_v4(),
        title: "General Knowledge Warm-up".to_owned(),
        questions: vec![
            QuestionEntity {
                text: "Which planet is known as the Red Planet?".to_owned(),
                options: vec![
                    option("Venus", false),
                    option("Mars", true),
                    option("Jupiter", false),
                    option("Mercury", false),
                ],
                explanation: Some("Iron oxide dust gives Mars its color.".to_owned()),
                difficulty: Difficulty::Easy,
                base_points: 100,
                time_limit_secs: 20,
            },
            QuestionEntity {
                text: "What is the largest ocean on Earth?".to_owned(),
                options: vec![
                    option("Atlantic", false),
                    option("Indian", false),
                    option("Pacific", true),
                    option("Arctic", false),
                ],
                explanation: None,
                difficulty: Difficulty::Medium,
                base_points: 100,
                time_limit_secs: 20,
            },
            QuestionEntity {
                text: "In which year did the first human land on the Moon?".to_owned(),
                options: vec![
                    option("1965", false),
                    option("1969", true),
                    option("1971", false),
                    option("1973", false),
                ],
                explanation: Some("Apollo 11 landed on July 20, 1969.".to_owned()),
                difficulty: Difficulty::Hard,
                base_points: 120,
                time_limit_secs: 25,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_returns_inserted_quiz() {
        let store = MemoryStore::new();
        let id = store.insert_quiz(sample_quiz());

        let quiz = store.fetch_quiz(id).await.unwrap().unwrap();
        assert_eq!(quiz.id, id);
        assert_eq!(quiz.questions.len(), 3);

        let missing = store.fetch_quiz(Uuid::new_v4()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn stats_accumulate_and_track_highest() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let delta = |score: u32| UserStatsDelta {
            quizzes_played: 1,
            score,
            highest_score: score,
            correct_answers: 2,
            questions_answered: 3,
        };

        store.bump_user_stats(user, delta(300)).await.unwrap();
        store.bump_user_stats(user, delta(150)).await.unwrap();

        let stats = store.stats_for(user).unwrap();
        assert_eq!(stats.quizzes_played, 2);
        assert_eq!(stats.total_score, 450);
        assert_eq!(stats.highest_score, 300);
        assert_eq!(stats.questions_answered, 6);
    }

    #[tokio::test]
    async fn injected_fault_rejects_result_saves() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.fail_results_for(user);

        let mut result = ResultEntity {
            id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4(),
            room_code: "ABC123".into(),
            user_id: user,
            username: "ada".into(),
            score: 100,
            max_score: 300,
            percentage: 33.3,
            correct_count: 1,
            total_questions: 3,
            total_time_secs: 12.0,
            average_time_secs: 4.0,
            rank: 1,
            answers: Vec::new(),
            finished_at: time::OffsetDateTime::now_utc(),
        };
        assert!(store.save_result(result.clone()).await.is_err());

        result.user_id = Uuid::new_v4();
        assert!(store.save_result(result).await.is_ok());
        assert_eq!(store.results().len(), 1);
    }
}
