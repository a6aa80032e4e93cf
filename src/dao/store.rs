//! The store trait every persistence backend implements.

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{QuizEntity, ResultEntity, UserStatsDelta};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for quiz content, results, and user statistics.
///
/// The session engine only ever reads quiz content and writes results; the
/// catalog/CRUD surface that authors quizzes lives outside this crate.
pub trait QuizStore: Send + Sync {
    /// Fetch a quiz document by its primary key.
    fn fetch_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;
    /// Persist one participant's final result record.
    fn save_result(&self, result: ResultEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Increment a user's lifetime aggregate statistics.
    fn bump_user_stats(
        &self,
        user_id: Uuid,
        delta: UserStatsDelta,
    ) -> BoxFuture<'static, StorageResult<()>>;
}
