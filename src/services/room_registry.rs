//! Cross-room registry: code allocation, lookup, and pruning.

use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::auth::UserIdentity;
use crate::dto::room::{RoomConfigInput, RoomSummary};
use crate::error::ServiceError;
use crate::services::room_actor::{RoomHandle, spawn_room};
use crate::state::room::Room;
use crate::state::{Connection, SharedState};

/// Room code alphabet; ambiguous characters (0, O, 1, I) are excluded.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate one random room code of the given length.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Create a room for a quiz and spawn its worker; the caller becomes host.
pub async fn create_room(
    state: &SharedState,
    host: UserIdentity,
    conn: Connection,
    quiz_id: Uuid,
    config: RoomConfigInput,
) -> Result<RoomSummary, ServiceError> {
    config.validate()?;
    let room_config = config.resolve(state.config());

    let quiz = state
        .store()
        .fetch_quiz(quiz_id)
        .await?
        .ok_or(ServiceError::QuizNotFound(quiz_id))?;
    if quiz.questions.is_empty() {
        return Err(ServiceError::InvalidInput(
            "quiz has no questions to play".into(),
        ));
    }

    let attempts = state.config().max_code_attempts;
    let code = allocate_code(state, attempts)?;

    let room = Room::new(code.clone(), quiz, room_config, host, conn);
    let summary = RoomSummary::from(&room);
    let handle = spawn_room(room, state.config().clone(), state.store().clone());
    state.rooms().insert(code.clone(), handle);

    info!(code = %code, quiz = %summary.quiz_title, "room created");
    Ok(summary)
}

/// Pick a code not currently registered, within the retry cap.
fn allocate_code(state: &SharedState, attempts: u32) -> Result<String, ServiceError> {
    let length = state.config().code_length;
    for _ in 0..attempts {
        let code = generate_code(length);
        if !state.rooms().contains_key(&code) {
            return Ok(code);
        }
    }
    Err(ServiceError::CodeGenerationExhausted(attempts))
}

/// Look up a live room by code, case-insensitively.
///
/// Handles whose worker already stopped are pruned on the spot so a stale
/// entry can never shadow a future room with the same code.
pub fn lookup(state: &SharedState, code: &str) -> Result<RoomHandle, ServiceError> {
    let code = code.trim().to_ascii_uppercase();
    let handle = state
        .rooms()
        .get(&code)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| ServiceError::RoomNotFound(code.clone()))?;

    if handle.is_closed() {
        state.rooms().remove(&code);
        return Err(ServiceError::RoomNotFound(code));
    }
    Ok(handle)
}

/// Number of rooms whose worker is still running.
pub fn live_room_count(state: &SharedState) -> usize {
    state
        .rooms()
        .iter()
        .filter(|entry| !entry.value().is_closed())
        .count()
}

/// Spawn the background sweeper pruning entries of stopped workers.
pub fn spawn_sweeper(state: SharedState) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config().sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let before = state.rooms().len();
            state.rooms().retain(|_, handle| !handle.is_closed());
            let pruned = before - state.rooms().len();
            if pruned > 0 {
                debug!(pruned, remaining = state.rooms().len(), "swept closed rooms");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::auth::{AuthProvider, LocalAuth};
    use crate::config::AppConfig;
    use crate::dao::memory::{MemoryStore, sample_quiz};
    use crate::dao::store::QuizStore;
    use crate::state::AppState;
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

    fn shared_state(config: AppConfig) -> (SharedState, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let quiz_id = store.insert_quiz(sample_quiz());
        let state = AppState::new(
            config,
            store as Arc<dyn QuizStore>,
            Arc::new(LocalAuth::new()) as Arc<dyn AuthProvider>,
        );
        (state, quiz_id)
    }

    #[test]
    fn generated_codes_use_the_unambiguous_alphabet() {
        for _ in 0..100 {
            let code = generate_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert!(!code.contains('O') && !code.contains('0'));
        }
    }

    #[tokio::test]
    async fn create_room_registers_a_live_handle() {
        let (state, quiz_id) = shared_state(AppConfig::default());
        let summary = create_room(
            &state,
            identity("host"),
            connection(),
            quiz_id,
            RoomConfigInput::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.participant_count, 1);
        assert_eq!(summary.question_count, 3);
        assert_eq!(live_room_count(&state), 1);

        let handle = lookup(&state, &summary.code).unwrap();
        let fresh = handle.summary().await.unwrap();
        assert_eq!(fresh.code, summary.code);
    }

    #[tokio::test]
    async fn unknown_quiz_is_rejected() {
        let (state, _quiz_id) = shared_state(AppConfig::default());
        let err = create_room(
            &state,
            identity("host"),
            connection(),
            Uuid::new_v4(),
            RoomConfigInput::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::QuizNotFound(_)));
        assert_eq!(live_room_count(&state), 0);
    }

    #[tokio::test]
    async fn invalid_capacity_is_rejected_before_any_spawn() {
        let (state, quiz_id) = shared_state(AppConfig::default());
        let err = create_room(
            &state,
            identity("host"),
            connection(),
            quiz_id,
            RoomConfigInput {
                max_participants: Some(1),
                allow_late_join: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(live_room_count(&state), 0);
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive_and_prunes_dead_handles() {
        let (state, quiz_id) = shared_state(AppConfig::default());
        let summary = create_room(
            &state,
            identity("host"),
            connection(),
            quiz_id,
            RoomConfigInput::default(),
        )
        .await
        .unwrap();

        let lowered = summary.code.to_ascii_lowercase();
        assert!(lookup(&state, &lowered).is_ok());
        assert!(matches!(
            lookup(&state, "NOPE42"),
            Err(ServiceError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn exhausted_code_space_surfaces_a_typed_error() {
        let config = AppConfig {
            code_length: 1,
            max_code_attempts: 5,
            ..AppConfig::default()
        };
        let (state, quiz_id) = shared_state(config);

        // Occupy the entire one-character code space.
        for b in CODE_ALPHABET {
            let (tx, _rx) = mpsc::unbounded_channel();
            let code = (*b as char).to_string();
            let dummy = {
                let room = Room::new(
                    code.clone(),
                    sample_quiz(),
                    crate::state::room::RoomConfig {
                        max_participants: 2,
                        allow_late_join: false,
                    },
                    identity("holder"),
                    Connection::new(tx),
                );
                spawn_room(room, state.config().clone(), state.store().clone())
            };
            state.rooms().insert(code, dummy);
        }

        let err = create_room(
            &state,
            identity("host"),
            connection(),
            quiz_id,
            RoomConfigInput::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::CodeGenerationExhausted(5)));
    }
}
