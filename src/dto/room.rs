//! Room-facing request and summary DTOs.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::AppConfig;
use crate::dto::format_timestamp;
use crate::state::lifecycle::RoomStatus;
use crate::state::room::{Room, RoomConfig};

/// Host-supplied room settings; unset fields fall back to server defaults.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RoomConfigInput {
    /// Cap on concurrently connected participants.
    #[validate(range(min = 2, max = 500, message = "capacity must be between 2 and 500"))]
    pub max_participants: Option<u32>,
    /// Whether joining stays open once the quiz has started.
    pub allow_late_join: Option<bool>,
}

impl RoomConfigInput {
    /// Resolve the input against the server defaults.
    pub fn resolve(&self, defaults: &AppConfig) -> RoomConfig {
        RoomConfig {
            max_participants: self
                .max_participants
                .map(|n| n as usize)
                .unwrap_or(defaults.default_max_participants),
            allow_late_join: self.allow_late_join.unwrap_or(false),
        }
    }
}

/// Public snapshot of a room, served over REST and on room creation.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    /// Room code participants join with.
    pub code: String,
    /// Title of the quiz being played.
    pub quiz_title: String,
    /// Number of questions in the quiz.
    pub question_count: usize,
    /// Current room status.
    pub status: RoomStatus,
    /// Participants currently counting towards capacity.
    pub participant_count: usize,
    /// Capacity chosen at creation.
    pub max_participants: usize,
    /// Whether mid-game joining is allowed.
    pub allow_late_join: bool,
    /// Index of the question currently being tracked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question_index: Option<usize>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        Self {
            code: room.code.clone(),
            quiz_title: room.quiz.title.clone(),
            question_count: room.quiz.questions.len(),
            status: room.status,
            participant_count: room.active_count(),
            max_participants: room.config.max_participants,
            allow_late_join: room.config.allow_late_join,
            current_question_index: room.current.map(|current| current.index),
            created_at: format_timestamp(room.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_resolve_to_server_defaults() {
        let defaults = AppConfig::default();
        let resolved = RoomConfigInput::default().resolve(&defaults);
        assert_eq!(resolved.max_participants, defaults.default_max_participants);
        assert!(!resolved.allow_late_join);
    }

    #[test]
    fn explicit_fields_win_over_defaults() {
        let input = RoomConfigInput {
            max_participants: Some(3),
            allow_late_join: Some(true),
        };
        let resolved = input.resolve(&AppConfig::default());
        assert_eq!(resolved.max_participants, 3);
        assert!(resolved.allow_late_join);
    }

    #[test]
    fn capacity_outside_bounds_fails_validation() {
        let input = RoomConfigInput {
            max_participants: Some(1),
            allow_late_join: None,
        };
        assert!(input.validate().is_err());
        let input = RoomConfigInput {
            max_participants: Some(501),
            allow_late_join: None,
        };
        assert!(input.validate().is_err());
    }
}
