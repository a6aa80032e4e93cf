//! Room status machine with validated transitions.

use serde::Serialize;
use thiserror::Error;

/// High-level status of a room over its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Lobby is open, quiz has not started.
    Waiting,
    /// Host pressed start; countdown is running.
    Starting,
    /// Questions are being played.
    Active,
    /// Host paused an active quiz.
    Paused,
    /// Quiz completed; results are readable until teardown.
    Finished,
    /// Room was cancelled before completing; no results exist.
    Cancelled,
}

/// Why a room transitioned to [`RoomStatus::Finished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// Every question was played to completion.
    QuestionsExhausted,
    /// The host ended the quiz early.
    HostEnded,
}

/// Events that can be applied to the room status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host starts the quiz from the lobby.
    Start,
    /// The 3-2-1 countdown ran out.
    CountdownElapsed,
    /// Host pauses active gameplay.
    Pause,
    /// Host resumes a paused quiz.
    Resume,
    /// Quiz reached its end.
    Finish(FinishReason),
    /// Room is cancelled before finishing.
    Cancel,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Status the room was in when the invalid event was received.
    pub from: RoomStatus,
    /// The event that cannot be applied from this status.
    pub event: RoomEvent,
}

impl RoomStatus {
    /// Whether the room can never leave this status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RoomStatus::Finished | RoomStatus::Cancelled)
    }

    /// Compute the status an event leads to, if the transition is valid.
    pub fn transition(self, event: RoomEvent) -> Result<RoomStatus, InvalidTransition> {
        let next = match (self, event) {
            (RoomStatus::Waiting, RoomEvent::Start) => RoomStatus::Starting,
            (RoomStatus::Starting, RoomEvent::CountdownElapsed) => RoomStatus::Active,
            (RoomStatus::Active, RoomEvent::Pause) => RoomStatus::Paused,
            (RoomStatus::Paused, RoomEvent::Resume) => RoomStatus::Active,
            (RoomStatus::Active | RoomStatus::Paused, RoomEvent::Finish(..)) => {
                RoomStatus::Finished
            }
            (
                RoomStatus::Waiting | RoomStatus::Starting | RoomStatus::Active | RoomStatus::Paused,
                RoomEvent::Cancel,
            ) => RoomStatus::Cancelled,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance(status: RoomStatus, event: RoomEvent) -> RoomStatus {
        status.transition(event).unwrap()
    }

    #[test]
    fn full_happy_path_through_session() {
        let mut status = RoomStatus::Waiting;
        status = advance(status, RoomEvent::Start);
        assert_eq!(status, RoomStatus::Starting);
        status = advance(status, RoomEvent::CountdownElapsed);
        assert_eq!(status, RoomStatus::Active);
        status = advance(status, RoomEvent::Pause);
        assert_eq!(status, RoomStatus::Paused);
        status = advance(status, RoomEvent::Resume);
        assert_eq!(status, RoomStatus::Active);
        status = advance(status, RoomEvent::Finish(FinishReason::QuestionsExhausted));
        assert_eq!(status, RoomStatus::Finished);
        assert!(status.is_terminal());
    }

    #[test]
    fn cancel_allowed_from_any_non_terminal_status() {
        for status in [
            RoomStatus::Waiting,
            RoomStatus::Starting,
            RoomStatus::Active,
            RoomStatus::Paused,
        ] {
            assert_eq!(advance(status, RoomEvent::Cancel), RoomStatus::Cancelled);
        }
    }

    #[test]
    fn terminal_statuses_reject_everything() {
        for status in [RoomStatus::Finished, RoomStatus::Cancelled] {
            for event in [
                RoomEvent::Start,
                RoomEvent::CountdownElapsed,
                RoomEvent::Pause,
                RoomEvent::Resume,
                RoomEvent::Finish(FinishReason::HostEnded),
                RoomEvent::Cancel,
            ] {
                let err = status.transition(event).unwrap_err();
                assert_eq!(err.from, status);
            }
        }
    }

    #[test]
    fn start_requires_waiting_lobby() {
        let err = RoomStatus::Active.transition(RoomEvent::Start).unwrap_err();
        assert_eq!(err.from, RoomStatus::Active);
        assert_eq!(err.event, RoomEvent::Start);
    }
}
