//! Ranked standings computed from participant scores.
//!
//! Recomputation is eager and O(n log n): it runs after every scoring event
//! and on room-state changes, trading throughput for update latency, which is
//! acceptable at expected room sizes.

use indexmap::IndexMap;
use serde::Serialize;

use crate::auth::UserId;
use crate::state::room::Participant;

/// One row of a ranked standings snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    /// Stable user id.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Optional avatar reference.
    pub avatar: Option<String>,
    /// Current total score.
    pub score: u32,
    /// Correctly answered questions so far.
    pub correct_answers: u32,
    /// Current consecutive-correct streak.
    pub streak: u32,
    /// 1-based rank; contiguous, ties broken by join order.
    pub position: u32,
}

/// Live standings: connected participants only, ranked by score.
///
/// Disconnected and kicked participants stay in the roster but are excluded
/// from live ranking; they reappear in the final standings.
pub fn live_standings(participants: &IndexMap<UserId, Participant>) -> Vec<LeaderboardEntry> {
    ranked(
        participants
            .values()
            .filter(|participant| participant.counts_for_ranking()),
    )
}

/// Final standings: every participant except kicked ones.
pub fn final_standings(participants: &IndexMap<UserId, Participant>) -> Vec<LeaderboardEntry> {
    ranked(
        participants
            .values()
            .filter(|participant| !participant.is_kicked()),
    )
}

/// Sort by score descending and assign contiguous 1-based positions.
///
/// The sort is stable, so equal scores keep roster insertion order, which is
/// join order: the tiebreak needs no extra field.
fn ranked<'a>(participants: impl Iterator<Item = &'a Participant>) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = participants
        .map(|participant| LeaderboardEntry {
            user_id: participant.identity.id,
            username: participant.identity.username.clone(),
            avatar: participant.identity.avatar.clone(),
            score: participant.score,
            correct_answers: participant.correct_answers,
            streak: participant.streak,
            position: 0,
        })
        .collect();

    entries.sort_by(|a, b| b.score.cmp(&a.score));

    for (index, entry) in entries.iter_mut().enumerate() {
        entry.position = index as u32 + 1;
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserIdentity;
    use crate::state::room::{Participant, ParticipantStatus};
    use uuid::Uuid;

    fn participant(name: &str, score: u32, status: ParticipantStatus) -> (UserId, Participant) {
        let identity = UserIdentity {
            id: Uuid::new_v4(),
            username: name.to_owned(),
            avatar: None,
        };
        let id = identity.id;
        let mut participant = Participant::new(identity, None, false, status);
        participant.score = score;
        (id, participant)
    }

    fn roster(entries: Vec<(UserId, Participant)>) -> IndexMap<UserId, Participant> {
        entries.into_iter().collect()
    }

    #[test]
    fn orders_by_score_descending_with_contiguous_positions() {
        let roster = roster(vec![
            participant("low", 50, ParticipantStatus::Playing),
            participant("high", 300, ParticipantStatus::Playing),
            participant("mid", 120, ParticipantStatus::Playing),
        ]);

        let standings = live_standings(&roster);
        let names: Vec<&str> = standings.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, ["high", "mid", "low"]);

        for (index, entry) in standings.iter().enumerate() {
            assert_eq!(entry.position, index as u32 + 1);
        }
        assert!(standings.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[test]
    fn ties_break_by_join_order() {
        let roster = roster(vec![
            participant("first", 100, ParticipantStatus::Playing),
            participant("second", 100, ParticipantStatus::Playing),
        ]);

        let standings = live_standings(&roster);
        assert_eq!(standings[0].username, "first");
        assert_eq!(standings[0].position, 1);
        assert_eq!(standings[1].username, "second");
        assert_eq!(standings[1].position, 2);
    }

    #[test]
    fn disconnected_excluded_live_but_present_in_final() {
        let roster = roster(vec![
            participant("online", 80, ParticipantStatus::Playing),
            participant("offline", 200, ParticipantStatus::Disconnected),
            participant("removed", 500, ParticipantStatus::Kicked),
        ]);

        let live = live_standings(&roster);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].username, "online");

        let last = final_standings(&roster);
        let names: Vec<&str> = last.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, ["offline", "online"]);
        assert_eq!(last[0].position, 1);
    }
}
