// Core data model. Plain serde structs; all times are unix milliseconds,
// all amounts are integer minor units.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type TournamentId = String;
pub type UserId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentStatus {
    Upcoming,
    Ongoing,
    Completed,
}

/// One row of a tournament's reward table: pay `amount` to the user who
/// finishes at `position` (1-based).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTier {
    pub position: u32,
    pub amount: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub game: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub entry_fee: u64,
    pub currency: String,
    pub network: String,
    pub reward_distribution: Vec<RewardTier>,
    pub status: TournamentStatus,
    pub is_rewarded: bool,
    pub is_active: bool,
    /// Set while one settlement worker holds the claim on this tournament.
    #[serde(default)]
    pub settling_since_ms: Option<u64>,
}

impl Tournament {
    /// Reward amount for a final rank, if the table pays that position.
    /// Non-positive amounts count as unpaid.
    pub fn reward_for_rank(&self, rank: u32) -> Option<u64> {
        self.reward_distribution
            .iter()
            .find(|t| t.position == rank)
            .map(|t| t.amount)
            .filter(|amount| *amount > 0)
    }

    /// Highest position the reward table mentions; 0 for an empty table.
    pub fn max_reward_position(&self) -> u32 {
        self.reward_distribution
            .iter()
            .map(|t| t.position)
            .max()
            .unwrap_or(0)
    }
}

/// The status a tournament's window places it in at `now_ms`.
/// The window is half-open: [start_ms, end_ms).
pub fn expected_status(tournament: &Tournament, now_ms: u64) -> TournamentStatus {
    if now_ms < tournament.start_ms {
        TournamentStatus::Upcoming
    } else if now_ms < tournament.end_ms {
        TournamentStatus::Ongoing
    } else {
        TournamentStatus::Completed
    }
}

/// One scored attempt by one user. Immutable once written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticipationRecord {
    pub id: String,
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    pub score: i64,
    pub entry_at_ms: u64,
    pub created_at_ms: u64,
}

/// One user's best result in a tournament, annotated with a dense 1-based rank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub user_id: UserId,
    pub best_score: i64,
    pub rank: u32,
    pub source_record_id: String,
}

/// A single pending credit derived from the final ranking and reward table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardInstruction {
    pub tournament_id: TournamentId,
    pub user_id: UserId,
    pub position: u32,
    pub amount: u64,
    pub currency: String,
    pub network: String,
}

/// Stable dedupe key for one (tournament, user, rank) credit, so the sink
/// can be re-invoked on retry without double paying.
pub fn payout_dedupe_key(tournament_id: &str, user_id: &str, rank: u32) -> String {
    let mut h = Sha256::new();
    h.update(tournament_id.as_bytes());
    h.update(b"|");
    h.update(user_id.as_bytes());
    h.update(b"|");
    h.update(rank.to_le_bytes());
    hex::encode(h.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tournament_with_window(start_ms: u64, end_ms: u64) -> Tournament {
        Tournament {
            id: "t1".into(),
            name: "weekly".into(),
            game: "tetris".into(),
            start_ms,
            end_ms,
            entry_fee: 0,
            currency: "USDC".into(),
            network: "base".into(),
            reward_distribution: vec![
                RewardTier { position: 1, amount: 100 },
                RewardTier { position: 2, amount: 50 },
                RewardTier { position: 4, amount: 0 },
            ],
            status: TournamentStatus::Upcoming,
            is_rewarded: false,
            is_active: true,
            settling_since_ms: None,
        }
    }

    #[test]
    fn window_buckets_are_exclusive() {
        let t = tournament_with_window(1_000, 2_000);
        assert_eq!(expected_status(&t, 999), TournamentStatus::Upcoming);
        assert_eq!(expected_status(&t, 1_000), TournamentStatus::Ongoing);
        assert_eq!(expected_status(&t, 1_999), TournamentStatus::Ongoing);
        assert_eq!(expected_status(&t, 2_000), TournamentStatus::Completed);
    }

    #[test]
    fn reward_lookup_skips_unpaid_positions() {
        let t = tournament_with_window(0, 1);
        assert_eq!(t.reward_for_rank(1), Some(100));
        assert_eq!(t.reward_for_rank(2), Some(50));
        assert_eq!(t.reward_for_rank(3), None, "no table entry");
        assert_eq!(t.reward_for_rank(4), None, "zero amount is unpaid");
        assert_eq!(t.max_reward_position(), 4);
    }

    #[test]
    fn dedupe_key_is_stable_and_distinct() {
        let a = payout_dedupe_key("t1", "alice", 1);
        let b = payout_dedupe_key("t1", "alice", 1);
        let c = payout_dedupe_key("t1", "alice", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
