// Leaderboard construction: deterministic, in-memory, pure with respect to
// its inputs. One function feeds both the display leaderboard and the
// settlement payout path.

use crate::model::{ParticipationRecord, RankedEntry};
use crate::store::{ParticipationStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;

/// True when `candidate` beats `current` as a user's best attempt.
/// Higher score wins; on equal score the attempt that reached it first
/// wins; record id is the final arbiter so replays are byte-stable.
fn better_attempt(candidate: &ParticipationRecord, current: &ParticipationRecord) -> bool {
    if candidate.score != current.score {
        return candidate.score > current.score;
    }
    if candidate.created_at_ms != current.created_at_ms {
        return candidate.created_at_ms < current.created_at_ms;
    }
    candidate.id < current.id
}

/// Merge raw attempts into an ordered, deduplicated leaderboard.
///
/// One entry per distinct user, carrying that user's best score. Entries
/// are sorted best-score-first; ties across users break on earliest
/// created_at, then lexical user id, so the output is a strict total order
/// and ranks are dense 1..=M with no sharing.
pub fn rank_records(records: &[ParticipationRecord]) -> Vec<RankedEntry> {
    let mut best: HashMap<&str, &ParticipationRecord> = HashMap::new();
    for record in records {
        let entry = best.entry(record.user_id.as_str()).or_insert(record);
        if better_attempt(record, *entry) {
            *entry = record;
        }
    }

    let mut winners: Vec<&ParticipationRecord> = best.into_values().collect();
    winners.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.created_at_ms.cmp(&b.created_at_ms))
            .then(a.user_id.cmp(&b.user_id))
    });

    winners
        .into_iter()
        .enumerate()
        .map(|(i, record)| RankedEntry {
            user_id: record.user_id.clone(),
            best_score: record.score,
            rank: (i + 1) as u32,
            source_record_id: record.id.clone(),
        })
        .collect()
}

/// Display transform for "your rank" views: duplicate one user's entry at
/// the front without disturbing the canonical order or any rank value.
/// Unknown users leave the ranking untouched.
pub fn promote_user(ranking: &[RankedEntry], user_id: &str) -> Vec<RankedEntry> {
    let mut out = Vec::with_capacity(ranking.len() + 1);
    if let Some(own) = ranking.iter().find(|e| e.user_id == user_id) {
        out.push(own.clone());
    }
    out.extend_from_slice(ranking);
    out
}

/// Store-facing wrapper used by the settlement engine and the leaderboard
/// endpoints.
pub struct RankingEngine {
    participations: Arc<dyn ParticipationStore>,
}

impl RankingEngine {
    pub fn new(participations: Arc<dyn ParticipationStore>) -> Self {
        Self { participations }
    }

    pub fn rank(&self, tournament_id: &str) -> Result<Vec<RankedEntry>, StoreError> {
        let records = self.participations.list_by_tournament(tournament_id)?;
        Ok(rank_records(&records))
    }

    pub fn rank_for_user(
        &self,
        tournament_id: &str,
        user_id: &str,
    ) -> Result<Vec<RankedEntry>, StoreError> {
        let ranking = self.rank(tournament_id)?;
        Ok(promote_user(&ranking, user_id))
    }
}
