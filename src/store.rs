// Repository seams between the engines and the durable stores, plus an
// in-memory implementation used by the daemon (optionally file-backed)
// and by tests. Every mutation is a guarded, independently idempotent
// update; there is no read-modify-write across the trait boundary.

use crate::model::{
    expected_status, ParticipationRecord, Tournament, TournamentStatus,
};
use crate::storage::{PersistedState, StateFile};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    Conflict,
    Io(String),
}

/// Read/mutate surface for tournament definitions.
pub trait TournamentStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Tournament, StoreError>;

    /// Active tournaments whose persisted status disagrees with their
    /// window at `now_ms`.
    fn find_status_drift(&self, now_ms: u64) -> Result<Vec<Tournament>, StoreError>;

    /// Conditionally set the status. Returns false when nothing changed,
    /// including when the change would move a rewarded tournament out of
    /// Completed (that transition is refused, never an error).
    fn apply_status(&self, id: &str, status: TournamentStatus) -> Result<bool, StoreError>;

    /// Closed, active, not-yet-rewarded tournaments.
    fn find_eligible_for_settlement(&self, now_ms: u64) -> Result<Vec<Tournament>, StoreError>;

    /// Lease-based compare-and-set claim. Returns false when the
    /// tournament is already rewarded, inactive, or held by a live claim.
    fn claim_for_settlement(
        &self,
        id: &str,
        now_ms: u64,
        lease_ms: u64,
    ) -> Result<bool, StoreError>;

    /// Drop a claim after a failed settlement attempt so the next tick
    /// retries immediately instead of waiting out the lease.
    fn release_settlement_claim(&self, id: &str) -> Result<(), StoreError>;

    /// Single update marking payout completion: is_rewarded = true,
    /// status = Completed, claim cleared.
    fn commit_settlement(&self, id: &str) -> Result<(), StoreError>;
}

/// Read-only surface over participation facts.
pub trait ParticipationStore: Send + Sync {
    fn list_by_tournament(&self, tournament_id: &str)
        -> Result<Vec<ParticipationRecord>, StoreError>;
}

/// External credit operation. Callers pass a dedupe key derived from
/// (tournament, user, rank); implementations must treat a replayed key as
/// success, since a tournament's whole payout is re-dispatched on retry.
pub trait RewardSink: Send + Sync {
    fn credit(
        &self,
        user_id: &str,
        amount: u64,
        currency: &str,
        network: &str,
        memo: &str,
        dedupe_key: &str,
    ) -> Result<(), String>;
}

#[derive(Default)]
struct StoreState {
    tournaments: HashMap<String, Tournament>,
    participations: Vec<ParticipationRecord>,
}

pub struct InMemoryStore {
    state: Mutex<StoreState>,
    persist: Option<StateFile>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            persist: None,
        }
    }

    /// File-backed store: restores any existing snapshot, then saves after
    /// every mutation. In-flight settlement claims do not survive a
    /// restart; the lease mechanism re-grants them.
    pub fn with_persistence(file: StateFile) -> Result<Self, StoreError> {
        let mut state = StoreState::default();
        if let Some(persisted) = file.load().map_err(StoreError::Io)? {
            for mut t in persisted.tournaments {
                t.settling_since_ms = None;
                state.tournaments.insert(t.id.clone(), t);
            }
            state.participations = persisted.participations;
        }
        Ok(Self {
            state: Mutex::new(state),
            persist: Some(file),
        })
    }

    pub fn upsert_tournament(&self, tournament: Tournament) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state
            .tournaments
            .insert(tournament.id.clone(), tournament);
        self.save(&state);
        Ok(())
    }

    pub fn add_participation(&self, record: ParticipationRecord) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.participations.push(record);
        self.save(&state);
        Ok(())
    }

    /// Soft delete: the tournament stays referenced by its participations
    /// but drops out of every scheduler query.
    pub fn deactivate_tournament(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let t = state.tournaments.get_mut(id).ok_or(StoreError::NotFound)?;
        t.is_active = false;
        self.save(&state);
        Ok(())
    }

    pub fn list_tournaments(&self) -> Result<Vec<Tournament>, StoreError> {
        let state = self.lock()?;
        let mut out: Vec<Tournament> = state.tournaments.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Io("store lock poisoned".into()))
    }

    fn save(&self, state: &StoreState) {
        let Some(file) = &self.persist else {
            return;
        };
        let mut tournaments: Vec<Tournament> = state.tournaments.values().cloned().collect();
        tournaments.sort_by(|a, b| a.id.cmp(&b.id));
        let snapshot = PersistedState {
            tournaments,
            participations: state.participations.clone(),
        };
        if let Err(e) = file.save(&snapshot) {
            eprintln!("state save failed: {}", e);
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TournamentStore for InMemoryStore {
    fn get(&self, id: &str) -> Result<Tournament, StoreError> {
        let state = self.lock()?;
        state.tournaments.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn find_status_drift(&self, now_ms: u64) -> Result<Vec<Tournament>, StoreError> {
        let state = self.lock()?;
        let mut out: Vec<Tournament> = state
            .tournaments
            .values()
            .filter(|t| t.is_active && expected_status(t, now_ms) != t.status)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn apply_status(&self, id: &str, status: TournamentStatus) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let t = state.tournaments.get_mut(id).ok_or(StoreError::NotFound)?;
        if t.status == status {
            return Ok(false);
        }
        // A rewarded tournament never leaves Completed, even if its window
        // was manually edited back into the future.
        if t.is_rewarded && status != TournamentStatus::Completed {
            return Ok(false);
        }
        t.status = status;
        self.save(&state);
        Ok(true)
    }

    fn find_eligible_for_settlement(&self, now_ms: u64) -> Result<Vec<Tournament>, StoreError> {
        let state = self.lock()?;
        let mut out: Vec<Tournament> = state
            .tournaments
            .values()
            .filter(|t| t.is_active && !t.is_rewarded && t.end_ms <= now_ms)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    fn claim_for_settlement(
        &self,
        id: &str,
        now_ms: u64,
        lease_ms: u64,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let t = state.tournaments.get_mut(id).ok_or(StoreError::NotFound)?;
        if !t.is_active || t.is_rewarded {
            return Ok(false);
        }
        if let Some(since) = t.settling_since_ms {
            if now_ms < since.saturating_add(lease_ms) {
                return Ok(false);
            }
        }
        t.settling_since_ms = Some(now_ms);
        self.save(&state);
        Ok(true)
    }

    fn release_settlement_claim(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let t = state.tournaments.get_mut(id).ok_or(StoreError::NotFound)?;
        t.settling_since_ms = None;
        self.save(&state);
        Ok(())
    }

    fn commit_settlement(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let t = state.tournaments.get_mut(id).ok_or(StoreError::NotFound)?;
        t.is_rewarded = true;
        t.status = TournamentStatus::Completed;
        t.settling_since_ms = None;
        self.save(&state);
        Ok(())
    }
}

impl ParticipationStore for InMemoryStore {
    fn list_by_tournament(
        &self,
        tournament_id: &str,
    ) -> Result<Vec<ParticipationRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .participations
            .iter()
            .filter(|p| p.tournament_id == tournament_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RewardTier;

    fn closed_tournament(id: &str) -> Tournament {
        Tournament {
            id: id.into(),
            name: "t".into(),
            game: "g".into(),
            start_ms: 0,
            end_ms: 1_000,
            entry_fee: 0,
            currency: "USDC".into(),
            network: "base".into(),
            reward_distribution: vec![RewardTier { position: 1, amount: 10 }],
            status: TournamentStatus::Ongoing,
            is_rewarded: false,
            is_active: true,
            settling_since_ms: None,
        }
    }

    #[test]
    fn claim_is_exclusive_until_lease_expires() {
        let store = InMemoryStore::new();
        store.upsert_tournament(closed_tournament("t1")).unwrap();

        assert!(store.claim_for_settlement("t1", 2_000, 500).unwrap());
        assert!(
            !store.claim_for_settlement("t1", 2_100, 500).unwrap(),
            "second worker must be refused while the lease is live"
        );
        assert!(
            store.claim_for_settlement("t1", 2_600, 500).unwrap(),
            "expired lease is reclaimable"
        );
    }

    #[test]
    fn commit_sets_both_flags_and_clears_claim() {
        let store = InMemoryStore::new();
        store.upsert_tournament(closed_tournament("t1")).unwrap();
        assert!(store.claim_for_settlement("t1", 2_000, 500).unwrap());

        store.commit_settlement("t1").unwrap();
        let t = store.get("t1").unwrap();
        assert!(t.is_rewarded);
        assert_eq!(t.status, TournamentStatus::Completed);
        assert_eq!(t.settling_since_ms, None);

        assert!(
            !store.claim_for_settlement("t1", 3_000, 500).unwrap(),
            "a rewarded tournament can never be claimed again"
        );
    }

    #[test]
    fn rewarded_tournament_never_leaves_completed() {
        let store = InMemoryStore::new();
        let mut t = closed_tournament("t1");
        t.status = TournamentStatus::Completed;
        t.is_rewarded = true;
        store.upsert_tournament(t).unwrap();

        assert!(!store.apply_status("t1", TournamentStatus::Upcoming).unwrap());
        assert_eq!(
            store.get("t1").unwrap().status,
            TournamentStatus::Completed
        );
    }

    #[test]
    fn soft_deleted_tournament_drops_out_of_queries() {
        let store = InMemoryStore::new();
        store.upsert_tournament(closed_tournament("t1")).unwrap();
        store.deactivate_tournament("t1").unwrap();

        assert!(store.find_status_drift(2_000).unwrap().is_empty());
        assert!(store.find_eligible_for_settlement(2_000).unwrap().is_empty());
        assert!(!store.claim_for_settlement("t1", 2_000, 500).unwrap());
    }

    #[test]
    fn release_makes_tournament_immediately_reclaimable() {
        let store = InMemoryStore::new();
        store.upsert_tournament(closed_tournament("t1")).unwrap();
        assert!(store.claim_for_settlement("t1", 2_000, 60_000).unwrap());
        store.release_settlement_claim("t1").unwrap();
        assert!(store.claim_for_settlement("t1", 2_001, 60_000).unwrap());
    }
}
