// Settlement pass: convert each closed, unrewarded tournament into credits
// exactly once. Claim, rank, dispatch in ascending rank order, then commit
// is_rewarded + Completed as one update. Any payout failure leaves the
// tournament unclaimed and the whole payout is re-dispatched next tick,
// relying on the sink's dedupe keys.

use crate::model::{payout_dedupe_key, RewardInstruction, Tournament};
use crate::ranking::RankingEngine;
use crate::store::{RewardSink, StoreError, TournamentStore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SettlementOutcome {
    pub eligible: usize,
    pub settled: usize,
    pub skipped: usize,
    pub failed: usize,
    pub credits_dispatched: usize,
}

/// Audit row for one settled tournament.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub tournament_id: String,
    pub payouts: Vec<RewardInstruction>,
    pub settled_at_ms: u64,
}

pub struct SettlementEngine {
    tournaments: Arc<dyn TournamentStore>,
    ranking: RankingEngine,
    sink: Arc<dyn RewardSink>,
    top_k_cap: u32,
    claim_lease_ms: u64,
}

impl SettlementEngine {
    pub fn new(
        tournaments: Arc<dyn TournamentStore>,
        ranking: RankingEngine,
        sink: Arc<dyn RewardSink>,
        top_k_cap: u32,
        claim_lease_ms: u64,
    ) -> Self {
        Self {
            tournaments,
            ranking,
            sink,
            top_k_cap,
            claim_lease_ms,
        }
    }

    pub fn run_tick(
        &self,
        now_ms: u64,
    ) -> Result<(SettlementOutcome, Vec<SettlementRecord>), StoreError> {
        static NEVER: AtomicBool = AtomicBool::new(false);
        self.run_tick_with_stop(now_ms, &NEVER)
    }

    /// One pass at `now_ms`. Tournaments are independent: a claim lost to
    /// another worker is a skip, a payout failure is logged and retried
    /// next tick, and neither stops the rest of the batch. `stop` is
    /// honored between tournaments, never inside one tournament's payout
    /// loop.
    pub fn run_tick_with_stop(
        &self,
        now_ms: u64,
        stop: &AtomicBool,
    ) -> Result<(SettlementOutcome, Vec<SettlementRecord>), StoreError> {
        let eligible = self.tournaments.find_eligible_for_settlement(now_ms)?;
        let mut outcome = SettlementOutcome {
            eligible: eligible.len(),
            ..SettlementOutcome::default()
        };
        let mut records = Vec::new();

        for tournament in &eligible {
            if stop.load(Ordering::Relaxed) {
                break;
            }

            match self
                .tournaments
                .claim_for_settlement(&tournament.id, now_ms, self.claim_lease_ms)
            {
                Ok(true) => {}
                Ok(false) => {
                    outcome.skipped += 1;
                    continue;
                }
                Err(e) => {
                    eprintln!(
                        "settlement: claim failed for tournament {}: {:?}",
                        tournament.id, e
                    );
                    outcome.failed += 1;
                    continue;
                }
            }

            match self.settle_one(tournament, now_ms) {
                Ok(record) => {
                    outcome.settled += 1;
                    outcome.credits_dispatched += record.payouts.len();
                    records.push(record);
                }
                Err(e) => {
                    outcome.failed += 1;
                    eprintln!("settlement: tournament {} left unsettled: {}", tournament.id, e);
                    if let Err(e) = self.tournaments.release_settlement_claim(&tournament.id) {
                        // Harmless: the lease expires on its own.
                        eprintln!(
                            "settlement: claim release failed for tournament {}: {:?}",
                            tournament.id, e
                        );
                    }
                }
            }
        }

        Ok((outcome, records))
    }

    /// Dispatch one claimed tournament's payouts, then commit. The commit
    /// only happens after every credit succeeded; a tournament with no
    /// participants or an unpayable reward table commits with zero credits.
    fn settle_one(&self, tournament: &Tournament, now_ms: u64) -> Result<SettlementRecord, String> {
        let ranking = self
            .ranking
            .rank(&tournament.id)
            .map_err(|e| format!("ranking failed: {:?}", e))?;

        let top_k = tournament.max_reward_position().min(self.top_k_cap);
        let mut payouts = Vec::new();

        // Ascending rank order, so a partial failure leaves a clean prefix
        // of already-deduped credits behind.
        for entry in ranking.iter().take(top_k as usize) {
            let Some(amount) = tournament.reward_for_rank(entry.rank) else {
                eprintln!(
                    "settlement: tournament {} rank {} has no payable reward entry; skipping",
                    tournament.id, entry.rank
                );
                continue;
            };

            let memo = format!("Tournament reward for rank {}", entry.rank);
            let dedupe_key = payout_dedupe_key(&tournament.id, &entry.user_id, entry.rank);
            self.sink
                .credit(
                    &entry.user_id,
                    amount,
                    &tournament.currency,
                    &tournament.network,
                    &memo,
                    &dedupe_key,
                )
                .map_err(|e| {
                    format!(
                        "credit failed (tournament {}, user {}, rank {}, amount {}): {}",
                        tournament.id, entry.user_id, entry.rank, amount, e
                    )
                })?;

            payouts.push(RewardInstruction {
                tournament_id: tournament.id.clone(),
                user_id: entry.user_id.clone(),
                position: entry.rank,
                amount,
                currency: tournament.currency.clone(),
                network: tournament.network.clone(),
            });
        }

        self.tournaments
            .commit_settlement(&tournament.id)
            .map_err(|e| format!("commit failed after payout: {:?}", e))?;

        Ok(SettlementRecord {
            tournament_id: tournament.id.clone(),
            payouts,
            settled_at_ms: now_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParticipationRecord, RewardTier, TournamentStatus};
    use crate::store::{InMemoryStore, ParticipationStore};
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Credit {
        user_id: String,
        amount: u64,
        memo: String,
        dedupe_key: String,
    }

    /// Records every credit; optionally fails for a configured user.
    #[derive(Default)]
    struct RecordingSink {
        credits: Mutex<Vec<Credit>>,
        fail_for: Mutex<HashSet<String>>,
    }

    impl RecordingSink {
        fn credits(&self) -> Vec<Credit> {
            self.credits.lock().unwrap().clone()
        }

        fn fail_for(&self, user_id: &str) {
            self.fail_for.lock().unwrap().insert(user_id.to_string());
        }

        fn clear_failures(&self) {
            self.fail_for.lock().unwrap().clear();
        }
    }

    impl RewardSink for RecordingSink {
        fn credit(
            &self,
            user_id: &str,
            amount: u64,
            _currency: &str,
            _network: &str,
            memo: &str,
            dedupe_key: &str,
        ) -> Result<(), String> {
            if self.fail_for.lock().unwrap().contains(user_id) {
                return Err("sink unavailable".into());
            }
            self.credits.lock().unwrap().push(Credit {
                user_id: user_id.to_string(),
                amount,
                memo: memo.to_string(),
                dedupe_key: dedupe_key.to_string(),
            });
            Ok(())
        }
    }

    fn closed_tournament(id: &str, rewards: Vec<RewardTier>) -> crate::model::Tournament {
        crate::model::Tournament {
            id: id.into(),
            name: "weekly".into(),
            game: "tetris".into(),
            start_ms: 0,
            end_ms: 1_000,
            entry_fee: 0,
            currency: "USDC".into(),
            network: "base".into(),
            reward_distribution: rewards,
            status: TournamentStatus::Completed,
            is_rewarded: false,
            is_active: true,
            settling_since_ms: None,
        }
    }

    fn attempt(id: &str, tournament: &str, user: &str, score: i64, created: u64) -> ParticipationRecord {
        ParticipationRecord {
            id: id.into(),
            tournament_id: tournament.into(),
            user_id: user.into(),
            score,
            entry_at_ms: created,
            created_at_ms: created,
        }
    }

    fn engine(
        store: &Arc<InMemoryStore>,
        sink: &Arc<RecordingSink>,
        top_k_cap: u32,
    ) -> SettlementEngine {
        SettlementEngine::new(
            Arc::clone(store) as Arc<dyn TournamentStore>,
            RankingEngine::new(Arc::clone(store) as Arc<dyn ParticipationStore>),
            Arc::clone(sink) as Arc<dyn RewardSink>,
            top_k_cap,
            60_000,
        )
    }

    fn seed_abc(store: &InMemoryStore, tournament: &str) {
        // A's 30 arrives after B's 30 -> final order B, A, C.
        store.add_participation(attempt("p1", tournament, "a", 10, 100)).unwrap();
        store.add_participation(attempt("p2", tournament, "a", 30, 400)).unwrap();
        store.add_participation(attempt("p3", tournament, "b", 30, 200)).unwrap();
        store.add_participation(attempt("p4", tournament, "c", 20, 150)).unwrap();
    }

    #[test]
    fn settles_top_two_and_marks_rewarded() {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        store
            .upsert_tournament(closed_tournament(
                "t1",
                vec![
                    RewardTier { position: 1, amount: 100 },
                    RewardTier { position: 2, amount: 50 },
                ],
            ))
            .unwrap();
        seed_abc(&store, "t1");

        let (outcome, records) = engine(&store, &sink, 25).run_tick(2_000).unwrap();
        assert_eq!(outcome.settled, 1);
        assert_eq!(outcome.credits_dispatched, 2);

        let credits = sink.credits();
        assert_eq!(credits.len(), 2);
        assert_eq!(credits[0].user_id, "b");
        assert_eq!(credits[0].amount, 100);
        assert_eq!(credits[0].memo, "Tournament reward for rank 1");
        assert_eq!(credits[1].user_id, "a");
        assert_eq!(credits[1].amount, 50);

        let t = store.get("t1").unwrap();
        assert!(t.is_rewarded);
        assert_eq!(t.status, TournamentStatus::Completed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payouts.len(), 2);
    }

    #[test]
    fn second_tick_dispatches_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        store
            .upsert_tournament(closed_tournament(
                "t1",
                vec![RewardTier { position: 1, amount: 100 }],
            ))
            .unwrap();
        seed_abc(&store, "t1");
        let engine = engine(&store, &sink, 25);

        engine.run_tick(2_000).unwrap();
        assert_eq!(sink.credits().len(), 1);

        let (outcome, _) = engine.run_tick(3_000).unwrap();
        assert_eq!(outcome.eligible, 0);
        assert_eq!(sink.credits().len(), 1, "exactly once");
    }

    #[test]
    fn sink_failure_leaves_tournament_retryable_all_or_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        store
            .upsert_tournament(closed_tournament(
                "t1",
                vec![
                    RewardTier { position: 1, amount: 100 },
                    RewardTier { position: 2, amount: 50 },
                ],
            ))
            .unwrap();
        seed_abc(&store, "t1");
        let engine = engine(&store, &sink, 25);

        // Rank 2 is user "a"; fail only that credit.
        sink.fail_for("a");
        let (outcome, _) = engine.run_tick(2_000).unwrap();
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.settled, 0);
        let t = store.get("t1").unwrap();
        assert!(!t.is_rewarded);
        assert_eq!(t.settling_since_ms, None, "claim released for retry");
        assert_eq!(sink.credits().len(), 1, "rank-1 prefix was dispatched");

        // Next tick retries the whole tournament.
        sink.clear_failures();
        let (outcome, _) = engine.run_tick(3_000).unwrap();
        assert_eq!(outcome.settled, 1);
        let credits = sink.credits();
        assert_eq!(credits.len(), 3, "rank 1 re-sent with the same dedupe key");
        assert_eq!(credits[0].dedupe_key, credits[1].dedupe_key);
        assert!(store.get("t1").unwrap().is_rewarded);
    }

    #[test]
    fn claim_held_elsewhere_is_a_skip_not_an_error() {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        store
            .upsert_tournament(closed_tournament(
                "t1",
                vec![RewardTier { position: 1, amount: 100 }],
            ))
            .unwrap();
        seed_abc(&store, "t1");

        // Another worker holds the claim.
        store.claim_for_settlement("t1", 1_900, 60_000).unwrap();

        let (outcome, _) = engine(&store, &sink, 25).run_tick(2_000).unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failed, 0);
        assert!(sink.credits().is_empty());
        assert!(!store.get("t1").unwrap().is_rewarded);
    }

    #[test]
    fn zero_participants_settles_trivially() {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        store
            .upsert_tournament(closed_tournament(
                "t1",
                vec![RewardTier { position: 1, amount: 100 }],
            ))
            .unwrap();

        let (outcome, records) = engine(&store, &sink, 25).run_tick(2_000).unwrap();
        assert_eq!(outcome.settled, 1);
        assert!(sink.credits().is_empty());
        assert!(records[0].payouts.is_empty());
        assert!(store.get("t1").unwrap().is_rewarded);
    }

    #[test]
    fn sparse_and_zero_amount_positions_are_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        // Pays rank 1 and rank 3; rank 2 has a zero-amount row.
        store
            .upsert_tournament(closed_tournament(
                "t1",
                vec![
                    RewardTier { position: 1, amount: 100 },
                    RewardTier { position: 2, amount: 0 },
                    RewardTier { position: 3, amount: 25 },
                ],
            ))
            .unwrap();
        seed_abc(&store, "t1");

        let (outcome, _) = engine(&store, &sink, 25).run_tick(2_000).unwrap();
        assert_eq!(outcome.settled, 1);
        let credits = sink.credits();
        assert_eq!(credits.len(), 2);
        assert_eq!(credits[0].user_id, "b");
        assert_eq!(credits[1].user_id, "c");
        assert!(store.get("t1").unwrap().is_rewarded);
    }

    #[test]
    fn top_k_cap_bounds_the_payout_loop() {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let rewards = (1..=10)
            .map(|position| RewardTier { position, amount: 10 })
            .collect();
        store.upsert_tournament(closed_tournament("t1", rewards)).unwrap();
        for i in 0..10 {
            store
                .add_participation(attempt(
                    &format!("p{}", i),
                    "t1",
                    &format!("u{}", i),
                    100 - i as i64,
                    i as u64,
                ))
                .unwrap();
        }

        let (outcome, _) = engine(&store, &sink, 3).run_tick(2_000).unwrap();
        assert_eq!(outcome.settled, 1);
        assert_eq!(sink.credits().len(), 3);
    }

    #[test]
    fn failure_in_one_tournament_does_not_abort_the_batch() {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        store
            .upsert_tournament(closed_tournament(
                "t1",
                vec![RewardTier { position: 1, amount: 100 }],
            ))
            .unwrap();
        store
            .upsert_tournament(closed_tournament(
                "t2",
                vec![RewardTier { position: 1, amount: 100 }],
            ))
            .unwrap();
        store.add_participation(attempt("p1", "t1", "bad", 10, 1)).unwrap();
        store.add_participation(attempt("p2", "t2", "good", 10, 1)).unwrap();
        sink.fail_for("bad");

        let (outcome, _) = engine(&store, &sink, 25).run_tick(2_000).unwrap();
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.settled, 1);
        assert!(!store.get("t1").unwrap().is_rewarded);
        assert!(store.get("t2").unwrap().is_rewarded);
    }

    #[test]
    fn stop_flag_halts_between_tournaments() {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        store
            .upsert_tournament(closed_tournament(
                "t1",
                vec![RewardTier { position: 1, amount: 100 }],
            ))
            .unwrap();
        store.add_participation(attempt("p1", "t1", "a", 10, 1)).unwrap();

        let stop = AtomicBool::new(true);
        let (outcome, _) = engine(&store, &sink, 25)
            .run_tick_with_stop(2_000, &stop)
            .unwrap();
        assert_eq!(outcome.settled, 0);
        assert!(sink.credits().is_empty());
        assert!(!store.get("t1").unwrap().is_rewarded);
    }
}
