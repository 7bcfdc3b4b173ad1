// Status pass: keep each tournament's status consistent with its window.
// Independent of reward settlement; a tournament goes Completed here and
// stays unrewarded until the settlement pass catches up.

use crate::model::{expected_status, TournamentStatus};
use crate::store::{StoreError, TournamentStore};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleOutcome {
    pub examined: usize,
    pub to_upcoming: usize,
    pub to_ongoing: usize,
    pub to_completed: usize,
}

impl LifecycleOutcome {
    pub fn changed(&self) -> usize {
        self.to_upcoming + self.to_ongoing + self.to_completed
    }
}

pub struct LifecycleScheduler {
    tournaments: Arc<dyn TournamentStore>,
}

impl LifecycleScheduler {
    pub fn new(tournaments: Arc<dyn TournamentStore>) -> Self {
        Self { tournaments }
    }

    /// One pass at `now_ms`. Each tournament's window places it in exactly
    /// one bucket, so every transition is independently idempotent:
    /// re-running the pass with the same clock is a no-op. A listing
    /// failure aborts the tick (retried on the next one); a single
    /// tournament's update failure is logged and does not stop the rest.
    pub fn run_tick(&self, now_ms: u64) -> Result<LifecycleOutcome, StoreError> {
        let drifted = self.tournaments.find_status_drift(now_ms)?;
        let mut outcome = LifecycleOutcome {
            examined: drifted.len(),
            ..LifecycleOutcome::default()
        };

        for tournament in &drifted {
            let target = expected_status(tournament, now_ms);
            match self.tournaments.apply_status(&tournament.id, target) {
                Ok(true) => match target {
                    TournamentStatus::Upcoming => outcome.to_upcoming += 1,
                    TournamentStatus::Ongoing => outcome.to_ongoing += 1,
                    TournamentStatus::Completed => outcome.to_completed += 1,
                },
                Ok(false) => {}
                Err(e) => {
                    eprintln!(
                        "lifecycle: status update failed for tournament {}: {:?}",
                        tournament.id, e
                    );
                }
            }
        }

        Ok(outcome)
    }
}
