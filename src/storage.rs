// Durable state: one JSON snapshot file for tournaments + participations,
// and an append-only JSONL payout ledger acting as the bundled RewardSink.

use crate::model::{ParticipationRecord, Tournament};
use crate::store::RewardSink;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedState {
    pub tournaments: Vec<Tournament>,
    pub participations: Vec<ParticipationRecord>,
}

pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, String> {
        fs::create_dir_all(&data_dir).map_err(|e| format!("{}", e))?;
        Ok(Self {
            path: data_dir.as_ref().join("tourney_state.json"),
        })
    }

    pub fn load(&self) -> Result<Option<PersistedState>, String> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path).map_err(|e| format!("{}", e))?;
        let state = serde_json::from_slice::<PersistedState>(&data)
            .map_err(|e| format!("{}", e))?;
        Ok(Some(state))
    }

    pub fn save(&self, state: &PersistedState) -> Result<(), String> {
        let data = serde_json::to_vec_pretty(state).map_err(|e| format!("{}", e))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, data).map_err(|e| format!("{}", e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| format!("{}", e))?;
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PayoutLine {
    dedupe_key: String,
    user_id: String,
    amount: u64,
    currency: String,
    network: String,
    memo: String,
}

/// File-ledger sink: one JSON line per credit. Keys already present in the
/// ledger are acknowledged without being written again, which makes whole-
/// tournament payout retries safe.
pub struct JsonlRewardSink {
    path: PathBuf,
    seen: Mutex<HashSet<String>>,
}

impl JsonlRewardSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).map_err(|e| format!("{}", e))?;
        }
        let mut seen = HashSet::new();
        if path.as_ref().exists() {
            let file = fs::File::open(&path).map_err(|e| format!("{}", e))?;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(|e| format!("{}", e))?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: PayoutLine =
                    serde_json::from_str(&line).map_err(|e| format!("{}", e))?;
                seen.insert(entry.dedupe_key);
            }
        }
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            seen: Mutex::new(seen),
        })
    }
}

impl RewardSink for JsonlRewardSink {
    fn credit(
        &self,
        user_id: &str,
        amount: u64,
        currency: &str,
        network: &str,
        memo: &str,
        dedupe_key: &str,
    ) -> Result<(), String> {
        let mut seen = self.seen.lock().map_err(|_| "sink lock poisoned".to_string())?;
        if seen.contains(dedupe_key) {
            return Ok(());
        }
        let line = PayoutLine {
            dedupe_key: dedupe_key.to_string(),
            user_id: user_id.to_string(),
            amount,
            currency: currency.to_string(),
            network: network.to_string(),
            memo: memo.to_string(),
        };
        let data = serde_json::to_string(&line).map_err(|e| format!("{}", e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| format!("{}", e))?;
        writeln!(file, "{}", data).map_err(|e| format!("{}", e))?;
        seen.insert(dedupe_key.to_string());
        Ok(())
    }
}
