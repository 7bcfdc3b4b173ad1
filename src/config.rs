use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Status pass interval.
    #[serde(default = "default_lifecycle_interval_ms")]
    pub lifecycle_interval_ms: u64,
    /// Settlement pass interval.
    #[serde(default = "default_settlement_interval_ms")]
    pub settlement_interval_ms: u64,
    /// Upper bound on how many leaderboard positions a settlement pass
    /// will ever pay, regardless of the reward table.
    #[serde(default = "default_top_k_cap")]
    pub top_k_cap: u32,
    /// Claim lease: a worker that disappears mid-settlement loses its
    /// claim after this long.
    #[serde(default = "default_settlement_lease_ms")]
    pub settlement_lease_ms: u64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_lifecycle_interval_ms() -> u64 {
    60_000
}

fn default_settlement_interval_ms() -> u64 {
    300_000
}

fn default_top_k_cap() -> u32 {
    25
}

fn default_settlement_lease_ms() -> u64 {
    120_000
}

fn default_listen_addr() -> String {
    "127.0.0.1:7200".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lifecycle_interval_ms: default_lifecycle_interval_ms(),
            settlement_interval_ms: default_settlement_interval_ms(),
            top_k_cap: default_top_k_cap(),
            settlement_lease_ms: default_settlement_lease_ms(),
            listen_addr: default_listen_addr(),
            data_dir: default_data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg: EngineConfig = serde_json::from_str("{}").expect("parse empty config");
        assert_eq!(cfg.lifecycle_interval_ms, 60_000);
        assert_eq!(cfg.settlement_interval_ms, 300_000);
        assert_eq!(cfg.top_k_cap, 25);
        assert_eq!(cfg.settlement_lease_ms, 120_000);
        assert_eq!(cfg.listen_addr, "127.0.0.1:7200");
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"top_k_cap": 5, "data_dir": "/tmp/x"}"#).expect("parse");
        assert_eq!(cfg.top_k_cap, 5);
        assert_eq!(cfg.data_dir, "/tmp/x");
        assert_eq!(cfg.lifecycle_interval_ms, 60_000);
    }
}
