use std::env;
use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tourney_core::config::EngineConfig;
use tourney_core::http::{start_http_server, EngineContext};
use tourney_core::lifecycle::LifecycleScheduler;
use tourney_core::ranking::RankingEngine;
use tourney_core::schedule::{spawn_periodic, TickGuard};
use tourney_core::settlement::SettlementEngine;
use tourney_core::storage::{JsonlRewardSink, StateFile};
use tourney_core::store::{InMemoryStore, ParticipationStore, RewardSink, TournamentStore};

fn main() {
    let mut config_path: Option<String> = None;
    let mut listen_override: Option<String> = None;
    let mut data_dir_override: Option<String> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next(),
            "--listen" => listen_override = args.next(),
            "--data-dir" => data_dir_override = args.next(),
            _ => {
                eprintln!("unknown arg {}", arg);
                return;
            }
        }
    }

    let mut config = match config_path {
        Some(path) => {
            let bytes = fs::read_to_string(&path).expect("read config");
            serde_json::from_str::<EngineConfig>(&bytes).expect("parse config json")
        }
        None => EngineConfig::default(),
    };
    if let Some(listen) = listen_override {
        config.listen_addr = listen;
    }
    if let Some(data_dir) = data_dir_override {
        config.data_dir = data_dir;
    }

    let state_file = StateFile::new(&config.data_dir).expect("open data dir");
    let store = Arc::new(InMemoryStore::with_persistence(state_file).expect("restore state"));
    let payout_path = std::path::Path::new(&config.data_dir).join("payouts.jsonl");
    let sink = Arc::new(JsonlRewardSink::open(&payout_path).expect("open payout ledger"));

    let tournaments = Arc::clone(&store) as Arc<dyn TournamentStore>;
    let participations = Arc::clone(&store) as Arc<dyn ParticipationStore>;

    let lifecycle = LifecycleScheduler::new(Arc::clone(&tournaments));
    let settlement = SettlementEngine::new(
        Arc::clone(&tournaments),
        RankingEngine::new(Arc::clone(&participations)),
        Arc::clone(&sink) as Arc<dyn RewardSink>,
        config.top_k_cap,
        config.settlement_lease_ms,
    );

    let lifecycle_guard = Arc::new(TickGuard::new());
    let settlement_guard = Arc::new(TickGuard::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    let lifecycle_job = LifecycleScheduler::new(Arc::clone(&tournaments));
    let _lifecycle_handle = spawn_periodic(
        "lifecycle",
        Duration::from_millis(config.lifecycle_interval_ms),
        Arc::clone(&lifecycle_guard),
        Arc::clone(&shutdown),
        move |now| match lifecycle_job.run_tick(now) {
            Ok(outcome) if outcome.changed() > 0 => {
                eprintln!(
                    "lifecycle: {} upcoming, {} ongoing, {} completed",
                    outcome.to_upcoming, outcome.to_ongoing, outcome.to_completed
                );
            }
            Ok(_) => {}
            Err(e) => eprintln!("lifecycle tick failed: {:?}", e),
        },
    );

    let settlement_job = SettlementEngine::new(
        Arc::clone(&tournaments),
        RankingEngine::new(Arc::clone(&participations)),
        Arc::clone(&sink) as Arc<dyn RewardSink>,
        config.top_k_cap,
        config.settlement_lease_ms,
    );
    let settlement_stop = Arc::clone(&shutdown);
    let _settlement_handle = spawn_periodic(
        "settlement",
        Duration::from_millis(config.settlement_interval_ms),
        Arc::clone(&settlement_guard),
        Arc::clone(&shutdown),
        move |now| match settlement_job.run_tick_with_stop(now, &settlement_stop) {
            Ok((outcome, _records)) if outcome.eligible > 0 => {
                eprintln!(
                    "settlement: {} eligible, {} settled, {} skipped, {} failed, {} credits",
                    outcome.eligible,
                    outcome.settled,
                    outcome.skipped,
                    outcome.failed,
                    outcome.credits_dispatched
                );
            }
            Ok(_) => {}
            Err(e) => eprintln!("settlement tick failed: {:?}", e),
        },
    );

    let ctx = Arc::new(EngineContext {
        store: Arc::clone(&store),
        ranking: RankingEngine::new(Arc::clone(&participations)),
        lifecycle,
        settlement,
        lifecycle_guard,
        settlement_guard,
    });
    start_http_server(config.listen_addr.clone(), ctx);
    eprintln!(
        "tourney-engined listening on {} (data dir {})",
        config.listen_addr, config.data_dir
    );

    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
