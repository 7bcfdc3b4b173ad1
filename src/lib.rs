// Tournament lifecycle and reward settlement engine.
// Deterministic ticks; wall-clock time is injected explicitly so every
// pass is replayable in tests.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod ranking;
pub mod schedule;
pub mod settlement;
pub mod storage;
pub mod store;
