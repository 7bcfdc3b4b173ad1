// Thin HTTP/1.1 surface for leaderboard reads, admin ingress, and manual
// tick triggers. No framework; all semantics live in the engines. Manual
// triggers share the periodic jobs' guards, so a trigger racing a timer
// tick is skipped rather than overlapped.

use crate::lifecycle::LifecycleScheduler;
use crate::model::{ParticipationRecord, Tournament};
use crate::ranking::RankingEngine;
use crate::schedule::{now_ms, TickGuard};
use crate::settlement::SettlementEngine;
use crate::store::{InMemoryStore, StoreError, TournamentStore};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

pub struct EngineContext {
    pub store: Arc<InMemoryStore>,
    pub ranking: RankingEngine,
    pub lifecycle: LifecycleScheduler,
    pub settlement: SettlementEngine,
    pub lifecycle_guard: Arc<TickGuard>,
    pub settlement_guard: Arc<TickGuard>,
}

pub fn start_http_server(listen_addr: String, ctx: Arc<EngineContext>) {
    thread::spawn(move || {
        let listener = TcpListener::bind(listen_addr).expect("bind http");
        for stream in listener.incoming() {
            if let Ok(stream) = stream {
                let ctx = Arc::clone(&ctx);
                thread::spawn(move || handle_client(stream, ctx));
            }
        }
    });
}

fn handle_client(mut stream: TcpStream, ctx: Arc<EngineContext>) {
    let req = match read_request(&mut stream) {
        Ok(r) => r,
        Err(_) => return,
    };

    let segments: Vec<&str> = req.path.split('/').filter(|s| !s.is_empty()).collect();

    match (req.method.as_str(), segments.as_slice()) {
        ("GET", ["leaderboard", tournament_id]) => {
            match ctx.ranking.rank(tournament_id) {
                Ok(ranking) => write_body(&mut stream, 200, &ranking),
                Err(e) => write_json(&mut stream, 500, &error_body(&format!("{:?}", e))),
            }
        }
        ("GET", ["leaderboard", tournament_id, "user", user_id]) => {
            match ctx.ranking.rank_for_user(tournament_id, user_id) {
                Ok(ranking) => write_body(&mut stream, 200, &ranking),
                Err(e) => write_json(&mut stream, 500, &error_body(&format!("{:?}", e))),
            }
        }
        ("GET", ["tournament", tournament_id]) => {
            match ctx.store.get(tournament_id) {
                Ok(t) => write_body(&mut stream, 200, &t),
                Err(StoreError::NotFound) => {
                    write_json(&mut stream, 404, r#"{"error":"not found"}"#)
                }
                Err(e) => write_json(&mut stream, 500, &error_body(&format!("{:?}", e))),
            }
        }
        ("POST", ["tournament"]) => {
            let tournament = match serde_json::from_slice::<Tournament>(&req.body) {
                Ok(t) => t,
                Err(_) => return write_json(&mut stream, 400, r#"{"error":"bad json"}"#),
            };
            if tournament.start_ms >= tournament.end_ms {
                return write_json(&mut stream, 400, r#"{"error":"start must precede end"}"#);
            }
            match ctx.store.upsert_tournament(tournament) {
                Ok(()) => write_json(&mut stream, 200, r#"{"ok":true}"#),
                Err(e) => write_json(&mut stream, 500, &error_body(&format!("{:?}", e))),
            }
        }
        ("POST", ["participation"]) => {
            let record = match serde_json::from_slice::<ParticipationRecord>(&req.body) {
                Ok(r) => r,
                Err(_) => return write_json(&mut stream, 400, r#"{"error":"bad json"}"#),
            };
            match ctx.store.add_participation(record) {
                Ok(()) => write_json(&mut stream, 200, r#"{"ok":true}"#),
                Err(e) => write_json(&mut stream, 500, &error_body(&format!("{:?}", e))),
            }
        }
        ("POST", ["tick", "lifecycle"]) => {
            match ctx.lifecycle_guard.try_run(|| ctx.lifecycle.run_tick(now_ms())) {
                None => write_json(&mut stream, 200, r#"{"skipped":true}"#),
                Some(Ok(outcome)) => write_body(&mut stream, 200, &outcome),
                Some(Err(e)) => write_json(&mut stream, 500, &error_body(&format!("{:?}", e))),
            }
        }
        ("POST", ["tick", "settlement"]) => {
            match ctx
                .settlement_guard
                .try_run(|| ctx.settlement.run_tick(now_ms()))
            {
                None => write_json(&mut stream, 200, r#"{"skipped":true}"#),
                Some(Ok((outcome, _records))) => write_body(&mut stream, 200, &outcome),
                Some(Err(e)) => write_json(&mut stream, 500, &error_body(&format!("{:?}", e))),
            }
        }
        ("GET", ["status"]) => {
            match ctx.store.list_tournaments() {
                Ok(tournaments) => {
                    let rewarded = tournaments.iter().filter(|t| t.is_rewarded).count();
                    let resp = format!(
                        r#"{{"tournaments":{},"rewarded":{}}}"#,
                        tournaments.len(),
                        rewarded
                    );
                    write_json(&mut stream, 200, &resp);
                }
                Err(e) => write_json(&mut stream, 500, &error_body(&format!("{:?}", e))),
            }
        }
        _ => {
            write_json(&mut stream, 404, r#"{"error":"not found"}"#);
        }
    }
}

fn error_body(detail: &str) -> String {
    serde_json::json!({ "error": detail }).to_string()
}

fn write_body<T: serde::Serialize>(stream: &mut TcpStream, status: u16, body: &T) {
    match serde_json::to_string(body) {
        Ok(json) => write_json(stream, status, &json),
        Err(_) => write_json(stream, 500, r#"{"error":"encode failed"}"#),
    }
}

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<Request, String> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf).map_err(|e| format!("{}", e))?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let header_end = data
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or("bad request")?
        + 4;
    let header_bytes = &data[..header_end];
    let mut body = data[header_end..].to_vec();

    let req_str = String::from_utf8_lossy(header_bytes);
    let mut lines = req_str.split("\r\n");
    let line = lines.next().ok_or("bad request")?;
    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or("bad method")?.to_string();
    let path = parts.next().ok_or("bad path")?.to_string();

    let mut content_len = 0usize;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix("Content-Length:") {
            content_len = rest.trim().parse::<usize>().unwrap_or(0);
        }
    }

    while content_len > body.len() {
        let mut chunk = vec![0u8; (content_len - body.len()).min(4096)];
        let n = stream.read(&mut chunk).map_err(|e| format!("{}", e))?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Ok(Request { method, path, body })
}

fn write_json(stream: &mut TcpStream, status: u16, body: &str) {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let resp = format!(
        "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        status_line,
        body.len(),
        body
    );
    let _ = stream.write_all(resp.as_bytes());
}
