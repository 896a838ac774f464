#![cfg(feature = "server")]

use fairdraw_core::http::{start_http_server, MAX_BODY_BYTES};
use fairdraw_core::types::{Participant, ParticipantStatus};
use fairdraw_core::{LotteryEngine, MemoryStore};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

fn request(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, serde_json::Value) {
    let req = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{}",
        method,
        path,
        body.len(),
        body
    );
    send_raw(addr, &req)
}

fn send_raw(addr: SocketAddr, req: &str) -> (u16, serde_json::Value) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.write_all(req.as_bytes()).expect("write");
    let mut raw = String::new();
    stream.read_to_string(&mut raw).expect("read");
    let status: u16 = raw
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status");
    let body = raw.split("\r\n\r\n").nth(1).unwrap_or("");
    (status, serde_json::from_str(body).expect("json body"))
}

fn engine_with_draw() -> (Arc<LotteryEngine<MemoryStore>>, fairdraw_core::DrawResult) {
    let engine = LotteryEngine::new(MemoryStore::new(100));
    for i in 0..6 {
        let id = engine
            .register_participant(Participant::new(&format!("p{}", i), "+7", "12345678"))
            .expect("register");
        engine
            .update_participant_status(id, ParticipantStatus::Approved, 1, None)
            .expect("approve");
    }
    let result = engine.conduct_lottery(2, true).expect("draw");
    (Arc::new(engine), result)
}

#[test]
fn serves_stats_and_draws() {
    let (engine, result) = engine_with_draw();
    let (addr, _handle) = start_http_server("127.0.0.1:0", engine).expect("start");

    let (status, stats) = request(addr, "GET", "/stats", "");
    assert_eq!(status, 200);
    assert_eq!(stats["total_winners"], 2);
    assert_eq!(stats["total_draws"], 1);

    let (status, draw) = request(addr, "GET", "/draws/1", "");
    assert_eq!(status, 200);
    assert_eq!(draw["seed_hash"], result.seed_hash.as_str());
    assert_eq!(draw["winners"].as_array().map(Vec::len), Some(2));

    let (status, _) = request(addr, "GET", "/draws/9", "");
    assert_eq!(status, 404);
    let (status, _) = request(addr, "GET", "/draws/abc", "");
    assert_eq!(status, 400);
}

#[test]
fn verify_endpoint_replays() {
    let (engine, result) = engine_with_draw();
    let (addr, _handle) = start_http_server("127.0.0.1:0", engine).expect("start");

    let mut body = serde_json::json!({
        "seed": result.seed.expose(),
        "seed_hash": result.seed_hash,
        "participant_ids": result.eligible_snapshot,
        "winner_ids": result.winner_participant_ids(),
    });
    let (status, resp) = request(addr, "POST", "/verify", &body.to_string());
    assert_eq!(status, 200);
    assert_eq!(resp["verified"], true);

    body["seed_hash"] = serde_json::Value::String("00".repeat(32));
    let (_, resp) = request(addr, "POST", "/verify", &body.to_string());
    assert_eq!(resp["verified"], false);

    let (status, _) = request(addr, "POST", "/verify", "{not json");
    assert_eq!(status, 400);
}

#[test]
fn health_reports_participant_count() {
    let (engine, _) = engine_with_draw();
    let (addr, _handle) = start_http_server("127.0.0.1:0", engine).expect("start");

    let (status, health) = request(addr, "GET", "/health", "");
    assert_eq!(status, 200);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["participants"], 6);
}

#[test]
fn oversized_body_is_refused_before_reading() {
    let (engine, _) = engine_with_draw();
    let (addr, _handle) = start_http_server("127.0.0.1:0", engine).expect("start");

    // only the head is sent; the server must answer without waiting for the body
    let req = format!(
        "POST /verify HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n",
        MAX_BODY_BYTES + 1
    );
    let (status, body) = send_raw(addr, &req);
    assert_eq!(status, 413);
    assert_eq!(body["error"], "request too large");
}

#[test]
fn silent_client_is_dropped() {
    let (engine, _) = engine_with_draw();
    let (addr, _handle) = start_http_server("127.0.0.1:0", engine).expect("start");

    let mut idle = TcpStream::connect(addr).expect("connect");
    let mut raw = Vec::new();
    let started = std::time::Instant::now();
    // returns once the server gives up and closes the connection
    let _ = idle.read_to_end(&mut raw);
    assert!(raw.is_empty());
    assert!(started.elapsed() < std::time::Duration::from_secs(30));

    let (status, _) = request(addr, "GET", "/health", "");
    assert_eq!(status, 200);
}
