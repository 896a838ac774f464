// Read-only public HTTP surface: health, statistics, recorded draws, replay verification.
// Plain HTTP/1.1 over std::net, one thread per connection. Requests are bounded in
// size and in how long a client may take to send them.

use crate::draw::LotteryEngine;
use crate::store::DrawStore;
use crate::types::ParticipantId;
use crate::verify::verify_lottery_result;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// A client that sends nothing for this long is dropped.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_HEADER_BYTES: usize = 16 * 1024;
/// Covers a `/verify` body for a pool at the default participant limit.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Deserialize)]
struct VerifyRequest {
    seed: String,
    seed_hash: String,
    participant_ids: Vec<ParticipantId>,
    winner_ids: Vec<ParticipantId>,
}

#[derive(Serialize)]
struct VerifyResponse {
    verified: bool,
}

/// Bind and serve in the background. Returns the bound address.
pub fn start_http_server<S>(
    listen_addr: &str,
    engine: Arc<LotteryEngine<S>>,
) -> Result<(SocketAddr, thread::JoinHandle<()>), String>
where
    S: DrawStore + Send + 'static,
{
    let listener = TcpListener::bind(listen_addr).map_err(|e| format!("bind {}: {}", listen_addr, e))?;
    let local = listener.local_addr().map_err(|e| format!("{}", e))?;
    let handle = thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || handle_client(stream, engine));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    });
    Ok((local, handle))
}

fn handle_client<S: DrawStore>(mut stream: TcpStream, engine: Arc<LotteryEngine<S>>) {
    if let Err(e) = stream
        .set_read_timeout(Some(READ_TIMEOUT))
        .and_then(|_| stream.set_write_timeout(Some(READ_TIMEOUT)))
    {
        warn!(error = %e, "cannot set socket timeouts");
        return;
    }
    let req = match read_request(&mut stream) {
        Ok(r) => r,
        Err(RequestError::TooLarge) => {
            debug!("request over size limit");
            return write_error(&mut stream, 413, "request too large");
        }
        Err(RequestError::Malformed(e)) => {
            debug!(error = %e, "unreadable request");
            return;
        }
    };
    debug!(method = %req.method, path = %req.path, "http request");

    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/health") => match engine.read(|s| s.list_participants().map(|p| p.len())) {
            Ok(participants) => write_serialized(
                &mut stream,
                200,
                &serde_json::json!({ "status": "healthy", "participants": participants }),
            ),
            Err(e) => {
                error!(error = %e, "health check failed");
                write_serialized(
                    &mut stream,
                    500,
                    &serde_json::json!({ "status": "unhealthy", "error": e.to_string() }),
                )
            }
        },
        ("GET", "/stats") => match engine.lottery_statistics() {
            Ok(stats) => write_serialized(&mut stream, 200, &stats),
            Err(e) => write_error(&mut stream, 500, &e.to_string()),
        },
        ("GET", "/draws") => match engine.draw_records() {
            Ok(records) => write_serialized(&mut stream, 200, &records),
            Err(e) => write_error(&mut stream, 500, &e.to_string()),
        },
        ("GET", path) if path.starts_with("/draws/") => {
            let Ok(number) = path.trim_start_matches("/draws/").parse::<u64>() else {
                return write_error(&mut stream, 400, "bad draw number");
            };
            match engine.draw_records() {
                Ok(records) => match records.iter().find(|r| r.draw_number == number) {
                    Some(record) => write_serialized(&mut stream, 200, record),
                    None => write_error(&mut stream, 404, "not found"),
                },
                Err(e) => write_error(&mut stream, 500, &e.to_string()),
            }
        }
        ("POST", "/verify") => {
            let body = match serde_json::from_slice::<VerifyRequest>(&req.body) {
                Ok(b) => b,
                Err(_) => return write_error(&mut stream, 400, "bad json"),
            };
            let verified = verify_lottery_result(
                &body.seed,
                &body.seed_hash,
                &body.participant_ids,
                &body.winner_ids,
            );
            write_serialized(&mut stream, 200, &VerifyResponse { verified });
        }
        _ => write_error(&mut stream, 404, "not found"),
    }
}

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

enum RequestError {
    Malformed(String),
    TooLarge,
}

impl From<&str> for RequestError {
    fn from(msg: &str) -> Self {
        RequestError::Malformed(msg.to_string())
    }
}

impl From<std::io::Error> for RequestError {
    fn from(e: std::io::Error) -> Self {
        RequestError::Malformed(e.to_string())
    }
}

fn read_request(stream: &mut TcpStream) -> Result<Request, RequestError> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(RequestError::TooLarge);
        }
    }
    let header_end = data
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or("bad request")?
        + 4;
    if header_end > MAX_HEADER_BYTES {
        return Err(RequestError::TooLarge);
    }
    let mut body = data[header_end..].to_vec();

    let head = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = head.split("\r\n");
    let line = lines.next().ok_or("bad request")?;
    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or("bad method")?.to_string();
    let path = parts.next().ok_or("bad path")?.to_string();

    let mut content_len = 0usize;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_len = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| "bad content-length")?;
            }
        }
    }

    if content_len > MAX_BODY_BYTES {
        return Err(RequestError::TooLarge);
    }
    body.truncate(content_len);
    let mut remaining = content_len.saturating_sub(body.len());
    while remaining > 0 {
        let mut chunk = vec![0u8; remaining.min(4096)];
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
        remaining = remaining.saturating_sub(n);
    }

    Ok(Request { method, path, body })
}

fn write_serialized<T: Serialize>(stream: &mut TcpStream, status: u16, value: &T) {
    match serde_json::to_string(value) {
        Ok(body) => write_json(stream, status, &body),
        Err(e) => write_error(stream, 500, &e.to_string()),
    }
}

fn write_error(stream: &mut TcpStream, status: u16, message: &str) {
    let body = serde_json::json!({ "error": message }).to_string();
    write_json(stream, status, &body);
}

fn write_json(stream: &mut TcpStream, status: u16, body: &str) {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let resp = format!(
        "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    );
    let _ = stream.write_all(resp.as_bytes());
}
