//! Shared helpers for tft-bridge integration tests.
//!
//! `StubHost` is a minimal HTTP/1.1 server on `127.0.0.1:0` that answers with
//! canned JSON and records every request.  `StubPushChannel` accepts WebSocket
//! upgrades and closes them on demand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use tft_core::BridgeConfig;

/// One request as seen by the stub.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

type Responder = dyn Fn(&Recorded) -> (u16, String) + Send + Sync;

pub struct StubHost {
    pub port: u16,
    requests: Arc<Mutex<Vec<Recorded>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StubHost {
    /// Serves every request with `respond`.
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&Recorded) -> (u16, String) + Send + Sync + 'static,
    {
        Self::start_dropping(0, respond).await
    }

    /// Closes the first `drop_first` connections without answering, then
    /// serves with `respond`.
    pub async fn start_dropping<F>(drop_first: usize, respond: F) -> Self
    where
        F: Fn(&Recorded) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let respond: Arc<Responder> = Arc::new(respond);

        let task = {
            let requests = Arc::clone(&requests);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let n = connections.fetch_add(1, Ordering::SeqCst);
                    if n < drop_first {
                        drop(stream);
                        continue;
                    }
                    let requests = Arc::clone(&requests);
                    let respond = Arc::clone(&respond);
                    tokio::spawn(async move {
                        serve(stream, requests, respond).await;
                    });
                }
            })
        };

        Self {
            port,
            requests,
            connections,
            task,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// A config pointing at this stub with fast retries.
    pub fn config(&self) -> BridgeConfig {
        BridgeConfig {
            serial_port: "/dev/ttyMOCK0".to_string(),
            host: "127.0.0.1".to_string(),
            port: self.port,
            timeout: Duration::from_secs(2),
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            ..BridgeConfig::default()
        }
    }
}

impl Drop for StubHost {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, requests: Arc<Mutex<Vec<Recorded>>>, respond: Arc<Responder>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let body = &buf[head_end..head_end + content_length];
    let body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(body).ok()
    };

    let recorded = Recorded { method, path, body };
    let (status, payload) = respond(&recorded);
    requests.lock().unwrap().push(recorded);

    let response = format!(
        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// WebSocket endpoint that accepts upgrades and holds them open until
/// [`StubPushChannel::close_all`] is called.
pub struct StubPushChannel {
    pub port: u16,
    accepted: Arc<AtomicUsize>,
    close: Arc<Notify>,
    task: JoinHandle<()>,
}

impl StubPushChannel {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let close = Arc::new(Notify::new());

        let task = {
            let accepted = Arc::clone(&accepted);
            let close = Arc::clone(&close);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        continue;
                    };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let close = Arc::clone(&close);
                    tokio::spawn(async move {
                        loop {
                            tokio::select! {
                                _ = close.notified() => {
                                    let _ = ws.close(None).await;
                                    break;
                                }
                                msg = ws.next() => {
                                    if msg.is_none() {
                                        break;
                                    }
                                }
                            }
                        }
                    });
                }
            })
        };

        Self {
            port,
            accepted,
            close,
            task,
        }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Closes every open session from the server side.
    pub fn close_all(&self) {
        self.close.notify_waiters();
    }

    pub fn config(&self) -> BridgeConfig {
        BridgeConfig {
            host: "127.0.0.1".to_string(),
            port: self.port,
            timeout: Duration::from_secs(2),
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            ..BridgeConfig::default()
        }
    }
}

impl Drop for StubPushChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Polls `check` every 10 ms until it holds or `limit` passes.
pub async fn wait_until<F: FnMut() -> bool>(limit: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
