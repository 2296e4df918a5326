// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Embedded staging file server.
//!
//! Serves the public directory read-only over HTTP/1.1 on a free local
//! port, bound once for the lifetime of a run. Remote hosts reach it
//! through the reverse forwarding every session sets up, so installers can
//! fetch sources with `$INSTALL_URL`. Only `GET` and `HEAD` are accepted;
//! byte ranges and `If-Modified-Since` are honored. One trace line per
//! request (`bytes<TAB>client<TAB>status<TAB>user-agent<TAB>target`) is
//! queued for the orchestrator to drain.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const HEADER_MAX: usize = 4096;

pub struct StageServer {
    port: u16,
    trace: mpsc::UnboundedReceiver<String>,
    handle: JoinHandle<()>,
}

impl StageServer {
    /// Bind to a free port on the loopback interface and start serving.
    pub async fn start(public_dir: PathBuf) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind staging server")?;
        let port = listener.local_addr().context("staging server address")?.port();
        let (tx, trace) = mpsc::unbounded_channel();

        let handle = tokio::spawn(accept_loop(listener, public_dir, tx));
        debug!("staging server listening on 127.0.0.1:{port}");

        Ok(Self { port, trace, handle })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Collect any request trace lines queued since the last drain.
    pub fn drain_trace(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.trace.try_recv() {
            lines.push(line);
        }
        lines
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    root: PathBuf,
    trace: mpsc::UnboundedSender<String>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let root = root.clone();
                let trace = trace.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, peer.ip().to_string(), root, trace).await
                    {
                        debug!("staging request failed: {e:#}");
                    }
                });
            }
            Err(e) => debug!("staging accept failed: {e}"),
        }
    }
}

#[derive(Debug, Default)]
struct Request {
    head: bool,
    target: String,
    range: Option<String>,
    if_modified_since: Option<String>,
    user_agent: String,
}

async fn handle_client(
    stream: TcpStream,
    client: String,
    root: PathBuf,
    trace: mpsc::UnboundedSender<String>,
) -> Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .context("read request line")?;

    let parsed = parse_request(&mut reader, &request_line).await;
    let mut stream = reader.into_inner();

    let request = match parsed {
        Ok(req) => req,
        Err(status) => {
            let _ = trace.send(trace_line(0, &client, status, "", ""));
            return send_simple(&mut stream, status).await;
        }
    };

    let (status, body, total_len, offset) = match resolve(&root, &request) {
        Ok(resolved) => resolved,
        Err(status) => {
            let line = trace_line(0, &client, status, &request.user_agent, &request.target);
            let _ = trace.send(line);
            return send_simple(&mut stream, status).await;
        }
    };

    let mut header = format!(
        "HTTP/1.1 {} {}\r\nConnection: close\r\n",
        status,
        status_text(status)
    );
    if status == 200 || status == 206 {
        header.push_str(&format!("Content-Length: {}\r\n", body.len()));
        if status == 206 {
            header.push_str(&format!(
                "Content-Range: bytes {}-{}/{}\r\n",
                offset,
                offset + body.len().saturating_sub(1) as u64,
                total_len
            ));
        }
    } else {
        header.push_str("Content-Length: 0\r\n");
    }
    header.push_str("\r\n");

    stream.write_all(header.as_bytes()).await?;
    let mut sent = 0usize;
    if !request.head && (status == 200 || status == 206) {
        stream.write_all(&body).await?;
        sent = body.len();
    }
    stream.flush().await?;

    let _ = trace.send(trace_line(
        sent,
        &client,
        status,
        &request.user_agent,
        &request.target,
    ));
    Ok(())
}

async fn parse_request(
    reader: &mut BufReader<TcpStream>,
    request_line: &str,
) -> Result<Request, u16> {
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(400u16)?;
    let target = parts.next().ok_or(400u16)?;
    let version = parts.next().ok_or(400u16)?;

    if !version.starts_with("HTTP/1.") {
        return Err(505);
    }
    let head = match method {
        "GET" => false,
        "HEAD" => true,
        _ => return Err(405),
    };

    let mut request = Request {
        head,
        target: target.to_string(),
        ..Request::default()
    };

    let mut consumed = request_line.len();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.map_err(|_| 408u16)?;
        consumed += line.len();
        if consumed > HEADER_MAX {
            return Err(431);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "range" => request.range = Some(value.to_string()),
                "if-modified-since" => request.if_modified_since = Some(value.to_string()),
                "user-agent" => request.user_agent = value.to_string(),
                _ => {}
            }
        }
    }

    Ok(request)
}

/// Resolve a request against the public directory. Returns the status, the
/// body slice to send, the file's total length, and the range offset.
fn resolve(root: &Path, request: &Request) -> Result<(u16, Vec<u8>, u64, u64), u16> {
    let target = request.target.split('?').next().unwrap_or("");
    if !target.starts_with('/') {
        return Err(400);
    }

    let relative = Path::new(&target[1..]);
    for component in relative.components() {
        match component {
            Component::Normal(_) => {}
            Component::CurDir => {}
            _ => return Err(403),
        }
    }

    let path = root.join(relative);
    let meta = std::fs::metadata(&path).map_err(|_| 404u16)?;
    if !meta.is_file() {
        return Err(403);
    }

    if let (Some(since), Ok(mtime)) = (&request.if_modified_since, meta.modified()) {
        if !modified_since(since, mtime) {
            return Err(304);
        }
    }

    let bytes = std::fs::read(&path).map_err(|_| 403u16)?;
    let total = bytes.len() as u64;

    if let Some(range) = &request.range {
        let (start, end) = parse_range(range, total).ok_or(416u16)?;
        let body = bytes[start as usize..=(end as usize)].to_vec();
        return Ok((206, body, total, start));
    }

    Ok((200, bytes, total, 0))
}

/// `bytes=start-end` with an optional open end.
fn parse_range(value: &str, total: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() {
        total.checked_sub(1)?
    } else {
        end.parse().ok()?
    };
    if start > end || end >= total {
        return None;
    }
    Some((start, end))
}

fn modified_since(header: &str, mtime: SystemTime) -> bool {
    let Ok(since) = NaiveDateTime::parse_from_str(header, HTTP_DATE_FORMAT) else {
        return true;
    };
    let mtime: DateTime<Utc> = mtime.into();
    mtime.timestamp() > since.and_utc().timestamp()
}

async fn send_simple(stream: &mut TcpStream, status: u16) -> Result<()> {
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status,
        status_text(status)
    );
    stream.write_all(header.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        416 => "Range Not Satisfiable",
        431 => "Request Header Fields Too Large",
        505 => "HTTP Version Not Supported",
        _ => "Internal Server Error",
    }
}

fn trace_line(bytes: usize, client: &str, status: u16, user_agent: &str, target: &str) -> String {
    format!("{bytes}\t{client}\t{status}\t{user_agent}\t{target}")
}
