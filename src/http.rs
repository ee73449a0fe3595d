//! Minimal asynchronous HTTP/1.1 client.
//!
//! The shape the filtering host expects from its request helper: resolve
//! the host, connect, write a `Connection: close` request, and parse the
//! reply with a three-state line parser: status line, headers, then a
//! body of exactly `Content-Length` bytes. Failures never surface as
//! errors; they fold into synthetic reply codes so the caller handles one
//! shape:
//!
//! | Condition | Code |
//! |---|---|
//! | DNS, connect, or write failure | 450 |
//! | 200 reply without `Content-Length` | 450 |
//! | read error or timeout | 500 |
//! | non-200 status | the server's code, no headers or body |
//!
//! ```no_run
//! use kvkit::http::{get_request, RequestOptions};
//!
//! # async fn run() {
//! let reply = get_request("example.com", "/status", &RequestOptions::default()).await;
//! if reply.code == 200 {
//!     println!("{} bytes", reply.body.map(|b| b.len()).unwrap_or(0));
//! }
//! # }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

/// Default destination port.
pub const DEFAULT_PORT: u16 = 80;

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Synthetic code for request-side failures: resolution, connect, write,
/// and a 200 reply that carries no `Content-Length`.
pub const CODE_REQUEST_FAILED: u16 = 450;

/// Synthetic code for transport failures while reading the reply.
pub const CODE_TRANSPORT_FAILED: u16 = 500;

/// Per-request knobs; the defaults match the host's conventions.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra request headers, written after `Host`.
    pub headers: Vec<(String, String)>,
    /// Destination port; defaults to [`DEFAULT_PORT`].
    pub port: Option<u16>,
    /// Timeout per network phase; defaults to [`DEFAULT_TIMEOUT_MS`].
    pub timeout_ms: Option<u64>,
}

/// Outcome of a request. Synthetic and non-200 codes carry no headers and
/// no body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub code: u16,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<Bytes>,
}

impl HttpReply {
    fn error(code: u16) -> HttpReply {
        HttpReply {
            code,
            headers: None,
            body: None,
        }
    }
}

#[derive(Debug, Error)]
enum ReadError {
    #[error("transport read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed status line")]
    BadStatus,
    #[error("reply carries no content-length")]
    MissingLength,
}

/// Issues a GET request and reports the reply.
pub async fn get_request(host: &str, path: &str, opts: &RequestOptions) -> HttpReply {
    request(host, path, None, opts).await
}

/// Issues a POST request with `body` and reports the reply.
pub async fn post_request(host: &str, path: &str, body: &[u8], opts: &RequestOptions) -> HttpReply {
    request(host, path, Some(body), opts).await
}

async fn request(host: &str, path: &str, body: Option<&[u8]>, opts: &RequestOptions) -> HttpReply {
    let port = opts.port.unwrap_or(DEFAULT_PORT);
    let deadline = Duration::from_millis(opts.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));

    let addr = match lookup_host((host, port)).await {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => return HttpReply::error(CODE_REQUEST_FAILED),
        },
        Err(_) => {
            debug!(host, "hostname resolution failed");
            return HttpReply::error(CODE_REQUEST_FAILED);
        }
    };

    let mut stream = match timeout(deadline, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        _ => return HttpReply::error(CODE_REQUEST_FAILED),
    };

    let req = format_request(host, path, body, &opts.headers);
    match timeout(deadline, stream.write_all(&req)).await {
        Ok(Ok(())) => {}
        _ => return HttpReply::error(CODE_REQUEST_FAILED),
    }

    match timeout(deadline, read_reply(stream)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(ReadError::MissingLength)) => HttpReply::error(CODE_REQUEST_FAILED),
        Ok(Err(_)) => HttpReply::error(CODE_TRANSPORT_FAILED),
        Err(_) => HttpReply::error(CODE_TRANSPORT_FAILED),
    }
}

fn format_request(
    host: &str,
    path: &str,
    body: Option<&[u8]>,
    headers: &[(String, String)],
) -> Vec<u8> {
    let method = if body.is_some() { "POST" } else { "GET" };
    let mut req = format!(
        "{method} {path} HTTP/1.1\r\nConnection: close\r\nHost: {host}\r\n"
    )
    .into_bytes();
    if let Some(body) = body {
        req.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    for (name, value) in headers {
        req.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    req.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        req.extend_from_slice(body);
    }
    req
}

/// Three-state reply parser: status line, headers, then a body of exactly
/// `Content-Length` bytes.
async fn read_reply(stream: TcpStream) -> Result<HttpReply, ReadError> {
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let code = parse_status_line(&line).ok_or(ReadError::BadStatus)?;
    if code != 200 {
        // Report the server's code; the body is not read.
        return Ok(HttpReply::error(code));
    }

    let mut headers = HashMap::new();
    let mut content_length: Option<usize> = None;
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(ReadError::BadStatus);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = parse_header_line(trimmed) {
            if content_length.is_none() && name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().ok();
            }
            headers.insert(name.to_string(), value.to_string());
        }
    }

    let len = content_length.ok_or(ReadError::MissingLength)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(HttpReply {
        code,
        headers: Some(headers),
        body: Some(Bytes::from(body)),
    })
}

/// Parses `HTTP/1.1 200 OK` into the status code.
fn parse_status_line(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let proto = parts.next()?;
    if !proto.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Splits `Name: value`, trimming leading whitespace off the value.
fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    Some((name, value.trim_start()))
}
