//! Minimal HTTP/1.1 client.
//!
//! Plain HTTP over `std::net::TcpStream`, one request per connection
//! (`Connection: close`). The helper and control server are reached on the
//! local network, so there is no TLS and no redirect handling.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Maximum response body size (8 MB).
const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Low-level failure of a single exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The deadline passed before a complete response arrived.
    Timeout,
    /// Connect, DNS, or socket failure.
    Network(String),
    /// The URL or the response could not be parsed.
    Malformed(String),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed: {msg}"),
        }
    }
}

/// A raw parsed HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    /// HTTP status code (e.g. 200, 404).
    pub status_code: u16,
    /// Response headers as (lowercased name, value) pairs.
    pub headers: Vec<(String, String)>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

/// Target of a request, split out of an `http://host[:port]/path` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTarget {
    pub host: String,
    pub port: u16,
    /// Path plus query, always starting with `/`.
    pub path: String,
}

impl HttpTarget {
    /// Parse an absolute `http://` URL.
    pub fn parse(url: &str) -> Result<Self, HttpError> {
        let rest = url
            .trim()
            .strip_prefix("http://")
            .ok_or_else(|| HttpError::Malformed(format!("unsupported URL: {url}")))?;
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| HttpError::Malformed(format!("bad port in {url}")))?;
                (h, port)
            },
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(HttpError::Malformed(format!("missing host in {url}")));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Perform one request and wait for the complete response.
///
/// `body` is sent as `application/json`. The whole exchange (connect, send,
/// receive) must finish within `timeout`.
pub fn send(
    method: Method,
    url: &str,
    body: Option<&[u8]>,
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    let target = HttpTarget::parse(url)?;
    let deadline = Instant::now() + timeout;

    let mut stream = tcp_connect(&target, deadline)?;
    write_request(&mut stream, method, &target, body)?;
    let raw = read_response(&mut stream, deadline)?;
    parse_response(&raw)
}

// -------------------------------------------------------------------
// Internals
// -------------------------------------------------------------------

/// Connect to the first resolved address that accepts before `deadline`.
/// `localhost` may resolve to `::1` ahead of `127.0.0.1`, so every
/// address is tried in turn.
fn tcp_connect(target: &HttpTarget, deadline: Instant) -> Result<TcpStream, HttpError> {
    let addrs: Vec<_> = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| HttpError::Network(format!("DNS resolution failed: {e}")))?
        .collect();

    let mut last_err = HttpError::Network(format!(
        "no addresses for {}:{}",
        target.host, target.port
    ));
    for addr in &addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(HttpError::Timeout);
        }
        match TcpStream::connect_timeout(addr, remaining) {
            Ok(stream) => {
                let remaining = deadline
                    .saturating_duration_since(Instant::now())
                    .max(Duration::from_millis(1));
                stream
                    .set_write_timeout(Some(remaining))
                    .map_err(|e| HttpError::Network(format!("set write timeout: {e}")))?;
                return Ok(stream);
            },
            Err(e) => {
                log::debug!("connect to {addr} failed: {e}");
                last_err = match e.kind() {
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => HttpError::Timeout,
                    _ => HttpError::Network(format!("TCP connect failed: {e}")),
                };
            },
        }
    }
    Err(last_err)
}

/// Serialize the request line, headers, and optional body.
fn write_request(
    stream: &mut impl Write,
    method: Method,
    target: &HttpTarget,
    body: Option<&[u8]>,
) -> Result<(), HttpError> {
    let mut head = format!(
        "{method} {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: kiosk/{version}\r\n\
         Accept: application/json, text/plain, */*\r\n\
         Connection: close\r\n",
        path = target.path,
        host = target.host_header(),
        version = env!("CARGO_PKG_VERSION"),
    );
    if let Some(body) = body {
        head.push_str("Content-Type: application/json\r\n");
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("\r\n");

    let mut message = head.into_bytes();
    if let Some(body) = body {
        message.extend_from_slice(body);
    }

    let io_err = |e: io::Error| match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => HttpError::Timeout,
        _ => HttpError::Network(format!("send request: {e}")),
    };
    stream.write_all(&message).map_err(io_err)?;
    stream.flush().map_err(io_err)
}

/// Read until the response is complete, EOF, or the deadline.
fn read_response(stream: &mut TcpStream, deadline: Instant) -> Result<Vec<u8>, HttpError> {
    let mut buf = Vec::with_capacity(8192);
    let mut chunk = [0u8; 8192];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(HttpError::Timeout);
        }
        stream
            .set_read_timeout(Some(remaining))
            .map_err(|e| HttpError::Network(format!("set read timeout: {e}")))?;

        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() + n > MAX_BODY_SIZE + 4096 {
                    return Err(HttpError::Malformed("response too large".to_string()));
                }
                buf.extend_from_slice(&chunk[..n]);
                if is_complete(&buf) {
                    break;
                }
            },
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                return Err(HttpError::Timeout);
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(HttpError::Network(format!("read response: {e}"))),
        }
    }
    Ok(buf)
}

/// Whether `data` already holds a full response per its framing headers.
fn is_complete(data: &[u8]) -> bool {
    let Some(header_end) = find_subsequence(data, b"\r\n\r\n") else {
        return false;
    };
    let Ok(head) = std::str::from_utf8(&data[..header_end]) else {
        return false;
    };
    let body = &data[header_end + 4..];
    let headers = parse_headers(head.split("\r\n").skip(1));
    if find_header(&headers, "transfer-encoding").is_some_and(|v| v.contains("chunked")) {
        return body.ends_with(b"0\r\n\r\n");
    }
    match find_header(&headers, "content-length").and_then(|v| v.parse::<usize>().ok()) {
        Some(len) => body.len() >= len,
        None => false,
    }
}

/// Parse raw bytes into status code, headers, and body.
pub fn parse_response(data: &[u8]) -> Result<HttpResponse, HttpError> {
    let header_end = find_subsequence(data, b"\r\n\r\n").ok_or_else(|| {
        HttpError::Malformed("no header terminator".to_string())
    })?;

    let header_str = std::str::from_utf8(&data[..header_end])
        .map_err(|_| HttpError::Malformed("non-UTF-8 headers".to_string()))?;
    let mut lines = header_str.split("\r\n");

    let status_line = lines
        .next()
        .ok_or_else(|| HttpError::Malformed("empty response".to_string()))?;
    let status_code = parse_status_line(status_line)?;
    let headers = parse_headers(lines);

    let raw_body = &data[header_end + 4..];
    let body = if find_header(&headers, "transfer-encoding").is_some_and(|v| v.contains("chunked"))
    {
        decode_chunked(raw_body)?
    } else if let Some(cl) = find_header(&headers, "content-length") {
        let len: usize = cl
            .parse()
            .map_err(|_| HttpError::Malformed("bad Content-Length".to_string()))?;
        if len > MAX_BODY_SIZE {
            return Err(HttpError::Malformed("response body exceeds 8 MB limit".to_string()));
        }
        raw_body[..raw_body.len().min(len)].to_vec()
    } else {
        raw_body.to_vec()
    };

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }
    headers
}

/// Parse the status code from `HTTP/1.x NNN reason`.
fn parse_status_line(line: &str) -> Result<u16, HttpError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(HttpError::Malformed(format!("bad status line: {line}")));
    }
    parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| HttpError::Malformed(format!("bad status code in: {line}")))
}

/// Case-insensitive header lookup.
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    let name_lower = name.to_lowercase();
    headers
        .iter()
        .find(|(k, _)| k == &name_lower)
        .map(|(_, v)| v.as_str())
}

/// Decode a chunked transfer-encoded body.
fn decode_chunked(data: &[u8]) -> Result<Vec<u8>, HttpError> {
    let mut result = Vec::new();
    let mut pos = 0;

    while let Some(i) = find_subsequence(&data[pos..], b"\r\n") {
        let line_end = pos + i;
        let size_str = std::str::from_utf8(&data[pos..line_end])
            .map_err(|_| HttpError::Malformed("bad chunk size".to_string()))?;
        // Chunk extensions follow `;`.
        let size_str = size_str.split(';').next().unwrap_or("").trim();
        let chunk_size = usize::from_str_radix(size_str, 16)
            .map_err(|_| HttpError::Malformed("bad chunk size".to_string()))?;
        if chunk_size == 0 {
            break;
        }

        if chunk_size > MAX_BODY_SIZE.saturating_sub(result.len()) {
            return Err(HttpError::Malformed("chunked body exceeds 8 MB limit".to_string()));
        }

        let chunk_start = line_end + 2;
        let available = data.len() - chunk_start;
        if chunk_size > available {
            // Truncated final chunk: keep what arrived.
            result.extend_from_slice(&data[chunk_start..]);
            break;
        }
        let chunk_end = chunk_start + chunk_size;
        result.extend_from_slice(&data[chunk_start..chunk_end]);
        pos = chunk_end + 2;
        if pos >= data.len() {
            break;
        }
    }

    Ok(result)
}

/// Find the position of a byte subsequence in a slice.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
