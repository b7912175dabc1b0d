//! HTTP/1.1 messages and their wire codec.
//!
//! The response reader is an explicit framing state machine (status line,
//! headers, then body by `Content-Length` / chunked / connection close) that
//! keeps leftover bytes between calls, which is what makes pipelined
//! demultiplexing possible on one stream.

use std::io::{self, Read};

use crate::enums::Method;

/// Response headers larger than this abort the exchange.
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Maximum number of response headers to parse.
const MAX_HEADERS: usize = 100;

const READ_CHUNK: usize = 8 * 1024;

/// One logical request submitted to the pipeline. Immutable after
/// submission except for the header and target rewrites the engine performs
/// for auth and redirects.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Request {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Request::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        let mut req = Request::new(Method::POST, path);
        req.body = Some(body.into());
        req
    }

    /// Append a header (builder style).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace a header wherever it appears, or append it.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// One response, paired with its request in submission order.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated header, in order.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Whether the server asked to drop the connection after this response.
    pub fn wants_close(&self) -> bool {
        self.header("connection")
            .map(|v| v.to_ascii_lowercase().contains("close"))
            .unwrap_or(false)
    }
}

/// Serialize a request. `target` is the request-target as it goes on the
/// wire (origin-form normally, absolute-form through a cleartext proxy).
pub(crate) fn encode_request(
    method: &Method,
    target: &str,
    host_header: &str,
    headers: &[(String, String)],
    body: Option<&[u8]>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\nHost: ");
    out.extend_from_slice(host_header.as_bytes());
    out.extend_from_slice(b"\r\n");

    let mut has_connection = false;
    let mut has_content_length = false;
    let mut has_transfer_encoding = false;
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        if name.eq_ignore_ascii_case("connection") {
            has_connection = true;
        }
        if name.eq_ignore_ascii_case("content-length") {
            has_content_length = true;
        }
        if name.eq_ignore_ascii_case("transfer-encoding") {
            has_transfer_encoding = true;
        }
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    if !has_connection {
        out.extend_from_slice(b"Connection: keep-alive\r\n");
    }

    if let Some(body) = body {
        if !has_content_length && !has_transfer_encoding {
            out.extend_from_slice(b"Content-Length: ");
            out.extend_from_slice(body.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b"\r\n");

    if let Some(body) = body {
        out.extend_from_slice(body);
    }

    out
}

/// How to frame the body of the response being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyMode {
    /// Frame by Content-Length / chunked / connection close.
    Normal,
    /// The request was HEAD; the response never carries a body.
    None,
    /// The request was CONNECT: a 2xx tunnel response has no body and no
    /// framing, anything else is framed normally.
    Connect,
}

/// Failure modes of one response read.
#[derive(Debug)]
pub(crate) enum WireError {
    /// EOF before any byte of this response arrived; safe to retry on a
    /// fresh connection for idempotent requests.
    CleanEof,
    /// The peer violated HTTP framing; the connection is unusable.
    Malformed(String),
    Io(io::Error),
}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        WireError::Io(e)
    }
}

struct Head {
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
    len: usize,
}

/// Reads framed responses off a stream, buffering across calls so bytes of
/// a pipelined successor are never lost.
#[derive(Debug, Default)]
pub(crate) struct ResponseReader {
    buf: Vec<u8>,
}

impl ResponseReader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }

    /// Read exactly one response off the stream.
    pub(crate) fn read_response<R: Read>(
        &mut self,
        stream: &mut R,
        mode: BodyMode,
    ) -> Result<(Response, bool), WireError> {
        loop {
            let head = self.read_head(stream)?;

            // informational responses carry no body; keep going
            if (100..200).contains(&head.status) {
                self.buf.drain(..head.len);
                continue;
            }

            let mut close = head
                .headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case("connection"))
                .map(|(_, v)| v.to_ascii_lowercase().contains("close"))
                .unwrap_or(false);

            let no_body = match mode {
                BodyMode::None => true,
                BodyMode::Connect => (200..300).contains(&head.status),
                BodyMode::Normal => false,
            } || matches!(head.status, 204 | 304);

            let (body, consumed) = if no_body {
                (Vec::new(), head.len)
            } else {
                let chunked = header_of(&head.headers, "transfer-encoding")
                    .map(|v| {
                        v.split(',')
                            .next_back()
                            .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
                            .unwrap_or(false)
                    })
                    .unwrap_or(false);

                if chunked {
                    self.read_chunked(stream, head.len)?
                } else if let Some(cl) = header_of(&head.headers, "content-length") {
                    let len: usize = cl.trim().parse().map_err(|_| {
                        WireError::Malformed(format!("bad content-length {cl:?}"))
                    })?;
                    let end = head.len.checked_add(len).ok_or_else(|| {
                        WireError::Malformed(format!("bad content-length {cl:?}"))
                    })?;
                    self.fill_to(stream, end)?;
                    (self.buf[head.len..end].to_vec(), end)
                } else {
                    // delimited by connection close
                    close = true;
                    let mut body = self.buf[head.len..].to_vec();
                    let mut chunk = [0u8; READ_CHUNK];
                    loop {
                        let n = stream.read(&mut chunk)?;
                        if n == 0 {
                            break;
                        }
                        body.extend_from_slice(&chunk[..n]);
                    }
                    let consumed = self.buf.len();
                    (body, consumed)
                }
            };

            self.buf.drain(..consumed);

            let resp = Response {
                status: head.status,
                reason: head.reason,
                headers: head.headers,
                body,
            };
            return Ok((resp, close));
        }
    }

    fn read_head<R: Read>(&mut self, stream: &mut R) -> Result<Head, WireError> {
        loop {
            let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut parsed = httparse::Response::new(&mut header_buf);
            match parsed.parse(&self.buf) {
                Ok(httparse::Status::Complete(len)) => {
                    let status = parsed
                        .code
                        .ok_or_else(|| WireError::Malformed("missing status code".into()))?;
                    let reason = parsed.reason.unwrap_or("").to_string();
                    let headers = parsed
                        .headers
                        .iter()
                        .filter(|h| !h.name.is_empty())
                        .map(|h| {
                            (
                                h.name.to_string(),
                                String::from_utf8_lossy(h.value).into_owned(),
                            )
                        })
                        .collect();
                    return Ok(Head {
                        status,
                        reason,
                        headers,
                        len,
                    });
                }
                Ok(httparse::Status::Partial) => {}
                Err(e) => return Err(WireError::Malformed(e.to_string())),
            }

            if self.buf.len() > MAX_HEAD_SIZE {
                return Err(WireError::Malformed("response head too large".into()));
            }
            self.fill_some(stream)?;
        }
    }

    /// Append one read's worth of bytes; EOF is clean only when nothing of
    /// the current response has arrived yet.
    fn fill_some<R: Read>(&mut self, stream: &mut R) -> Result<(), WireError> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(if self.buf.is_empty() {
                WireError::CleanEof
            } else {
                WireError::Malformed("connection closed mid-response".into())
            });
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    fn fill_to<R: Read>(&mut self, stream: &mut R, target: usize) -> Result<(), WireError> {
        while self.buf.len() < target {
            let mut chunk = [0u8; READ_CHUNK];
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Err(WireError::Malformed("connection closed mid-body".into()));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Position of the next CRLF at or after `from`, reading more as needed.
    fn find_crlf<R: Read>(&mut self, stream: &mut R, from: usize) -> Result<usize, WireError> {
        let mut scan = from;
        loop {
            while scan + 1 < self.buf.len() {
                if self.buf[scan] == b'\r' && self.buf[scan + 1] == b'\n' {
                    return Ok(scan);
                }
                scan += 1;
            }
            self.fill_to(stream, self.buf.len() + 1)?;
        }
    }

    /// Decode a chunked body starting at `pos`; returns (body, consumed).
    fn read_chunked<R: Read>(
        &mut self,
        stream: &mut R,
        mut pos: usize,
    ) -> Result<(Vec<u8>, usize), WireError> {
        let mut body = Vec::new();
        loop {
            let line_end = self.find_crlf(stream, pos)?;
            let line = &self.buf[pos..line_end];
            let size_text = std::str::from_utf8(line)
                .map_err(|_| WireError::Malformed("bad chunk size line".into()))?;
            let size_text = size_text.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_text, 16)
                .map_err(|_| WireError::Malformed(format!("bad chunk size {size_text:?}")))?;
            pos = line_end + 2;

            if size == 0 {
                // trailer section: lines until an empty one
                loop {
                    let end = self.find_crlf(stream, pos)?;
                    let empty = end == pos;
                    pos = end + 2;
                    if empty {
                        break;
                    }
                }
                return Ok((body, pos));
            }

            // the size is attacker-controlled; a wrap here would panic
            let end = pos
                .checked_add(size)
                .and_then(|n| n.checked_add(2))
                .ok_or_else(|| {
                    WireError::Malformed(format!("chunk size {size_text:?} too large"))
                })?;
            self.fill_to(stream, end)?;
            body.extend_from_slice(&self.buf[pos..pos + size]);
            if &self.buf[pos + size..end] != b"\r\n" {
                return Err(WireError::Malformed("missing chunk terminator".into()));
            }
            pos = end;
        }
    }
}

fn header_of<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
