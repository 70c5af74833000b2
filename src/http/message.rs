//! Wire-level HTTP/1.x message.
//!
//! A message is a start line, an ordered header multimap and a buffered
//! body. Serialization writes exactly what the message holds: no header is
//! added, reordered or normalized on the way out.

use bytes::Bytes;

use crate::error::ProxyError;
use crate::http::headers::Headers;

/// Upper bound on header lines in a single message head.
pub const MAX_HEADERS: usize = 128;

const CRLF: &[u8] = b"\r\n";

/// Which side of an exchange a head belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

/// First line of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: String,
        target: String,
        version: String,
    },
    Response {
        version: String,
        status: u16,
        reason: String,
    },
}

/// Start line and headers, without a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    pub start: StartLine,
    pub headers: Headers,
}

/// A request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMessage {
    pub start: StartLine,
    pub headers: Headers,
    pub body: Bytes,
}

impl HttpMessage {
    pub fn request(method: impl Into<String>, target: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            start: StartLine::Request {
                method: method.into(),
                target: target.into(),
                version: version.into(),
            },
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn response(version: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        Self {
            start: StartLine::Response {
                version: version.into(),
                status,
                reason: reason.into(),
            },
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn from_head(head: Head, body: Bytes) -> Self {
        Self {
            start: head.start,
            headers: head.headers,
            body,
        }
    }

    /// Parse a complete message held in memory.
    ///
    /// The kind is taken from the start line: anything beginning with `HTTP/`
    /// is a response. Bytes after the head form the body; a declared
    /// `Content-Length` must match their count exactly.
    pub fn parse(raw: &[u8]) -> Result<Self, ProxyError> {
        let kind = if raw.starts_with(b"HTTP/") {
            MessageKind::Response
        } else {
            MessageKind::Request
        };

        let (head, head_len) = parse_head(kind, raw)?
            .ok_or_else(|| ProxyError::malformed("incomplete message head"))?;
        let body = &raw[head_len..];

        if let Some(declared) = content_length(&head.headers)? {
            if declared != body.len() {
                return Err(ProxyError::malformed(format!(
                    "Content-Length is {} but {} body bytes are present",
                    declared,
                    body.len()
                )));
            }
        }

        Ok(Self::from_head(head, Bytes::copy_from_slice(body)))
    }

    /// Exact wire bytes of this message.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());
        match &self.start {
            StartLine::Request { method, target, version } => {
                out.extend_from_slice(format!("{} {} {}", method, target, version).as_bytes());
            }
            StartLine::Response { version, status, reason } => {
                out.extend_from_slice(format!("{} {} {}", version, status, reason).as_bytes());
            }
        }
        out.extend_from_slice(CRLF);
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(CRLF);
        }
        out.extend_from_slice(CRLF);
        out.extend_from_slice(&self.body);
        out
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start, StartLine::Request { .. })
    }

    pub fn method(&self) -> Option<&str> {
        match &self.start {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.start {
            StartLine::Request { target, .. } => Some(target),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.start {
            StartLine::Response { status, .. } => Some(*status),
            StartLine::Request { .. } => None,
        }
    }

    pub fn version(&self) -> &str {
        match &self.start {
            StartLine::Request { version, .. } | StartLine::Response { version, .. } => version,
        }
    }

    /// Declared body length, if any.
    pub fn content_length(&self) -> Result<Option<usize>, ProxyError> {
        content_length(&self.headers)
    }

    /// Lower-cased media type of `Content-Type` without parameters.
    pub fn mime_type(&self) -> Option<String> {
        let value = self.headers.get("content-type")?;
        let essence = value.split(';').next().unwrap_or("").trim();
        if essence.is_empty() {
            None
        } else {
            Some(essence.to_ascii_lowercase())
        }
    }

    /// Declared body text encoding: the `charset` parameter, or UTF-8.
    pub fn body_encoding(&self) -> String {
        self.headers
            .get("content-type")
            .and_then(|value| {
                value.split(';').skip(1).find_map(|param| {
                    let (key, val) = param.split_once('=')?;
                    if key.trim().eq_ignore_ascii_case("charset") {
                        Some(val.trim().trim_matches('"').to_string())
                    } else {
                        None
                    }
                })
            })
            .filter(|charset| !charset.is_empty())
            .unwrap_or_else(|| "utf-8".to_string())
    }

    /// True if the last transfer coding is `chunked`.
    pub fn is_chunked(&self) -> bool {
        self.headers
            .get_all("transfer-encoding")
            .flat_map(|v| v.split(','))
            .last()
            .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
    }

    /// Body with the chunked framing removed, if there is any.
    pub fn payload(&self) -> Result<Bytes, ProxyError> {
        if self.is_chunked() {
            decode_chunked(&self.body)
        } else {
            Ok(self.body.clone())
        }
    }
}

/// Join the data of a chunked body. Chunk extensions and trailers are dropped.
pub fn decode_chunked(body: &[u8]) -> Result<Bytes, ProxyError> {
    let mut decoded = Vec::with_capacity(body.len());
    let mut rest = body;
    loop {
        let line_end = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| ProxyError::malformed("unterminated chunk size line"))?;
        let line = std::str::from_utf8(&rest[..line_end])
            .map_err(|_| ProxyError::malformed("chunk size line is not ASCII"))?;
        let size_field = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_field, 16)
            .map_err(|_| ProxyError::malformed(format!("invalid chunk size {:?}", size_field)))?;
        rest = &rest[line_end + 2..];

        if size == 0 {
            return Ok(Bytes::from(decoded));
        }
        if rest.len() < 2 || rest.len() - 2 < size {
            return Err(ProxyError::malformed("chunk runs past the end of the body"));
        }
        if &rest[size..size + 2] != b"\r\n" {
            return Err(ProxyError::malformed("chunk data not followed by CRLF"));
        }
        decoded.extend_from_slice(&rest[..size]);
        rest = &rest[size + 2..];
    }
}

/// Parse a message head from the start of `buf`.
///
/// Returns `Ok(None)` while the head is still incomplete, otherwise the head
/// and the number of bytes it occupies.
pub fn parse_head(kind: MessageKind, buf: &[u8]) -> Result<Option<(Head, usize)>, ProxyError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];

    match kind {
        MessageKind::Request => {
            let mut req = httparse::Request::new(&mut raw_headers);
            let len = match req.parse(buf) {
                Ok(httparse::Status::Complete(len)) => len,
                Ok(httparse::Status::Partial) => return Ok(None),
                Err(e) => return Err(ProxyError::malformed(format!("request head: {}", e))),
            };
            let start = StartLine::Request {
                method: req.method.unwrap_or_default().to_string(),
                target: req.path.unwrap_or_default().to_string(),
                version: version_string(req.version),
            };
            Ok(Some((Head { start, headers: collect_headers(req.headers) }, len)))
        }
        MessageKind::Response => {
            let mut resp = httparse::Response::new(&mut raw_headers);
            let len = match resp.parse(buf) {
                Ok(httparse::Status::Complete(len)) => len,
                Ok(httparse::Status::Partial) => return Ok(None),
                Err(e) => return Err(ProxyError::malformed(format!("response head: {}", e))),
            };
            let start = StartLine::Response {
                version: version_string(resp.version),
                status: resp.code.unwrap_or_default(),
                reason: resp.reason.unwrap_or_default().to_string(),
            };
            Ok(Some((Head { start, headers: collect_headers(resp.headers) }, len)))
        }
    }
}

/// Declared `Content-Length`. Repeated headers must agree.
pub fn content_length(headers: &Headers) -> Result<Option<usize>, ProxyError> {
    let mut declared = None;
    for value in headers.get_all("content-length") {
        let len: usize = value
            .trim()
            .parse()
            .map_err(|_| ProxyError::malformed(format!("invalid Content-Length {:?}", value)))?;
        match declared {
            Some(previous) if previous != len => {
                return Err(ProxyError::malformed("conflicting Content-Length headers"));
            }
            _ => declared = Some(len),
        }
    }
    Ok(declared)
}

fn version_string(minor: Option<u8>) -> String {
    format!("HTTP/1.{}", minor.unwrap_or(1))
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Headers {
    let mut headers = Headers::new();
    for header in raw {
        headers.append(header.name, String::from_utf8_lossy(header.value).into_owned());
    }
    headers
}
