//! Reading messages off a stream.
//!
//! Framing rules:
//! - requests carry a `Content-Length` body or none at all
//! - responses to `HEAD`, and 1xx/204/304 responses, have no body
//! - other responses use `Content-Length` if present, otherwise run until
//!   the peer closes the connection
//!
//! Requests are buffered whole. Responses are read head first; the caller
//! then either buffers the body up to the size limit or relays it as it
//! arrives.
//!
//! Transfer codings are not decoded on the wire. A chunked response is relayed
//! as the bytes the server sent, which is possible because the upstream
//! request is always sent with `Connection: close`.
//!
//! Framing errors in a response surface as [`ProxyError::BadUpstreamResponse`].

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::LimitsConfig;
use crate::error::ProxyError;
use crate::http::message::{content_length, parse_head, Head, HttpMessage, MessageKind, StartLine};
use crate::resilience::with_deadline;

const RELAY_CHUNK: usize = 16 * 1024;

/// A parsed message together with the exact bytes it was read from.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub message: HttpMessage,
    pub raw: Bytes,
}

/// How the body of a response is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Length(usize),
    UntilClose,
}

/// A response whose head has been read and whose body may still be on the wire.
#[derive(Debug)]
pub struct ResponseHead {
    /// Start line and headers. The body is empty.
    pub message: HttpMessage,
    pub framing: BodyFraming,
    /// Raw head followed by any body bytes read so far.
    buf: BytesMut,
    head_len: usize,
}

impl ResponseHead {
    /// Body bytes already read off the connection.
    pub fn buffered_body_len(&self) -> usize {
        self.buf.len() - self.head_len
    }

    /// The response with whatever body has been buffered.
    ///
    /// Bytes past a declared `Content-Length` are dropped.
    pub fn into_raw(self) -> RawMessage {
        let end = match self.framing {
            BodyFraming::Empty => self.head_len,
            BodyFraming::Length(len) => self.head_len + len,
            BodyFraming::UntilClose => self.buf.len(),
        };
        let mut buf = self.buf;
        buf.truncate(end);
        let raw = buf.freeze();
        let mut message = self.message;
        message.body = raw.slice(self.head_len..);
        RawMessage { message, raw }
    }
}

/// Read one request from a client.
pub async fn read_request<R>(reader: &mut R, limits: &LimitsConfig) -> Result<RawMessage, ProxyError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);
    let (head, head_len) = read_head(reader, MessageKind::Request, limits, &mut buf, ProxyError::ClientIo).await?;

    if head.headers.contains("transfer-encoding") {
        return Err(ProxyError::malformed("request bodies with Transfer-Encoding are not supported"));
    }
    let body_len = content_length(&head.headers)?.unwrap_or(0);
    if body_len > limits.max_body_bytes {
        return Err(ProxyError::malformed(format!("body exceeds {} bytes", limits.max_body_bytes)));
    }
    let total = head_len + body_len;
    read_exact_total(reader, &mut buf, total, ProxyError::ClientIo).await?;

    buf.truncate(total);
    let raw = buf.freeze();
    Ok(RawMessage {
        message: HttpMessage::from_head(head, raw.slice(head_len..)),
        raw,
    })
}

/// Read the head of an upstream response.
///
/// `request_method` decides whether a body can follow at all. I/O errors are
/// mapped through `on_io` so the caller can name the upstream.
pub async fn read_response_head<R, F>(
    reader: &mut R,
    request_method: &str,
    limits: &LimitsConfig,
    on_io: F,
) -> Result<ResponseHead, ProxyError>
where
    R: AsyncRead + Unpin,
    F: Fn(std::io::Error) -> ProxyError,
{
    let mut buf = BytesMut::with_capacity(RELAY_CHUNK);
    let (head, head_len) = read_head(reader, MessageKind::Response, limits, &mut buf, on_io)
        .await
        .map_err(upstream_framing)?;

    let status = match head.start {
        StartLine::Response { status, .. } => status,
        StartLine::Request { .. } => 0,
    };
    let bodiless = request_method.eq_ignore_ascii_case("HEAD")
        || (100..200).contains(&status)
        || status == 204
        || status == 304;

    let framing = if bodiless {
        BodyFraming::Empty
    } else {
        match content_length(&head.headers).map_err(upstream_framing)? {
            Some(len) => BodyFraming::Length(len),
            None => BodyFraming::UntilClose,
        }
    };

    Ok(ResponseHead {
        message: HttpMessage::from_head(head, Bytes::new()),
        framing,
        buf,
        head_len,
    })
}

/// Buffer the rest of the body into `head`.
///
/// Returns `false` once the body is known to exceed `limits.max_body_bytes`.
/// A declared oversized body is not read at all; an unframed one stops just
/// past the limit. What was read stays in `head` and can still be relayed.
pub async fn buffer_body<R, F>(
    reader: &mut R,
    head: &mut ResponseHead,
    limits: &LimitsConfig,
    on_io: F,
) -> Result<bool, ProxyError>
where
    R: AsyncRead + Unpin,
    F: Fn(std::io::Error) -> ProxyError,
{
    match head.framing {
        BodyFraming::Empty => Ok(true),
        BodyFraming::Length(len) if len > limits.max_body_bytes => Ok(false),
        BodyFraming::Length(len) => {
            read_exact_total(reader, &mut head.buf, head.head_len + len, on_io)
                .await
                .map_err(upstream_framing)?;
            Ok(true)
        }
        BodyFraming::UntilClose => loop {
            if head.buffered_body_len() > limits.max_body_bytes {
                return Ok(false);
            }
            head.buf.reserve(RELAY_CHUNK);
            let n = reader.read_buf(&mut head.buf).await.map_err(&on_io)?;
            if n == 0 {
                return Ok(true);
            }
        },
    }
}

/// Write `head` and the rest of its body from `reader` to `writer`.
///
/// Each upstream read waits at most `read_idle` and each client write at most
/// `write_limit`; there is no limit on the whole transfer. Returns the number
/// of bytes written.
pub async fn relay_response<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    head: ResponseHead,
    read_idle: Duration,
    write_limit: Duration,
    on_io: F,
) -> Result<u64, ProxyError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Fn(std::io::Error) -> ProxyError,
{
    let ResponseHead {
        framing,
        mut buf,
        head_len,
        ..
    } = head;

    let mut remaining = match framing {
        BodyFraming::Empty => Some(0),
        BodyFraming::Length(len) => Some(len),
        BodyFraming::UntilClose => None,
    };
    let prefetched = buf.len() - head_len;
    let first_body = remaining.map_or(prefetched, |left| left.min(prefetched));
    remaining = remaining.map(|left| left - first_body);

    let first = head_len + first_body;
    write_chunk(writer, &buf[..first], write_limit).await?;
    let mut written = first as u64;

    while remaining != Some(0) {
        buf.clear();
        buf.reserve(RELAY_CHUNK);
        let n = with_deadline("upstream read", read_idle, async {
            reader.read_buf(&mut buf).await.map_err(&on_io)
        })
        .await?;

        if n == 0 {
            return match remaining {
                Some(left) => Err(ProxyError::BadUpstreamResponse(format!(
                    "connection closed with {} body bytes missing",
                    left
                ))),
                None => Ok(written),
            };
        }

        let take = remaining.map_or(n, |left| left.min(n));
        remaining = remaining.map(|left| left - take);
        write_chunk(writer, &buf[..take], write_limit).await?;
        written += take as u64;
    }
    Ok(written)
}

async fn write_chunk<W>(writer: &mut W, bytes: &[u8], limit: Duration) -> Result<(), ProxyError>
where
    W: AsyncWrite + Unpin,
{
    with_deadline("client write", limit, async {
        writer.write_all(bytes).await.map_err(ProxyError::ClientIo)?;
        writer.flush().await.map_err(ProxyError::ClientIo)
    })
    .await
}

async fn read_head<R, F>(
    reader: &mut R,
    kind: MessageKind,
    limits: &LimitsConfig,
    buf: &mut BytesMut,
    on_io: F,
) -> Result<(Head, usize), ProxyError>
where
    R: AsyncRead + Unpin,
    F: Fn(std::io::Error) -> ProxyError,
{
    loop {
        if let Some(parsed) = parse_head(kind, &buf[..])? {
            return Ok(parsed);
        }
        if buf.len() >= limits.max_head_bytes {
            return Err(ProxyError::malformed(format!(
                "message head exceeds {} bytes",
                limits.max_head_bytes
            )));
        }
        let n = reader.read_buf(buf).await.map_err(&on_io)?;
        if n == 0 {
            return Err(ProxyError::malformed(if buf.is_empty() {
                "connection closed before any data was sent"
            } else {
                "connection closed inside the message head"
            }));
        }
    }
}

async fn read_exact_total<R, F>(reader: &mut R, buf: &mut BytesMut, total: usize, on_io: F) -> Result<(), ProxyError>
where
    R: AsyncRead + Unpin,
    F: Fn(std::io::Error) -> ProxyError,
{
    while buf.len() < total {
        buf.reserve(total - buf.len());
        let n = reader.read_buf(buf).await.map_err(&on_io)?;
        if n == 0 {
            return Err(ProxyError::malformed(format!(
                "connection closed after {} of {} bytes",
                buf.len(),
                total
            )));
        }
    }
    Ok(())
}

/// Framing problems in a response are the upstream's fault, not the client's.
fn upstream_framing(error: ProxyError) -> ProxyError {
    match error {
        ProxyError::MalformedMessage(reason) => ProxyError::BadUpstreamResponse(reason),
        other => other,
    }
}
