//! Upstream side of a cycle.
//!
//! # Responsibilities
//! - Work out which host and port a request is for
//! - Rewrite the request for the origin server
//! - Connect, send the request and read the response head
//! - Buffer or relay the response body
//!
//! # Design Decisions
//! - One attempt per cycle, no retries
//! - Every upstream request carries `Connection: close`, so a response without
//!   `Content-Length` ends when the server closes
//! - `Accept-Encoding` is dropped so classifiable bodies arrive identity-coded

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use crate::config::{LimitsConfig, TimeoutConfig};
use crate::error::ProxyError;
use crate::http::codec::{buffer_body, read_response_head, relay_response, RawMessage, ResponseHead};
use crate::http::message::{HttpMessage, StartLine};
use crate::resilience::with_deadline;

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_TUNNEL_PORT: u16 = 443;

/// Headers that only concern the client-to-proxy hop.
const HOP_BY_HOP: &[&str] = &[
    "proxy-connection",
    "proxy-authorization",
    "keep-alive",
    "connection",
    "te",
    "trailer",
    "upgrade",
];

/// Where a request is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Lower-cased host name or IP literal, without brackets.
    pub host: String,
    pub port: u16,
    /// Path and query to put on the upstream request line.
    pub origin_form: String,
}

impl Target {
    /// Resolve the target of a client request.
    ///
    /// Accepts absolute-form (`http://host/path`), origin-form with a `Host`
    /// header, and the authority-form of `CONNECT`.
    pub fn from_request(request: &HttpMessage) -> Result<Self, ProxyError> {
        let (method, target) = match &request.start {
            StartLine::Request { method, target, .. } => (method.as_str(), target.as_str()),
            StartLine::Response { .. } => return Err(ProxyError::malformed("expected a request")),
        };

        if method.eq_ignore_ascii_case("CONNECT") {
            let (host, port) = parse_authority(target, DEFAULT_TUNNEL_PORT)?;
            return Ok(Self {
                host,
                port,
                origin_form: String::new(),
            });
        }

        if target.starts_with('/') {
            let authority = request
                .headers
                .get("host")
                .ok_or_else(|| ProxyError::malformed("origin-form request without a Host header"))?;
            let (host, port) = parse_authority(authority.trim(), DEFAULT_HTTP_PORT)?;
            return Ok(Self {
                host,
                port,
                origin_form: target.to_string(),
            });
        }

        let url = Url::parse(target).map_err(|e| ProxyError::malformed(format!("bad request target {:?}: {}", target, e)))?;
        if url.scheme() != "http" {
            return Err(ProxyError::malformed(format!("unsupported scheme {:?}", url.scheme())));
        }
        let host = url
            .host_str()
            .map(strip_brackets)
            .ok_or_else(|| ProxyError::malformed(format!("request target {:?} has no host", target)))?;
        let port = url.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);

        Ok(Self {
            host,
            port,
            origin_form: origin_form_of(target),
        })
    }

    /// `host[:port]`, omitting the default HTTP port.
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == DEFAULT_HTTP_PORT {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

fn parse_authority(authority: &str, default_port: u16) -> Result<(String, u16), ProxyError> {
    if authority.is_empty() {
        return Err(ProxyError::malformed("empty authority"));
    }
    let url = Url::parse(&format!("http://{}", authority))
        .map_err(|e| ProxyError::malformed(format!("bad authority {:?}: {}", authority, e)))?;
    // Url hides :80 for http, so look at what was written.
    let explicit_port = url.port().or_else(|| {
        authority
            .rsplit_once(':')
            .filter(|(_, port)| !port.contains(']'))
            .and_then(|(_, port)| port.parse().ok())
    });
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .map(strip_brackets)
        .ok_or_else(|| ProxyError::malformed(format!("authority {:?} has no host", authority)))?;
    Ok((host, explicit_port.unwrap_or(default_port)))
}

fn strip_brackets(host: &str) -> String {
    host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase()
}

/// Everything after the authority of an absolute URI, or `/`.
fn origin_form_of(absolute: &str) -> String {
    let after_scheme = absolute.find("://").map(|i| &absolute[i + 3..]).unwrap_or(absolute);
    match after_scheme.find(|c: char| c == '/' || c == '?') {
        Some(i) if after_scheme[i..].starts_with('?') => format!("/{}", &after_scheme[i..]),
        Some(i) => after_scheme[i..].to_string(),
        None => "/".to_string(),
    }
}

/// Copy of `request` as it should be sent to the origin server.
pub fn rewrite_request(request: &HttpMessage, target: &Target) -> HttpMessage {
    let mut upstream = request.clone();

    if let StartLine::Request { target: line_target, .. } = &mut upstream.start {
        *line_target = target.origin_form.clone();
    }

    let listed: Vec<String> = upstream
        .headers
        .get_all("connection")
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty() && name != "close")
        .collect();
    for name in listed.iter().map(String::as_str).chain(HOP_BY_HOP.iter().copied()) {
        upstream.headers.remove(name);
    }
    upstream.headers.remove("accept-encoding");

    // The origin sees the host that passed the blacklist check, whatever
    // the client put in its own Host header.
    upstream.headers.set("Host", target.authority());
    upstream.headers.append("Connection", "close");
    upstream
}

/// Open a connection to `target` within the connect deadline.
pub async fn connect(target: &Target, timeouts: &TimeoutConfig) -> Result<TcpStream, ProxyError> {
    with_deadline("upstream connect", timeouts.upstream_connect(), async {
        TcpStream::connect((target.host.as_str(), target.port))
            .await
            .map_err(|source| ProxyError::UpstreamUnavailable {
                target: target.authority(),
                source,
            })
    })
    .await
}

/// An upstream connection whose response head has been read.
///
/// The body is still on the connection: either [`Exchange::buffer`] it for
/// inspection or [`Exchange::relay`] it to the client.
pub struct Exchange {
    stream: TcpStream,
    authority: String,
    pub head: ResponseHead,
}

/// Send `request` to `target` and read the response head.
///
/// Connecting and the request/head exchange have separate deadlines.
pub async fn send(
    target: &Target,
    request: &HttpMessage,
    timeouts: &TimeoutConfig,
    limits: &LimitsConfig,
) -> Result<Exchange, ProxyError> {
    let mut stream = connect(target, timeouts).await?;
    let authority = target.authority();
    tracing::debug!(upstream = %authority, "Upstream connected");

    let on_io = unavailable(&authority);
    let method = request.method().unwrap_or("GET");
    let wire = request.serialize();

    let head = with_deadline("upstream exchange", timeouts.upstream_read(), async {
        stream.write_all(&wire).await.map_err(on_io)?;
        stream.flush().await.map_err(on_io)?;
        read_response_head(&mut stream, method, limits, on_io).await
    })
    .await?;

    Ok(Exchange {
        stream,
        authority,
        head,
    })
}

impl Exchange {
    /// Buffer the body up to `limits.max_body_bytes`.
    ///
    /// Returns `false` if the body is larger; the exchange can still be relayed.
    pub async fn buffer(&mut self, timeouts: &TimeoutConfig, limits: &LimitsConfig) -> Result<bool, ProxyError> {
        let on_io = unavailable(&self.authority);
        with_deadline(
            "upstream read",
            timeouts.upstream_read(),
            buffer_body(&mut self.stream, &mut self.head, limits, on_io),
        )
        .await
    }

    /// The response as buffered so far, with its exact wire bytes.
    pub fn into_raw(self) -> RawMessage {
        self.head.into_raw()
    }

    /// Forward the response to `client` as it arrives.
    ///
    /// `upstream_read` bounds each read rather than the whole body.
    pub async fn relay<W>(mut self, client: &mut W, timeouts: &TimeoutConfig) -> Result<u64, ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        let on_io = unavailable(&self.authority);
        relay_response(
            &mut self.stream,
            client,
            self.head,
            timeouts.upstream_read(),
            timeouts.client_write(),
            on_io,
        )
        .await
    }
}

fn unavailable(authority: &str) -> impl Fn(std::io::Error) -> ProxyError + Copy + '_ {
    move |source| ProxyError::UpstreamUnavailable {
        target: authority.to_string(),
        source,
    }
}
