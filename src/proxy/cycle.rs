//! A single proxy cycle.
//!
//! Each accepted connection carries exactly one request:
//!
//! ```text
//! Accepted → RequestParsed → HostBlocked ─┐
//!                          → Forwarded ───┴→ ResponseReady → Written → Closed
//! ```
//!
//! Classifiable responses are buffered and checked before anything is sent;
//! all others are relayed as they arrive. Failures before a response exists
//! get a best-effort minimal error response.
//! Nothing here touches another connection's state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::Instrument;

use crate::error::ProxyError;
use crate::http::codec::{read_request, RawMessage};
use crate::http::message::HttpMessage;
use crate::http::response::{error_response, tunnel_established};
use crate::net::connection::{ConnectionId, ConnectionState};
use crate::observability::metrics;
use crate::policy::PolicyVerdict;
use crate::proxy::upstream::{self, Target};
use crate::proxy::{Outcome, ProxyContext};
use crate::resilience::with_deadline;

/// Run one cycle on `client` and close it.
///
/// Never returns an error: failures are logged, answered where possible and
/// counted.
pub async fn serve_connection<S>(ctx: Arc<ProxyContext>, mut client: S, peer: SocketAddr, id: ConnectionId)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let span = tracing::info_span!("cycle", connection_id = %id, peer = %peer);
    async move {
        let started = Instant::now();
        let mut state = ConnectionState::Accepted;

        let label = match run_cycle(&ctx, &mut client, &mut state).await {
            Ok(outcome) => outcome.label(),
            Err(e) => {
                log_failure(&e);
                if !matches!(state, ConnectionState::ResponseReady | ConnectionState::Written) {
                    if let Some(response) = failure_response(&e) {
                        let wire = response.serialize();
                        let _ = with_deadline("client write", ctx.timeouts.client_write(), async {
                            client.write_all(&wire).await.map_err(ProxyError::ClientIo)
                        })
                        .await;
                    }
                }
                e.kind()
            }
        };

        let _ = client.shutdown().await;
        advance(&mut state, ConnectionState::Closed);
        metrics::record_cycle(label, started);
    }
    .instrument(span)
    .await
}

/// Drive the state machine up to `Written`.
pub async fn run_cycle<S>(ctx: &ProxyContext, client: &mut S, state: &mut ConnectionState) -> Result<Outcome, ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let request = with_deadline("client read", ctx.timeouts.client_read(), read_request(client, &ctx.limits)).await?;
    advance(state, ConnectionState::RequestParsed);

    let target = Target::from_request(&request.message)?;
    let method = request.message.method().unwrap_or_default().to_string();
    tracing::debug!(method = %method, host = %target.host, port = target.port, "Request parsed");

    if ctx.gate.check_host(&target.host, target.port) == PolicyVerdict::BlockHost {
        advance(state, ConnectionState::HostBlocked);
        tracing::info!(host = %target.host, verdict = PolicyVerdict::BlockHost.label(), "Host is blacklisted");
        let response = ctx.responses.build_blocked_host_response();
        advance(state, ConnectionState::ResponseReady);
        write_to_client(ctx, client, &response.serialize()).await?;
        advance(state, ConnectionState::Written);
        return Ok(Outcome::HostBlocked);
    }

    advance(state, ConnectionState::Forwarded);

    if method.eq_ignore_ascii_case("CONNECT") {
        return tunnel(ctx, client, state, &target).await;
    }

    let upstream_request = upstream::rewrite_request(&request.message, &target);
    let mut exchange = upstream::send(&target, &upstream_request, &ctx.timeouts, &ctx.limits).await?;
    tracing::debug!(
        status = exchange.head.message.status().unwrap_or_default(),
        framing = ?exchange.head.framing,
        chunked = exchange.head.message.is_chunked(),
        "Upstream response head received"
    );

    if ctx.gate.is_classifiable(&exchange.head.message) {
        if exchange.buffer(&ctx.timeouts, &ctx.limits).await? {
            return deliver_inspected(ctx, client, state, &target, exchange.into_raw()).await;
        }
        tracing::warn!(
            host = %target.host,
            buffered = exchange.head.buffered_body_len(),
            limit = ctx.limits.max_body_bytes,
            "Body too large to classify, relaying unclassified"
        );
    }

    advance(state, ConnectionState::ResponseReady);
    let bytes = exchange.relay(client, &ctx.timeouts).await?;
    advance(state, ConnectionState::Written);
    tracing::debug!(bytes, "Upstream response relayed");
    Ok(Outcome::Forwarded)
}

/// Classify a buffered response and write it or its replacement.
async fn deliver_inspected<S>(
    ctx: &ProxyContext,
    client: &mut S,
    state: &mut ConnectionState,
    target: &Target,
    response: RawMessage,
) -> Result<Outcome, ProxyError>
where
    S: AsyncWrite + Unpin,
{
    let gate = ctx.gate.clone();
    let message = response.message.clone();
    let verdict = tokio::task::spawn_blocking(move || gate.check_content(&message))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Classification task failed, allowing response");
            PolicyVerdict::Allow
        });

    let (wire, outcome) = match verdict {
        PolicyVerdict::BlockContent { categories } => {
            tracing::info!(
                host = %target.host,
                verdict = "block_content",
                categories = ?categories,
                "Content blocked"
            );
            let report = ctx.responses.build_classification_report(&categories);
            (Bytes::from(report.serialize()), Outcome::ContentBlocked)
        }
        _ => (response.raw, Outcome::Forwarded),
    };
    advance(state, ConnectionState::ResponseReady);

    write_to_client(ctx, client, &wire).await?;
    advance(state, ConnectionState::Written);
    Ok(outcome)
}

async fn tunnel<S>(ctx: &ProxyContext, client: &mut S, state: &mut ConnectionState, target: &Target) -> Result<Outcome, ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut upstream = upstream::connect(target, &ctx.timeouts).await?;
    advance(state, ConnectionState::ResponseReady);
    write_to_client(ctx, client, &tunnel_established().serialize()).await?;
    advance(state, ConnectionState::Written);

    let relayed = with_deadline("tunnel", ctx.timeouts.tunnel(), async {
        tokio::io::copy_bidirectional(client, &mut upstream)
            .await
            .map_err(ProxyError::ClientIo)
    })
    .await;
    match relayed {
        Ok((sent, received)) => tracing::debug!(sent, received, "Tunnel closed"),
        Err(e) => tracing::debug!(reason = %e, "Tunnel ended"),
    }
    Ok(Outcome::Tunneled)
}

async fn write_to_client<S>(ctx: &ProxyContext, client: &mut S, wire: &[u8]) -> Result<(), ProxyError>
where
    S: AsyncWrite + Unpin,
{
    with_deadline("client write", ctx.timeouts.client_write(), async {
        client.write_all(wire).await.map_err(ProxyError::ClientIo)?;
        client.flush().await.map_err(ProxyError::ClientIo)
    })
    .await
}

fn advance(state: &mut ConnectionState, next: ConnectionState) {
    debug_assert!(state.can_advance_to(next), "illegal transition {:?} -> {:?}", state, next);
    tracing::trace!(from = ?state, to = ?next, "State transition");
    *state = next;
}

fn log_failure(error: &ProxyError) {
    match error {
        ProxyError::MalformedMessage(_) => tracing::warn!(error = %error, "Malformed message"),
        ProxyError::UpstreamUnavailable { .. } | ProxyError::BadUpstreamResponse(_) => {
            tracing::error!(error = %error, "Upstream failed")
        }
        ProxyError::Timeout { .. } => tracing::warn!(error = %error, "Cycle timed out"),
        ProxyError::ClientIo(_) => tracing::debug!(error = %error, "Client went away"),
        _ => tracing::error!(error = %error, "Cycle failed"),
    }
}

/// Minimal response for a cycle that failed before producing one.
fn failure_response(error: &ProxyError) -> Option<HttpMessage> {
    match error {
        ProxyError::MalformedMessage(_) => Some(error_response(400, "Bad Request")),
        ProxyError::UpstreamUnavailable { .. } | ProxyError::BadUpstreamResponse(_) => {
            Some(error_response(502, "Bad Gateway"))
        }
        ProxyError::Timeout { stage } if stage.starts_with("upstream") => {
            Some(error_response(504, "Gateway Timeout"))
        }
        _ => None,
    }
}
