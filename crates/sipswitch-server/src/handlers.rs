//! Method handlers dispatched after the validation chain passes (spec §2
//! data flow: "Validation chain → Method handler (Registrar / Proxy /
//! Session-Timer) → response via Transaction layer"). `REGISTER` goes to
//! the registrar directly; `OPTIONS` is answered locally; everything else
//! goes through the proxy engine, with `INVITE`/`BYE` additionally
//! driving the session-timer manager.

use std::sync::Arc;

use tracing::{debug, warn};

use sipswitch_core::{HeaderName, Headers, Method, Request, Response, StatusCode};
use sipswitch_proxy::ProxyError;
use sipswitch_session::Refresher;
use sipswitch_transaction::{ServerTransaction, TransactionKey};

use crate::context::ServerContext;

/// Echoes the dialog-identifying headers from `request` onto a
/// locally-generated `response`, matching the registrar's own
/// `copy_dialog_headers` helper: every `Via` (not just the top one, so
/// intermediate proxies on the request path can still route the
/// response back), `From`, `To`, `Call-ID`, and `CSeq`.
pub(crate) fn copy_dialog_headers(request: &Request, response: &mut Response) {
    for via in request.headers.get_all(&HeaderName::Via) {
        response.headers.push(HeaderName::Via, via.to_string());
    }
    if let Some(from) = request.headers.get(&HeaderName::From) {
        response.headers.push(HeaderName::From, from.to_string());
    }
    if let Some(to) = request.headers.get(&HeaderName::To) {
        response.headers.push(HeaderName::To, to.to_string());
    }
    if let Some(call_id) = request.call_id() {
        response.headers.push(HeaderName::CallId, call_id.to_string());
    }
    if let Some(cseq) = request.cseq() {
        response.headers.push(HeaderName::CSeq, cseq.to_string());
    }
}

fn reject_response(request: &Request, status: StatusCode, extra_headers: Headers, body: Vec<u8>) -> Response {
    let mut response = Response::with_default_reason(status);
    copy_dialog_headers(request, &mut response);
    for (name, value) in &extra_headers {
        response.headers.push(name.clone(), value.clone());
    }
    response.body = body;
    response
}

/// Extracts the `tag` parameter from a `From`/`To` header value, used to
/// pick up the `to-tag` a UAS assigns in its 2xx to `INVITE` (spec §3
/// `Session`: `{ call_id, from_tag, to_tag, ... }`).
fn extract_tag(header_value: &str) -> Option<String> {
    header_value
        .split(';')
        .skip(1)
        .find_map(|param| param.trim().strip_prefix("tag=").map(|v| v.trim_matches('"').to_string()))
}

/// Parses the numeric `Session-Expires` value, ignoring the trailing
/// `;refresher=...` parameter (spec §4.7, §4.4 step 4).
fn session_expires_seconds(message_headers: &sipswitch_core::Headers) -> Option<i64> {
    let raw = message_headers.get(&HeaderName::SessionExpires)?;
    raw.split(';').next()?.trim().parse().ok()
}

fn refresher_from(message_headers: &sipswitch_core::Headers) -> Refresher {
    message_headers
        .get(&HeaderName::SessionExpires)
        .and_then(|raw| raw.split(';').nth(1))
        .and_then(|param| param.trim().strip_prefix("refresher="))
        .and_then(Refresher::parse)
        .unwrap_or(Refresher::Uac)
}

/// Runs the method-specific handler for a freshly-validated request,
/// driving `server_txn` to completion (every branch below ends by
/// calling `send_response`, except `ACK`, which RFC 3261 never
/// acknowledges).
pub async fn dispatch(ctx: &Arc<ServerContext>, server_txn: &ServerTransaction, request: Request) {
    match request.method {
        Method::Register => {
            let response = ctx.registrar.handle_register(&request).await;
            server_txn.send_response(response).await;
        }
        Method::Options => {
            server_txn.send_response(options_response(&request)).await;
        }
        Method::Invite => handle_invite(ctx, server_txn, request).await,
        Method::Bye => handle_bye(ctx, server_txn, request).await,
        Method::Cancel => handle_cancel(ctx, server_txn, &request).await,
        Method::Ack => {
            // ACK to a non-2xx final response is matched to the INVITE
            // server transaction upstream of this function (see
            // `dispatch.rs`); reaching here means no transaction existed
            // for it, i.e. it's the 2xx case (spec §4.8 `forward_stateless`).
            if let Err(e) = ctx.proxy.forward_stateless(request).await {
                warn!(error = %e, "failed to forward ACK");
            }
        }
        Method::Info | Method::Other(_) => forward_simple(ctx, server_txn, request).await,
    }
}

fn options_response(request: &Request) -> Response {
    let mut response = Response::with_default_reason(StatusCode::OK);
    copy_dialog_headers(request, &mut response);
    let allow = Method::SUPPORTED.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    response.headers.push(HeaderName::Allow, allow);
    response
}

async fn handle_invite(ctx: &Arc<ServerContext>, server_txn: &ServerTransaction, request: Request) {
    let inbound_branch = request.top_via().and_then(|v| v.branch).unwrap_or_default();
    let call_id = request.call_id().map(|s| s.to_string()).unwrap_or_default();
    let from_tag = request.headers.get(&HeaderName::From).and_then(extract_tag).unwrap_or_default();
    let session_expires = session_expires_seconds(&request.headers);
    let refresher = refresher_from(&request.headers);

    match ctx.proxy.forward(inbound_branch, request).await {
        Ok(mut events) => {
            while let Some(event) = events.recv().await {
                match event {
                    sipswitch_proxy::ProxyEvent::Provisional(response) => {
                        server_txn.send_response(response).await;
                    }
                    sipswitch_proxy::ProxyEvent::Final(response) => {
                        if response.status_code.is_success() {
                            if let Some(session_expires) = session_expires {
                                if ctx.sessions.get(&call_id).is_some() {
                                    // Re-INVITE/UPDATE on an already-established dialog:
                                    // reschedule the existing timer rather than arming a
                                    // second, independent generation-0 timer alongside it
                                    // (spec §4.7 "the timer is rescheduled").
                                    ctx.sessions.refresh(&call_id, session_expires);
                                } else {
                                    let to_tag = response
                                        .headers
                                        .get(&HeaderName::To)
                                        .and_then(extract_tag)
                                        .unwrap_or_default();
                                    ctx.sessions.establish(
                                        call_id.clone(),
                                        from_tag.clone(),
                                        to_tag,
                                        session_expires,
                                        refresher,
                                        ctx.config.session_timer.min_se,
                                    );
                                }
                            }
                        }
                        server_txn.send_response(response).await;
                        break;
                    }
                }
            }
        }
        Err(e) => {
            let req_for_headers = server_txn.data.request.clone();
            server_txn.send_response(proxy_error_response(&req_for_headers, &e)).await;
        }
    }
}

async fn handle_bye(ctx: &Arc<ServerContext>, server_txn: &ServerTransaction, request: Request) {
    if let Some(call_id) = request.call_id() {
        ctx.sessions.terminate(call_id);
    }
    forward_simple(ctx, server_txn, request).await;
}

async fn handle_cancel(ctx: &Arc<ServerContext>, server_txn: &ServerTransaction, request: &Request) {
    let branch = request.top_via().and_then(|v| v.branch).unwrap_or_default();
    let sent_by = request.top_via().map(|v| v.sent_by()).unwrap_or_default();
    let cancelled = ctx.proxy.cancel(&branch).await;
    debug!(branch = %branch, cancelled, "processed CANCEL");

    server_txn.send_response(Response::with_default_reason(StatusCode::OK)).await;

    if cancelled {
        let invite_key = TransactionKey::new(branch, sent_by, &Method::Invite);
        if let Some(invite_data) = ctx.transactions.find_server(&invite_key) {
            let invite_txn = ServerTransaction { data: invite_data };
            invite_txn.send_response(Response::with_default_reason(StatusCode::REQUEST_TERMINATED)).await;
        }
    }
}

/// Shared forwarding path for methods that neither establish nor tear
/// down a session (`BYE` after its own session bookkeeping, `INFO`, and
/// any locally-unrecognized-but-syntactically-valid method).
async fn forward_simple(ctx: &Arc<ServerContext>, server_txn: &ServerTransaction, request: Request) {
    let inbound_branch = request.top_via().and_then(|v| v.branch).unwrap_or_default();
    match ctx.proxy.forward(inbound_branch, request).await {
        Ok(mut events) => {
            while let Some(event) = events.recv().await {
                match event {
                    sipswitch_proxy::ProxyEvent::Provisional(response) => {
                        server_txn.send_response(response).await;
                    }
                    sipswitch_proxy::ProxyEvent::Final(response) => {
                        server_txn.send_response(response).await;
                        break;
                    }
                }
            }
        }
        Err(e) => {
            let req_for_headers = server_txn.data.request.clone();
            server_txn.send_response(proxy_error_response(&req_for_headers, &e)).await;
        }
    }
}

fn proxy_error_response(request: &Request, error: &ProxyError) -> Response {
    let status = match error {
        ProxyError::NoContactsForAor(_) => StatusCode::NOT_FOUND,
        ProxyError::LoopDetected => StatusCode::LOOP_DETECTED,
        ProxyError::ResolutionFailed(_) | ProxyError::AllBranchesFailed => StatusCode::SERVICE_UNAVAILABLE,
    };
    reject_response(request, status, Headers::new(), Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_tag_finds_tag_param() {
        assert_eq!(extract_tag("<sip:bob@example.com>;tag=abc123"), Some("abc123".to_string()));
    }

    #[test]
    fn extract_tag_missing_returns_none() {
        assert_eq!(extract_tag("<sip:bob@example.com>"), None);
    }

    #[test]
    fn session_expires_seconds_ignores_refresher_param() {
        let mut headers = sipswitch_core::Headers::new();
        headers.push(HeaderName::SessionExpires, "1800;refresher=uac");
        assert_eq!(session_expires_seconds(&headers), Some(1800));
    }

    #[test]
    fn refresher_from_defaults_to_uac() {
        let headers = sipswitch_core::Headers::new();
        assert_eq!(refresher_from(&headers), Refresher::Uac);
    }
}
