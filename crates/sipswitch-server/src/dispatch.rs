//! The dispatch loop (spec §2 data flow): drains the transport's merged
//! event stream, locates or creates the matching transaction, and hands
//! new requests to the validation chain and [`crate::handlers::dispatch`].
//! Each message is processed on its own spawned task (spec §5
//! "Per-message work runs on a worker pool"); the loop itself never
//! blocks on handler work.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sipswitch_core::{HeaderName, Method, Request, Response, SipMessage};
use sipswitch_transaction::{ServerTransaction, TransactionKey, TransactionState};
use sipswitch_transport::{TransportEvent, TransportKind};

use crate::context::ServerContext;
use crate::handlers;

/// Runs until the transport event stream closes or a shutdown signal
/// arrives, spawning one task per inbound message.
pub async fn run(ctx: Arc<ServerContext>, mut events: mpsc::Receiver<TransportEvent>, mut shutdown: sipswitch_infra::shutdown::ShutdownSignal) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("dispatch loop observed shutdown signal");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(TransportEvent::MessageReceived { message, source, transport, .. }) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            dispatch_message(&ctx, message, source, transport).await;
                        });
                    }
                    Some(TransportEvent::Error { error }) => {
                        warn!(%error, "transport reported an error");
                    }
                    Some(TransportEvent::Closed) | None => {
                        info!("transport event stream closed");
                        break;
                    }
                }
            }
        }
    }
}

async fn dispatch_message(ctx: &Arc<ServerContext>, message: SipMessage, source: SocketAddr, transport: TransportKind) {
    match message {
        SipMessage::Request(request) => handle_request(ctx, request, source, transport).await,
        SipMessage::Response(response) => handle_response(ctx, response).await,
    }
}

async fn handle_request(ctx: &Arc<ServerContext>, request: Request, source: SocketAddr, transport: TransportKind) {
    let Some(top_via) = request.top_via() else {
        // The parser already rejects inbound requests without a Via
        // (spec §4.1 required headers); this only guards a
        // locally-constructed request reaching here some other way.
        warn!("request reached dispatch with no Via header, dropping");
        return;
    };
    let key = TransactionKey::new(top_via.branch.clone().unwrap_or_default(), top_via.sent_by(), &request.method);

    if let Some(existing) = ctx.transactions.find_server(&key) {
        handle_matched_request(ctx, existing, request).await;
        return;
    }

    if request.method == Method::Ack {
        // No INVITE server transaction is waiting for this ACK: either
        // it already terminated after a 2xx (the expected case) or was
        // swept. Either way it's a stateless ACK forward (spec §4.8
        // `forward_stateless`).
        if let Err(e) = ctx.proxy.forward_stateless(request).await {
            warn!(error = %e, "failed to forward out-of-transaction ACK");
        }
        return;
    }

    let server_txn_data = ServerTransaction::start(
        key,
        request.clone(),
        source,
        transport,
        ctx.transport.clone(),
        ctx.timer_settings,
        unused_transaction_events_channel(),
    );
    ctx.transactions.insert_server(server_txn_data.clone());
    let server_txn = ServerTransaction { data: server_txn_data };

    match ctx.validators.run(&request).await {
        sipswitch_validation::Outcome::Pass | sipswitch_validation::Outcome::Skip => {
            handlers::dispatch(ctx, &server_txn, request).await;
        }
        sipswitch_validation::Outcome::Reject { status, headers, body } => {
            debug!(status = status.0, method = %request.method, "validation chain rejected request");
            let mut response = Response::with_default_reason(status);
            handlers::copy_dialog_headers(&request, &mut response);
            for (name, value) in &headers {
                response.headers.push(name.clone(), value.clone());
            }
            response.body = body;
            server_txn.send_response(response).await;
        }
    }
}

/// Handles a request whose branch/sent-by/method already matches a live
/// server transaction: either a retransmission, or (for `INVITE`) the
/// `ACK` that confirms a non-2xx final response.
async fn handle_matched_request(_ctx: &Arc<ServerContext>, data: Arc<sipswitch_transaction::ServerTransactionData>, request: Request) {
    let txn = ServerTransaction { data: data.clone() };
    if request.method == Method::Ack {
        if data.kind.is_invite() && data.state.get() == TransactionState::Completed {
            txn.on_ack().await;
        }
        // Terminated/Confirmed here means this ACK belongs to an
        // already-answered 2xx or is a harmless duplicate; nothing
        // further to do since the 2xx path forwards statelessly and was
        // already handled when the transaction terminated.
        return;
    }
    txn.on_request_retransmitted().await;
}

async fn handle_response(ctx: &Arc<ServerContext>, response: Response) {
    let Some(top_via) = response.vias().into_iter().next() else {
        warn!("response reached dispatch with no Via header, dropping");
        return;
    };
    let Some(method) = cseq_method(&response) else {
        warn!("response reached dispatch with no parseable CSeq, dropping");
        return;
    };

    let key = TransactionKey::new(top_via.branch.clone().unwrap_or_default(), top_via.sent_by(), &method);
    let Some(data) = ctx.transactions.find_client(&key) else {
        debug!(branch = %key.branch, "no client transaction matches response, dropping");
        return;
    };

    let client_txn = sipswitch_transaction::ClientTransaction { data };
    client_txn.on_response(response).await;
}

fn cseq_method(response: &Response) -> Option<Method> {
    let cseq = response.headers.get(&HeaderName::CSeq)?;
    let (_, method_token) = cseq.trim().split_once(char::is_whitespace)?;
    Some(method_token.trim().parse().unwrap())
}

/// A freshly-constructed server transaction reports its own lifecycle
/// (retransmissions, terminal state) back through this channel, but the
/// dispatch loop drives the transaction exclusively through the handle
/// returned by `start` rather than consuming those events itself; the
/// receiver is dropped immediately; sends against a dropped receiver are
/// simply ignored by the transaction's event loop.
fn unused_transaction_events_channel() -> mpsc::Sender<sipswitch_transaction::TransactionEvent> {
    let (tx, _rx) = mpsc::channel(1);
    tx
}
