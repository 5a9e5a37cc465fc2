//! Stateful forwarding (spec §4.8): resolve targets via the registrar,
//! fork one client transaction per contact, and join the responses with
//! "first final answer wins" semantics. Grounded on
//! `dialog-core::routing::request_router`'s router/matcher split (the
//! engine here plays the router's role) and on the client transaction's
//! own event-channel idiom (`sipswitch-transaction::client`) for the
//! fork/join loop — each fork attempt gets its own short-lived `mpsc`
//! channel rather than filtering a shared one.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use sipswitch_core::{new_branch, HeaderName, Method, Request, Response, SipMessage, StatusCode, Via};
use sipswitch_registrar::RegistrationStore;
use sipswitch_transaction::{
    ClientTransaction, TimerSettings, TransactionEvent, TransactionKey, TransactionTable,
};
use sipswitch_transport::{TransportKind, TransportManager};

use crate::error::{ProxyError, Result};
use crate::target::resolve_target;

/// What the proxy reports upward as a fork progresses, so the caller
/// (the server-side dispatch loop, owning the inbound server
/// transaction) can relay provisional responses immediately and only
/// block on the final one.
#[derive(Debug, Clone)]
pub enum ProxyEvent {
    Provisional(Response),
    Final(Response),
}

#[derive(Clone)]
struct Branch {
    key: TransactionKey,
    request: Request,
    remote_addr: SocketAddr,
    transport_kind: TransportKind,
}

pub struct ProxyEngine {
    transport: Arc<TransportManager>,
    table: Arc<TransactionTable>,
    registrar: Arc<dyn RegistrationStore>,
    sent_by: String,
    timer_settings: TimerSettings,
    /// Outstanding forks, keyed by the *inbound* request's top Via
    /// branch (the branch a matching `CANCEL` shares per RFC 3261 §9.1),
    /// so an inbound CANCEL can find and tear down every branch opened
    /// for it without the dispatch layer needing to track fork internals.
    active: Arc<DashMap<String, Vec<Branch>>>,
}

impl ProxyEngine {
    pub fn new(
        transport: Arc<TransportManager>,
        table: Arc<TransactionTable>,
        registrar: Arc<dyn RegistrationStore>,
        sent_by: impl Into<String>,
        timer_settings: TimerSettings,
    ) -> Self {
        ProxyEngine {
            transport,
            table,
            registrar,
            sent_by: sent_by.into(),
            timer_settings,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Forwards `request` (never `REGISTER`, which the registrar handles
    /// directly) to every contact registered at its request-URI's AOR,
    /// reporting progress on the returned channel until the fork
    /// resolves.
    pub async fn forward(
        &self,
        inbound_branch: impl Into<String>,
        mut request: Request,
    ) -> Result<mpsc::Receiver<ProxyEvent>> {
        if self.has_loop(&request) {
            return Err(ProxyError::LoopDetected);
        }

        let aor = request.request_uri.aor_key();
        let contacts = self.registrar.get(&aor).await;
        if contacts.is_empty() {
            return Err(ProxyError::NoContactsForAor(aor));
        }

        let max_forwards = request.max_forwards().unwrap_or(70).saturating_sub(1);
        request.set_max_forwards(max_forwards);

        let (tu_tx, tu_rx) = mpsc::channel(64);
        let mut branches = Vec::with_capacity(contacts.len());

        for contact in &contacts {
            let Ok(target_uri) = contact.uri.parse() else {
                warn!(uri = %contact.uri, "skipping unparseable contact");
                continue;
            };
            let Ok((remote_addr, transport_kind)) = resolve_target(&target_uri) else {
                warn!(uri = %contact.uri, "skipping unresolvable contact");
                continue;
            };

            let mut forked = request.clone();
            let branch = new_branch();
            let mut via = Via::new(transport_kind.as_str(), self.sent_by_host());
            via.sent_by_port = self.sent_by_port();
            via.branch = Some(branch.clone());
            forked.push_via(&via);

            let key = TransactionKey::new(branch, &self.sent_by, &forked.method);
            let data = ClientTransaction::start(
                key.clone(),
                forked.clone(),
                remote_addr,
                transport_kind,
                self.transport.clone(),
                self.timer_settings,
                tu_tx.clone(),
            )
            .await;
            self.table.insert_client(data);
            branches.push(Branch { key, request: forked, remote_addr, transport_kind });
        }
        drop(tu_tx);

        if branches.is_empty() {
            return Err(ProxyError::AllBranchesFailed);
        }

        let inbound_branch = inbound_branch.into();
        self.active.insert(inbound_branch.clone(), branches.clone());

        let (events_tx, events_rx) = mpsc::channel(64);
        let table = self.table.clone();
        let transport = self.transport.clone();
        let active = self.active.clone();
        tokio::spawn(join_fork(inbound_branch, branches, tu_rx, table, transport, active, events_tx));
        Ok(events_rx)
    }

    /// Cancels every branch opened for the inbound request whose top Via
    /// branch is `inbound_branch` (spec §4.8 step 5 "CANCEL sent on the
    /// other [branches]", generalized here to "every branch" since the
    /// caller itself asked to abandon the whole fork rather than a
    /// single winner having already been chosen). Returns `false` if no
    /// fork is outstanding for that branch (already resolved, or never
    /// existed).
    pub async fn cancel(&self, inbound_branch: &str) -> bool {
        let Some((_, branches)) = self.active.remove(inbound_branch) else {
            return false;
        };
        let no_winner = TransactionKey::new("", "", &Method::Other("NONE".to_string()));
        cancel_losing_branches(&branches, &no_winner, &self.table, &self.transport).await;
        true
    }

    /// Relays a request with no transaction of its own — the ACK that
    /// follows a 2xx response to an `INVITE` (spec §4.6: the 2xx server
    /// transaction terminates on sending the response, so this ACK is
    /// never matched against the transaction table and must be forwarded
    /// directly to the dialog target). Only the first resolvable contact
    /// at the request-URI's AOR is used; unlike `forward` there is no
    /// fork to join, since the ACK carries no response of its own.
    pub async fn forward_stateless(&self, mut request: Request) -> Result<()> {
        if self.has_loop(&request) {
            return Err(ProxyError::LoopDetected);
        }

        let aor = request.request_uri.aor_key();
        let contacts = self.registrar.get(&aor).await;
        let contact = contacts.first().ok_or_else(|| ProxyError::NoContactsForAor(aor))?;

        let target_uri = contact
            .uri
            .parse()
            .map_err(|_| ProxyError::ResolutionFailed(contact.uri.clone()))?;
        let (remote_addr, transport_kind) =
            resolve_target(&target_uri).map_err(|_| ProxyError::ResolutionFailed(contact.uri.clone()))?;

        let max_forwards = request.max_forwards().unwrap_or(70).saturating_sub(1);
        request.set_max_forwards(max_forwards);

        let mut via = Via::new(transport_kind.as_str(), self.sent_by_host());
        via.sent_by_port = self.sent_by_port();
        via.branch = Some(new_branch());
        request.push_via(&via);

        let message = SipMessage::Request(request);
        self.transport
            .send(&message, remote_addr, transport_kind)
            .await
            .map_err(|e| ProxyError::ResolutionFailed(e.to_string()))?;
        Ok(())
    }

    /// RFC 3261 §16.6 step 8 loop check, degenerate for this server
    /// (spec §4.8 step 2): any `Via` already bearing our own `sent-by`
    /// means this request has already passed through us on this leg.
    fn has_loop(&self, request: &Request) -> bool {
        request.vias().iter().any(|via| via.sent_by() == self.sent_by)
    }

    fn sent_by_host(&self) -> String {
        self.sent_by.split(':').next().unwrap_or(&self.sent_by).to_string()
    }

    fn sent_by_port(&self) -> Option<u16> {
        self.sent_by.split_once(':').and_then(|(_, p)| p.parse().ok())
    }
}

#[allow(clippy::too_many_arguments)]
async fn join_fork(
    inbound_branch: String,
    branches: Vec<Branch>,
    mut tu_rx: mpsc::Receiver<TransactionEvent>,
    table: Arc<TransactionTable>,
    transport: Arc<TransportManager>,
    active: Arc<DashMap<String, Vec<Branch>>>,
    events_tx: mpsc::Sender<ProxyEvent>,
) {
    let mut finals: Vec<(TransactionKey, Response)> = Vec::new();
    let mut provisional_forwarded = false;
    let pending = branches.len();

    while finals.len() < pending {
        match tu_rx.recv().await {
            Some(TransactionEvent::Provisional { response, .. }) => {
                if !provisional_forwarded && response.status_code != StatusCode::TRYING {
                    provisional_forwarded = true;
                    let _ = events_tx.send(ProxyEvent::Provisional(response)).await;
                }
            }
            Some(TransactionEvent::Final { key, response }) => {
                if response.status_code.is_success() {
                    active.remove(&inbound_branch);
                    cancel_losing_branches(&branches, &key, &table, &transport).await;
                    let _ = events_tx.send(ProxyEvent::Final(response)).await;
                    return;
                }
                finals.push((key, response));
            }
            Some(TransactionEvent::TransportFailure { key, error }) => {
                // Spec §4.9 "Connection write failure": mark the branch
                // dead immediately rather than waiting out Timer B/F —
                // the client transaction itself never sends a Final for
                // this branch (it goes straight to Terminated), so this
                // is the only place that failure is counted toward the
                // fork resolving.
                debug!(branch = %key.branch, %error, "branch failed at the transport, counting as 503");
                finals.push((key, Response::with_default_reason(StatusCode::SERVICE_UNAVAILABLE)));
            }
            Some(
                TransactionEvent::Terminated { .. }
                | TransactionEvent::NewRequest { .. }
                | TransactionEvent::Retransmission { .. },
            ) => {}
            None => break,
        }
    }
    active.remove(&inbound_branch);

    let best = pick_best_final(finals);
    let response = best.unwrap_or_else(|| Response::with_default_reason(StatusCode::SERVICE_UNAVAILABLE));
    let _ = events_tx.send(ProxyEvent::Final(response)).await;
}

/// RFC 3261 §16.7: when every branch ends non-2xx, the lowest class
/// wins by the 6xx > 2xx > 3xx > 4xx > 5xx ranking, lowest code within a
/// class, earliest arrival on a tie.
fn pick_best_final(finals: Vec<(TransactionKey, Response)>) -> Option<Response> {
    let mut best: Option<Response> = None;
    for (_, response) in finals {
        best = Some(match best {
            None => response,
            Some(current) => {
                let current_rank = (current.status_code.class_rank(), current.status_code.0);
                let candidate_rank = (response.status_code.class_rank(), response.status_code.0);
                if candidate_rank < current_rank {
                    response
                } else {
                    current
                }
            }
        });
    }
    best
}

/// Sends a `CANCEL` matching each losing branch's request and tears down
/// its client transaction (spec §4.8 step 5, §5 "Cancellation").
async fn cancel_losing_branches(
    branches: &[Branch],
    winner: &TransactionKey,
    table: &Arc<TransactionTable>,
    transport: &Arc<TransportManager>,
) {
    for branch in branches {
        if &branch.key == winner {
            continue;
        }
        debug!(branch = %branch.key.branch, "cancelling losing fork branch");

        let cancel = build_cancel(&branch.request);
        let message = SipMessage::Request(cancel);
        if let Err(e) = transport.send(&message, branch.remote_addr, branch.transport_kind).await {
            warn!(branch = %branch.key.branch, error = %e, "failed to send CANCEL");
        }

        if let Some(data) = table.find_client(&branch.key) {
            ClientTransaction { data }.terminate().await;
        }
        table.remove_client(&branch.key);
    }
}

/// Builds the `CANCEL` for `invite`, matching RFC 3261 §9.1: same
/// Request-URI, Call-ID, To, From, and topmost Via/branch, CSeq number
/// carried over with the method replaced.
fn build_cancel(invite: &Request) -> Request {
    let mut cancel = Request::new(Method::Cancel, invite.request_uri.clone());
    for (name, value) in invite.headers.iter() {
        if matches!(
            name,
            HeaderName::Via | HeaderName::From | HeaderName::To | HeaderName::CallId | HeaderName::Route
        ) {
            cancel.headers.push(name.clone(), value.clone());
        }
    }
    if let Some(cseq_number) = invite.cseq_number() {
        cancel.headers.push(HeaderName::CSeq, format!("{} CANCEL", cseq_number));
    }
    cancel.set_max_forwards(invite.max_forwards().unwrap_or(70));
    cancel
}
