//! Client transaction state machines (RFC 3261 §17.1): INVITE
//! (`Calling → Proceeding → Completed → Terminated`, Timers A/B/D) and
//! non-INVITE (`Trying → Proceeding → Completed → Terminated`, Timers
//! E/F/K). Grounded on `dialog-core::transaction::client::data`'s
//! `ClientTransactionData` — state in an atomic cell, an `mpsc` command
//! channel driving a per-transaction event-loop task, `Drop` aborting that
//! task.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use sipswitch_core::{Request, Response, StatusCode};
use sipswitch_transport::{TransportKind, TransportManager};

use crate::event::TransactionEvent;
use crate::key::{TransactionKey, TransactionKind};
use crate::state::{AtomicTransactionState, TransactionState};
use crate::timer::{Timer, TimerFired, TimerSettings, TimerType};

enum ClientCommand {
    ResponseReceived(Response),
    TimerFired(TimerType),
    Terminate,
}

pub struct ClientTransactionData {
    pub id: TransactionKey,
    pub kind: TransactionKind,
    pub state: Arc<AtomicTransactionState>,
    pub request: Request,
    pub remote_addr: SocketAddr,
    pub transport_kind: TransportKind,
    cmd_tx: mpsc::Sender<ClientCommand>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl fmt::Debug for ClientTransactionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTransactionData")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Drop for ClientTransactionData {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.event_loop_handle.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
                debug!(id = %self.id, "aborted client transaction event loop");
            }
        }
    }
}

/// A live client transaction: owns the event-loop task that drives the
/// state machine and retransmission timers.
pub struct ClientTransaction {
    pub data: Arc<ClientTransactionData>,
}

impl ClientTransaction {
    /// Starts the transaction: sends the initial request and spawns the
    /// event loop that will retransmit, time out, or relay responses.
    pub async fn start(
        key: TransactionKey,
        request: Request,
        remote_addr: SocketAddr,
        transport_kind: TransportKind,
        transport: Arc<TransportManager>,
        timer_settings: TimerSettings,
        tu_events: mpsc::Sender<TransactionEvent>,
    ) -> Arc<ClientTransactionData> {
        let kind = TransactionKind::for_method(&request.method, true);
        let initial_state = if kind.is_invite() {
            TransactionState::Calling
        } else {
            TransactionState::Trying
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let data = Arc::new(ClientTransactionData {
            id: key.clone(),
            kind,
            state: Arc::new(AtomicTransactionState::new(initial_state)),
            request: request.clone(),
            remote_addr,
            transport_kind,
            cmd_tx,
            event_loop_handle: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let reliable = transport_kind == TransportKind::Tcp;
        let handle = tokio::spawn(run_event_loop(
            data.clone(),
            request,
            remote_addr,
            transport_kind,
            transport,
            timer_settings,
            reliable,
            cmd_rx,
            tu_events,
        ));
        *data.event_loop_handle.lock().await = Some(handle);
        data
    }

    /// Delivers a response received on the wire to this transaction.
    pub async fn on_response(&self, response: Response) {
        let _ = self.data.cmd_tx.send(ClientCommand::ResponseReceived(response)).await;
    }

    pub async fn terminate(&self) {
        let _ = self.data.cmd_tx.send(ClientCommand::Terminate).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_event_loop(
    data: Arc<ClientTransactionData>,
    request: Request,
    remote_addr: SocketAddr,
    transport_kind: TransportKind,
    transport: Arc<TransportManager>,
    timer_settings: TimerSettings,
    reliable: bool,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
    tu_events: mpsc::Sender<TransactionEvent>,
) {
    let (timer_tx, mut timer_rx) = mpsc::channel::<TimerFired>(16);
    let message = sipswitch_core::SipMessage::Request(request.clone());
    if let Err(e) = transport.send(&message, remote_addr, transport_kind).await {
        // Spec §4.9: a connection write failure is a distinct, immediate
        // failure path from "Upstream timeout (Timer B)" — the branch is
        // dead now, not merely silent for up to 64*T1. Report it and
        // terminate without ever arming A/E or B/F, rather than letting
        // the normal timer schedule mask this for tens of seconds.
        warn!(id = %data.id, error = %e, "failed to send initial request");
        data.state.transition_to(TransactionState::Terminated);
        let _ = tu_events
            .send(TransactionEvent::TransportFailure { key: data.id.clone(), error: e.to_string() })
            .await;
        let _ = tu_events.send(TransactionEvent::Terminated { key: data.id.clone() }).await;
        return;
    }

    let mut retransmit_interval = timer_settings.t1;
    let mut active_timers: Vec<Timer> = Vec::new();
    let mut last_response: Option<Response> = None;

    if !reliable {
        let timer_type = if data.kind.is_invite() { TimerType::A } else { TimerType::E };
        active_timers.push(Timer::schedule(timer_type, data.id.clone(), retransmit_interval, timer_tx.clone()));
    }
    let timeout_timer = if data.kind.is_invite() { TimerType::B } else { TimerType::F };
    active_timers.push(Timer::schedule(timeout_timer, data.id.clone(), timer_settings.timeout(), timer_tx.clone()));

    loop {
        tokio::select! {
            Some(cmd) = cmd_rx.recv() => {
                match cmd {
                    ClientCommand::Terminate => {
                        data.state.transition_to(TransactionState::Terminated);
                        break;
                    }
                    ClientCommand::ResponseReceived(response) => {
                        handle_response(&data, response.clone(), &tu_events, &mut last_response).await;
                        if response.status_code.is_provisional() {
                            continue;
                        }
                        // Final response: stop retransmitting, arm Completed-state timer.
                        data.state.transition_to(TransactionState::Completed);
                        if data.kind.is_invite() {
                            // Client INVITE: Timer D governs how long we linger to
                            // absorb retransmitted final responses before Terminated.
                            active_timers.push(Timer::schedule(
                                TimerType::D,
                                data.id.clone(),
                                timer_settings.d(reliable),
                                timer_tx.clone(),
                            ));
                            if timer_settings.d(reliable).is_zero() {
                                data.state.transition_to(TransactionState::Terminated);
                                break;
                            }
                        } else {
                            active_timers.push(Timer::schedule(
                                TimerType::K,
                                data.id.clone(),
                                timer_settings.k(reliable),
                                timer_tx.clone(),
                            ));
                            if timer_settings.k(reliable).is_zero() {
                                data.state.transition_to(TransactionState::Terminated);
                                break;
                            }
                        }
                    }
                    ClientCommand::TimerFired(_) => {}
                }
            }
            Some(fired) = timer_rx.recv() => {
                match fired.timer_type {
                    TimerType::A | TimerType::E => {
                        if data.state.get() == TransactionState::Calling || data.state.get() == TransactionState::Trying {
                            trace!(id = %data.id, "retransmitting request");
                            let _ = transport.send(&message, remote_addr, transport_kind).await;
                            retransmit_interval = timer_settings.next_retransmit(retransmit_interval);
                            active_timers.push(Timer::schedule(
                                fired.timer_type,
                                data.id.clone(),
                                retransmit_interval,
                                timer_tx.clone(),
                            ));
                        }
                    }
                    TimerType::B | TimerType::F => {
                        if !data.state.get().is_terminal() && data.state.get() != TransactionState::Completed {
                            let timeout_response = synthetic_error_response(&request, StatusCode::REQUEST_TIMEOUT);
                            handle_response(&data, timeout_response.clone(), &tu_events, &mut last_response).await;
                            data.state.transition_to(TransactionState::Terminated);
                            break;
                        }
                    }
                    TimerType::D | TimerType::K => {
                        data.state.transition_to(TransactionState::Terminated);
                        break;
                    }
                    _ => {}
                }
            }
            else => break,
        }
    }

    for t in active_timers {
        t.cancel();
    }
    let _ = tu_events.send(TransactionEvent::Terminated { key: data.id.clone() }).await;
}

async fn handle_response(
    data: &Arc<ClientTransactionData>,
    response: Response,
    tu_events: &mpsc::Sender<TransactionEvent>,
    last_response: &mut Option<Response>,
) {
    *last_response = Some(response.clone());
    if response.status_code.is_provisional() {
        data.state.transition_to(TransactionState::Proceeding);
        let _ = tu_events
            .send(TransactionEvent::Provisional { key: data.id.clone(), response })
            .await;
    } else {
        let _ = tu_events
            .send(TransactionEvent::Final { key: data.id.clone(), response })
            .await;
    }
}

/// Synthesizes a final response delivered to the TU in place of one
/// that will never arrive on the wire: 408 when Timer B/F fires with no
/// final response, 503 when the initial send itself fails outright
/// (spec §4.9's "Upstream timeout" and "Connection write failure" rows).
fn synthetic_error_response(request: &Request, status: StatusCode) -> Response {
    let mut resp = Response::with_default_reason(status);
    if let Some(call_id) = request.call_id() {
        resp.headers.push(sipswitch_core::HeaderName::CallId, call_id.to_string());
    }
    if let Some(cseq) = request.cseq() {
        resp.headers.push(sipswitch_core::HeaderName::CSeq, cseq.to_string());
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipswitch_core::{HeaderName, Method, Uri};
    use std::str::FromStr;
    use std::time::Duration;

    fn sample_request(method: Method) -> Request {
        let mut req = Request::new(method.clone(), Uri::from_str("sip:bob@example.com").unwrap());
        req.headers.push(HeaderName::Via, "SIP/2.0/UDP a.example.com;branch=z9hG4bK1");
        req.headers.push(HeaderName::From, "<sip:alice@example.com>;tag=1");
        req.headers.push(HeaderName::To, "<sip:bob@example.com>");
        req.headers.push(HeaderName::CallId, "callid-1");
        req.headers.push(HeaderName::CSeq, format!("1 {}", method));
        req.headers.push(HeaderName::MaxForwards, "70");
        req
    }

    #[tokio::test]
    async fn non_invite_transaction_times_out_with_synthetic_408() {
        let (transport, _rx) = TransportManager::bind(
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:0".parse().unwrap(),
            None,
        )
        .await
        .unwrap();
        let transport = Arc::new(transport);

        let (tu_tx, mut tu_rx) = mpsc::channel(16);
        let req = sample_request(Method::Options);
        let key = TransactionKey::new("z9hG4bK1", "a.example.com", &Method::Options);
        let mut fast = TimerSettings::default();
        fast.t1 = Duration::from_millis(5);

        let _data = ClientTransaction::start(
            key,
            req,
            "127.0.0.1:1".parse().unwrap(),
            TransportKind::Udp,
            transport,
            fast,
            tu_tx,
        )
        .await;

        // Timer F fires at 64*T1 = 320ms with our fast settings; allow slack.
        let mut saw_final = false;
        for _ in 0..20 {
            if let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(100), tu_rx.recv()).await {
                if let TransactionEvent::Final { response, .. } = event {
                    assert_eq!(response.status_code, StatusCode::REQUEST_TIMEOUT);
                    saw_final = true;
                    break;
                }
            }
        }
        assert!(saw_final, "expected a synthetic 408 on timeout");
    }

    #[tokio::test]
    async fn initial_send_failure_terminates_immediately_without_waiting_on_timer_b() {
        let (transport, _rx) = TransportManager::bind(
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:0".parse().unwrap(),
            None,
        )
        .await
        .unwrap();
        let transport = Arc::new(transport);

        // Nothing listens here; TCP connect fails immediately instead of
        // the UDP "fire and forget" path that never reports a send error.
        let dead_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();

        let (tu_tx, mut tu_rx) = mpsc::channel(16);
        let req = sample_request(Method::Invite);
        let key = TransactionKey::new("z9hG4bK-dead", "a.example.com", &Method::Invite);
        // Slow settings: if the failure were only caught by Timer B, this
        // test would time out waiting for it instead of seeing an
        // immediate TransportFailure + Terminated pair.
        let slow = TimerSettings::default();

        let _data =
            ClientTransaction::start(key, req, dead_addr, TransportKind::Tcp, transport, slow, tu_tx).await;

        let mut saw_transport_failure = false;
        let mut saw_terminated = false;
        for _ in 0..2 {
            match tokio::time::timeout(Duration::from_millis(500), tu_rx.recv()).await {
                Ok(Some(TransactionEvent::TransportFailure { .. })) => saw_transport_failure = true,
                Ok(Some(TransactionEvent::Terminated { .. })) => saw_terminated = true,
                other => panic!("expected TransportFailure/Terminated quickly, got {other:?}"),
            }
        }
        assert!(saw_transport_failure && saw_terminated);
    }
}
