//! Server transaction state machines (RFC 3261 §17.2): INVITE
//! (`Proceeding → Completed → Confirmed → Terminated`, Timers G/H/I,
//! retransmitting the final non-2xx on every retransmitted INVITE while
//! Completed) and non-INVITE (`Trying → Proceeding → Completed →
//! Terminated`, Timer J). Grounded on `dialog-core::transaction::server::data`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use sipswitch_core::{Request, Response};
use sipswitch_transport::{TransportKind, TransportManager};

use crate::event::TransactionEvent;
use crate::key::{TransactionKey, TransactionKind};
use crate::state::{AtomicTransactionState, TransactionState};
use crate::timer::{Timer, TimerFired, TimerSettings, TimerType};

enum ServerCommand {
    /// The TU produced a response to send (provisional or final).
    SendResponse(Response),
    /// A retransmission (or, for INVITE, an ACK) of the request arrived.
    RequestRetransmitted,
    /// An ACK arrived, confirming a non-2xx final response (INVITE only).
    AckReceived,
    Terminate,
}

pub struct ServerTransactionData {
    pub id: TransactionKey,
    pub kind: TransactionKind,
    pub state: Arc<AtomicTransactionState>,
    pub request: Request,
    pub remote_addr: SocketAddr,
    pub transport_kind: TransportKind,
    cmd_tx: mpsc::Sender<ServerCommand>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl fmt::Debug for ServerTransactionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTransactionData")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Drop for ServerTransactionData {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.event_loop_handle.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
                debug!(id = %self.id, "aborted server transaction event loop");
            }
        }
    }
}

pub struct ServerTransaction {
    pub data: Arc<ServerTransactionData>,
}

impl ServerTransaction {
    /// Starts a server transaction for a freshly-arrived request, entering
    /// Proceeding (INVITE) or Trying (non-INVITE) and spawning the event
    /// loop that owns retransmission of the last response and the
    /// Completed/Confirmed timers.
    pub fn start(
        key: TransactionKey,
        request: Request,
        remote_addr: SocketAddr,
        transport_kind: TransportKind,
        transport: Arc<TransportManager>,
        timer_settings: TimerSettings,
        tu_events: mpsc::Sender<TransactionEvent>,
    ) -> Arc<ServerTransactionData> {
        let kind = TransactionKind::for_method(&request.method, false);
        let initial_state = if kind.is_invite() {
            TransactionState::Proceeding
        } else {
            TransactionState::Trying
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let data = Arc::new(ServerTransactionData {
            id: key.clone(),
            kind,
            state: Arc::new(AtomicTransactionState::new(initial_state)),
            request,
            remote_addr,
            transport_kind,
            cmd_tx,
            event_loop_handle: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let reliable = transport_kind == TransportKind::Tcp;
        let data_for_loop = data.clone();
        let handle = tokio::spawn(async move {
            run_event_loop(data_for_loop, remote_addr, transport_kind, transport, timer_settings, reliable, cmd_rx, tu_events).await;
        });
        // The handle must be stashed before the caller can observe the
        // transaction as started; `try_lock` on a brand-new Mutex never
        // contends, so this is safe to do synchronously.
        if let Ok(mut guard) = data.event_loop_handle.try_lock() {
            *guard = Some(handle);
        }
        data
    }

    pub async fn send_response(&self, response: Response) {
        let _ = self.data.cmd_tx.send(ServerCommand::SendResponse(response)).await;
    }

    pub async fn on_request_retransmitted(&self) {
        let _ = self.data.cmd_tx.send(ServerCommand::RequestRetransmitted).await;
    }

    pub async fn on_ack(&self) {
        let _ = self.data.cmd_tx.send(ServerCommand::AckReceived).await;
    }

    pub async fn terminate(&self) {
        let _ = self.data.cmd_tx.send(ServerCommand::Terminate).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_event_loop(
    data: Arc<ServerTransactionData>,
    remote_addr: SocketAddr,
    transport_kind: TransportKind,
    transport: Arc<TransportManager>,
    timer_settings: TimerSettings,
    reliable: bool,
    mut cmd_rx: mpsc::Receiver<ServerCommand>,
    tu_events: mpsc::Sender<TransactionEvent>,
) {
    let (timer_tx, mut timer_rx) = mpsc::channel::<TimerFired>(16);
    let mut active_timers: Vec<Timer> = Vec::new();
    let mut last_response: Option<Response> = None;
    let mut g_interval = timer_settings.t1;

    loop {
        tokio::select! {
            Some(cmd) = cmd_rx.recv() => {
                match cmd {
                    ServerCommand::Terminate => {
                        data.state.transition_to(TransactionState::Terminated);
                        break;
                    }
                    ServerCommand::RequestRetransmitted => {
                        if let Some(resp) = &last_response {
                            trace!(id = %data.id, "retransmitting last response for retransmitted request");
                            let _ = transport
                                .send(&sipswitch_core::SipMessage::Response(resp.clone()), remote_addr, transport_kind)
                                .await;
                        }
                        let _ = tu_events.send(TransactionEvent::Retransmission { key: data.id.clone() }).await;
                    }
                    ServerCommand::AckReceived => {
                        if data.kind.is_invite() && data.state.get() == TransactionState::Completed {
                            data.state.transition_to(TransactionState::Confirmed);
                            let dur = timer_settings.i(reliable);
                            if dur.is_zero() {
                                data.state.transition_to(TransactionState::Terminated);
                                break;
                            }
                            active_timers.push(Timer::schedule(TimerType::I, data.id.clone(), dur, timer_tx.clone()));
                        }
                    }
                    ServerCommand::SendResponse(response) => {
                        let is_final = response.status_code.is_final();
                        let _ = transport
                            .send(&sipswitch_core::SipMessage::Response(response.clone()), remote_addr, transport_kind)
                            .await;
                        last_response = Some(response.clone());

                        if !is_final {
                            data.state.transition_to(TransactionState::Proceeding);
                            continue;
                        }

                        if data.kind.is_invite() {
                            if response.status_code.is_success() {
                                // 2xx: the TU retransmits directly on its own, this
                                // transaction's job ends here (RFC 3261 §13.3.1.4).
                                data.state.transition_to(TransactionState::Terminated);
                                break;
                            }
                            data.state.transition_to(TransactionState::Completed);
                            if !reliable {
                                active_timers.push(Timer::schedule(TimerType::G, data.id.clone(), g_interval, timer_tx.clone()));
                            }
                            active_timers.push(Timer::schedule(TimerType::H, data.id.clone(), timer_settings.h(), timer_tx.clone()));
                        } else {
                            data.state.transition_to(TransactionState::Completed);
                            let dur = timer_settings.j(reliable);
                            if dur.is_zero() {
                                data.state.transition_to(TransactionState::Terminated);
                                break;
                            }
                            active_timers.push(Timer::schedule(TimerType::J, data.id.clone(), dur, timer_tx.clone()));
                        }
                    }
                }
            }
            Some(fired) = timer_rx.recv() => {
                match fired.timer_type {
                    TimerType::G => {
                        if data.state.get() == TransactionState::Completed {
                            if let Some(resp) = &last_response {
                                trace!(id = %data.id, "Timer G retransmitting final response");
                                let _ = transport
                                    .send(&sipswitch_core::SipMessage::Response(resp.clone()), remote_addr, transport_kind)
                                    .await;
                            }
                            g_interval = timer_settings.next_g(g_interval);
                            active_timers.push(Timer::schedule(TimerType::G, data.id.clone(), g_interval, timer_tx.clone()));
                        }
                    }
                    TimerType::H => {
                        // No ACK arrived in time: give up on reliable delivery.
                        data.state.transition_to(TransactionState::Terminated);
                        break;
                    }
                    TimerType::I | TimerType::J => {
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

#[cfg(test)]
mod tests {
    use super::*;
    use sipswitch_core::{HeaderName, Method, StatusCode, Uri};
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
    async fn non_invite_terminates_after_timer_j_on_final_response() {
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

        let txn = ServerTransaction {
            data: ServerTransaction::start(
                key,
                req,
                "127.0.0.1:1".parse().unwrap(),
                TransportKind::Udp,
                transport,
                fast,
                tu_tx,
            ),
        };

        txn.send_response(Response::with_default_reason(StatusCode::OK)).await;
        assert_eq!(txn.data.state.get(), TransactionState::Completed);

        let mut saw_terminated = false;
        for _ in 0..20 {
            if let Ok(Some(TransactionEvent::Terminated { .. })) =
                tokio::time::timeout(Duration::from_millis(100), tu_rx.recv()).await
            {
                saw_terminated = true;
                break;
            }
        }
        assert!(saw_terminated, "expected termination after Timer J");
    }
}
