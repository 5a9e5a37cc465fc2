//! End-to-end scenarios over real loopback UDP sockets, matching the
//! literal expected outputs in spec.md §8.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tokio::net::UdpSocket;

use sipswitch_core::{new_branch, HeaderName, Method, Request, Response, SipMessage, StatusCode, Uri};
use sipswitch_infra::ServerConfig;
use sipswitch_server::context::ServerContext;
use sipswitch_server::dispatch;

/// Starts a server bound to OS-assigned loopback ports and returns its
/// UDP address plus the dispatch loop's shutdown handle.
async fn start_server(mut config: ServerConfig) -> (SocketAddr, sipswitch_infra::ShutdownHandle) {
    config.server.bind_address = "127.0.0.1".to_string();
    config.server.udp_port = 0;
    config.server.tcp_port = 0;

    let (ctx, transport_events, _session_events) = ServerContext::build(config).await.unwrap();
    let udp_addr = ctx.transport.udp_local_addr().unwrap();

    let (handle, signal) = sipswitch_infra::ShutdownHandle::new();
    tokio::spawn(dispatch::run(ctx, transport_events, signal));

    (udp_addr, handle)
}

fn base_request(method: Method, request_uri: &str, call_id: &str, cseq: u32) -> Request {
    let mut req = Request::new(method.clone(), Uri::from_str(request_uri).unwrap());
    let branch = new_branch();
    req.headers.push(HeaderName::Via, format!("SIP/2.0/UDP 127.0.0.1:9999;branch={branch}"));
    req.headers.push(HeaderName::From, "<sip:alice@example.com>;tag=abc");
    req.headers.push(HeaderName::To, "<sip:bob@example.com>");
    req.headers.push(HeaderName::CallId, call_id.to_string());
    req.headers.push(HeaderName::CSeq, format!("{cseq} {method}"));
    req.headers.push(HeaderName::MaxForwards, "70");
    req
}

async fn send_and_receive(client: &UdpSocket, server_addr: SocketAddr, request: Request) -> Response {
    let bytes = sipswitch_core::serializer::serialize_request(&request);
    client.send_to(&bytes, server_addr).await.unwrap();

    let mut buf = vec![0u8; 8192];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a response")
        .unwrap();

    match sipswitch_core::parser::parse(&buf[..len]).unwrap().0 {
        SipMessage::Response(resp) => resp,
        SipMessage::Request(_) => panic!("expected a response, got a request"),
    }
}

/// Scenario 1: OPTIONS to the server, no Authorization -> 200 OK with
/// the full Allow list.
#[tokio::test]
async fn options_to_server_returns_200_with_allow() {
    let (server_addr, _handle) = start_server(ServerConfig::default()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let req = base_request(Method::Options, "sip:registrar.example.com", "call-options", 1);
    let resp = send_and_receive(&client, server_addr, req).await;

    assert_eq!(resp.status_code, StatusCode::OK);
    let allow = resp.headers.get(&HeaderName::Allow).unwrap();
    for method in ["INVITE", "ACK", "BYE", "CANCEL", "OPTIONS", "REGISTER", "INFO"] {
        assert!(allow.contains(method), "Allow header missing {method}: {allow}");
    }
}

/// Scenario 2: REGISTER without Authorization -> 401 with a fresh
/// WWW-Authenticate challenge, no bindings changed.
#[tokio::test]
async fn register_without_credentials_returns_401_with_challenge() {
    let (server_addr, _handle) = start_server(ServerConfig::default()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut req = base_request(Method::Register, "sip:registrar.example.com", "call-register", 1);
    req.headers.push(HeaderName::Contact, "<sip:bob@192.0.2.1:5060>;expires=3600");
    let resp = send_and_receive(&client, server_addr, req).await;

    assert_eq!(resp.status_code, StatusCode::UNAUTHORIZED);
    let challenge = resp.headers.get(&HeaderName::WwwAuthenticate).unwrap();
    assert!(challenge.contains("Digest"));
    assert!(challenge.contains("nonce="));
    assert!(resp.headers.get(&HeaderName::Contact).is_none());
}

/// Scenario 3: INVITE with neither Session-Expires, Supported: timer,
/// nor credentials -> 421 Extension Required, never 401.
#[tokio::test]
async fn invite_without_session_timer_support_returns_421_not_401() {
    let (server_addr, _handle) = start_server(ServerConfig::default()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let req = base_request(Method::Invite, "sip:bob@example.com", "call-invite-421", 1);
    let resp = send_and_receive(&client, server_addr, req).await;

    assert_eq!(resp.status_code, StatusCode::EXTENSION_REQUIRED);
    assert_eq!(resp.headers.get(&HeaderName::Require), Some("timer"));
}

/// Scenario 4: INVITE with Session-Expires below min_se (default 90) ->
/// 422 Session Interval Too Small with Min-SE.
#[tokio::test]
async fn invite_with_session_expires_too_low_returns_422() {
    let (server_addr, _handle) = start_server(ServerConfig::default()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut req = base_request(Method::Invite, "sip:bob@example.com", "call-invite-422", 1);
    req.headers.push(HeaderName::SessionExpires, "30");
    let resp = send_and_receive(&client, server_addr, req).await;

    assert_eq!(resp.status_code, StatusCode::INTERVAL_TOO_BRIEF);
    assert_eq!(resp.headers.get(&HeaderName::MinSe), Some("90"));
}

/// Scenario 7: INVITE with Max-Forwards: 0 -> 483, before any target
/// lookup (no registered contacts needed for this assertion to hold).
#[tokio::test]
async fn invite_with_max_forwards_zero_returns_483() {
    let (server_addr, _handle) = start_server(ServerConfig::default()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut req = base_request(Method::Invite, "sip:bob@example.com", "call-invite-483", 1);
    req.headers.set(HeaderName::MaxForwards, "0");
    req.headers.push(HeaderName::SessionExpires, "1800");
    let resp = send_and_receive(&client, server_addr, req).await;

    assert_eq!(resp.status_code, StatusCode::TOO_MANY_HOPS);
}

/// Scenario 6, with auth disabled to isolate registrar behavior from
/// digest machinery (spec §6 `authentication.require_auth`): a wildcard
/// Contact with Expires: 0 removes every binding for the AOR and the
/// 200 carries no Contact headers.
#[tokio::test]
async fn register_wildcard_with_zero_expires_clears_bindings() {
    let mut config = ServerConfig::default();
    config.authentication.require_auth = false;
    let (server_addr, _handle) = start_server(config).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let mut register = base_request(Method::Register, "sip:registrar.example.com", "call-wildcard", 1);
    register.headers.push(HeaderName::Contact, "<sip:bob@192.0.2.1:5060>;expires=3600");
    let resp = send_and_receive(&client, server_addr, register).await;
    assert_eq!(resp.status_code, StatusCode::OK);
    assert_eq!(resp.headers.get_all(&HeaderName::Contact).count(), 1);

    let mut wildcard = base_request(Method::Register, "sip:registrar.example.com", "call-wildcard", 2);
    wildcard.headers.push(HeaderName::Contact, "*");
    wildcard.headers.push(HeaderName::Expires, "0");
    let resp = send_and_receive(&client, server_addr, wildcard).await;

    assert_eq!(resp.status_code, StatusCode::OK);
    assert_eq!(resp.headers.get_all(&HeaderName::Contact).count(), 0);
}

/// Scenario 8: a malformed start-line ("INVALID MESSAGE") on UDP has no
/// Via to reply against, so it is silently dropped rather than crashing
/// the dispatch loop or producing any response.
#[tokio::test]
async fn malformed_start_line_on_udp_is_silently_dropped() {
    let (server_addr, _handle) = start_server(ServerConfig::default()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    client.send_to(b"INVALID MESSAGE\r\n\r\n", server_addr).await.unwrap();

    // Follow it with a well-formed OPTIONS on the same socket: if the
    // malformed datagram had wedged the receive loop or the dispatch
    // loop, this would never come back.
    let req = base_request(Method::Options, "sip:registrar.example.com", "call-after-garbage", 1);
    let resp = send_and_receive(&client, server_addr, req).await;
    assert_eq!(resp.status_code, StatusCode::OK);
}

/// Scenario 5: an INVITE with two registered contacts forks a client
/// transaction per contact; the first 2xx is relayed upstream and the
/// losing branch receives a CANCEL.
#[tokio::test]
async fn invite_forks_to_two_contacts_first_2xx_wins_loser_cancelled() {
    let mut config = ServerConfig::default();
    config.authentication.require_auth = false;
    let (server_addr, _handle) = start_server(config).await;

    let contact_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let contact_a_addr = contact_a.local_addr().unwrap();
    let contact_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let contact_b_addr = contact_b.local_addr().unwrap();

    let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    for (addr, tag) in [(contact_a_addr, "reg-a"), (contact_b_addr, "reg-b")] {
        let mut register = base_request(Method::Register, "sip:registrar.example.com", tag, 1);
        register.headers.set(HeaderName::To, "<sip:bob@example.com>");
        register.headers.push(HeaderName::Contact, format!("<sip:bob@{addr};transport=udp>;expires=3600"));
        let resp = send_and_receive(&caller, server_addr, register).await;
        assert_eq!(resp.status_code, StatusCode::OK);
    }

    let mut invite = base_request(Method::Invite, "sip:bob@example.com", "call-invite-fork", 1);
    invite.headers.push(HeaderName::SessionExpires, "1800;refresher=uac");
    let invite_bytes = sipswitch_core::serializer::serialize_request(&invite);
    caller.send_to(&invite_bytes, server_addr).await.unwrap();

    // Both forked branches must receive the INVITE.
    let mut buf_a = vec![0u8; 8192];
    let (len_a, from_a) = tokio::time::timeout(Duration::from_secs(2), contact_a.recv_from(&mut buf_a))
        .await
        .expect("contact A never received the forked INVITE")
        .unwrap();
    let forked_a = match sipswitch_core::parser::parse(&buf_a[..len_a]).unwrap().0 {
        SipMessage::Request(r) => r,
        SipMessage::Response(_) => panic!("expected a request"),
    };

    let mut buf_b = vec![0u8; 8192];
    let (_len_b, _from_b) = tokio::time::timeout(Duration::from_secs(2), contact_b.recv_from(&mut buf_b))
        .await
        .expect("contact B never received the forked INVITE")
        .unwrap();

    assert_ne!(
        forked_a.top_via().unwrap().branch,
        None,
        "forked branch must carry a fresh Via branch"
    );

    // Contact A answers first with 200 OK.
    let mut ok = Response::with_default_reason(StatusCode::OK);
    for via in forked_a.vias() {
        ok.headers.push(HeaderName::Via, via.to_string());
    }
    ok.headers.push(HeaderName::From, forked_a.headers.get(&HeaderName::From).unwrap().to_string());
    ok.headers.push(HeaderName::To, format!("{};tag=winner-tag", forked_a.headers.get(&HeaderName::To).unwrap()));
    ok.headers.push(HeaderName::CallId, forked_a.call_id().unwrap().to_string());
    ok.headers.push(HeaderName::CSeq, forked_a.cseq().unwrap().to_string());
    let ok_bytes = sipswitch_core::serializer::serialize_response(&ok);
    contact_a.send_to(&ok_bytes, from_a).await.unwrap();

    // The caller sees the winning 200 OK relayed upstream.
    let mut buf = vec![0u8; 8192];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), caller.recv_from(&mut buf))
        .await
        .expect("caller never received the winning 200 OK")
        .unwrap();
    let relayed = match sipswitch_core::parser::parse(&buf[..len]).unwrap().0 {
        SipMessage::Response(r) => r,
        SipMessage::Request(_) => panic!("expected a response"),
    };
    assert_eq!(relayed.status_code, StatusCode::OK);

    // Contact B (the losing branch) receives a CANCEL for its INVITE.
    let mut buf = vec![0u8; 8192];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), contact_b.recv_from(&mut buf))
        .await
        .expect("losing branch never received a CANCEL")
        .unwrap();
    let cancel = match sipswitch_core::parser::parse(&buf[..len]).unwrap().0 {
        SipMessage::Request(r) => r,
        SipMessage::Response(_) => panic!("expected a request"),
    };
    assert_eq!(cancel.method, Method::Cancel);
}

/// A registered callee receives a forwarded INVITE with a fresh top Via
/// naming this server, and the callee's 200 OK is relayed back to the
/// original caller (spec §4.8 steps 3-6), with auth disabled so the
/// test isolates routing from digest verification.
#[tokio::test]
async fn invite_forwards_to_registered_contact_and_relays_final_response() {
    let mut config = ServerConfig::default();
    config.authentication.require_auth = false;
    let (server_addr, _handle) = start_server(config).await;

    let callee = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let callee_addr = callee.local_addr().unwrap();

    let mut register = base_request(Method::Register, "sip:registrar.example.com", "call-reg-fwd", 1);
    register.headers.set(HeaderName::To, "<sip:bob@example.com>");
    register.headers.push(HeaderName::Contact, format!("<sip:bob@{callee_addr};transport=udp>;expires=3600"));
    let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let resp = send_and_receive(&caller, server_addr, register).await;
    assert_eq!(resp.status_code, StatusCode::OK);

    let mut invite = base_request(Method::Invite, "sip:bob@example.com", "call-invite-fwd", 1);
    invite.headers.push(HeaderName::SessionExpires, "1800;refresher=uac");
    let invite_bytes = sipswitch_core::serializer::serialize_request(&invite);
    caller.send_to(&invite_bytes, server_addr).await.unwrap();

    let mut buf = vec![0u8; 8192];
    let (len, from) = tokio::time::timeout(Duration::from_secs(2), callee.recv_from(&mut buf))
        .await
        .expect("callee never received the forwarded INVITE")
        .unwrap();
    let forwarded = match sipswitch_core::parser::parse(&buf[..len]).unwrap().0 {
        SipMessage::Request(r) => r,
        SipMessage::Response(_) => panic!("expected a forwarded request"),
    };
    assert_eq!(forwarded.method, Method::Invite);
    assert_eq!(forwarded.vias().len(), 2, "proxy must push its own Via ahead of the original");
    assert_eq!(forwarded.max_forwards(), Some(69));

    let mut ok = Response::with_default_reason(StatusCode::OK);
    for via in forwarded.vias() {
        ok.headers.push(HeaderName::Via, via.to_string());
    }
    ok.headers.push(HeaderName::From, forwarded.headers.get(&HeaderName::From).unwrap().to_string());
    ok.headers.push(HeaderName::To, format!("{};tag=callee-tag", forwarded.headers.get(&HeaderName::To).unwrap()));
    ok.headers.push(HeaderName::CallId, forwarded.call_id().unwrap().to_string());
    ok.headers.push(HeaderName::CSeq, forwarded.cseq().unwrap().to_string());
    let ok_bytes = sipswitch_core::serializer::serialize_response(&ok);
    callee.send_to(&ok_bytes, from).await.unwrap();

    let mut buf = vec![0u8; 8192];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), caller.recv_from(&mut buf))
        .await
        .expect("caller never received the relayed 200 OK")
        .unwrap();
    let relayed = match sipswitch_core::parser::parse(&buf[..len]).unwrap().0 {
        SipMessage::Response(r) => r,
        SipMessage::Request(_) => panic!("expected a response"),
    };
    assert_eq!(relayed.status_code, StatusCode::OK);
    assert_eq!(relayed.vias().len(), 1, "the proxy's own Via must be popped before relaying downstream");
}
