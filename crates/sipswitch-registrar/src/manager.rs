//! REGISTER processing (spec §4.6), grounded on
//! `rvoip-registrar-core::registrar::manager::RegistrationManager`'s
//! sweeper-task idiom, generalized to also own the request-handling
//! logic rather than delegating it to a separate location service only.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use sipswitch_core::{HeaderName, Request, Response, StatusCode};

use crate::contact::{self, RegistrarContact};
use crate::store::RegistrationStore;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Clamped expiry bounds and the default applied when a `Contact` names
/// none (spec §4.6, §6 `authentication`/`session_timer`-style config
/// table entries for the registrar).
#[derive(Debug, Clone, Copy)]
pub struct RegistrarConfig {
    pub min_expires: i64,
    pub max_expires: i64,
    pub default_expires: i64,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        RegistrarConfig {
            min_expires: 60,
            max_expires: 3600,
            default_expires: 3600,
        }
    }
}

pub struct RegistrarManager<S: RegistrationStore> {
    store: Arc<S>,
    config: RegistrarConfig,
}

impl<S: RegistrationStore + 'static> RegistrarManager<S> {
    pub fn new(store: Arc<S>, config: RegistrarConfig) -> Arc<Self> {
        let manager = Arc::new(RegistrarManager { store, config });
        manager.clone().spawn_sweeper();
        manager
    }

    /// Processes one `REGISTER` request per RFC 3261 §10.3, returning
    /// the response to send (always a complete `SipMessage`-ready
    /// `Response`; this component never propagates an error type
    /// upward, matching the rest of the method-handler layer).
    pub async fn handle_register(&self, request: &Request) -> Response {
        let to_value = match request.headers.get(&HeaderName::To) {
            Some(v) => v,
            None => return bad_request(request, "missing To header"),
        };
        let aor = match contact::aor_from_to_header(to_value) {
            Ok(aor) => aor,
            Err(_) => return bad_request(request, "malformed To header"),
        };
        let call_id = request.call_id().unwrap_or("").to_string();
        let cseq = match request.cseq_number() {
            Some(n) => n,
            None => return bad_request(request, "malformed CSeq"),
        };

        if let Some(last) = self.store.last_cseq(&aor, &call_id).await {
            if cseq <= last {
                warn!(%aor, %call_id, cseq, last, "rejecting out-of-order REGISTER");
                return bad_request(request, "CSeq not greater than last accepted value");
            }
        }

        let contact_values: Vec<&str> = request.headers.get_all(&HeaderName::Contact).collect();

        if contact_values.is_empty() {
            // No Contact: return the current bindings unchanged.
            return self.ok_with_bindings(request, &aor).await;
        }

        if contact_values.len() == 1 && contact::is_wildcard(contact_values[0]) {
            let header_expires = request
                .headers
                .get(&HeaderName::Expires)
                .and_then(|v| v.trim().parse::<i64>().ok());
            if header_expires != Some(0) {
                return bad_request(request, "wildcard Contact requires Expires: 0");
            }
            self.store.delete_all(&aor).await;
            self.store.record_cseq(&aor, &call_id, cseq).await;
            info!(%aor, %call_id, "wildcard de-registration");
            return self.ok_with_bindings(request, &aor).await;
        }

        let default_expires_header = request
            .headers
            .get(&HeaderName::Expires)
            .and_then(|v| v.trim().parse::<i64>().ok());
        let user_agent = request.headers.get(&HeaderName::UserAgent).map(|s| s.to_string());

        for raw in &contact_values {
            let parsed = match contact::parse_contact(raw) {
                Ok(p) => p,
                Err(_) => return bad_request(request, "malformed Contact"),
            };
            let requested = parsed
                .expires_param
                .or(default_expires_header)
                .unwrap_or(self.config.default_expires);
            let effective = requested.clamp(self.config.min_expires, self.config.max_expires);
            let uri_string = parsed.uri.to_string();

            if requested <= 0 {
                self.store.delete(&aor, &uri_string).await;
                continue;
            }

            let record = RegistrarContact {
                aor: aor.clone(),
                uri: uri_string,
                expires_at: Utc::now() + chrono::Duration::seconds(effective),
                call_id: call_id.clone(),
                cseq,
                user_agent: user_agent.clone(),
                created_at: Utc::now(),
            };
            self.store.put(record).await;
        }

        self.store.record_cseq(&aor, &call_id, cseq).await;
        debug!(%aor, %call_id, "processed REGISTER");
        self.ok_with_bindings(request, &aor).await
    }

    async fn ok_with_bindings(&self, request: &Request, aor: &str) -> Response {
        let mut response = Response::with_default_reason(StatusCode::OK);
        copy_dialog_headers(request, &mut response);

        let now = Utc::now();
        for contact in self.store.get(aor).await {
            let remaining = contact.remaining_seconds(now);
            response.headers.push(
                HeaderName::Contact,
                format!("<{}>;expires={}", contact.uri, remaining),
            );
        }
        response
    }

    fn spawn_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let removed = self.store.sweep_expired().await;
                if !removed.is_empty() {
                    info!(count = removed.len(), "swept expired registrations");
                }
            }
        });
    }
}

fn copy_dialog_headers(request: &Request, response: &mut Response) {
    if let Some(via) = request.headers.get(&HeaderName::Via) {
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

fn bad_request(request: &Request, reason: &str) -> Response {
    let mut response = Response::new(StatusCode::BAD_REQUEST, reason.to_string());
    copy_dialog_headers(request, &mut response);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRegistrationStore;
    use sipswitch_core::{Method, Uri};
    use std::str::FromStr;

    fn register_request(contact: Option<&str>, cseq: u32) -> Request {
        let mut req = Request::new(Method::Register, Uri::from_str("sip:registrar.example.com").unwrap());
        req.headers.push(HeaderName::Via, "SIP/2.0/UDP pc33.example.com;branch=z9hG4bK1");
        req.headers.push(HeaderName::From, "<sip:bob@example.com>;tag=1");
        req.headers.push(HeaderName::To, "<sip:bob@example.com>");
        req.headers.push(HeaderName::CallId, "call-1");
        req.headers.push(HeaderName::CSeq, format!("{} REGISTER", cseq));
        req.headers.push(HeaderName::MaxForwards, "70");
        if let Some(c) = contact {
            req.headers.push(HeaderName::Contact, c);
        }
        req
    }

    #[tokio::test]
    async fn registers_a_contact_and_returns_it() {
        let store = Arc::new(InMemoryRegistrationStore::new());
        let manager = RegistrarManager::new(store, RegistrarConfig::default());
        let req = register_request(Some("<sip:bob@192.0.2.1:5060>;expires=3600"), 1);
        let resp = manager.handle_register(&req).await;
        assert_eq!(resp.status_code, StatusCode::OK);
        assert_eq!(resp.headers.get_all(&HeaderName::Contact).count(), 1);
    }

    #[tokio::test]
    async fn no_contact_returns_current_bindings() {
        let store = Arc::new(InMemoryRegistrationStore::new());
        let manager = RegistrarManager::new(store, RegistrarConfig::default());
        manager
            .handle_register(&register_request(Some("<sip:bob@192.0.2.1:5060>;expires=3600"), 1))
            .await;
        let resp = manager.handle_register(&register_request(None, 2)).await;
        assert_eq!(resp.status_code, StatusCode::OK);
        assert_eq!(resp.headers.get_all(&HeaderName::Contact).count(), 1);
    }

    #[tokio::test]
    async fn wildcard_with_zero_expires_clears_bindings() {
        let store = Arc::new(InMemoryRegistrationStore::new());
        let manager = RegistrarManager::new(store, RegistrarConfig::default());
        manager
            .handle_register(&register_request(Some("<sip:bob@192.0.2.1:5060>;expires=3600"), 1))
            .await;

        let mut wildcard_req = register_request(Some("*"), 2);
        wildcard_req.headers.push(HeaderName::Expires, "0");
        let resp = manager.handle_register(&wildcard_req).await;
        assert_eq!(resp.status_code, StatusCode::OK);
        assert_eq!(resp.headers.get_all(&HeaderName::Contact).count(), 0);
    }

    #[tokio::test]
    async fn wildcard_with_nonzero_expires_is_rejected() {
        let store = Arc::new(InMemoryRegistrationStore::new());
        let manager = RegistrarManager::new(store, RegistrarConfig::default());
        let resp = manager.handle_register(&register_request(Some("*"), 1)).await;
        assert_eq!(resp.status_code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn lower_cseq_on_same_call_id_is_rejected() {
        let store = Arc::new(InMemoryRegistrationStore::new());
        let manager = RegistrarManager::new(store, RegistrarConfig::default());
        manager
            .handle_register(&register_request(Some("<sip:bob@192.0.2.1:5060>;expires=3600"), 5))
            .await;
        let resp = manager
            .handle_register(&register_request(Some("<sip:bob@192.0.2.1:5060>;expires=3600"), 3))
            .await;
        assert_eq!(resp.status_code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn expires_are_clamped_to_configured_bounds() {
        let store = Arc::new(InMemoryRegistrationStore::new());
        let config = RegistrarConfig { min_expires: 60, max_expires: 120, default_expires: 90 };
        let manager = RegistrarManager::new(store.clone(), config);
        manager
            .handle_register(&register_request(Some("<sip:bob@192.0.2.1:5060>;expires=9999"), 1))
            .await;
        let contacts = store.get("bob@example.com").await;
        assert_eq!(contacts.len(), 1);
        assert!(contacts[0].remaining_seconds(Utc::now()) <= 120);
    }
}
