//! Final link in the chain (spec §4.4 step 5): challenges or verifies
//! credentials for methods that need them. `REGISTER` is challenged in
//! registrar scope (401 / `WWW-Authenticate`); everything else routed
//! toward a user is challenged in proxy scope (407 / `Proxy-Authenticate`),
//! per the split `sipswitch-auth::ChallengeScope` already models.

use std::sync::Arc;

use async_trait::async_trait;
use sipswitch_auth::{AuthError, ChallengeScope, DigestAuthenticator, UserStore};
use sipswitch_core::{HeaderName, Headers, Method, Request};

use crate::outcome::Outcome;
use crate::validator::Validator;

pub struct AuthenticationValidator<S: UserStore> {
    authenticator: Arc<DigestAuthenticator<S>>,
    /// Mirrors `authentication.require_auth` (spec §6): when `false`,
    /// the chain skips credential checks entirely rather than
    /// challenging every non-OPTIONS/ACK request.
    require_auth: bool,
}

impl<S: UserStore> AuthenticationValidator<S> {
    pub fn new(authenticator: Arc<DigestAuthenticator<S>>) -> Self {
        AuthenticationValidator { authenticator, require_auth: true }
    }

    pub fn with_require_auth(authenticator: Arc<DigestAuthenticator<S>>, require_auth: bool) -> Self {
        AuthenticationValidator { authenticator, require_auth }
    }

    /// REGISTER always needs credentials; OPTIONS/ACK never do; any other
    /// method directed at a user (i.e. not targeting the server itself)
    /// does (spec §4.4 step 5, §4.10 rationale).
    fn scope_for(method: &Method) -> Option<ChallengeScope> {
        match method {
            Method::Register => Some(ChallengeScope::WwwAuthenticate),
            Method::Options | Method::Ack => None,
            _ => Some(ChallengeScope::ProxyAuthenticate),
        }
    }

    fn credential_header(scope: ChallengeScope) -> HeaderName {
        match scope {
            ChallengeScope::WwwAuthenticate => HeaderName::Authorization,
            ChallengeScope::ProxyAuthenticate => HeaderName::ProxyAuthorization,
        }
    }
}

#[async_trait]
impl<S: UserStore + Send + Sync> Validator for AuthenticationValidator<S> {
    async fn check(&self, request: &Request) -> Outcome {
        if !self.require_auth {
            return Outcome::Skip;
        }
        let Some(scope) = Self::scope_for(&request.method) else {
            return Outcome::Skip;
        };

        let header_name = Self::credential_header(scope);
        let Some(header_value) = request.headers.get(&header_name) else {
            return challenge(&self.authenticator, scope, false);
        };

        match self.authenticator.verify(request, header_value).await {
            Ok(()) => Outcome::Pass,
            Err(AuthError::StaleNonce) => challenge(&self.authenticator, scope, true),
            Err(_) => challenge(&self.authenticator, scope, false),
        }
    }

    fn name(&self) -> &'static str {
        "authentication"
    }
}

fn challenge<S: UserStore>(
    authenticator: &DigestAuthenticator<S>,
    scope: ChallengeScope,
    stale: bool,
) -> Outcome {
    let value = if stale { authenticator.stale_challenge() } else { authenticator.challenge() };
    let mut headers = Headers::new();
    let name = match scope {
        ChallengeScope::WwwAuthenticate => HeaderName::WwwAuthenticate,
        ChallengeScope::ProxyAuthenticate => HeaderName::ProxyAuthenticate,
    };
    headers.push(name, value);
    Outcome::Reject { status: scope.status_code(), headers, body: Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipswitch_auth::{InMemoryUserStore, NonceManager};
    use sipswitch_core::{StatusCode, Uri};
    use std::str::FromStr;
    use std::time::Duration;

    fn register_request() -> Request {
        Request::new(Method::Register, Uri::from_str("sip:registrar.example.com").unwrap())
    }

    #[tokio::test]
    async fn challenges_register_without_credentials() {
        let store = Arc::new(InMemoryUserStore::new());
        let nonces = NonceManager::new("sipswitch", Duration::from_secs(300));
        let authenticator = Arc::new(DigestAuthenticator::new(store, nonces));
        let validator = AuthenticationValidator::new(authenticator);

        let outcome = validator.check(&register_request()).await;
        match outcome {
            Outcome::Reject { status, headers, .. } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert!(headers.get(&HeaderName::WwwAuthenticate).is_some());
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn skips_everything_when_require_auth_is_false() {
        let store = Arc::new(InMemoryUserStore::new());
        let nonces = NonceManager::new("sipswitch", Duration::from_secs(300));
        let authenticator = Arc::new(DigestAuthenticator::new(store, nonces));
        let validator = AuthenticationValidator::with_require_auth(authenticator, false);

        assert_eq!(validator.check(&register_request()).await, Outcome::Skip);
    }

    #[tokio::test]
    async fn skips_options() {
        let store = Arc::new(InMemoryUserStore::new());
        let nonces = NonceManager::new("sipswitch", Duration::from_secs(300));
        let authenticator = Arc::new(DigestAuthenticator::new(store, nonces));
        let validator = AuthenticationValidator::new(authenticator);

        let req = Request::new(Method::Options, Uri::from_str("sip:registrar.example.com").unwrap());
        assert_eq!(validator.check(&req).await, Outcome::Skip);
    }

    #[tokio::test]
    async fn passes_with_valid_credentials() {
        let store = Arc::new(InMemoryUserStore::new());
        store.add_user("alice", "sipswitch", "hunter2");
        let nonces = NonceManager::new("sipswitch", Duration::from_secs(300));
        let authenticator = Arc::new(DigestAuthenticator::new(store, nonces.clone()));
        let validator = AuthenticationValidator::new(authenticator);

        let nonce = nonces.issue();
        let ha1 = sipswitch_auth::compute_ha1("alice", "sipswitch", "hunter2");
        let ha2 = sipswitch_auth::compute_ha2("REGISTER", "sip:registrar.example.com");
        let response = sipswitch_auth::compute_response(&ha1, &nonce.value, &ha2, None, None, None);
        let mut req = register_request();
        req.headers.push(
            HeaderName::Authorization,
            format!(
                "Digest username=\"alice\", realm=\"sipswitch\", nonce=\"{}\", uri=\"sip:registrar.example.com\", response=\"{}\"",
                nonce.value, response
            ),
        );

        assert_eq!(validator.check(&req).await, Outcome::Pass);
    }
}
