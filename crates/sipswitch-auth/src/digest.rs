//! RFC 2617 MD5 Digest: challenge generation, `Authorization` parsing,
//! and response verification (spec §4.5).

use std::sync::Arc;

use sipswitch_core::{Method, Request};

use crate::error::{AuthError, Result};
use crate::nonce::{NonceManager, NonceValidity};
use crate::user::UserStore;

/// The parsed fields of an `Authorization: Digest ...` or
/// `Proxy-Authorization: Digest ...` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCredentials {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
}

impl DigestCredentials {
    /// Parses the header value following the `Digest` scheme token,
    /// e.g. `username="alice", realm="sipswitch", nonce="...", uri="...",
    /// response="..."`.
    pub fn parse(header_value: &str) -> Result<Self> {
        let rest = header_value
            .trim()
            .strip_prefix("Digest")
            .ok_or(AuthError::MalformedHeader)?
            .trim();

        let mut fields = std::collections::HashMap::new();
        for part in split_params(rest) {
            let (key, value) = part.split_once('=').ok_or(AuthError::MalformedHeader)?;
            let value = value.trim().trim_matches('"');
            fields.insert(key.trim().to_ascii_lowercase(), value.to_string());
        }

        let get = |k: &str| fields.get(k).cloned().ok_or(AuthError::MalformedHeader);
        Ok(DigestCredentials {
            username: get("username")?,
            realm: get("realm")?,
            nonce: get("nonce")?,
            uri: get("uri")?,
            response: get("response")?,
            qop: fields.get("qop").cloned(),
            nc: fields.get("nc").cloned(),
            cnonce: fields.get("cnonce").cloned(),
        })
    }
}

/// Splits `a=b, c="d,e", f=g` on top-level commas, respecting quotes so a
/// comma inside a quoted value is not treated as a separator.
fn split_params(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = s[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

pub fn compute_ha1(username: &str, realm: &str, password: &str) -> String {
    md5_hex(format!("{}:{}:{}", username, realm, password))
}

pub fn compute_ha2(method: &str, uri: &str) -> String {
    md5_hex(format!("{}:{}", method, uri))
}

/// Classic (non-qop) response: `MD5(HA1:nonce:HA2)`. When the client
/// supplied `qop=auth`, RFC 2617 §3.2.2.1 folds in `nc` and `cnonce` too.
pub fn compute_response(ha1: &str, nonce: &str, ha2: &str, qop: Option<&str>, nc: Option<&str>, cnonce: Option<&str>) -> String {
    match (qop, nc, cnonce) {
        (Some(qop), Some(nc), Some(cnonce)) => {
            md5_hex(format!("{}:{}:{}:{}:{}:{}", ha1, nonce, nc, cnonce, qop, ha2))
        }
        _ => md5_hex(format!("{}:{}:{}", ha1, nonce, ha2)),
    }
}

fn md5_hex(input: String) -> String {
    hex::encode(md5::compute(input.as_bytes()).0)
}

/// Which header a challenge or credential rejection belongs on, per
/// spec §4.4's split between registrar-scope (401/`WWW-Authenticate`)
/// and proxy-scope (407/`Proxy-Authenticate`) authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeScope {
    WwwAuthenticate,
    ProxyAuthenticate,
}

impl ChallengeScope {
    pub fn header_name(self) -> &'static str {
        match self {
            ChallengeScope::WwwAuthenticate => "WWW-Authenticate",
            ChallengeScope::ProxyAuthenticate => "Proxy-Authenticate",
        }
    }

    pub fn status_code(self) -> sipswitch_core::StatusCode {
        match self {
            ChallengeScope::WwwAuthenticate => sipswitch_core::StatusCode::UNAUTHORIZED,
            ChallengeScope::ProxyAuthenticate => sipswitch_core::StatusCode::PROXY_AUTH_REQUIRED,
        }
    }
}

/// Verifies Digest credentials against a [`UserStore`] and a
/// [`NonceManager`], and renders fresh challenges on demand.
pub struct DigestAuthenticator<S: UserStore> {
    store: Arc<S>,
    nonces: Arc<NonceManager>,
}

impl<S: UserStore> DigestAuthenticator<S> {
    pub fn new(store: Arc<S>, nonces: Arc<NonceManager>) -> Self {
        DigestAuthenticator { store, nonces }
    }

    /// Renders a challenge header value, e.g.
    /// `Digest realm="sipswitch", nonce="...", stale=true`.
    pub fn challenge(&self) -> String {
        let nonce = self.nonces.issue();
        format!("Digest realm=\"{}\", nonce=\"{}\"", nonce.realm, nonce.value)
    }

    pub fn stale_challenge(&self) -> String {
        let nonce = self.nonces.issue();
        format!("Digest realm=\"{}\", nonce=\"{}\", stale=true", nonce.realm, nonce.value)
    }

    /// Verifies a credential header against `request`. Returns
    /// [`AuthError::StaleNonce`] specifically when the only problem is
    /// an expired (but previously issued) nonce, so the caller can
    /// reissue with `stale=true` rather than treat it as a hard failure.
    pub async fn verify(&self, request: &Request, header_value: &str) -> Result<()> {
        let creds = DigestCredentials::parse(header_value)?;

        match self.nonces.validate(&creds.nonce) {
            NonceValidity::Valid => {}
            NonceValidity::Stale => return Err(AuthError::StaleNonce),
            NonceValidity::Unknown => return Err(AuthError::BadDigest),
        }

        let ha1 = self
            .store
            .get_ha1(&creds.username, &creds.realm)
            .await
            .ok_or_else(|| AuthError::UnknownUser(creds.username.clone()))?;

        let method_token = method_for_response(&request.method);
        let ha2 = compute_ha2(&method_token, &creds.uri);
        let expected = compute_response(
            &ha1,
            &creds.nonce,
            &ha2,
            creds.qop.as_deref(),
            creds.nc.as_deref(),
            creds.cnonce.as_deref(),
        );

        if expected == creds.response {
            Ok(())
        } else {
            Err(AuthError::BadDigest)
        }
    }
}

fn method_for_response(method: &Method) -> String {
    method.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::InMemoryUserStore;
    use sipswitch_core::Uri;
    use std::str::FromStr;
    use std::time::Duration;

    fn sample_request() -> Request {
        Request::new(Method::Register, Uri::from_str("sip:registrar.example.com").unwrap())
    }

    #[tokio::test]
    async fn verifies_a_correctly_computed_response() {
        let store = Arc::new(InMemoryUserStore::new());
        store.add_user("alice", "sipswitch", "hunter2");
        let nonces = NonceManager::new("sipswitch", Duration::from_secs(300));
        let auth = DigestAuthenticator::new(store, nonces.clone());
        let nonce = nonces.issue();

        let ha1 = compute_ha1("alice", "sipswitch", "hunter2");
        let ha2 = compute_ha2("REGISTER", "sip:registrar.example.com");
        let response = compute_response(&ha1, &nonce.value, &ha2, None, None, None);

        let header = format!(
            "Digest username=\"alice\", realm=\"sipswitch\", nonce=\"{}\", uri=\"sip:registrar.example.com\", response=\"{}\"",
            nonce.value, response
        );

        assert!(auth.verify(&sample_request(), &header).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_wrong_password() {
        let store = Arc::new(InMemoryUserStore::new());
        store.add_user("alice", "sipswitch", "hunter2");
        let nonces = NonceManager::new("sipswitch", Duration::from_secs(300));
        let auth = DigestAuthenticator::new(store, nonces.clone());
        let nonce = nonces.issue();

        let ha1 = compute_ha1("alice", "sipswitch", "WRONG");
        let ha2 = compute_ha2("REGISTER", "sip:registrar.example.com");
        let response = compute_response(&ha1, &nonce.value, &ha2, None, None, None);
        let header = format!(
            "Digest username=\"alice\", realm=\"sipswitch\", nonce=\"{}\", uri=\"sip:registrar.example.com\", response=\"{}\"",
            nonce.value, response
        );

        let err = auth.verify(&sample_request(), &header).await.unwrap_err();
        assert_eq!(err, AuthError::BadDigest);
    }

    #[tokio::test]
    async fn stale_nonce_reported_distinctly() {
        let store = Arc::new(InMemoryUserStore::new());
        store.add_user("alice", "sipswitch", "hunter2");
        let nonces = NonceManager::new("sipswitch", Duration::from_millis(5));
        let auth = DigestAuthenticator::new(store, nonces.clone());
        let nonce = nonces.issue();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let header = format!(
            "Digest username=\"alice\", realm=\"sipswitch\", nonce=\"{}\", uri=\"sip:registrar.example.com\", response=\"deadbeef\"",
            nonce.value
        );
        let err = auth.verify(&sample_request(), &header).await.unwrap_err();
        assert_eq!(err, AuthError::StaleNonce);
    }

    #[test]
    fn splits_quoted_params_correctly() {
        let parts = split_params(r#"username="alice", realm="sipswitch", nonce="a,b""#);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2], r#"nonce="a,b""#);
    }
}
