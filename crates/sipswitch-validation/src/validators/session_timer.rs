//! RFC 4028 session interval enforcement on INVITE (spec §4.4 step 4):
//! missing timer support is rejected with 421 before any credential
//! check ever runs, which is exactly why this validator sits ahead of
//! [`super::auth::AuthenticationValidator`] in the chain rather than
//! behind it.

use async_trait::async_trait;
use sipswitch_core::{HeaderName, Headers, Method, Request, StatusCode};

use crate::outcome::Outcome;
use crate::validator::Validator;

pub struct SessionTimerValidator {
    pub min_se: i64,
    pub max_se: i64,
    pub require_support: bool,
}

impl SessionTimerValidator {
    pub fn new(min_se: i64, max_se: i64, require_support: bool) -> Self {
        SessionTimerValidator { min_se, max_se, require_support }
    }

    fn supports_timer(request: &Request) -> bool {
        header_lists_token(request, &HeaderName::Supported, "timer")
            || header_lists_token(request, &HeaderName::Require, "timer")
    }
}

fn header_lists_token(request: &Request, name: &HeaderName, token: &str) -> bool {
    request
        .headers
        .get_all(name)
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

#[async_trait]
impl Validator for SessionTimerValidator {
    async fn check(&self, request: &Request) -> Outcome {
        if request.method != Method::Invite {
            return Outcome::Skip;
        }
        if !self.require_support {
            return Outcome::Skip;
        }

        let Some(raw) = request.headers.get(&HeaderName::SessionExpires) else {
            if Self::supports_timer(request) {
                return Outcome::Pass;
            }
            let mut headers = Headers::new();
            headers.push(HeaderName::Require, "timer");
            return Outcome::Reject { status: StatusCode::EXTENSION_REQUIRED, headers, body: Vec::new() };
        };

        let value = raw.split(';').next().unwrap_or(raw).trim();
        let Ok(session_expires) = value.parse::<i64>() else {
            return Outcome::reject(StatusCode::BAD_REQUEST);
        };

        if session_expires < self.min_se {
            let mut headers = Headers::new();
            headers.push(HeaderName::MinSe, self.min_se.to_string());
            return Outcome::Reject { status: StatusCode::INTERVAL_TOO_BRIEF, headers, body: Vec::new() };
        }

        // Above max_se: spec allows clamp-and-accept rather than reject;
        // the proxy/session manager applies the clamp when it records
        // the session, so this validator only guards against malformed
        // or too-small values.
        let _ = self.max_se;

        Outcome::Pass
    }

    fn name(&self) -> &'static str {
        "session-timer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipswitch_core::Uri;
    use std::str::FromStr;

    fn invite() -> Request {
        Request::new(Method::Invite, Uri::from_str("sip:bob@example.com").unwrap())
    }

    #[tokio::test]
    async fn skips_non_invite_methods() {
        let req = Request::new(Method::Bye, Uri::from_str("sip:bob@example.com").unwrap());
        let validator = SessionTimerValidator::new(90, 3600, true);
        assert_eq!(validator.check(&req).await, Outcome::Skip);
    }

    #[tokio::test]
    async fn rejects_missing_session_expires_without_support() {
        let validator = SessionTimerValidator::new(90, 3600, true);
        let outcome = validator.check(&invite()).await;
        match outcome {
            Outcome::Reject { status, headers, .. } => {
                assert_eq!(status, StatusCode::EXTENSION_REQUIRED);
                assert_eq!(headers.get(&HeaderName::Require), Some("timer"));
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn passes_when_supported_header_lists_timer() {
        let mut req = invite();
        req.headers.push(HeaderName::Supported, "timer");
        let validator = SessionTimerValidator::new(90, 3600, true);
        assert_eq!(validator.check(&req).await, Outcome::Pass);
    }

    #[tokio::test]
    async fn rejects_interval_below_min_se() {
        let mut req = invite();
        req.headers.push(HeaderName::SessionExpires, "30");
        let validator = SessionTimerValidator::new(90, 3600, true);
        let outcome = validator.check(&req).await;
        match outcome {
            Outcome::Reject { status, headers, .. } => {
                assert_eq!(status, StatusCode::INTERVAL_TOO_BRIEF);
                assert_eq!(headers.get(&HeaderName::MinSe), Some("90"));
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn accepts_interval_within_bounds() {
        let mut req = invite();
        req.headers.push(HeaderName::SessionExpires, "1800;refresher=uac");
        let validator = SessionTimerValidator::new(90, 3600, true);
        assert_eq!(validator.check(&req).await, Outcome::Pass);
    }
}
