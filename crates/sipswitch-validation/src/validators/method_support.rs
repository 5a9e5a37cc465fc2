//! Rejects methods outside `Method::SUPPORTED` (spec §4.4 step 2).

use async_trait::async_trait;
use sipswitch_core::{HeaderName, Headers, Method, Request, StatusCode};

use crate::outcome::Outcome;
use crate::validator::Validator;

pub struct MethodSupportValidator;

#[async_trait]
impl Validator for MethodSupportValidator {
    async fn check(&self, request: &Request) -> Outcome {
        if request.method.is_supported() {
            return Outcome::Pass;
        }

        let mut headers = Headers::new();
        let allow = Method::SUPPORTED
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        headers.push(HeaderName::Allow, allow);

        Outcome::Reject {
            status: StatusCode::METHOD_NOT_ALLOWED,
            headers,
            body: Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        "method-support"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipswitch_core::Uri;
    use std::str::FromStr;

    #[tokio::test]
    async fn passes_supported_methods() {
        let req = Request::new(Method::Invite, Uri::from_str("sip:bob@example.com").unwrap());
        assert_eq!(MethodSupportValidator.check(&req).await, Outcome::Pass);
    }

    #[tokio::test]
    async fn rejects_unsupported_method_with_allow_header() {
        let req = Request::new(
            Method::Other("SUBSCRIBE".to_string()),
            Uri::from_str("sip:bob@example.com").unwrap(),
        );
        let outcome = MethodSupportValidator.check(&req).await;
        match outcome {
            Outcome::Reject { status, headers, .. } => {
                assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
                assert!(headers.get(&HeaderName::Allow).unwrap().contains("INVITE"));
            }
            other => panic!("expected reject, got {other:?}"),
        }
    }
}
