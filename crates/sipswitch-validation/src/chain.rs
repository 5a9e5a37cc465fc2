//! Runs validators in priority order, stopping at the first `Reject`
//! (spec §4.4: "The chain runs in priority order and emits the first
//! `Reject`"). Order is fixed by construction, not by registration time.

use sipswitch_core::Request;
use tracing::debug;

use crate::outcome::Outcome;
use crate::validator::Validator;

pub struct ValidatorChain {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorChain {
    pub fn new(validators: Vec<Box<dyn Validator>>) -> Self {
        ValidatorChain { validators }
    }

    /// Runs every validator in order, returning the first `Reject`
    /// encountered, or `Outcome::Pass` if every validator passed or
    /// skipped.
    pub async fn run(&self, request: &Request) -> Outcome {
        for validator in &self.validators {
            match validator.check(request).await {
                Outcome::Pass | Outcome::Skip => continue,
                reject @ Outcome::Reject { .. } => {
                    debug!(validator = validator.name(), "validation chain rejected request");
                    return reject;
                }
            }
        }
        Outcome::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sipswitch_core::{Method, StatusCode, Uri};
    use std::str::FromStr;

    struct AlwaysPass;
    #[async_trait]
    impl Validator for AlwaysPass {
        async fn check(&self, _request: &Request) -> Outcome {
            Outcome::Pass
        }
        fn name(&self) -> &'static str {
            "always-pass"
        }
    }

    struct AlwaysReject;
    #[async_trait]
    impl Validator for AlwaysReject {
        async fn check(&self, _request: &Request) -> Outcome {
            Outcome::reject(StatusCode::BAD_REQUEST)
        }
        fn name(&self) -> &'static str {
            "always-reject"
        }
    }

    struct PanicsIfCalled;
    #[async_trait]
    impl Validator for PanicsIfCalled {
        async fn check(&self, _request: &Request) -> Outcome {
            panic!("should never run after a reject");
        }
        fn name(&self) -> &'static str {
            "panics-if-called"
        }
    }

    #[tokio::test]
    async fn short_circuits_on_first_reject() {
        let chain = ValidatorChain::new(vec![
            Box::new(AlwaysPass),
            Box::new(AlwaysReject),
            Box::new(PanicsIfCalled),
        ]);
        let req = Request::new(Method::Invite, Uri::from_str("sip:bob@example.com").unwrap());
        let outcome = chain.run(&req).await;
        assert!(outcome.is_reject());
    }

    #[tokio::test]
    async fn passes_when_every_validator_passes() {
        let chain = ValidatorChain::new(vec![Box::new(AlwaysPass), Box::new(AlwaysPass)]);
        let req = Request::new(Method::Invite, Uri::from_str("sip:bob@example.com").unwrap());
        assert_eq!(chain.run(&req).await, Outcome::Pass);
    }
}
