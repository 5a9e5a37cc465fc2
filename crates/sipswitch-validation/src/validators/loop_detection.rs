//! Rejects requests whose `Max-Forwards` would go negative once the
//! proxy decrements it (spec §4.4 step 3). The decrement itself happens
//! in the proxy engine; this validator only checks the precondition.

use async_trait::async_trait;
use sipswitch_core::{Request, StatusCode};

use crate::outcome::Outcome;
use crate::validator::Validator;

pub struct LoopDetectionValidator;

#[async_trait]
impl Validator for LoopDetectionValidator {
    async fn check(&self, request: &Request) -> Outcome {
        match request.max_forwards() {
            Some(0) | None => Outcome::reject(StatusCode::TOO_MANY_HOPS),
            Some(_) => Outcome::Pass,
        }
    }

    fn name(&self) -> &'static str {
        "loop-detection"
    }
}
