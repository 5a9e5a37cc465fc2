//! Structural checks the parser's grammar doesn't already enforce
//! (spec §3 "Validation" / §4.4 step 1): `CSeq`'s numeric prefix must fit
//! a 32-bit count and its method token must match the request line,
//! `Max-Forwards` must be a decimal in `[0, 255]`, and the request-URI's
//! host must be non-empty.

use async_trait::async_trait;
use sipswitch_core::{Request, StatusCode};

use crate::outcome::Outcome;
use crate::validator::Validator;

pub struct SyntaxValidator;

#[async_trait]
impl Validator for SyntaxValidator {
    async fn check(&self, request: &Request) -> Outcome {
        if request.request_uri.host.trim().is_empty() {
            return Outcome::reject(StatusCode::BAD_REQUEST);
        }

        let Some(cseq) = request.cseq() else {
            return Outcome::reject(StatusCode::BAD_REQUEST);
        };
        let Some((number, method_token)) = cseq.split_once(char::is_whitespace) else {
            return Outcome::reject(StatusCode::BAD_REQUEST);
        };
        if number.trim().parse::<u32>().is_err() {
            return Outcome::reject(StatusCode::BAD_REQUEST);
        }
        if method_token.trim() != request.method.as_str() {
            return Outcome::reject(StatusCode::BAD_REQUEST);
        }

        if request.max_forwards().is_none() {
            return Outcome::reject(StatusCode::BAD_REQUEST);
        }

        Outcome::Pass
    }

    fn name(&self) -> &'static str {
        "syntax"
    }
}
