//! The `Validator` trait every chain link implements (spec §4.4).

use async_trait::async_trait;
use sipswitch_core::Request;

use crate::outcome::Outcome;

/// One precondition check in the ordered chain. Implementations must be
/// side-effect free on `Pass`/`Skip` — only `Reject` short-circuits.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn check(&self, request: &Request) -> Outcome;

    /// A short name for tracing spans, e.g. `"syntax"`.
    fn name(&self) -> &'static str;
}
