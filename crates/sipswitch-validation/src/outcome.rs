//! The three-way result every validator returns (spec §4.4).

use sipswitch_core::{Headers, StatusCode};

/// What a single validator decided about a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to object to; the chain continues.
    Pass,
    /// This validator doesn't apply to the request at hand (e.g. the
    /// session-timer validator on a non-INVITE); the chain continues.
    Skip,
    /// A precondition failed; the chain stops here and this response is
    /// sent as-is.
    Reject {
        status: StatusCode,
        headers: Headers,
        body: Vec<u8>,
    },
}

impl Outcome {
    /// Builds a `Reject` with no extra headers and an empty body.
    pub fn reject(status: StatusCode) -> Self {
        Outcome::Reject { status, headers: Headers::new(), body: Vec::new() }
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Outcome::Reject { .. })
    }
}
