//! Events a transaction reports upward to its Transaction User (the
//! validation chain / proxy engine), mirroring `dialog-core`'s
//! `TransactionEvent` channel.

use sipswitch_core::{Request, Response};

use crate::key::TransactionKey;

#[derive(Debug, Clone)]
pub enum TransactionEvent {
    /// A provisional (1xx) response arrived on a client transaction.
    Provisional { key: TransactionKey, response: Response },
    /// A final response arrived (or was synthesized, e.g. Timer B → 408).
    Final { key: TransactionKey, response: Response },
    /// A server transaction received a new request needing a TU response
    /// (first time the request's been seen, not a retransmission).
    NewRequest { key: TransactionKey, request: Request },
    /// A server transaction received a retransmission of the original
    /// request while in Proceeding (no response yet) or Completed
    /// (retransmits the last final response).
    Retransmission { key: TransactionKey },
    TransportFailure { key: TransactionKey, error: String },
    Terminated { key: TransactionKey },
}
