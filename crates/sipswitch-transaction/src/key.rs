//! Transaction matching (RFC 3261 §17.2.3): branch + sent-by + method, with
//! the ACK-to-non-2xx special case folded into the key's `is_ack` flag so
//! an ACK to a non-2xx final response matches its INVITE server
//! transaction rather than needing one of its own.

use std::fmt;

use sipswitch_core::Method;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub branch: String,
    pub sent_by: String,
    /// The method used for matching. ACKs to a non-2xx final response use
    /// `"INVITE"` here (per §17.1.1.3), not `"ACK"`, so the key collides
    /// with the original INVITE server transaction's key.
    pub method: String,
}

impl TransactionKey {
    pub fn new(branch: impl Into<String>, sent_by: impl Into<String>, method: &Method) -> Self {
        let method_token = if matches!(method, Method::Ack) {
            "INVITE".to_string()
        } else {
            method.as_str().to_string()
        };
        TransactionKey {
            branch: branch.into(),
            sent_by: sent_by.into(),
            method: method_token,
        }
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{}", self.branch, self.sent_by, self.method)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    ClientInvite,
    ServerInvite,
    ClientNonInvite,
    ServerNonInvite,
}

impl TransactionKind {
    pub fn for_method(method: &Method, is_client: bool) -> Self {
        match (matches!(method, Method::Invite), is_client) {
            (true, true) => TransactionKind::ClientInvite,
            (true, false) => TransactionKind::ServerInvite,
            (false, true) => TransactionKind::ClientNonInvite,
            (false, false) => TransactionKind::ServerNonInvite,
        }
    }

    pub fn is_invite(&self) -> bool {
        matches!(self, TransactionKind::ClientInvite | TransactionKind::ServerInvite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_to_non_2xx_matches_invite_key() {
        let ack_key = TransactionKey::new("z9hG4bK1", "host:5060", &Method::Ack);
        let invite_key = TransactionKey::new("z9hG4bK1", "host:5060", &Method::Invite);
        assert_eq!(ack_key, invite_key);
    }

    #[test]
    fn different_branches_do_not_collide() {
        let a = TransactionKey::new("z9hG4bK1", "host:5060", &Method::Invite);
        let b = TransactionKey::new("z9hG4bK2", "host:5060", &Method::Invite);
        assert_ne!(a, b);
    }
}
