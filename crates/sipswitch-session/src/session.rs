//! The `Session` record (spec §3): created on a 2xx to INVITE carrying
//! `Session-Expires`, destroyed on BYE or timer expiry.

use chrono::{DateTime, Utc};

/// Which party is responsible for sending the next session refresh
/// (RFC 4028 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresher {
    Uac,
    Uas,
}

impl Refresher {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "uac" => Some(Refresher::Uac),
            "uas" => Some(Refresher::Uas),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Refresher::Uac => "uac",
            Refresher::Uas => "uas",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub call_id: String,
    pub from_tag: String,
    pub to_tag: String,
    pub expires_at: DateTime<Utc>,
    pub refresher: Refresher,
    pub min_se: i64,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
