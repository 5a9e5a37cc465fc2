//! RFC 4028 Session-Timer tracking: per-dialog expiry, refresh on
//! re-INVITE/UPDATE, and BYE-on-expiry notification (spec §4.7).

pub mod error;
pub mod manager;
pub mod session;

pub use error::{Result, SessionError};
pub use manager::{SessionEvent, SessionManager};
pub use session::{Refresher, Session};
