//! SIP message model, parser, and serializer (RFC 3261 §4, §7, §25).
//!
//! This crate is the wire boundary: it turns bytes into a [`message::SipMessage`]
//! and back, and nothing else. Transaction matching, routing, and
//! authentication live in their own crates and consume the types here.

pub mod error;
pub mod header;
pub mod message;
pub mod method;
pub mod parser;
pub mod serializer;
pub mod status;
pub mod uri;
pub mod via;

pub use error::{ParseError, Result};
pub use header::{HeaderName, Headers};
pub use message::{Request, Response, SipMessage};
pub use method::Method;
pub use status::StatusCode;
pub use uri::{Scheme, Uri};
pub use via::{new_branch, Via};
