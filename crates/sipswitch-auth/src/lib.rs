//! RFC 2617 MD5 Digest authentication (spec §4.5): challenge issuance,
//! nonce lifecycle, and response verification against a collaborator
//! [`UserStore`].

pub mod digest;
pub mod error;
pub mod nonce;
pub mod user;

pub use digest::{
    compute_ha1, compute_ha2, compute_response, ChallengeScope, DigestAuthenticator,
    DigestCredentials,
};
pub use error::{AuthError, Result};
pub use nonce::{Nonce, NonceManager, NonceValidity};
pub use user::{InMemoryUserStore, User, UserStore};
