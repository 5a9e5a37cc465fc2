//! The registrar (spec §4.6): AOR→contact storage with expiry,
//! Call-ID/CSeq anti-replay, and wildcard de-registration.

pub mod contact;
pub mod error;
pub mod manager;
pub mod store;

pub use contact::{ParsedContact, RegistrarContact};
pub use error::{RegistrarError, Result};
pub use manager::{RegistrarConfig, RegistrarManager};
pub use store::{InMemoryRegistrationStore, RegistrationStore};
