//! The ordered precondition chain that runs before a request reaches
//! its method handler (spec §4.4): syntax → method support → loop
//! detection → session-timer → authentication.

pub mod chain;
pub mod error;
pub mod outcome;
pub mod validator;
pub mod validators;

pub use chain::ValidatorChain;
pub use error::{Result, ValidationError};
pub use outcome::Outcome;
pub use validator::Validator;
pub use validators::{
    AuthenticationValidator, LoopDetectionValidator, MethodSupportValidator,
    SessionTimerValidator, SyntaxValidator,
};
