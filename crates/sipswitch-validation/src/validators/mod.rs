pub mod auth;
pub mod loop_detection;
pub mod method_support;
pub mod session_timer;
pub mod syntax;

pub use auth::AuthenticationValidator;
pub use loop_detection::LoopDetectionValidator;
pub use method_support::MethodSupportValidator;
pub use session_timer::SessionTimerValidator;
pub use syntax::SyntaxValidator;
