//! Server lifecycle: wiring every component crate into a
//! [`context::ServerContext`], the dispatch loop that drains transport
//! events, and the method handlers invoked once the validation chain
//! passes (spec §2 data flow, §9 "replace global manager singletons...
//! with an explicit `ServerContext`").
//!
//! The binary (`src/bin/sipswitchd.rs`) is the only consumer of this
//! crate; splitting wiring from `main` keeps the startup/shutdown
//! sequence covered by ordinary `#[tokio::test]`s instead of only being
//! exercisable by actually running the daemon.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod session_timer_task;

pub use context::ServerContext;
pub use error::{Error, Result};
