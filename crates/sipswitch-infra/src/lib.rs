//! The ambient stack every sipswitch crate sits on: configuration
//! loading, error context, logging setup, and the component lifecycle
//! that the server binary drives at startup/shutdown.
//!
//! Grounded on `infra-common`'s module split (`config`, `errors`,
//! `logging`, `lifecycle`), narrowed to what a single-process SIP
//! registrar/proxy actually needs rather than the multi-plane event-bus
//! surface the teacher crate also carries.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod shutdown;

pub use config::ServerConfig;
pub use error::{Error, ErrorContext, ErrorExt, Result};
pub use lifecycle::{Component, ComponentState, LifecycleManager};
pub use logging::{setup_logging, LoggingConfig};
pub use shutdown::ShutdownHandle;
