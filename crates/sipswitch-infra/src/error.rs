//! The top-level error type the server binary deals in, and the
//! `ErrorContext`/`ErrorExt` pair every other crate's errors get wrapped
//! in when they cross into infra-owned code (config loading, lifecycle).
//!
//! Grounded on `infra-common::errors::context::{ErrorContext, ErrorExt}`.

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Custom(String),
}

/// Names the component and operation an error occurred in, so a bare
/// `NotFound` or `Internal` doesn't leave the reader guessing which
/// sweeper or listener produced it.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub component: String,
    pub operation: String,
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        ErrorContext { component: component.into(), operation: operation.into(), details: None }
    }

    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in component '{}' during operation '{}'", self.component, self.operation)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

pub trait ErrorExt {
    fn context(self, ctx: ErrorContext) -> Error;
}

impl ErrorExt for Error {
    fn context(self, ctx: ErrorContext) -> Error {
        Error::Internal(format!("{self} [{ctx}]"))
    }
}

impl ErrorExt for std::io::Error {
    fn context(self, ctx: ErrorContext) -> Error {
        Error::Internal(format!("{self} [{ctx}]"))
    }
}
