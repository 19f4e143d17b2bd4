//! Shared types for the proctoring pipeline services
//!
//! Every binary (intake server, chunk worker, batch compactor, finalizer)
//! links this crate for its error type and root folder resolution.

pub mod config;
pub mod error;

pub use error::{Error, Result};
