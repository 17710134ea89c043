//! Shared types for the video API gateway workspace
//!
//! `Secret` keeps API keys out of logs and Debug output; `Error` covers
//! configuration loading for the service binary.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
