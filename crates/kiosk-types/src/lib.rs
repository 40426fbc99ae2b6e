//! Foundation types for the exhibit kiosk runtime.
//!
//! Shared by every kiosk crate: the error enum, the on-disk configuration,
//! and the URL-query launch parameters that select standalone mode.

pub mod config;
pub mod error;
pub mod launch;
