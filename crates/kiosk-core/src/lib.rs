//! Exhibit kiosk synchronization core.
//!
//! A kiosk app polls its local helper and, when one is configured, pings a
//! remote control server. Every response is a partial update merged into
//! the [`SessionState`]; changes to the active definition trigger a reload
//! or a switch to another app, and a small command vocabulary drives the
//! helper's power actions. The host frame loop drives everything through
//! [`Session::tick`] and reacts to the [`SessionEvent`]s it drains.

// Re-exports from kiosk-types and kiosk-net.
pub use kiosk_net as net;
pub use kiosk_types::config;
pub use kiosk_types::error;
pub use kiosk_types::launch;

pub mod commands;
pub mod definition;
pub mod platform;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod update;

#[cfg(test)]
pub(crate) mod test_utils;

pub use commands::{Command, CommandEffect};
pub use definition::Definition;
pub use platform::PlatformDetails;
pub use session::{MergeOutcome, Session, SessionEvent};
pub use state::{Permissions, SessionState};
pub use update::{Update, UpdateSource, arrays_equal};
