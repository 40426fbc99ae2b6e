//! Process-wide session state, owned by the [`Session`](crate::Session).
//!
//! Created with defaults at start-up and mutated only by the update merger.
//! Nothing here is persisted; a restart begins from defaults again.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use kiosk_types::config::KioskConfig;
use kiosk_types::launch::LaunchParams;
use serde::Serialize;
use serde_json::Value;

use crate::platform::PlatformDetails;

/// Named boolean capabilities granted by the control server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Permissions(BTreeMap<String, bool>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is explicitly granted. Absent means denied.
    pub fn allows(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    pub fn set(&mut self, name: impl Into<String>, granted: bool) {
        self.0.insert(name.into(), granted);
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.0.get(name).copied()
    }
}

impl From<BTreeMap<String, bool>> for Permissions {
    fn from(map: BTreeMap<String, bool>) -> Self {
        Self(map)
    }
}

impl<const N: usize> From<[(&str, bool); N]> for Permissions {
    fn from(entries: [(&str, bool); N]) -> Self {
        Self(entries.iter().map(|(k, v)| ((*k).to_string(), *v)).collect())
    }
}

/// Error flag key for missing content warnings.
pub const ERROR_MISSING_CONTENT: &str = "missingContentWarnings";

/// Error flag key for a pending software update.
pub const ERROR_SOFTWARE_UPDATE: &str = "software_update";

/// Mutable configuration and identity of the running kiosk.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// Component identity; a `TEMP <millis>` placeholder until assigned.
    pub id: String,
    pub group: String,
    pub app_id: String,
    pub helper_address: String,
    /// Empty while no control server is configured.
    pub server_address: String,
    pub current_definition: String,
    pub current_exhibit: String,
    /// Legacy content list.
    pub current_content: Vec<String>,
    pub permissions: Permissions,
    /// Error flags reported upstream with each ping.
    pub error_dict: BTreeMap<String, Value>,
    pub standalone: bool,
    platform_details: PlatformDetails,
}

impl SessionState {
    pub fn new(config: &KioskConfig, launch: &LaunchParams) -> Self {
        Self {
            id: placeholder_id(),
            group: "Default".to_string(),
            app_id: config.app_id.clone(),
            helper_address: config.helper_address.clone(),
            server_address: String::new(),
            current_definition: String::new(),
            current_exhibit: String::new(),
            current_content: Vec::new(),
            permissions: Permissions::new(),
            error_dict: BTreeMap::new(),
            standalone: launch.standalone,
            platform_details: PlatformDetails::detect(),
        }
    }

    pub fn platform_details(&self) -> &PlatformDetails {
        &self.platform_details
    }

    /// Whether a control server should be pinged.
    pub fn has_server(&self) -> bool {
        !self.standalone && !self.server_address.is_empty()
    }
}

fn placeholder_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("TEMP {millis}")
}
