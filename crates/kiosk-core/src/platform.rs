//! Host platform details reported to the control server.

use serde::Serialize;

/// OS and client strings, collected once when the session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformDetails {
    /// Operating system name (`linux`, `windows`, `macos`, ...).
    pub operating_system: String,
    /// CPU architecture.
    pub architecture: String,
    /// Identifies this runtime in place of a browser user agent.
    #[serde(rename = "browser")]
    pub client: String,
}

impl PlatformDetails {
    /// Details of the machine this process runs on.
    pub fn detect() -> Self {
        Self {
            operating_system: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            client: format!("kiosk-runtime {}", env!("CARGO_PKG_VERSION")),
        }
    }
}
