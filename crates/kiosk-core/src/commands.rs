//! Command vocabulary carried in the `commands` list of an update.
//!
//! Tokens are matched case-sensitively. [`plan`] turns a token list into
//! the effects the session then carries out in order.

use std::fmt;

use kiosk_net::{Method, Request};

use crate::state::Permissions;

/// Prefix of the DMX scene command (`set_dmx_scene__<id>`).
pub const DMX_SCENE_PREFIX: &str = "set_dmx_scene__";

/// Permission that gates `refresh_page`.
pub const REFRESH_PERMISSION: &str = "refresh";

/// A recognized (or unrecognized) command token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Restart,
    Shutdown,
    SleepDisplays,
    WakeDisplays,
    RefreshPage,
    ReloadDefaults,
    SetDmxScene(String),
    Unknown(String),
}

impl Command {
    pub fn parse(token: &str) -> Self {
        match token {
            "restart" => Self::Restart,
            "shutdown" | "power_off" => Self::Shutdown,
            "sleepDisplay" | "sleepDisplays" => Self::SleepDisplays,
            "wakeDisplay" | "wakeDisplays" | "power_on" => Self::WakeDisplays,
            "refresh_page" => Self::RefreshPage,
            "reloadDefaults" => Self::ReloadDefaults,
            _ => match token.strip_prefix(DMX_SCENE_PREFIX) {
                Some(scene) if !scene.is_empty() => Self::SetDmxScene(scene.to_string()),
                _ => Self::Unknown(token.to_string()),
            },
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restart => write!(f, "restart"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::SleepDisplays => write!(f, "sleepDisplay"),
            Self::WakeDisplays => write!(f, "wakeDisplay"),
            Self::RefreshPage => write!(f, "refresh_page"),
            Self::ReloadDefaults => write!(f, "reloadDefaults"),
            Self::SetDmxScene(scene) => write!(f, "{DMX_SCENE_PREFIX}{scene}"),
            Self::Unknown(token) => write!(f, "{token}"),
        }
    }
}

/// What a command asks the session to do.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEffect {
    /// Fire-and-forget request to the helper.
    Helper(Request),
    /// Reload the running app.
    ReloadPage,
    /// Ask the helper for its defaults again.
    ReloadDefaults,
}

/// Effects for `tokens`, in token order. Unknown and denied commands are
/// logged and produce nothing.
pub fn plan(tokens: &[String], helper_address: &str, permissions: &Permissions) -> Vec<CommandEffect> {
    let mut effects = Vec::with_capacity(tokens.len());
    for token in tokens {
        let command = Command::parse(token);
        let effect = match command {
            Command::Restart => Some(power_action(helper_address, "/restart")),
            Command::Shutdown => Some(power_action(helper_address, "/shutdown")),
            Command::SleepDisplays => Some(CommandEffect::Helper(Request::get(
                helper_address,
                "/sleepDisplay",
            ))),
            Command::WakeDisplays => Some(CommandEffect::Helper(Request::get(
                helper_address,
                "/wakeDisplay",
            ))),
            Command::SetDmxScene(ref scene) => Some(CommandEffect::Helper(Request::get(
                helper_address,
                format!("/DMX/setScene/{scene}"),
            ))),
            Command::RefreshPage => {
                if permissions.allows(REFRESH_PERMISSION) {
                    Some(CommandEffect::ReloadPage)
                } else {
                    log::debug!("Ignoring refresh_page: refresh not permitted");
                    None
                }
            },
            Command::ReloadDefaults => Some(CommandEffect::ReloadDefaults),
            Command::Unknown(ref token) => {
                log::warn!("Unrecognized command: {token}");
                None
            },
        };
        if let Some(effect) = effect {
            log::info!("Command: {command}");
            effects.push(effect);
        }
    }
    effects
}

/// Power actions are bodiless POSTs.
fn power_action(helper_address: &str, endpoint: &str) -> CommandEffect {
    CommandEffect::Helper(Request {
        method: Method::Post,
        ..Request::get(helper_address, endpoint)
    })
}
