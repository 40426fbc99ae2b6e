//! Content definitions and the app page map.
//!
//! A definition is an arbitrary JSON object owned by the control server.
//! The core only reads its `app` and `uuid`; the rest is handed to the
//! running app untouched.

use kiosk_net::Request;
use kiosk_types::error::{KioskError, Result};
use serde_json::Value;

/// A loaded definition object.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition(Value);

impl Definition {
    /// Wrap `value`, which must be a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_object() {
            Ok(Self(value))
        } else {
            Err(KioskError::Definition(format!(
                "expected an object, got {value}"
            )))
        }
    }

    /// The app this definition is meant for.
    pub fn app(&self) -> Option<&str> {
        self.0.get("app").and_then(Value::as_str)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.0.get("uuid").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// `GET /definitions/<id>/load` on the helper.
pub fn load_request(helper_address: &str, id: &str) -> Request {
    Request::get(helper_address, format!("/definitions/{id}/load"))
}

/// Unpack a `{success, definition}` load response.
pub fn parse_load_response(id: &str, response: &Value) -> Result<Definition> {
    let success = response
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !success {
        let reason = response
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("helper reported failure");
        return Err(KioskError::Definition(format!("{id}: {reason}")));
    }
    match response.get("definition") {
        Some(def) => Definition::from_value(def.clone())
            .map_err(|e| KioskError::Definition(format!("{id}: {e}"))),
        None => Err(KioskError::Definition(format!(
            "{id}: response has no definition"
        ))),
    }
}

/// App name used for the escape hatch that navigates to a custom path.
pub const OTHER_APP: &str = "other";

const APP_PAGES: &[(&str, &str)] = &[
    ("dmx_control", "/dmx_control.html"),
    ("image_compare", "/image_compare.html"),
    ("infostation", "/infostation.html"),
    ("media_browser", "/media_browser.html"),
    ("media_player", "/media_player.html"),
    ("timelapse_viewer", "/timelapse_viewer.html"),
    ("timeline_explorer", "/timeline_explorer.html"),
    ("voting_kiosk", "/voting_kiosk.html"),
    ("word_cloud_input", "/word_cloud_input.html"),
    ("word_cloud_viewer", "/word_cloud_viewer.html"),
];

/// Page path for `app`. `other` resolves to `other_path`; unknown apps
/// resolve to nothing.
pub fn app_page(app: &str, other_path: Option<&str>) -> Option<String> {
    if app == OTHER_APP {
        return other_path.filter(|p| !p.is_empty()).map(str::to_string);
    }
    APP_PAGES
        .iter()
        .find(|(name, _)| *name == app)
        .map(|(_, page)| (*page).to_string())
}
