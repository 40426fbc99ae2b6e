//! Partial update messages received from the helper or the control server.
//!
//! Updates are loosely shaped JSON objects. Decoding is total: each known
//! key is read on its own, and a key that is missing, `null`, or of the
//! wrong type decodes to `None` without affecting the others.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// The local helper (`/getDefaults`, `/getUpdate`).
    Helper,
    /// The remote control server (`/system/ping` response).
    Server,
}

impl UpdateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Helper => "helper",
            Self::Server => "server",
        }
    }
}

/// The nested `software_update` object.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareUpdate {
    pub update_available: bool,
    /// The whole object, reported upstream unchanged.
    pub details: Value,
}

/// Prefix of the legacy per-permission keys (`allow_refresh: true`).
const ALLOW_PREFIX: &str = "allow_";

/// One decoded update. Every recognized key is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub commands: Option<Vec<String>>,
    pub id: Option<String>,
    pub group: Option<String>,
    pub server_ip_address: Option<String>,
    /// Accepts either a string or a number on the wire.
    pub server_port: Option<String>,
    pub helper_address: Option<String>,
    pub current_exhibit: Option<String>,
    /// Legacy content list.
    pub content: Option<Vec<String>>,
    pub definition: Option<String>,
    pub permissions: Option<BTreeMap<String, bool>>,
    /// Legacy `allow_<name>` flags keyed by `<name>`.
    pub allow: BTreeMap<String, bool>,
    pub missing_content_warnings: Option<Value>,
    pub software_update: Option<SoftwareUpdate>,
}

impl Update {
    /// Decode the recognized keys of `value`. Anything other than an
    /// object decodes to an empty update.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let allow = obj
            .iter()
            .filter_map(|(key, v)| {
                let name = key.strip_prefix(ALLOW_PREFIX)?;
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), v.as_bool()?))
            })
            .collect();

        Self {
            commands: string_list(obj, "commands"),
            id: string(obj, "id"),
            group: string(obj, "group"),
            server_ip_address: string(obj, "server_ip_address"),
            server_port: obj.get("server_port").and_then(port),
            helper_address: string(obj, "helperAddress"),
            current_exhibit: string(obj, "current_exhibit"),
            content: string_list(obj, "content"),
            definition: string(obj, "definition"),
            permissions: obj.get("permissions").and_then(bool_map),
            allow,
            missing_content_warnings: obj
                .get("missingContentWarnings")
                .filter(|v| !v.is_null())
                .cloned(),
            software_update: obj.get("software_update").and_then(|v| {
                let inner = v.as_object()?;
                Some(SoftwareUpdate {
                    update_available: inner
                        .get("update_available")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    details: v.clone(),
                })
            }),
        }
    }

    /// Whether no recognized key was present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// `http://<ip>:<port>`, only when both halves are present.
    pub fn server_address(&self) -> Option<String> {
        match (&self.server_ip_address, &self.server_port) {
            (Some(ip), Some(port)) => Some(format!("http://{ip}:{port}")),
            _ => None,
        }
    }
}

fn string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// A list of strings; non-string entries are dropped.
fn string_list(obj: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    let items = obj.get(key)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

fn port(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// An object of booleans; non-boolean entries are dropped.
fn bool_map(v: &Value) -> Option<BTreeMap<String, bool>> {
    let obj = v.as_object()?;
    Some(
        obj.iter()
            .filter_map(|(k, v)| Some((k.clone(), v.as_bool()?)))
            .collect(),
    )
}

/// Order-sensitive list comparison: lengths first, then index by index.
pub fn arrays_equal<T: PartialEq>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).all(|(x, y)| x == y)
}
