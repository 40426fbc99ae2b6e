//! Launch parameters from the page URL query string.
//!
//! `?standalone=true&definition=<id>` runs the app without a control server
//! and pins it to one definition (used for previews and unmanaged kiosks).

/// Parsed launch parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParams {
    /// Run without a control server.
    pub standalone: bool,
    /// Definition to load directly.
    pub definition: Option<String>,
}

impl LaunchParams {
    /// Parse a query string. A leading `?` is optional; unknown keys are
    /// ignored.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        let query = query.trim().trim_start_matches('?');
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = percent_decode(value);
            match percent_decode(key).as_str() {
                "standalone" => params.standalone = value == "true",
                "definition" if !value.is_empty() => params.definition = Some(value),
                _ => {},
            }
        }
        params
    }
}

/// Decode `%XX` escapes and `+` as space. Malformed escapes pass through.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            },
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    },
                    _ => {
                        out.push(b'%');
                        i += 1;
                    },
                }
            },
            b => {
                out.push(b);
                i += 1;
            },
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
