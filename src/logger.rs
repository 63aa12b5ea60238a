use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::diff::diff_json;

/// Replacement for personally identifying values.
const REDACTED: &str = "REDACTED";

/// Keys whose values never reach the message log, matched case-insensitively.
const SENSITIVE_KEYS: &[&str] = &[
    "locationid",
    "streetaddress",
    "city",
    "postcode",
    "userid",
    "username",
    "firstname",
    "lastname",
    "gatewayid",
    "mac",
    "crc",
    "password",
    "access_token",
    "refresh_token",
    "sessionid",
];

/// What the message log records for each response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    /// Every body in full.
    Full,
    /// First body per endpoint in full, then only the paths that changed.
    Diffed,
}

/// NDJSON log of remote traffic. A request and its response share an `id`.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous: HashMap<String, Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, id: Uuid, method: &str, path: &str, body: Option<&Value>) {
        let body = body.map(redacted);
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "id": id.to_string(),
            "dir": "req",
            "method": method,
            "path": path,
            "body": body,
        });
        self.write_line(&entry);
    }

    pub fn log_response(&mut self, id: Uuid, method: &str, path: &str, status: u16, body: &Value) {
        let body = redacted(body);
        let mut entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "id": id.to_string(),
            "dir": "resp",
            "method": method,
            "path": path,
            "status": status,
        });

        match self.mode {
            MessageLogMode::Full => entry["body"] = body,
            MessageLogMode::Diffed => {
                let endpoint = format!("{method} {path}");
                match self.previous.get(&endpoint) {
                    None => {
                        entry["full"] = json!(true);
                        entry["body"] = body.clone();
                    }
                    Some(prev) => {
                        let mut changes = Vec::new();
                        diff_json(prev, &body, "", &mut changes);
                        entry["changes"] = changes
                            .into_iter()
                            .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                            .collect();
                    }
                }
                self.previous.insert(endpoint, body);
            }
        }
        self.write_line(&entry);
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}

fn redacted(value: &Value) -> Value {
    let mut value = value.clone();
    redact(&mut value);
    value
}

pub(crate) fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                let lower = key.to_ascii_lowercase();
                if SENSITIVE_KEYS.contains(&lower.as_str()) {
                    *v = json!(REDACTED);
                } else {
                    redact(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}
