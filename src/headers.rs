//! NATS header block codec.
//!
//! Wire form: `NATS/1.0[ <code>[ <desc>]]\r\n(<k>: <v>\r\n)*\r\n`.

use std::fmt;

use crate::error::NatsError;

const PREFIX: &str = "NATS/1.0";

/// A 503 status with this description is the request/reply layer's
/// no-responders sentinel.
pub const NO_RESPONDERS_DESCRIPTION: &str = "No Responders";

/// An ordered multi-map of case-insensitive header names to value lists,
/// plus an optional status line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NatsHeaders {
    status_code: Option<u16>,
    status_description: Option<String>,
    // Registration-ordered (name, value) pairs. Lookups are case-insensitive;
    // storage keeps the original casing of the first `add` for a given name.
    entries: Vec<(String, String)>,
}

impl NatsHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(code: u16, description: impl Into<String>) -> Self {
        NatsHeaders {
            status_code: Some(code),
            status_description: Some(description.into()),
            entries: Vec::new(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn status_description(&self) -> Option<&str> {
        self.status_description.as_deref()
    }

    pub fn set_status(&mut self, code: u16, description: impl Into<String>) {
        self.status_code = Some(code);
        self.status_description = Some(description.into());
    }

    /// True when this header block is the request/reply layer's
    /// 503-No-Responders sentinel.
    pub fn is_no_responders(&self) -> bool {
        self.status_code == Some(503)
            && self
                .status_description
                .as_deref()
                .map(|d| d.eq_ignore_ascii_case(NO_RESPONDERS_DESCRIPTION))
                .unwrap_or(false)
    }

    /// Append a value for `name`, preserving insertion order across all keys.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    /// Replace all existing values for `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
        self
    }

    /// First value for `name`, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in registration order, case-insensitive.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.status_code.is_none() && self.entries.is_empty()
    }

    /// Serialize to the exact wire form, including the trailing blank line.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = String::with_capacity(32 + self.entries.len() * 24);
        out.push_str(PREFIX);
        if let Some(code) = self.status_code {
            out.push(' ');
            out.push_str(&code.to_string());
            if let Some(desc) = &self.status_description {
                if !desc.is_empty() {
                    out.push(' ');
                    out.push_str(desc);
                }
            }
        }
        out.push_str("\r\n");
        for (k, v) in &self.entries {
            out.push_str(k);
            out.push_str(": ");
            out.push_str(v);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.into_bytes()
    }

    /// Parse a complete header block (status line + key/value lines +
    /// trailing blank line), without the trailing blank line being required
    /// to be present twice — `raw` is everything up to and including the
    /// blank line that terminates the block.
    pub fn from_wire(raw: &[u8]) -> Result<Self, NatsError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| NatsError::HeaderError(format!("header block is not valid UTF-8: {e}")))?;

        let mut lines = text.split("\r\n");
        let status_line = lines
            .next()
            .ok_or_else(|| NatsError::HeaderError("empty header block".into()))?;

        if !status_line.starts_with(PREFIX) {
            return Err(NatsError::HeaderError(format!(
                "header block does not start with {PREFIX}"
            )));
        }

        let rest = status_line[PREFIX.len()..].trim_start();
        let (status_code, status_description) = if rest.is_empty() {
            (None, None)
        } else {
            let mut parts = rest.splitn(2, ' ');
            let code: u16 = parts
                .next()
                .unwrap()
                .parse()
                .map_err(|_| NatsError::HeaderError(format!("invalid status code in {status_line:?}")))?;
            let desc = parts.next().map(|s| s.to_string());
            (Some(code), desc)
        };

        let mut headers = NatsHeaders {
            status_code,
            status_description,
            entries: Vec::new(),
        };

        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (k, v) = line
                .split_once(':')
                .ok_or_else(|| NatsError::HeaderError(format!("malformed header line {line:?}")))?;
            headers.entries.push((k.trim().to_string(), v.trim().to_string()));
        }

        Ok(headers)
    }
}

impl fmt::Display for NatsHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.to_wire()))
    }
}
