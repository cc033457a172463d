use derive_builder::Builder;
use serde::{Deserialize, Serialize};

fn is_false(b: &bool) -> bool {
    !*b
}

/// The `INFO {...}` payload the server sends as the first frame of the
/// handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into))]
pub struct ServerInfo {
    pub server_id: String,
    pub version: String,
    #[builder(default)]
    pub proto: u8,
    #[builder(default)]
    pub go: String,
    #[builder(default)]
    pub host: String,
    #[builder(default)]
    pub port: u32,
    #[builder(default)]
    pub max_payload: u32,
    #[builder(default)]
    pub client_id: Option<u64>,
    #[builder(default)]
    pub auth_required: Option<bool>,
    #[builder(default)]
    pub tls_required: Option<bool>,
    #[builder(default)]
    pub tls_verify: Option<bool>,
    #[builder(default)]
    pub connect_urls: Option<Vec<String>>,
    /// Whether the server understands header-bearing frames (HMSG/HPUB).
    #[builder(default)]
    pub headers: Option<bool>,
    /// Present only when the server requires nonce-signing authentication.
    #[builder(default)]
    pub nonce: Option<String>,
}

impl ServerInfo {
    pub fn builder() -> ServerInfoBuilder {
        ServerInfoBuilder::default()
    }

    pub fn supports_headers(&self) -> bool {
        self.headers.unwrap_or(false)
    }
}

/// Credential fields an [`crate::net::Authenticator`] may return for the
/// CONNECT frame. All fields are optional; only the non-empty ones are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRecord {
    pub jwt: Option<String>,
    pub signature: Option<String>,
    pub auth_token: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub nkey: Option<String>,
}

/// The `CONNECT {...}` payload sent right after INFO.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into, strip_option))]
pub struct ConnectCommand {
    #[builder(default = "false")]
    pub verbose: bool,
    #[builder(default = "false")]
    pub pedantic: bool,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub lang: String,
    pub version: String,
    #[builder(default = "1")]
    pub protocol: u8,
    #[builder(default = "true")]
    pub headers: bool,
    #[serde(skip_serializing_if = "is_false")]
    #[builder(default = "false")]
    pub no_responders: bool,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    #[builder(default)]
    #[serde(rename = "sig", skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nkey: Option<String>,
}

impl ConnectCommand {
    pub fn builder() -> ConnectCommandBuilder {
        ConnectCommandBuilder::default()
    }

    /// Applies whichever auth fields the authenticator returned; empty
    /// fields are left unset so they're elided on the wire.
    pub fn apply_auth(&mut self, auth: AuthRecord) {
        self.jwt = auth.jwt.filter(|s| !s.is_empty());
        self.signature = auth.signature.filter(|s| !s.is_empty());
        self.auth_token = auth.auth_token.filter(|s| !s.is_empty());
        self.user = auth.user.filter(|s| !s.is_empty());
        self.pass = auth.pass.filter(|s| !s.is_empty());
        self.nkey = auth.nkey.filter(|s| !s.is_empty());
    }
}
