use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use url::Url;

use crate::net::{Authenticator, NoAuth, TransportFactory};
use crate::protocol::ConnectCommand;

/// Configuration knobs recognized by the connection.
#[derive(Clone, Builder)]
#[builder(setter(into))]
pub struct NatsClientOptions {
    /// WebSocket URL of the server.
    pub url: Url,

    /// Produces a fresh transport for the initial connect and for every
    /// reconnect attempt. The transport itself (including TLS) is supplied
    /// by the caller; this crate only calls into it.
    pub transport_factory: Arc<dyn TransportFactory>,

    /// Yields credential fields for the CONNECT frame; defaults to no
    /// authentication.
    #[builder(default = "Arc::new(NoAuth)")]
    pub auth_handler: Arc<dyn Authenticator>,

    /// Client name advertised in CONNECT; shows up in server monitoring.
    #[builder(default)]
    pub name: Option<String>,

    #[builder(default = "Duration::from_secs(5)")]
    pub connect_timeout: Duration,

    #[builder(default = "Duration::from_secs(5)")]
    pub request_timeout: Duration,

    #[builder(default = "true")]
    pub allow_reconnect: bool,

    /// -1 means unlimited.
    #[builder(default = "-1")]
    pub max_reconnect_attempts: i64,

    #[builder(default = "Duration::from_millis(250)")]
    pub reconnect_delay: Duration,

    #[builder(default = "Duration::from_secs(8)")]
    pub max_reconnect_delay: Duration,

    #[builder(default = "true")]
    pub reconnect_jitter: bool,

    /// Advertised to the server in CONNECT; also gates whether this client
    /// will attempt to parse HMSG frames at all.
    #[builder(default = "true")]
    pub headers: bool,

    /// Requests 503-No-Responders status frames for subjects with no
    /// subscribers.
    #[builder(default = "true")]
    pub no_responders: bool,

    #[builder(default = "65536")]
    pub receive_buffer_size: usize,

    #[builder(default = "Duration::from_secs(30)")]
    pub ping_interval: Duration,

    #[builder(default = "3")]
    pub max_ping_out: u32,
}

impl std::fmt::Debug for NatsClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsClientOptions")
            .field("url", &self.url)
            .field("name", &self.name)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("allow_reconnect", &self.allow_reconnect)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("headers", &self.headers)
            .field("no_responders", &self.no_responders)
            .finish()
    }
}

impl NatsClientOptions {
    pub fn builder() -> NatsClientOptionsBuilder {
        NatsClientOptionsBuilder::default()
    }

    /// The lang/version/headers/no_responders skeleton of the CONNECT frame;
    /// auth fields are filled in separately once the handshake has the nonce.
    pub fn connect_command_skeleton(&self) -> ConnectCommand {
        let mut builder = ConnectCommand::builder();
        builder
            .verbose(false)
            .pedantic(false)
            .lang("rust")
            .version(env!("CARGO_PKG_VERSION"))
            .headers(self.headers)
            .no_responders(self.no_responders);
        if let Some(name) = &self.name {
            builder.name(name.clone());
        }
        builder.build().expect("all required fields are set above")
    }
}
