use std::time::Duration;

/// Session identifier assigned by the speaker on group join
pub type SessionId = i64;

/// Source input identifier
pub type SourceId = i64;

/// Volume level in percent (0-100)
pub type Volume = i64;

/// WebSocket path the speaker serves its control protocol on
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Protocol major version announced during global join
pub const DEFAULT_PROTOCOL_MAJOR: i64 = 0;

/// Protocol minor version announced during global join
pub const DEFAULT_PROTOCOL_MINOR: i64 = 4;

/// Display name announced during group join
pub const DEFAULT_NAME: &str = "guest";

/// Stable client identifier announced during group join
pub const DEFAULT_UID: &str = "uid-od11-rs";

/// Color index announced during group join
pub const DEFAULT_COLOR_INDEX: i64 = 0;

/// Whether to request real-time push updates by default
pub const DEFAULT_REALTIME: bool = true;

/// Interval between application-level keepalive pings
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(25);

/// Parameters sent during the two join phases of the handshake
#[derive(Debug, Clone)]
pub struct JoinOptions {
    /// Protocol major version for the global_join request
    pub protocol_major: i64,

    /// Protocol minor version for the global_join request
    pub protocol_minor: i64,

    /// Display name for the group_join request
    pub name: String,

    /// Stable client identifier for the group_join request
    pub uid: String,

    /// Color index for the group_join request
    pub color_index: i64,

    /// Request real-time push updates after joining
    pub realtime_data: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            protocol_major: DEFAULT_PROTOCOL_MAJOR,
            protocol_minor: DEFAULT_PROTOCOL_MINOR,
            name: DEFAULT_NAME.to_string(),
            uid: DEFAULT_UID.to_string(),
            color_index: DEFAULT_COLOR_INDEX,
            realtime_data: DEFAULT_REALTIME,
        }
    }
}

/// Connection parameters for an OD-11 speaker
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Full WebSocket URL, e.g. `ws://10.0.0.42/ws`
    pub url: String,

    /// HTTP Origin header sent with the upgrade request
    pub origin: Option<String>,

    /// Cookie header sent with the upgrade request (e.g. `orthoplay=...`)
    pub cookie: Option<String>,

    /// Handshake parameters
    pub join: JoinOptions,

    /// Application-level ping interval; `None` disables the keepalive
    pub keepalive: Option<Duration>,
}

impl ConnectOptions {
    /// Options for the given WebSocket URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            origin: None,
            cookie: None,
            join: JoinOptions::default(),
            keepalive: Some(DEFAULT_KEEPALIVE),
        }
    }

    /// Options for a speaker host, using the standard `/ws` path and a
    /// matching `http://<host>` origin
    pub fn for_host(host: impl Into<String>) -> Self {
        let host = host.into();
        Self::new(format!("ws://{}{}", host, DEFAULT_WS_PATH))
            .with_origin(format!("http://{}", host))
    }

    /// Set the HTTP Origin header.
    ///
    /// The speaker expects an http(s) origin; `ws://` origins are rejected
    /// at connect time.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Set the Cookie header
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Override the handshake parameters
    pub fn with_join(mut self, join: JoinOptions) -> Self {
        self.join = join;
        self
    }

    /// Set or disable the keepalive interval
    pub fn with_keepalive(mut self, keepalive: Option<Duration>) -> Self {
        self.keepalive = keepalive;
        self
    }
}
