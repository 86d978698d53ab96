use std::time::Duration;

use robot_stream_protocol::{signaling_url, PeerRole, RobotId};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONTROL_URL, DEFAULT_RELAY_URL, DEFAULT_START_TIMEOUT_MS, DEFAULT_STUN_SERVER,
};
use crate::error::{Error, Result};

/// Specifies what kind of peer connection to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConnectionType {
    /// Within local network
    Local,
    /// Setup with STUN server, WAN capabilities but can fail
    Stun { urls: String },
    /// Setup with STUN and TURN servers, will fallback to TURN if needed, most stable connection
    #[serde(rename_all = "camelCase")]
    StunAndTurn {
        stun_urls: String,
        turn_urls: String,
        username: String,
        credential: String,
    },
}

impl Default for ConnectionType {
    fn default() -> Self {
        Self::Stun {
            urls: DEFAULT_STUN_SERVER.to_owned(),
        }
    }
}

/// Settings of a [`StreamController`](crate::StreamController).
///
/// Deserializes from camelCase JSON, every field falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamConfig {
    /// Base `ws://` or `wss://` address of the signaling relay.
    pub relay_url: String,
    /// Base `http://` or `https://` address of the robot control API.
    pub control_url: String,
    pub connection_type: ConnectionType,
    /// Give up on a start that is not streaming after this many milliseconds.
    /// `None` waits forever.
    pub start_timeout_ms: Option<u64>,
    /// Queue remote ICE candidates that arrive before the remote description
    /// instead of dropping them.
    pub buffer_early_candidates: bool,
    /// Let the browser send the offer once the robot acknowledged the start.
    pub local_offer: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_owned(),
            control_url: DEFAULT_CONTROL_URL.to_owned(),
            connection_type: ConnectionType::default(),
            start_timeout_ms: Some(DEFAULT_START_TIMEOUT_MS),
            buffer_early_candidates: false,
            local_offer: false,
        }
    }
}

impl StreamConfig {
    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    /// Fails on malformed JSON or when one of the base addresses has the wrong scheme.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Fails when `relay_url` is not a `WebSocket` address or `control_url` is not an HTTP one.
    pub fn validate(&self) -> Result<()> {
        if !(self.relay_url.starts_with("ws://") || self.relay_url.starts_with("wss://")) {
            return Err(Error::Config(format!(
                "relay url must use ws:// or wss://, got {}",
                self.relay_url
            )));
        }
        if !(self.control_url.starts_with("http://") || self.control_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "control url must use http:// or https://, got {}",
                self.control_url
            )));
        }
        if self.start_timeout_ms == Some(0) {
            return Err(Error::Config("start timeout must be positive".to_owned()));
        }
        Ok(())
    }

    #[must_use]
    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn signaling_url(&self, robot_id: &RobotId) -> String {
        signaling_url(&self.relay_url, robot_id, PeerRole::Web)
    }

    #[must_use]
    pub fn command_url(&self, robot_id: &RobotId) -> String {
        format!(
            "{}/{}/command",
            self.control_url.trim_end_matches('/'),
            robot_id
        )
    }
}
