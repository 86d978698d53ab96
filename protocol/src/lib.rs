/*!
Wire types shared between the [robot-stream](../robot_stream/index.html) client,
the signaling relay and the robot.

Signaling messages travel as JSON objects discriminated by a `type` field,
control commands are plain strings understood by the robot control API.
*/

#![warn(missing_docs)]

use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque name of a physical robot.
/// Addresses both the control API and the robot's signaling endpoint.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct RobotId(String);

impl RobotId {
    /// Wrap String into a `RobotId` `struct`
    #[must_use]
    pub const fn new(inner: String) -> Self {
        Self(inner)
    }

    /// Return reference to the underling string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Acquire the underlying type
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl FromStr for RobotId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl Display for RobotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side of the relay a signaling connection belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PeerRole {
    /// Browser viewer of the stream
    Web,
    /// Robot producing the stream
    Robot,
}

impl PeerRole {
    /// Path segment used by the relay for this role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Robot => "robot",
        }
    }
}

/// Address of the signaling endpoint for `robot_id` on the relay at `relay_base`,
/// in the shape `<relay>/signaling/<robotId>/<role>`.
#[must_use]
pub fn signaling_url(relay_base: &str, robot_id: &RobotId, role: PeerRole) -> String {
    format!(
        "{}/signaling/{}/{}",
        relay_base.trim_end_matches('/'),
        robot_id,
        role.as_str()
    )
}

/// Connectivity candidate, laid out like the browser's `RTCIceCandidateInit`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// `candidate:` attribute line
    pub candidate: String,
    /// Media stream identification tag the candidate belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

/// Messages relayed between browser and robot.
/// Acknowledgements confirm control commands, the rest carries `WebRTC` negotiation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalMessage {
    /// Robot confirms the stream was started
    #[serde(rename = "webrtc_start_response")]
    StartAck,
    /// Robot confirms the stream was stopped
    #[serde(rename = "webrtc_stop_response")]
    StopAck,
    /// `SDP` offer, usually sent by the robot
    #[serde(rename = "offer")]
    Offer {
        /// Session description body
        sdp: String,
    },
    /// `SDP` answer to the most recent offer
    #[serde(rename = "answer")]
    Answer {
        /// Session description body
        sdp: String,
    },
    /// Trickled ICE candidate, in either direction
    #[serde(rename = "ice")]
    IceCandidate {
        /// Proposed network path
        candidate: IceCandidate,
    },
}

impl SignalMessage {
    /// Wire discriminator of the message, handy for logging
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match *self {
            Self::StartAck => "webrtc_start_response",
            Self::StopAck => "webrtc_stop_response",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice",
        }
    }
}

/// Command understood by the robot control API.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub enum ControlCommand {
    /// Begin producing a `WebRTC` stream
    #[serde(rename = "webrtc_start")]
    Start,
    /// Stop producing the stream
    #[serde(rename = "webrtc_stop")]
    Stop,
}

impl ControlCommand {
    /// Command string as sent to the control API
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "webrtc_start",
            Self::Stop => "webrtc_stop",
        }
    }
}

impl Display for ControlCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
