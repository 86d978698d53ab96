use std::time::Duration;

use robot_stream_protocol::ControlCommand;
use thiserror::Error;

use crate::peer_session::NegotiationState;

/// Everything that can go wrong while bringing a robot stream up or down.
#[derive(Debug, Error)]
pub enum Error {
    /// The control API rejected the command or could not be reached.
    #[error("control call `{command}` failed: {reason}")]
    ControlCall {
        command: ControlCommand,
        reason: String,
    },
    /// The signaling relay could not be reached or dropped the connection.
    #[error("signaling channel error: {0}")]
    Channel(String),
    /// A negotiation message arrived in an order the peer session cannot handle.
    #[error(transparent)]
    Negotiation(#[from] NegotiationViolation),
    /// The underlying peer connection primitive failed.
    #[error("peer connection failure: {0}")]
    PeerConnection(String),
    #[error("robot did not start streaming within {0:?}")]
    StartTimeout(Duration),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn peer(err: impl std::fmt::Display) -> Self {
        Self::PeerConnection(err.to_string())
    }

    pub(crate) fn channel(err: impl std::fmt::Display) -> Self {
        Self::Channel(err.to_string())
    }
}

/// Out-of-order negotiation input.
/// These are dropped and reported, never escalated to a stream failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationViolation {
    #[error("offer arrived while negotiation state is {0:?}")]
    OfferWhileBusy(NegotiationState),
    #[error("answer arrived without a pending local offer")]
    UnexpectedAnswer,
    #[error("remote ICE candidate arrived before the remote description")]
    EarlyRemoteCandidate,
    #[error("local ICE candidate gathered while the signaling channel is not open")]
    LocalCandidateWithoutChannel,
    #[error("peer session is already closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
