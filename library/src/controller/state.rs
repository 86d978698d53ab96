use std::fmt::{Display, Formatter};

use crate::error::NegotiationViolation;

/// Lifecycle of one robot stream.
///
/// `Idle -> Starting -> Streaming -> Stopping -> Idle`, with `Error` reachable from
/// `Starting` and `Streaming` and left only through an explicit stop or a fresh start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState<S> {
    Idle,
    Starting(StartJoin),
    Streaming(S),
    Stopping,
    Error(String),
}

impl<S> StreamState<S> {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match *self {
            Self::Idle => "idle",
            Self::Starting(_) => "starting",
            Self::Streaming(_) => "streaming",
            Self::Stopping => "stopping",
            Self::Error(_) => "error",
        }
    }

    #[must_use]
    pub fn status(&self) -> StreamStatus {
        match *self {
            Self::Idle | Self::Stopping => StreamStatus::Idle,
            Self::Starting(_) => StreamStatus::Connecting,
            Self::Streaming(_) => StreamStatus::Streaming,
            Self::Error(ref reason) => StreamStatus::Error(reason.clone()),
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(*self, Self::Starting(_) | Self::Streaming(_))
    }
}

/// Rendezvous of the two conditions `Starting -> Streaming` waits for.
/// They may be met in either order.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StartJoin {
    acknowledged: bool,
    track_attached: bool,
}

impl StartJoin {
    /// Robot sent `StartAck`. Returns whether the join is now complete.
    pub fn acknowledge(&mut self) -> bool {
        self.acknowledged = true;
        self.is_complete()
    }

    /// Peer session received remote media. Returns whether the join is now complete.
    pub fn attach_track(&mut self) -> bool {
        self.track_attached = true;
        self.is_complete()
    }

    #[must_use]
    pub const fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.acknowledged && self.track_attached
    }
}

/// What a consumer needs to render: a badge and, when failed, a reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Idle,
    Connecting,
    Streaming,
    Error(String),
}

impl StreamStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Error(_) => "error",
        }
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match *self {
            Self::Error(ref reason) => Some(reason),
            _ => None,
        }
    }
}

impl Display for StreamStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Error(ref reason) => write!(f, "error: {reason}"),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Published to [`StreamController::subscribe`](crate::StreamController::subscribe) listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    StatusChanged(StreamStatus),
    NegotiationViolation(NegotiationViolation),
}
