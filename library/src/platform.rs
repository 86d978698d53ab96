/*!
Seams between the stream logic and the environment it runs in.

The controller, peer session and signaling channel only ever talk to these traits.
[`crate::web`] implements them on top of `web-sys`, tests use a scripted double.
*/

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedSender;
use futures::future::LocalBoxFuture;
use log::debug;
use robot_stream_protocol::{ControlCommand, IceCandidate, SignalMessage};

use crate::config::ConnectionType;
use crate::error::Result;

/// Identifies one stream lifecycle.
/// Bumped on every start and teardown so late callbacks of an older lifecycle can be told apart.
pub type Generation = u64;

/// Everything that happens asynchronously to a running session.
#[derive(Debug)]
pub enum SessionEvent<S> {
    /// Decoded message from the signaling relay, in arrival order.
    Signal(SignalMessage),
    /// Signaling transport went away without being asked to.
    ChannelClosed { reason: String },
    /// Peer connection gathered a candidate to trickle to the robot.
    LocalIceCandidate(IceCandidate),
    /// Remote media arrived.
    RemoteTrack(S),
    /// ICE could not establish connectivity.
    ConnectionFailed { reason: String },
}

impl<S> SessionEvent<S> {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match *self {
            Self::Signal(ref message) => message.kind(),
            Self::ChannelClosed { .. } => "channel closed",
            Self::LocalIceCandidate(_) => "local ice candidate",
            Self::RemoteTrack(_) => "remote track",
            Self::ConnectionFailed { .. } => "connection failed",
        }
    }
}

/// Handle given to transports and peer connections to report [`SessionEvent`]s.
///
/// Every event is stamped with the generation the sink was created for,
/// the controller drops the ones that no longer match.
#[derive(Debug)]
pub struct EventSink<S> {
    generation: Generation,
    sender: UnboundedSender<(Generation, SessionEvent<S>)>,
}

impl<S> Clone for EventSink<S> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            sender: self.sender.clone(),
        }
    }
}

impl<S> EventSink<S> {
    pub(crate) fn new(
        generation: Generation,
        sender: UnboundedSender<(Generation, SessionEvent<S>)>,
    ) -> Self {
        Self { generation, sender }
    }

    pub fn emit(&self, event: SessionEvent<S>) {
        let kind = event.kind();
        if self
            .sender
            .unbounded_send((self.generation, event))
            .is_err()
        {
            debug!("stream controller is gone, dropping {}", kind);
        }
    }
}

/// Kind of a session description.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Text transport to the signaling relay, already open when handed out.
pub trait Transport {
    fn is_open(&self) -> bool;

    /// # Errors
    /// Fails if the underlying transport refuses the frame.
    fn send_text(&self, text: &str) -> Result<()>;

    /// Close without reporting [`SessionEvent::ChannelClosed`].
    fn close(&self);
}

/// Underlying peer connection primitive.
#[async_trait(?Send)]
pub trait PeerConnection {
    /// # Errors
    /// Fails if the primitive rejects the description.
    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()>;

    /// Create an answer and apply it as the local description.
    ///
    /// # Errors
    /// Fails if the primitive cannot produce or apply the answer.
    async fn create_answer(&self) -> Result<String>;

    /// Create a receive-only offer and apply it as the local description.
    ///
    /// # Errors
    /// Fails if the primitive cannot produce or apply the offer.
    async fn create_offer(&self) -> Result<String>;

    /// # Errors
    /// Fails if the primitive rejects the candidate.
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    fn close(&self);
}

/// Environment the stream runs in: control API, relay, peer connections, timers and task spawning.
#[async_trait(?Send)]
pub trait Platform: 'static {
    /// Negotiated media handle handed to the presentation layer.
    type Stream: Clone + Debug + 'static;
    type Transport: Transport + 'static;
    type Peer: PeerConnection + 'static;

    /// Fire a control command at the robot's command endpoint `url`.
    ///
    /// # Errors
    /// [`Error::ControlCall`](crate::Error::ControlCall) on transport or application failure.
    async fn send_command(&self, url: &str, command: ControlCommand) -> Result<()>;

    /// Connect to `url` and resolve once the transport is open.
    /// Inbound frames and unexpected closure are reported through `events`.
    ///
    /// # Errors
    /// [`Error::Channel`](crate::Error::Channel) if the relay cannot be reached.
    async fn open_transport(
        &self,
        url: &str,
        events: EventSink<Self::Stream>,
    ) -> Result<Self::Transport>;

    /// # Errors
    /// [`Error::PeerConnection`](crate::Error::PeerConnection) if the primitive cannot be created.
    fn create_peer(
        &self,
        connection_type: &ConnectionType,
        events: EventSink<Self::Stream>,
    ) -> Result<Self::Peer>;

    async fn sleep(&self, duration: Duration);

    /// Run `task` on the single logical thread of control.
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}
