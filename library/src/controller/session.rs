use std::rc::Rc;

use log::debug;
use robot_stream_protocol::RobotId;

use crate::controller::state::StreamState;
use crate::peer_session::PeerSession;
use crate::platform::{Generation, Platform};
use crate::signaling::SignalingChannel;

struct SessionResources<P: Platform> {
    channel: Rc<SignalingChannel<P::Transport>>,
    peer: Rc<PeerSession<P>>,
}

/// Aggregate root of the stream for the selected robot.
///
/// Owns the signaling channel and peer session exclusively. Collaborators only ever
/// see them together with the generation they were created for.
pub(crate) struct StreamSession<P: Platform> {
    pub(crate) robot_id: Option<RobotId>,
    pub(crate) generation: Generation,
    pub(crate) state: StreamState<P::Stream>,
    /// Whether `Streaming` was reached since the last start.
    pub(crate) established: bool,
    resources: Option<SessionResources<P>>,
}

impl<P: Platform> StreamSession<P> {
    pub(crate) fn new() -> Self {
        Self {
            robot_id: None,
            generation: 0,
            state: StreamState::Idle,
            established: false,
            resources: None,
        }
    }

    pub(crate) fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation
    }

    /// Invalidate every callback issued so far.
    pub(crate) fn advance(&mut self) -> Generation {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub(crate) fn robot_label(&self) -> &str {
        self.robot_id.as_ref().map_or("<no robot>", RobotId::as_str)
    }

    pub(crate) fn attach(
        &mut self,
        channel: Rc<SignalingChannel<P::Transport>>,
        peer: Rc<PeerSession<P>>,
    ) {
        self.release();
        self.resources = Some(SessionResources { channel, peer });
    }

    pub(crate) fn peer(&self) -> Option<Rc<PeerSession<P>>> {
        self.resources
            .as_ref()
            .map(|resources| Rc::clone(&resources.peer))
    }

    /// Close the peer session, then the channel. Returns whether anything was open.
    pub(crate) fn release(&mut self) -> bool {
        match self.resources.take() {
            Some(resources) => {
                resources.peer.close();
                resources.channel.close();
                debug!("released stream resources of {}", self.robot_label());
                true
            }
            None => false,
        }
    }

    pub(crate) fn last_error(&self) -> Option<&str> {
        match self.state {
            StreamState::Error(ref reason) => Some(reason),
            _ => None,
        }
    }
}
