/*!
Media negotiation for a single stream lifecycle.

[`PeerSession`] wraps the peer connection primitive and enforces strict offer/answer ordering.
It never resolves glare or rolls back: input that does not fit the current
[`NegotiationState`] is rejected with a [`NegotiationViolation`] and leaves the
ongoing negotiation untouched.
*/

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use log::{debug, info, warn};
use robot_stream_protocol::{IceCandidate, SignalMessage};

use crate::error::{NegotiationViolation, Result};
use crate::platform::{PeerConnection, Platform, SdpKind};
use crate::signaling::SignalingChannel;

/// Offer/answer progress, mirroring the `RTCSignalingState` values this client can reach.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    /// No exchange in progress, the only state a new offer is accepted or made in.
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

#[derive(Debug)]
struct NegotiationProgress<S> {
    state: NegotiationState,
    remote_description_set: bool,
    pending_candidates: Vec<IceCandidate>,
    media_stream: Option<S>,
}

/// Owns the peer connection for one stream lifecycle and speaks to the robot
/// through the session's [`SignalingChannel`].
pub struct PeerSession<P: Platform> {
    connection: P::Peer,
    channel: Rc<SignalingChannel<P::Transport>>,
    buffer_early_candidates: bool,
    progress: RefCell<NegotiationProgress<P::Stream>>,
}

impl<P: Platform> PeerSession<P> {
    pub fn new(
        connection: P::Peer,
        channel: Rc<SignalingChannel<P::Transport>>,
        buffer_early_candidates: bool,
    ) -> Self {
        Self {
            connection,
            channel,
            buffer_early_candidates,
            progress: RefCell::new(NegotiationProgress {
                state: NegotiationState::Stable,
                remote_description_set: false,
                pending_candidates: Vec::new(),
                media_stream: None,
            }),
        }
    }

    #[must_use]
    pub fn negotiation_state(&self) -> NegotiationState {
        self.progress.borrow().state
    }

    /// Live stream once the remote track has been received.
    #[must_use]
    pub fn media_stream(&self) -> Option<P::Stream> {
        self.progress.borrow().media_stream.clone()
    }

    fn is_closed(&self) -> bool {
        self.negotiation_state() == NegotiationState::Closed
    }

    /// Accept the robot's offer, answer it and send the answer back.
    ///
    /// # Errors
    /// [`NegotiationViolation::OfferWhileBusy`] unless negotiation is stable,
    /// otherwise whatever the primitive fails with.
    pub async fn on_remote_offer(&self, sdp: &str) -> Result<()> {
        {
            let mut progress = self.progress.borrow_mut();
            let current = progress.state;
            match current {
                NegotiationState::Stable => progress.state = NegotiationState::HaveRemoteOffer,
                NegotiationState::Closed => return Err(NegotiationViolation::SessionClosed.into()),
                busy => return Err(NegotiationViolation::OfferWhileBusy(busy).into()),
            }
        }

        if let Err(err) = self
            .connection
            .set_remote_description(SdpKind::Offer, sdp)
            .await
        {
            self.abandon_exchange();
            return Err(err);
        }
        self.progress.borrow_mut().remote_description_set = true;
        self.flush_pending_candidates().await;

        let answer = match self.connection.create_answer().await {
            Ok(answer) => answer,
            Err(err) => {
                self.abandon_exchange();
                return Err(err);
            }
        };
        if self.is_closed() {
            debug!("peer session closed while answering, answer discarded");
            return Ok(());
        }
        self.progress.borrow_mut().state = NegotiationState::Stable;
        self.channel.send(&SignalMessage::Answer { sdp: answer });
        info!("answered offer from {}", self.channel.robot_id());
        Ok(())
    }

    /// Complete a negotiation started by [`PeerSession::create_local_offer`].
    ///
    /// # Errors
    /// [`NegotiationViolation::UnexpectedAnswer`] without a pending local offer,
    /// otherwise whatever the primitive fails with.
    pub async fn on_remote_answer(&self, sdp: &str) -> Result<()> {
        match self.negotiation_state() {
            NegotiationState::HaveLocalOffer => {}
            NegotiationState::Closed => return Err(NegotiationViolation::SessionClosed.into()),
            _ => return Err(NegotiationViolation::UnexpectedAnswer.into()),
        }

        self.connection
            .set_remote_description(SdpKind::Answer, sdp)
            .await?;
        if self.is_closed() {
            return Ok(());
        }
        {
            let mut progress = self.progress.borrow_mut();
            progress.state = NegotiationState::Stable;
            progress.remote_description_set = true;
        }
        self.flush_pending_candidates().await;
        info!("negotiation with {} completed", self.channel.robot_id());
        Ok(())
    }

    /// Offer to receive video, for relays where the browser initiates.
    ///
    /// # Errors
    /// [`NegotiationViolation::OfferWhileBusy`] unless negotiation is stable,
    /// otherwise whatever the primitive fails with.
    pub async fn create_local_offer(&self) -> Result<()> {
        {
            let mut progress = self.progress.borrow_mut();
            let current = progress.state;
            match current {
                NegotiationState::Stable => progress.state = NegotiationState::HaveLocalOffer,
                NegotiationState::Closed => return Err(NegotiationViolation::SessionClosed.into()),
                busy => return Err(NegotiationViolation::OfferWhileBusy(busy).into()),
            }
        }

        let offer = match self.connection.create_offer().await {
            Ok(offer) => offer,
            Err(err) => {
                self.abandon_exchange();
                return Err(err);
            }
        };
        if self.is_closed() {
            return Ok(());
        }
        self.channel.send(&SignalMessage::Offer { sdp: offer });
        debug!("sent local offer to {}", self.channel.robot_id());
        Ok(())
    }

    /// # Errors
    /// [`NegotiationViolation::EarlyRemoteCandidate`] before the remote description
    /// is set, unless early candidates are buffered.
    pub async fn on_remote_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        {
            let mut progress = self.progress.borrow_mut();
            if progress.state == NegotiationState::Closed {
                return Err(NegotiationViolation::SessionClosed.into());
            }
            if !progress.remote_description_set {
                if !self.buffer_early_candidates {
                    return Err(NegotiationViolation::EarlyRemoteCandidate.into());
                }
                debug!("buffering early ice candidate: {}", candidate.candidate);
                progress.pending_candidates.push(candidate);
                return Ok(());
            }
        }

        self.connection.add_ice_candidate(&candidate).await?;
        debug!("added ice candidate {:?}", candidate);
        Ok(())
    }

    /// Trickle a locally gathered candidate to the robot.
    ///
    /// # Errors
    /// [`NegotiationViolation::LocalCandidateWithoutChannel`] if the channel is not open,
    /// the candidate is not kept for later.
    pub fn on_local_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if self.is_closed() {
            return Err(NegotiationViolation::SessionClosed.into());
        }
        if !self.channel.is_open() {
            return Err(NegotiationViolation::LocalCandidateWithoutChannel.into());
        }
        self.channel.send(&SignalMessage::IceCandidate { candidate });
        Ok(())
    }

    pub fn on_remote_track(&self, stream: P::Stream) {
        let mut progress = self.progress.borrow_mut();
        if progress.state == NegotiationState::Closed {
            return;
        }
        debug!("received remote media stream: {:?}", stream);
        progress.media_stream = Some(stream);
    }

    fn abandon_exchange(&self) {
        let mut progress = self.progress.borrow_mut();
        if progress.state != NegotiationState::Closed {
            progress.state = NegotiationState::Stable;
        }
    }

    async fn flush_pending_candidates(&self) {
        let pending = mem::take(&mut self.progress.borrow_mut().pending_candidates);
        for candidate in pending {
            if let Err(err) = self.connection.add_ice_candidate(&candidate).await {
                warn!("failed to apply buffered ice candidate: {}", err);
            }
        }
    }

    /// Release the peer connection. Idempotent.
    pub fn close(&self) {
        {
            let mut progress = self.progress.borrow_mut();
            if progress.state == NegotiationState::Closed {
                return;
            }
            progress.state = NegotiationState::Closed;
            progress.pending_candidates.clear();
            progress.media_stream = None;
        }
        self.connection.close();
        debug!("peer session for {} closed", self.channel.robot_id());
    }
}
