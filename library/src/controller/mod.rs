/*!
Stream Controller: turns start/stop intents and signaling traffic into one coherent [`StreamState`].

Every start opens a new generation. Async work (the control call, opening the relay,
negotiation steps, timers) checks its generation before applying any effect,
so a robot switch or a stop makes everything still in flight for the old stream inert.
*/

mod session;
mod state;

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{FutureExt, StreamExt};
use log::{debug, error, info, warn};
use robot_stream_protocol::{ControlCommand, RobotId, SignalMessage};

pub use self::state::{StartJoin, StreamEvent, StreamState, StreamStatus};
use self::session::StreamSession;
use crate::config::StreamConfig;
use crate::error::{Error, NegotiationViolation, Result};
use crate::peer_session::{NegotiationState, PeerSession};
use crate::platform::{EventSink, Generation, Platform, SessionEvent};
use crate::signaling::SignalingChannel;

type Listener = Rc<dyn Fn(&StreamEvent)>;

struct ControllerInner<P: Platform> {
    platform: Rc<P>,
    config: Rc<StreamConfig>,
    session: StreamSession<P>,
    events: UnboundedSender<(Generation, SessionEvent<P::Stream>)>,
    listeners: Vec<Listener>,
    published: StreamStatus,
}

/// Drives the video stream of the selected robot.
///
/// Sole owner of the signaling channel and peer session. All intents are idempotent:
/// starting an active stream or stopping an idle one does nothing.
///
/// This is a pointer to the underlying state and can be cloned freely.
pub struct StreamController<P: Platform> {
    inner: Rc<RefCell<ControllerInner<P>>>,
}

impl<P: Platform> Clone for StreamController<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: Platform> StreamController<P> {
    pub fn new(platform: P, config: StreamConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded();
        let platform = Rc::new(platform);
        let controller = Self {
            inner: Rc::new(RefCell::new(ControllerInner {
                platform: Rc::clone(&platform),
                config: Rc::new(config),
                session: StreamSession::new(),
                events: sender,
                listeners: Vec::new(),
                published: StreamStatus::Idle,
            })),
        };
        platform.spawn_local(pump(Rc::downgrade(&controller.inner), receiver).boxed_local());
        controller
    }

    #[must_use]
    pub fn robot_id(&self) -> Option<RobotId> {
        self.inner.borrow().session.robot_id.clone()
    }

    #[must_use]
    pub fn state(&self) -> StreamState<P::Stream> {
        self.inner.borrow().session.state.clone()
    }

    #[must_use]
    pub fn status(&self) -> StreamStatus {
        self.inner.borrow().session.state.status()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.borrow().session.last_error().map(str::to_owned)
    }

    /// Negotiated media, present only while streaming.
    #[must_use]
    pub fn media_stream(&self) -> Option<P::Stream> {
        match self.inner.borrow().session.state {
            StreamState::Streaming(ref stream) => Some(stream.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn negotiation_state(&self) -> Option<NegotiationState> {
        self.inner
            .borrow()
            .session
            .peer()
            .map(|peer| peer.negotiation_state())
    }

    /// Register a listener for status changes and negotiation violations.
    pub fn subscribe(&self, listener: impl Fn(&StreamEvent) + 'static) {
        self.inner.borrow_mut().listeners.push(Rc::new(listener));
    }

    /// Make `robot_id` the target of future starts.
    /// A stream of the previously selected robot is torn down first.
    pub fn select_robot(&self, robot_id: Option<RobotId>) {
        if self.inner.borrow().session.robot_id == robot_id {
            return;
        }
        info!(
            "selecting robot {}",
            robot_id.as_ref().map_or("<none>", RobotId::as_str)
        );
        self.stop();
        {
            let mut inner = self.inner.borrow_mut();
            let session = &mut inner.session;
            session.robot_id = robot_id;
            session.advance();
            session.established = false;
            session.state = StreamState::Idle;
        }
        self.publish_status();
    }

    /// Ask the selected robot to stream. Ignored while a stream is starting, streaming or stopping.
    pub fn start(&self) {
        let (platform, config, robot_id, generation, stop_first) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let session = &mut inner.session;
            match session.state {
                StreamState::Starting(_) | StreamState::Streaming(_) => {
                    debug!("start ignored, stream is already {}", session.state.name());
                    return;
                }
                StreamState::Stopping => {
                    warn!("start ignored while the previous stream is stopping");
                    return;
                }
                StreamState::Idle | StreamState::Error(_) => {}
            }
            let Some(robot_id) = session.robot_id.clone() else {
                warn!("start ignored, no robot selected");
                return;
            };
            if session.release() {
                debug!("cleaned up the failed stream before restarting");
            }
            let stop_first = session.established;
            let generation = session.advance();
            session.established = false;
            session.state = StreamState::Starting(StartJoin::default());
            (
                Rc::clone(&inner.platform),
                Rc::clone(&inner.config),
                robot_id,
                generation,
                stop_first,
            )
        };
        info!("starting stream from {}", robot_id);

        if let Some(timeout) = config.start_timeout() {
            platform.spawn_local(self.clone().expire_start(generation, timeout).boxed_local());
        }
        platform.spawn_local(
            self.clone()
                .run_start(robot_id, generation, stop_first)
                .boxed_local(),
        );
        // listeners may stop or switch robots, both of which supersede `generation`
        self.publish_status();
    }

    /// Tear the stream down. Ignored while idle or already stopping.
    ///
    /// The robot is told to stop unless the stream failed before it was ever established.
    /// That call is best-effort, its failure is only logged.
    pub fn stop(&self) {
        let (platform, stop_url, generation) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let session = &mut inner.session;
            let notify_robot = match session.state {
                StreamState::Idle | StreamState::Stopping => {
                    debug!("stop ignored, stream is {}", session.state.name());
                    return;
                }
                StreamState::Starting(_) | StreamState::Streaming(_) => true,
                StreamState::Error(_) => session.established,
            };
            session.release();
            let generation = session.advance();
            session.state = StreamState::Stopping;
            let stop_url = session
                .robot_id
                .as_ref()
                .filter(|_| notify_robot)
                .map(|robot_id| inner.config.command_url(robot_id));
            (Rc::clone(&inner.platform), stop_url, generation)
        };
        self.publish_status();

        match stop_url {
            Some(url) => {
                let controller = self.clone();
                let control = Rc::clone(&platform);
                platform.spawn_local(
                    async move {
                        info!("asking the robot to stop streaming");
                        let stopped = control.send_command(&url, ControlCommand::Stop).await;
                        if let Err(err) = stopped {
                            warn!("stop command to {} failed: {}", url, err);
                        }
                        controller.finish_stop(generation);
                    }
                    .boxed_local(),
                );
            }
            None => self.finish_stop(generation),
        }
    }

    /// Teardown for when the owner goes away: stops, forgets the robot and drops all listeners.
    pub fn shutdown(&self) {
        self.select_robot(None);
        self.inner.borrow_mut().listeners.clear();
    }

    /// With `stop_first` the robot is told to stop before it is started again.
    async fn run_start(self, robot_id: RobotId, generation: Generation, stop_first: bool) {
        if !self.is_current(generation) {
            debug!("start of {} was superseded before it began", robot_id);
            return;
        }
        let (platform, config) = {
            let inner = self.inner.borrow();
            (Rc::clone(&inner.platform), Rc::clone(&inner.config))
        };
        let command_url = config.command_url(&robot_id);

        if stop_first {
            if let Err(err) = platform.send_command(&command_url, ControlCommand::Stop).await {
                warn!("stop command for {} failed: {}", robot_id, err);
            }
            if !self.is_current(generation) {
                debug!("start of {} was superseded while stopping the robot", robot_id);
                return;
            }
        }

        if let Err(err) = platform
            .send_command(&command_url, ControlCommand::Start)
            .await
        {
            self.fail(generation, &err);
            return;
        }
        if !self.is_current(generation) {
            debug!("start of {} was superseded during the control call", robot_id);
            return;
        }

        let events = self.event_sink(generation);
        let channel = match SignalingChannel::open(&*platform, &config, &robot_id, events.clone())
            .await
        {
            Ok(channel) => Rc::new(channel),
            Err(err) => {
                self.fail(generation, &err);
                return;
            }
        };
        if !self.is_current(generation) {
            debug!("start of {} was superseded while connecting", robot_id);
            channel.close();
            return;
        }

        let peer = match platform.create_peer(&config.connection_type, events) {
            Ok(peer) => PeerSession::new(peer, Rc::clone(&channel), config.buffer_early_candidates),
            Err(err) => {
                channel.close();
                self.fail(generation, &err);
                return;
            }
        };
        self.inner
            .borrow_mut()
            .session
            .attach(channel, Rc::new(peer));
        info!("signaling with {} is up, waiting for the robot", robot_id);
    }

    async fn expire_start(self, generation: Generation, timeout: Duration) {
        let platform = Rc::clone(&self.inner.borrow().platform);
        platform.sleep(timeout).await;
        let still_starting = {
            let inner = self.inner.borrow();
            inner.session.is_current(generation)
                && matches!(inner.session.state, StreamState::Starting(_))
        };
        if still_starting {
            self.fail(generation, &Error::StartTimeout(timeout));
        }
    }

    async fn handle_event(&self, generation: Generation, event: SessionEvent<P::Stream>) {
        let peer = {
            let inner = self.inner.borrow();
            if !inner.session.is_current(generation) {
                debug!(
                    "dropping {} of superseded stream generation {}",
                    event.kind(),
                    generation
                );
                return;
            }
            inner.session.peer()
        };

        match event {
            SessionEvent::Signal(SignalMessage::StartAck) => {
                self.on_start_ack(generation, peer).await;
            }
            SessionEvent::Signal(SignalMessage::StopAck) => {
                info!("robot confirmed the stream stopped");
            }
            SessionEvent::ChannelClosed { reason } => {
                let err = Error::Channel(format!("relay closed the connection: {reason}"));
                self.fail(generation, &err);
            }
            SessionEvent::ConnectionFailed { reason } => {
                self.fail(generation, &Error::PeerConnection(reason));
            }
            SessionEvent::RemoteTrack(stream) => match peer {
                Some(peer) => {
                    peer.on_remote_track(stream.clone());
                    self.record_track(generation, stream);
                }
                None => self.report_violation(NegotiationViolation::SessionClosed),
            },
            negotiation => match peer {
                Some(peer) => {
                    let result = negotiate(&peer, negotiation).await;
                    self.settle_negotiation(generation, result);
                }
                None => self.report_violation(NegotiationViolation::SessionClosed),
            },
        }
    }

    async fn on_start_ack(&self, generation: Generation, peer: Option<Rc<PeerSession<P>>>) {
        info!("robot confirmed the stream start");
        let joined = {
            let mut inner = self.inner.borrow_mut();
            match inner.session.state {
                StreamState::Starting(ref mut join) if !join.is_acknowledged() => {
                    Some(join.acknowledge())
                }
                _ => None,
            }
        };
        let Some(joined) = joined else {
            debug!("duplicate start acknowledgement ignored");
            return;
        };
        if joined {
            self.promote_if_joined();
        }

        let local_offer = self.inner.borrow().config.local_offer;
        if let (true, Some(peer)) = (local_offer, peer) {
            let result = peer.create_local_offer().await;
            self.settle_negotiation(generation, result);
        }
    }

    fn record_track(&self, generation: Generation, stream: P::Stream) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.session.is_current(generation) {
                return;
            }
            match inner.session.state {
                StreamState::Starting(ref mut join) => {
                    if !join.attach_track() {
                        debug!("remote media is in, waiting for the start acknowledgement");
                        return;
                    }
                }
                StreamState::Streaming(ref mut current) => {
                    debug!("remote media replaced while streaming");
                    *current = stream;
                    return;
                }
                _ => return,
            }
        }
        self.promote_if_joined();
    }

    /// `Starting -> Streaming` once both the acknowledgement and the media are in.
    fn promote_if_joined(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            let session = &mut inner.session;
            let joined = matches!(session.state, StreamState::Starting(ref join) if join.is_complete());
            if !joined {
                return;
            }
            let Some(stream) = session.peer().and_then(|peer| peer.media_stream()) else {
                warn!("start completed without remote media, still waiting");
                return;
            };
            session.established = true;
            session.state = StreamState::Streaming(stream);
            info!("streaming from {}", session.robot_label());
        }
        self.publish_status();
    }

    fn finish_stop(&self, generation: Generation) {
        {
            let mut inner = self.inner.borrow_mut();
            let session = &mut inner.session;
            if !session.is_current(generation) || !matches!(session.state, StreamState::Stopping)
            {
                return;
            }
            session.established = false;
            session.state = StreamState::Idle;
            info!("stream from {} stopped", session.robot_label());
        }
        self.publish_status();
    }

    /// Move an active stream of `generation` into `Error` and release what it holds.
    fn fail(&self, generation: Generation, err: &Error) {
        {
            let mut inner = self.inner.borrow_mut();
            let session = &mut inner.session;
            if !session.is_current(generation) || !session.state.is_active() {
                debug!("ignoring failure of a superseded stream: {}", err);
                return;
            }
            error!("stream from {} failed: {}", session.robot_label(), err);
            session.release();
            session.advance();
            session.state = StreamState::Error(err.to_string());
        }
        self.publish_status();
    }

    fn settle_negotiation(&self, generation: Generation, result: Result<()>) {
        match result {
            Ok(()) => {}
            Err(Error::Negotiation(violation)) => self.report_violation(violation),
            Err(err) => self.fail(generation, &err),
        }
    }

    fn report_violation(&self, violation: NegotiationViolation) {
        warn!("negotiation violation, message dropped: {}", violation);
        self.notify(&StreamEvent::NegotiationViolation(violation));
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.inner.borrow().session.is_current(generation)
    }

    fn event_sink(&self, generation: Generation) -> EventSink<P::Stream> {
        EventSink::new(generation, self.inner.borrow().events.clone())
    }

    fn publish_status(&self) {
        let status = {
            let mut inner = self.inner.borrow_mut();
            let status = inner.session.state.status();
            if status == inner.published {
                return;
            }
            inner.published = status.clone();
            status
        };
        debug!("stream status is now {}", status);
        self.notify(&StreamEvent::StatusChanged(status));
    }

    fn notify(&self, event: &StreamEvent) {
        let listeners = self.inner.borrow().listeners.clone();
        for listener in listeners {
            listener(event);
        }
    }
}

async fn negotiate<P: Platform>(
    peer: &PeerSession<P>,
    event: SessionEvent<P::Stream>,
) -> Result<()> {
    match event {
        SessionEvent::Signal(SignalMessage::Offer { sdp }) => peer.on_remote_offer(&sdp).await,
        SessionEvent::Signal(SignalMessage::Answer { sdp }) => peer.on_remote_answer(&sdp).await,
        SessionEvent::Signal(SignalMessage::IceCandidate { candidate }) => {
            peer.on_remote_ice_candidate(candidate).await
        }
        SessionEvent::LocalIceCandidate(candidate) => peer.on_local_ice_candidate(candidate),
        other => {
            debug!("{} needs no negotiation", other.kind());
            Ok(())
        }
    }
}

/// Applies session events one at a time, in arrival order, for as long as the controller lives.
async fn pump<P: Platform>(
    controller: Weak<RefCell<ControllerInner<P>>>,
    mut events: UnboundedReceiver<(Generation, SessionEvent<P::Stream>)>,
) {
    while let Some((generation, event)) = events.next().await {
        let Some(inner) = controller.upgrade() else {
            break;
        };
        StreamController { inner }
            .handle_event(generation, event)
            .await;
    }
    debug!("stream controller is gone, event pump finished");
}
