//! Scripted platform for driving the stream logic on a single-threaded executor.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::{self, LocalBoxFuture};
use futures::task::LocalSpawnExt;
use robot_stream_protocol::{ControlCommand, IceCandidate, RobotId, SignalMessage};

use crate::config::{ConnectionType, StreamConfig};
use crate::controller::{StreamController, StreamEvent, StreamStatus};
use crate::error::{Error, NegotiationViolation, Result};
use crate::platform::{EventSink, PeerConnection, Platform, SdpKind, SessionEvent, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MockStream(pub(crate) &'static str);

pub(crate) fn candidate(index: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{index} 1 udp 2122260223 10.0.0.{index} 5000{index} typ host"),
        sdp_mid: Some("0".to_owned()),
        sdp_m_line_index: Some(0),
    }
}

/// Holds async steps until released.
#[derive(Debug, Default)]
pub(crate) struct Gate {
    held: Cell<bool>,
    waiters: RefCell<Vec<oneshot::Sender<()>>>,
}

impl Gate {
    pub(crate) fn hold(&self) {
        self.held.set(true);
    }

    pub(crate) fn release(&self) {
        self.held.set(false);
        for waiter in self.waiters.borrow_mut().drain(..) {
            waiter.send(()).ok();
        }
    }

    async fn pass(&self) {
        if !self.held.get() {
            return;
        }
        let (sender, receiver) = oneshot::channel();
        self.waiters.borrow_mut().push(sender);
        receiver.await.ok();
    }
}

#[derive(Debug, Default)]
pub(crate) struct Wire {
    open: Cell<bool>,
    sent: RefCell<Vec<SignalMessage>>,
    pub(crate) closes: Cell<u32>,
}

impl Wire {
    pub(crate) fn sent(&self) -> Vec<SignalMessage> {
        self.sent.borrow().clone()
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.open.set(open);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockTransport {
    pub(crate) wire: Rc<Wire>,
}

impl MockTransport {
    pub(crate) fn open() -> Self {
        let wire = Rc::new(Wire::default());
        wire.set_open(true);
        Self { wire }
    }
}

impl Transport for MockTransport {
    fn is_open(&self) -> bool {
        self.wire.open.get()
    }

    fn send_text(&self, text: &str) -> Result<()> {
        let message = serde_json::from_str(text)?;
        self.wire.sent.borrow_mut().push(message);
        Ok(())
    }

    fn close(&self) {
        self.wire.set_open(false);
        self.wire.closes.set(self.wire.closes.get() + 1);
    }
}

#[derive(Debug, Default)]
pub(crate) struct PeerLog {
    remote_descriptions: RefCell<Vec<(SdpKind, String)>>,
    candidates: RefCell<Vec<IceCandidate>>,
    answers: Cell<u32>,
    pub(crate) offers: Cell<u32>,
    pub(crate) closes: Cell<u32>,
    pub(crate) fail_remote_description: Cell<bool>,
    pub(crate) answer_gate: Gate,
}

impl PeerLog {
    pub(crate) fn remote_descriptions(&self) -> Vec<(SdpKind, String)> {
        self.remote_descriptions.borrow().clone()
    }

    pub(crate) fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.borrow().clone()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockPeer {
    pub(crate) log: Rc<PeerLog>,
}

#[async_trait(?Send)]
impl PeerConnection for MockPeer {
    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        if self.log.fail_remote_description.get() {
            return Err(Error::peer("remote description rejected"));
        }
        self.log
            .remote_descriptions
            .borrow_mut()
            .push((kind, sdp.to_owned()));
        Ok(())
    }

    async fn create_answer(&self) -> Result<String> {
        self.log.answer_gate.pass().await;
        self.log.answers.set(self.log.answers.get() + 1);
        Ok(format!("answer-{}", self.log.answers.get()))
    }

    async fn create_offer(&self) -> Result<String> {
        self.log.offers.set(self.log.offers.get() + 1);
        Ok("browser-offer".to_owned())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.log.candidates.borrow_mut().push(candidate.clone());
        Ok(())
    }

    fn close(&self) {
        self.log.closes.set(self.log.closes.get() + 1);
    }
}

pub(crate) struct OpenedChannel {
    pub(crate) url: String,
    pub(crate) wire: Rc<Wire>,
    pub(crate) events: EventSink<MockStream>,
}

pub(crate) struct CreatedPeer {
    pub(crate) log: Rc<PeerLog>,
    pub(crate) events: EventSink<MockStream>,
}

#[derive(Default)]
pub(crate) struct MockState {
    pub(crate) commands: RefCell<Vec<(String, ControlCommand)>>,
    pub(crate) control_gate: Gate,
    pub(crate) fail_start: Cell<bool>,
    pub(crate) fail_stop: Cell<bool>,
    pub(crate) open_gate: Gate,
    pub(crate) fail_open: Cell<bool>,
    pub(crate) channels: RefCell<Vec<OpenedChannel>>,
    pub(crate) peers: RefCell<Vec<CreatedPeer>>,
    timers: RefCell<Vec<(Duration, oneshot::Sender<()>)>>,
}

pub(crate) struct MockPlatform {
    state: Rc<MockState>,
    spawner: LocalSpawner,
}

#[async_trait(?Send)]
impl Platform for MockPlatform {
    type Stream = MockStream;
    type Transport = MockTransport;
    type Peer = MockPeer;

    async fn send_command(&self, url: &str, command: ControlCommand) -> Result<()> {
        self.state
            .commands
            .borrow_mut()
            .push((url.to_owned(), command));
        self.state.control_gate.pass().await;
        let failed = match command {
            ControlCommand::Start => self.state.fail_start.get(),
            ControlCommand::Stop => self.state.fail_stop.get(),
        };
        if failed {
            return Err(Error::ControlCall {
                command,
                reason: "HTTP 503".to_owned(),
            });
        }
        Ok(())
    }

    async fn open_transport(
        &self,
        url: &str,
        events: EventSink<MockStream>,
    ) -> Result<MockTransport> {
        self.state.open_gate.pass().await;
        if self.state.fail_open.get() {
            return Err(Error::Channel("connection refused".to_owned()));
        }
        let transport = MockTransport::open();
        self.state.channels.borrow_mut().push(OpenedChannel {
            url: url.to_owned(),
            wire: Rc::clone(&transport.wire),
            events,
        });
        Ok(transport)
    }

    fn create_peer(
        &self,
        _connection_type: &ConnectionType,
        events: EventSink<MockStream>,
    ) -> Result<MockPeer> {
        let peer = MockPeer::default();
        self.state.peers.borrow_mut().push(CreatedPeer {
            log: Rc::clone(&peer.log),
            events,
        });
        Ok(peer)
    }

    async fn sleep(&self, duration: Duration) {
        let (sender, receiver) = oneshot::channel();
        self.state.timers.borrow_mut().push((duration, sender));
        if receiver.await.is_err() {
            future::pending::<()>().await;
        }
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        self.spawner
            .spawn_local(task)
            .expect("test pool accepts tasks");
    }
}

/// Controller wired to a [`MockPlatform`] on a [`LocalPool`], recording everything it publishes.
pub(crate) struct Harness {
    pool: LocalPool,
    pub(crate) state: Rc<MockState>,
    pub(crate) controller: StreamController<MockPlatform>,
    published: Rc<RefCell<Vec<StreamEvent>>>,
}

impl Harness {
    pub(crate) fn new(config: StreamConfig) -> Self {
        let pool = LocalPool::new();
        let state = Rc::new(MockState::default());
        let platform = MockPlatform {
            state: Rc::clone(&state),
            spawner: pool.spawner(),
        };
        let controller = StreamController::new(platform, config);
        let published = Rc::new(RefCell::new(Vec::new()));
        {
            let published = Rc::clone(&published);
            controller.subscribe(move |event| published.borrow_mut().push(event.clone()));
        }
        Self {
            pool,
            state,
            controller,
            published,
        }
    }

    pub(crate) fn with_robot(robot_id: &str) -> Self {
        let harness = Self::new(StreamConfig::default());
        harness
            .controller
            .select_robot(Some(RobotId::new(robot_id.to_owned())));
        harness
    }

    /// Run every task until none can make progress.
    pub(crate) fn settle(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Control calls made so far, keyed by the robot id in their endpoint.
    pub(crate) fn commands(&self) -> Vec<(String, ControlCommand)> {
        self.state
            .commands
            .borrow()
            .iter()
            .map(|&(ref url, command)| {
                let robot_id = url
                    .trim_end_matches("/command")
                    .rsplit('/')
                    .next()
                    .unwrap_or_default();
                (robot_id.to_owned(), command)
            })
            .collect()
    }

    pub(crate) fn command_url(&self, index: usize) -> String {
        self.state.commands.borrow()[index].0.clone()
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.state.peers.borrow().len()
    }

    pub(crate) fn channel_count(&self) -> usize {
        self.state.channels.borrow().len()
    }

    pub(crate) fn channel_url(&self, index: usize) -> String {
        self.state.channels.borrow()[index].url.clone()
    }

    pub(crate) fn wire(&self, index: usize) -> Rc<Wire> {
        Rc::clone(&self.state.channels.borrow()[index].wire)
    }

    pub(crate) fn peer(&self, index: usize) -> Rc<PeerLog> {
        Rc::clone(&self.state.peers.borrow()[index].log)
    }

    /// Deliver `message` on the most recently opened channel.
    pub(crate) fn signal(&self, message: SignalMessage) {
        self.signal_on(self.channel_count() - 1, message);
    }

    pub(crate) fn signal_on(&self, index: usize, message: SignalMessage) {
        self.state.channels.borrow()[index]
            .events
            .emit(SessionEvent::Signal(message));
    }

    pub(crate) fn drop_channel(&self, reason: &str) {
        let channels = self.state.channels.borrow();
        let channel = channels.last().expect("a channel was opened");
        channel.wire.set_open(false);
        channel.events.emit(SessionEvent::ChannelClosed {
            reason: reason.to_owned(),
        });
    }

    /// Let the most recently created peer report remote media.
    pub(crate) fn attach_track(&self, name: &'static str) {
        self.peer_events().emit(SessionEvent::RemoteTrack(MockStream(name)));
    }

    pub(crate) fn gather_candidate(&self, index: u16) {
        self.peer_events()
            .emit(SessionEvent::LocalIceCandidate(candidate(index)));
    }

    pub(crate) fn fail_connection(&self) {
        self.peer_events().emit(SessionEvent::ConnectionFailed {
            reason: "ice failed".to_owned(),
        });
    }

    fn peer_events(&self) -> EventSink<MockStream> {
        self.state
            .peers
            .borrow()
            .last()
            .expect("a peer was created")
            .events
            .clone()
    }

    pub(crate) fn pending_timers(&self) -> Vec<Duration> {
        self.state
            .timers
            .borrow()
            .iter()
            .map(|&(duration, _)| duration)
            .collect()
    }

    pub(crate) fn fire_timers(&self) {
        for (_, timer) in self.state.timers.borrow_mut().drain(..) {
            timer.send(()).ok();
        }
    }

    pub(crate) fn statuses(&self) -> Vec<StreamStatus> {
        self.published
            .borrow()
            .iter()
            .filter_map(|event| match *event {
                StreamEvent::StatusChanged(ref status) => Some(status.clone()),
                StreamEvent::NegotiationViolation(_) => None,
            })
            .collect()
    }

    pub(crate) fn violations(&self) -> Vec<NegotiationViolation> {
        self.published
            .borrow()
            .iter()
            .filter_map(|event| match *event {
                StreamEvent::NegotiationViolation(ref violation) => Some(violation.clone()),
                StreamEvent::StatusChanged(_) => None,
            })
            .collect()
    }

    /// Walk a fresh start all the way to `Streaming`: ack, offer, answer, track.
    pub(crate) fn stream(&mut self) {
        self.controller.start();
        self.settle();
        self.signal(SignalMessage::StartAck);
        self.signal(SignalMessage::Offer {
            sdp: "v=0 robot".to_owned(),
        });
        self.settle();
        self.attach_track("camera");
        self.settle();
    }
}
