use std::cell::Cell;

use log::{debug, error, info, warn};
use robot_stream_protocol::{RobotId, SignalMessage};

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::platform::{EventSink, Platform, Transport};

/// Framed JSON signaling connection to one robot's endpoint on the relay.
///
/// Messages are neither queued nor retried: anything sent while the transport
/// is not open is logged and dropped.
#[derive(Debug)]
pub struct SignalingChannel<T> {
    robot_id: RobotId,
    transport: T,
    closed: Cell<bool>,
}

impl<T: Transport> SignalingChannel<T> {
    /// Connect to `<relay>/signaling/<robotId>/web`.
    /// Inbound messages and unexpected closure are reported through `events`.
    ///
    /// # Errors
    /// [`Error::Channel`] if the relay cannot be reached. Not retried.
    pub async fn open<P>(
        platform: &P,
        config: &StreamConfig,
        robot_id: &RobotId,
        events: EventSink<P::Stream>,
    ) -> Result<Self>
    where
        P: Platform<Transport = T>,
        T: 'static,
    {
        let url = config.signaling_url(robot_id);
        info!("opening signaling channel: {}", url);
        let transport = platform
            .open_transport(&url, events)
            .await
            .map_err(|err| match err {
                Error::Channel(reason) => Error::Channel(reason),
                other => Error::Channel(format!("failed to reach {url}: {other}")),
            })?;
        debug!("signaling channel for {} is open", robot_id);
        Ok(Self::new(robot_id.clone(), transport))
    }

    pub(crate) fn new(robot_id: RobotId, transport: T) -> Self {
        Self {
            robot_id,
            transport,
            closed: Cell::new(false),
        }
    }

    #[must_use]
    pub fn robot_id(&self) -> &RobotId {
        &self.robot_id
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.get() && self.transport.is_open()
    }

    /// Serialize and transmit `message`.
    /// Returns whether it was handed to the transport.
    pub fn send(&self, message: &SignalMessage) -> bool {
        if !self.is_open() {
            warn!(
                "signaling channel for {} is not open, dropping {}",
                self.robot_id,
                message.kind()
            );
            return false;
        }
        match self.transmit(message) {
            Ok(()) => {
                debug!("sent {} to {}", message.kind(), self.robot_id);
                true
            }
            Err(err) => {
                error!("failed to send {} to {}: {}", message.kind(), self.robot_id, err);
                false
            }
        }
    }

    fn transmit(&self, message: &SignalMessage) -> Result<()> {
        let text = serde_json::to_string(message)?;
        self.transport.send_text(&text)
    }

    /// Idempotent, later calls do nothing.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.transport.close();
        info!("signaling channel for {} closed", self.robot_id);
    }
}

/// Decode one inbound frame, logging and discarding anything malformed.
#[must_use]
pub fn decode(text: &str) -> Option<SignalMessage> {
    match serde_json::from_str(text) {
        Ok(message) => Some(message),
        Err(err) => {
            error!("failed to deserialize signaling message: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::IceCandidate;

    #[derive(Debug, Default)]
    struct Wire {
        open: Cell<bool>,
        frames: RefCell<Vec<String>>,
        closes: Cell<u32>,
        refuse: Cell<bool>,
    }

    #[derive(Debug)]
    struct FakeTransport(Rc<Wire>);

    impl Transport for FakeTransport {
        fn is_open(&self) -> bool {
            self.0.open.get()
        }

        fn send_text(&self, text: &str) -> Result<()> {
            if self.0.refuse.get() {
                return Err(Error::channel("send buffer full"));
            }
            self.0.frames.borrow_mut().push(text.to_owned());
            Ok(())
        }

        fn close(&self) {
            self.0.open.set(false);
            self.0.closes.set(self.0.closes.get() + 1);
        }
    }

    fn channel() -> (SignalingChannel<FakeTransport>, Rc<Wire>) {
        let wire = Rc::new(Wire::default());
        wire.open.set(true);
        let channel = SignalingChannel::new(
            RobotId::new("R-001".to_owned()),
            FakeTransport(Rc::clone(&wire)),
        );
        (channel, wire)
    }

    #[test]
    fn send_frames_json_with_type_tag() {
        let (channel, wire) = channel();
        let sent = channel.send(&SignalMessage::IceCandidate {
            candidate: IceCandidate {
                candidate: "candidate:0 1 UDP 1 10.0.0.3 9 typ host".to_owned(),
                sdp_mid: Some("0".to_owned()),
                sdp_m_line_index: Some(0),
            },
        });

        assert!(sent);
        let frames = wire.frames.borrow();
        assert_eq!(frames.len(), 1);
        let frame: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(frame["type"], "ice");
        assert_eq!(frame["candidate"]["sdpMLineIndex"], 0);
    }

    #[test]
    fn send_on_transport_that_is_not_open_is_dropped() {
        let (channel, wire) = channel();
        wire.open.set(false);

        assert!(!channel.send(&SignalMessage::Answer {
            sdp: "v=0".to_owned()
        }));
        assert!(wire.frames.borrow().is_empty());
    }

    #[test]
    fn send_refused_by_transport_reports_failure() {
        let (channel, wire) = channel();
        wire.refuse.set(true);

        assert!(!channel.send(&SignalMessage::Answer {
            sdp: "v=0".to_owned()
        }));
        assert!(channel.is_open());

        wire.refuse.set(false);
        assert!(channel.send(&SignalMessage::StopAck));
        assert_eq!(wire.frames.borrow().len(), 1);
    }

    #[test]
    fn close_is_idempotent_and_blocks_further_sends() {
        let (channel, wire) = channel();
        channel.close();
        channel.close();

        assert_eq!(wire.closes.get(), 1);
        assert!(!channel.is_open());
        assert!(!channel.send(&SignalMessage::StopAck));
    }

    #[test]
    fn decode_discards_malformed_frames() {
        assert_eq!(
            decode(r#"{"type":"offer","sdp":"v=0"}"#),
            Some(SignalMessage::Offer {
                sdp: "v=0".to_owned()
            })
        );
        assert_eq!(decode("not json"), None);
        assert_eq!(decode(r#"{"type":"offer"}"#), None);
    }
}
