use async_trait::async_trait;
use log::{debug, warn};
use robot_stream_protocol::IceCandidate;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    MediaStream, RtcIceCandidateInit, RtcIceConnectionState, RtcPeerConnection,
    RtcPeerConnectionIceEvent, RtcRtpTransceiverDirection, RtcRtpTransceiverInit, RtcTrackEvent,
};

use crate::config::ConnectionType;
use crate::error::{Error, Result};
use crate::platform::{EventSink, PeerConnection, SdpKind, SessionEvent};
use crate::web::utils::{
    create_peer_connection, create_sdp_answer, create_sdp_offer, describe,
    set_remote_description,
};

struct PeerCallbacks {
    on_track: Closure<dyn FnMut(RtcTrackEvent)>,
    on_ice_candidate: Closure<dyn FnMut(RtcPeerConnectionIceEvent)>,
    on_ice_connection_state_change: Closure<dyn FnMut()>,
}

/// [`PeerConnection`] over a browser `RTCPeerConnection` that only receives media.
pub struct BrowserPeer {
    peer_connection: RtcPeerConnection,
    _callbacks: PeerCallbacks,
}

impl BrowserPeer {
    /// # Errors
    /// [`Error::PeerConnection`] if the browser refuses the configuration.
    pub fn new(connection_type: &ConnectionType, events: EventSink<MediaStream>) -> Result<Self> {
        let peer_connection =
            create_peer_connection(connection_type).map_err(|err| peer_error(&err))?;

        let callbacks = PeerCallbacks {
            on_track: on_track(events.clone()),
            on_ice_candidate: on_ice_candidate(events.clone()),
            on_ice_connection_state_change: on_ice_connection_state_change(
                peer_connection.clone(),
                events,
            ),
        };
        peer_connection.set_ontrack(Some(callbacks.on_track.as_ref().unchecked_ref()));
        peer_connection
            .set_onicecandidate(Some(callbacks.on_ice_candidate.as_ref().unchecked_ref()));
        peer_connection.set_oniceconnectionstatechange(Some(
            callbacks
                .on_ice_connection_state_change
                .as_ref()
                .unchecked_ref(),
        ));

        Ok(Self {
            peer_connection,
            _callbacks: callbacks,
        })
    }

    fn detach(&self) {
        self.peer_connection.set_ontrack(None);
        self.peer_connection.set_onicecandidate(None);
        self.peer_connection.set_oniceconnectionstatechange(None);
    }
}

fn on_track(events: EventSink<MediaStream>) -> Closure<dyn FnMut(RtcTrackEvent)> {
    Closure::wrap(Box::new(move |ev: RtcTrackEvent| {
        let stream = ev
            .streams()
            .get(0)
            .dyn_into::<MediaStream>()
            .ok()
            .or_else(|| {
                // robots that send bare tracks get a stream assembled around them
                let stream = MediaStream::new().ok()?;
                stream.add_track(&ev.track());
                Some(stream)
            });
        match stream {
            Some(stream) => {
                debug!("received remote track {}", ev.track().kind());
                events.emit(SessionEvent::RemoteTrack(stream));
            }
            None => warn!("remote track arrived but no media stream could hold it"),
        }
    }) as Box<dyn FnMut(RtcTrackEvent)>)
}

fn on_ice_candidate(
    events: EventSink<MediaStream>,
) -> Closure<dyn FnMut(RtcPeerConnectionIceEvent)> {
    Closure::wrap(Box::new(move |ev: RtcPeerConnectionIceEvent| {
        match ev.candidate() {
            Some(candidate) => {
                events.emit(SessionEvent::LocalIceCandidate(IceCandidate {
                    candidate: candidate.candidate(),
                    sdp_mid: candidate.sdp_mid(),
                    sdp_m_line_index: candidate.sdp_m_line_index(),
                }));
            }
            None => debug!("ice gathering complete"),
        }
    }) as Box<dyn FnMut(RtcPeerConnectionIceEvent)>)
}

fn on_ice_connection_state_change(
    peer_connection: RtcPeerConnection,
    events: EventSink<MediaStream>,
) -> Closure<dyn FnMut()> {
    Closure::wrap(Box::new(move || {
        let state = peer_connection.ice_connection_state();
        debug!("ice connection state: {:?}", state);
        if state == RtcIceConnectionState::Failed {
            events.emit(SessionEvent::ConnectionFailed {
                reason: "ice connection failed".to_owned(),
            });
        }
    }) as Box<dyn FnMut()>)
}

fn peer_error(err: &anyhow::Error) -> Error {
    Error::peer(format!("{err:#}"))
}

#[async_trait(?Send)]
impl PeerConnection for BrowserPeer {
    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        set_remote_description(&self.peer_connection, kind, sdp)
            .await
            .map_err(|err| peer_error(&err))
    }

    async fn create_answer(&self) -> Result<String> {
        create_sdp_answer(&self.peer_connection)
            .await
            .map_err(|err| peer_error(&err))
    }

    async fn create_offer(&self) -> Result<String> {
        let init = RtcRtpTransceiverInit::new();
        init.set_direction(RtcRtpTransceiverDirection::Recvonly);
        self.peer_connection
            .add_transceiver_with_str_and_init("video", &init);
        create_sdp_offer(&self.peer_connection)
            .await
            .map_err(|err| peer_error(&err))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let rtc_candidate = RtcIceCandidateInit::new(&candidate.candidate);
        rtc_candidate.set_sdp_mid(candidate.sdp_mid.as_deref());
        rtc_candidate.set_sdp_m_line_index(candidate.sdp_m_line_index);
        JsFuture::from(
            self.peer_connection
                .add_ice_candidate_with_opt_rtc_ice_candidate_init(Some(&rtc_candidate)),
        )
        .await
        .map_err(|err| Error::peer(describe(&err)))?;
        Ok(())
    }

    fn close(&self) {
        self.detach();
        self.peer_connection.close();
    }
}

impl Drop for BrowserPeer {
    fn drop(&mut self) {
        self.detach();
    }
}
