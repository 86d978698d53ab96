/*!
Browser implementation of [`Platform`]: `fetch` for the control API, a `WebSocket`
for the relay and `RTCPeerConnection` for media.
*/

use std::time::Duration;

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use robot_stream_protocol::ControlCommand;
use web_sys::MediaStream;

pub use self::peer::BrowserPeer;
pub use self::utils::init_logging;
pub use self::websocket::WebSocketTransport;
use crate::config::ConnectionType;
use crate::error::Result;
use crate::platform::{EventSink, Platform};

mod control;
mod peer;
pub(crate) mod utils;
mod websocket;

/// Runs the stream in the page that loaded this module.
/// Stateless, every address it needs is handed over by the controller.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserPlatform;

#[async_trait(?Send)]
impl Platform for BrowserPlatform {
    type Stream = MediaStream;
    type Transport = WebSocketTransport;
    type Peer = BrowserPeer;

    async fn send_command(&self, url: &str, command: ControlCommand) -> Result<()> {
        control::post_command(url, command).await
    }

    async fn open_transport(
        &self,
        url: &str,
        events: EventSink<MediaStream>,
    ) -> Result<WebSocketTransport> {
        WebSocketTransport::connect(url, events).await
    }

    fn create_peer(
        &self,
        connection_type: &ConnectionType,
        events: EventSink<MediaStream>,
    ) -> Result<BrowserPeer> {
        BrowserPeer::new(connection_type, events)
    }

    async fn sleep(&self, duration: Duration) {
        utils::sleep(duration).await;
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}
