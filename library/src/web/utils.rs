use std::time::Duration;

use anyhow::anyhow;
use js_sys::{Array, Object, Promise, Reflect};
use log::{error, Level};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{RtcConfiguration, RtcPeerConnection, RtcSdpType, RtcSessionDescriptionInit};

use crate::config::ConnectionType;
use crate::platform::SdpKind;

pub(crate) fn set_panic_hook() {
    // When the `console_error_panic_hook` feature is enabled, we can call the
    // `set_panic_hook` function at least once during initialization, and then
    // we will get better error messages if our code ever panics.
    //
    // For more details see
    // https://github.com/rustwasm/console_error_panic_hook#readme
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Route `log` records to the browser console. Later calls keep the first logger.
pub fn init_logging(level: Level) {
    set_panic_hook();
    wasm_logger::init(wasm_logger::Config::new(level));
}

/// Best-effort human readable text of a thrown JS value.
pub(crate) fn describe(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    format!("{value:?}")
}

pub(crate) fn js_error(context: &'static str) -> impl Fn(JsValue) -> anyhow::Error {
    move |value| anyhow!("{}: {}", context, describe(&value))
}

fn ice_server(urls: &str, credentials: Option<(&str, &str)>) -> anyhow::Result<Object> {
    let server_entry = Object::new();
    Reflect::set(&server_entry, &"urls".into(), &urls.into())
        .map_err(js_error("failed to set ice server urls"))?;
    if let Some((username, credential)) = credentials {
        Reflect::set(&server_entry, &"username".into(), &username.into())
            .map_err(js_error("failed to set ice server username"))?;
        Reflect::set(&server_entry, &"credential".into(), &credential.into())
            .map_err(js_error("failed to set ice server credential"))?;
    }
    Ok(server_entry)
}

pub(crate) fn create_peer_connection(
    connection_type: &ConnectionType,
) -> anyhow::Result<RtcPeerConnection> {
    let ice_servers = Array::new();
    match *connection_type {
        ConnectionType::Local => {
            return RtcPeerConnection::new().map_err(js_error("failed to create peer connection"));
        }
        ConnectionType::Stun { ref urls } => {
            let stun_entry = ice_server(urls, None)?;
            ice_servers.push(&stun_entry);
        }
        ConnectionType::StunAndTurn {
            ref stun_urls,
            ref turn_urls,
            ref username,
            ref credential,
        } => {
            let stun_entry = ice_server(stun_urls, None)?;
            ice_servers.push(&stun_entry);
            let turn_entry = ice_server(turn_urls, Some((username, credential)))?;
            ice_servers.push(&turn_entry);
        }
    }

    let rtc_configuration = RtcConfiguration::new();
    rtc_configuration.set_ice_servers(&ice_servers);
    RtcPeerConnection::new_with_configuration(&rtc_configuration)
        .map_err(js_error("failed to create peer connection"))
}

const fn sdp_type(kind: SdpKind) -> RtcSdpType {
    match kind {
        SdpKind::Offer => RtcSdpType::Offer,
        SdpKind::Answer => RtcSdpType::Answer,
    }
}

fn extract_sdp(description: &JsValue) -> anyhow::Result<String> {
    Reflect::get(description, &JsValue::from_str("sdp"))
        .map_err(js_error("session description has no sdp"))?
        .as_string()
        .ok_or_else(|| anyhow!("session description sdp is not a string"))
}

async fn set_local_description(
    peer_connection: &RtcPeerConnection,
    kind: SdpKind,
    sdp: &str,
) -> anyhow::Result<()> {
    let local_session_description = RtcSessionDescriptionInit::new(sdp_type(kind));
    local_session_description.set_sdp(sdp);
    JsFuture::from(peer_connection.set_local_description(&local_session_description))
        .await
        .map_err(js_error("failed to set local description"))?;
    Ok(())
}

pub(crate) async fn set_remote_description(
    peer_connection: &RtcPeerConnection,
    kind: SdpKind,
    sdp: &str,
) -> anyhow::Result<()> {
    let remote_session_description = RtcSessionDescriptionInit::new(sdp_type(kind));
    remote_session_description.set_sdp(sdp);
    JsFuture::from(peer_connection.set_remote_description(&remote_session_description))
        .await
        .map_err(js_error("failed to set remote description"))?;
    Ok(())
}

pub(crate) async fn create_sdp_offer(peer_connection: &RtcPeerConnection) -> anyhow::Result<String> {
    let offer = JsFuture::from(peer_connection.create_offer())
        .await
        .map_err(js_error("failed to create offer"))?;
    let offer = extract_sdp(&offer)?;
    set_local_description(peer_connection, SdpKind::Offer, &offer).await?;
    Ok(offer)
}

pub(crate) async fn create_sdp_answer(
    peer_connection: &RtcPeerConnection,
) -> anyhow::Result<String> {
    let answer = JsFuture::from(peer_connection.create_answer())
        .await
        .map_err(js_error("failed to create answer"))?;
    let answer = extract_sdp(&answer)?;
    set_local_description(peer_connection, SdpKind::Answer, &answer).await?;
    Ok(answer)
}

/// Resolves after `duration` through `setTimeout`. Never resolves outside a window.
pub(crate) async fn sleep(duration: Duration) {
    let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
    let promise = Promise::new(&mut |resolve, _reject| {
        let scheduled = web_sys::window().map(|window| {
            window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis)
        });
        match scheduled {
            Some(Ok(_)) => {}
            Some(Err(err)) => error!("failed to schedule timer: {}", describe(&err)),
            None => error!("no window to schedule a timer on"),
        }
    });
    if let Err(err) = JsFuture::from(promise).await {
        error!("timer failed: {}", describe(&err));
    }
}
