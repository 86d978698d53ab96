use anyhow::{bail, Context};
use log::{debug, info};
use robot_stream_protocol::ControlCommand;
use serde::Serialize;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

use crate::error::{Error, Result};
use crate::web::utils::js_error;

#[derive(Serialize)]
struct CommandBody {
    command: ControlCommand,
}

/// `POST {"command": ...}` to the robot's command endpoint.
///
/// # Errors
/// [`Error::ControlCall`] on network failure or a non-success HTTP status.
pub(crate) async fn post_command(url: &str, command: ControlCommand) -> Result<()> {
    info!("sending {} to {}", command, url);
    send(url, command)
        .await
        .map_err(|err| Error::ControlCall {
            command,
            reason: format!("{err:#}"),
        })
}

async fn send(url: &str, command: ControlCommand) -> anyhow::Result<()> {
    let body = serde_json::to_string(&CommandBody { command })?;

    let init = RequestInit::new();
    init.set_method("POST");
    init.set_mode(RequestMode::Cors);
    init.set_body(&JsValue::from_str(&body));
    let request = Request::new_with_str_and_init(url, &init)
        .map_err(js_error("failed to build control request"))?;
    request
        .headers()
        .set("Content-Type", "application/json")
        .map_err(js_error("failed to set control request headers"))?;

    let window = web_sys::window().context("no window to send the control request from")?;
    let response: Response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(js_error("control API is unreachable"))?
        .dyn_into()
        .map_err(js_error("fetch did not resolve to a response"))?;
    if !response.ok() {
        bail!("HTTP {} {}", response.status(), response.status_text());
    }
    debug!("{} accepted with HTTP {}", command, response.status());
    Ok(())
}
