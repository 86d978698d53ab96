/*!
JavaScript facade over [`StreamController`] for pages that embed the stream.

```js
const stream = new RobotStream(JSON.stringify({ relayUrl: "wss://relay.example.com" }));
stream.onStatusChange((status, error) => render(status, error, stream.mediaStream));
stream.selectRobot("R-001");
stream.start();
```
*/

use std::str::FromStr;

use js_sys::Function;
use log::{warn, Level};
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen::JsValue;
use web_sys::MediaStream;

use crate::config::StreamConfig;
use crate::controller::{StreamController, StreamEvent};
use crate::web::utils::{describe, set_panic_hook};
use crate::web::BrowserPlatform;
use crate::RobotId;

/// Route library logs to the browser console at `level` (`"debug"` when omitted).
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: Option<String>) -> Result<(), JsValue> {
    let level = match level {
        Some(level) => Level::from_str(&level)
            .map_err(|err| JsValue::from_str(&format!("{err}: {level}")))?,
        None => Level::Debug,
    };
    crate::web::init_logging(level);
    Ok(())
}

/// One robot video stream, driven from JavaScript.
#[wasm_bindgen]
pub struct RobotStream {
    controller: StreamController<BrowserPlatform>,
}

#[wasm_bindgen]
impl RobotStream {
    /// Create a stream from a camelCase JSON configuration; `"{}"` uses the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<RobotStream, JsValue> {
        set_panic_hook();
        let config = StreamConfig::from_json(config_json)
            .map_err(|err| JsValue::from_str(&err.to_string()))?;
        Ok(Self {
            controller: StreamController::new(BrowserPlatform, config),
        })
    }

    /// Switch to another robot, or to none with `null`. Any running stream is stopped.
    #[wasm_bindgen(js_name = selectRobot)]
    pub fn select_robot(&self, robot_id: Option<String>) {
        self.controller.select_robot(robot_id.map(RobotId::new));
    }

    pub fn start(&self) {
        self.controller.start();
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    /// One of `idle`, `connecting`, `streaming` or `error`.
    #[wasm_bindgen(getter)]
    pub fn status(&self) -> String {
        self.controller.status().as_str().to_owned()
    }

    #[wasm_bindgen(getter, js_name = errorMessage)]
    pub fn error_message(&self) -> Option<String> {
        self.controller.last_error()
    }

    #[wasm_bindgen(getter, js_name = mediaStream)]
    pub fn media_stream(&self) -> Option<MediaStream> {
        self.controller.media_stream()
    }

    /// Call `callback(status, errorMessage)` on every status change.
    #[wasm_bindgen(js_name = onStatusChange)]
    pub fn on_status_change(&self, callback: Function) {
        self.controller.subscribe(move |event| {
            if let StreamEvent::StatusChanged(ref status) = *event {
                let error = status
                    .error_message()
                    .map_or(JsValue::NULL, JsValue::from_str);
                if let Err(err) = callback.call2(&JsValue::NULL, &status.as_str().into(), &error) {
                    warn!("status change callback threw: {}", describe(&err));
                }
            }
        });
    }

    /// Stop streaming and release everything. The instance must not be used afterwards.
    pub fn dispose(&self) {
        self.controller.shutdown();
    }
}
