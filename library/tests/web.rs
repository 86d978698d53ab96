//! Test suite for the Web and headless browsers.

#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use robot_stream::bindings::RobotStream;
use robot_stream::web::BrowserPlatform;
use robot_stream::{RobotId, StreamConfig, StreamController, StreamEvent, StreamStatus};
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn facade_starts_idle_with_default_config() {
    let stream = RobotStream::new("{}").expect("default config is valid");
    assert_eq!(stream.status(), "idle");
    assert!(stream.error_message().is_none());
    assert!(stream.media_stream().is_none());
    stream.dispose();
}

#[wasm_bindgen_test]
fn facade_rejects_relay_without_websocket_scheme() {
    assert!(RobotStream::new(r#"{"relayUrl":"http://relay.example.com"}"#).is_err());
}

#[wasm_bindgen_test]
fn facade_ignores_start_without_robot() {
    let stream = RobotStream::new("{}").unwrap();
    stream.start();
    assert_eq!(stream.status(), "idle");
}

#[wasm_bindgen_test]
async fn unreachable_control_api_fails_the_stream() {
    let config = StreamConfig {
        control_url: "http://127.0.0.1:9/api/robots".to_owned(),
        ..StreamConfig::default()
    };
    let controller = StreamController::new(BrowserPlatform, config);

    let (sender, receiver) = oneshot::channel();
    let sender = Rc::new(RefCell::new(Some(sender)));
    controller.subscribe(move |event| {
        if let StreamEvent::StatusChanged(StreamStatus::Error(ref reason)) = *event {
            if let Some(sender) = sender.borrow_mut().take() {
                sender.send(reason.clone()).ok();
            }
        }
    });
    controller.select_robot(Some(RobotId::new("R-001".to_owned())));
    controller.start();
    assert_eq!(controller.status(), StreamStatus::Connecting);

    let reason = receiver.await.unwrap();
    assert!(reason.contains("webrtc_start"));
    controller.stop();
    assert_eq!(controller.status(), StreamStatus::Idle);
}
