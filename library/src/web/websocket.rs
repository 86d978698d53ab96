use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use log::{debug, error, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CloseEvent, Event, MediaStream, MessageEvent, WebSocket};

use crate::error::{Error, Result};
use crate::platform::{EventSink, SessionEvent, Transport};
use crate::signaling;
use crate::web::utils::describe;

type OpenSignal = Rc<RefCell<Option<oneshot::Sender<std::result::Result<(), String>>>>>;

/// Handlers stay registered only as long as this struct lives.
struct SocketCallbacks {
    on_open: Closure<dyn FnMut(JsValue)>,
    on_message: Closure<dyn FnMut(MessageEvent)>,
    on_error: Closure<dyn FnMut(Event)>,
    on_close: Closure<dyn FnMut(CloseEvent)>,
}

/// [`Transport`] over a browser `WebSocket`.
pub struct WebSocketTransport {
    websocket: WebSocket,
    _callbacks: SocketCallbacks,
}

impl WebSocketTransport {
    /// Connect to `url` and resolve once the socket is open.
    ///
    /// # Errors
    /// [`Error::Channel`] if the socket errors or closes before opening.
    pub async fn connect(url: &str, events: EventSink<MediaStream>) -> Result<Self> {
        let websocket = WebSocket::new(url).map_err(|err| Error::channel(describe(&err)))?;
        let (opened_sender, opened_receiver) = oneshot::channel();
        let opened: OpenSignal = Rc::new(RefCell::new(Some(opened_sender)));

        let callbacks = SocketCallbacks {
            on_open: on_open(Rc::clone(&opened)),
            on_message: on_message(events.clone()),
            on_error: on_error(Rc::clone(&opened)),
            on_close: on_close(opened, events),
        };
        websocket.set_onopen(Some(callbacks.on_open.as_ref().unchecked_ref()));
        websocket.set_onmessage(Some(callbacks.on_message.as_ref().unchecked_ref()));
        websocket.set_onerror(Some(callbacks.on_error.as_ref().unchecked_ref()));
        websocket.set_onclose(Some(callbacks.on_close.as_ref().unchecked_ref()));

        // dropping the transport on failure detaches the handlers and closes the socket
        let transport = Self {
            websocket,
            _callbacks: callbacks,
        };
        match opened_receiver.await {
            Ok(Ok(())) => Ok(transport),
            Ok(Err(reason)) => Err(Error::Channel(reason)),
            Err(_) => Err(Error::channel("socket went away before opening")),
        }
    }

    fn detach(&self) {
        self.websocket.set_onopen(None);
        self.websocket.set_onmessage(None);
        self.websocket.set_onerror(None);
        self.websocket.set_onclose(None);
    }
}

fn on_open(opened: OpenSignal) -> Closure<dyn FnMut(JsValue)> {
    Closure::wrap(Box::new(move |_| {
        debug!("websocket is open");
        if let Some(sender) = opened.borrow_mut().take() {
            sender.send(Ok(())).ok();
        }
    }) as Box<dyn FnMut(JsValue)>)
}

/// Decode text frames in arrival order and hand them to the controller.
fn on_message(events: EventSink<MediaStream>) -> Closure<dyn FnMut(MessageEvent)> {
    Closure::wrap(Box::new(move |ev: MessageEvent| {
        match ev.data().as_string() {
            Some(text) => {
                if let Some(message) = signaling::decode(&text) {
                    events.emit(SessionEvent::Signal(message));
                }
            }
            None => warn!("ignoring non-text websocket frame"),
        }
    }) as Box<dyn FnMut(MessageEvent)>)
}

fn on_error(opened: OpenSignal) -> Closure<dyn FnMut(Event)> {
    Closure::wrap(Box::new(move |ev: Event| {
        error!("websocket error: {:?}", ev.type_());
        if let Some(sender) = opened.borrow_mut().take() {
            sender.send(Err("relay is unreachable".to_owned())).ok();
        }
    }) as Box<dyn FnMut(Event)>)
}

fn on_close(opened: OpenSignal, events: EventSink<MediaStream>) -> Closure<dyn FnMut(CloseEvent)> {
    Closure::wrap(Box::new(move |ev: CloseEvent| {
        let reason = if ev.reason().is_empty() {
            format!("code {}", ev.code())
        } else {
            format!("code {}, {}", ev.code(), ev.reason())
        };
        match opened.borrow_mut().take() {
            Some(sender) => {
                sender.send(Err(format!("closed before opening: {reason}"))).ok();
            }
            None => {
                warn!("websocket closed by the relay: {}", reason);
                events.emit(SessionEvent::ChannelClosed { reason });
            }
        }
    }) as Box<dyn FnMut(CloseEvent)>)
}

impl Transport for WebSocketTransport {
    fn is_open(&self) -> bool {
        self.websocket.ready_state() == WebSocket::OPEN
    }

    fn send_text(&self, text: &str) -> Result<()> {
        self.websocket
            .send_with_str(text)
            .map_err(|err| Error::channel(describe(&err)))
    }

    fn close(&self) {
        self.detach();
        if let Err(err) = self.websocket.close() {
            warn!("failed to close websocket: {}", describe(&err));
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.detach();
        let state = self.websocket.ready_state();
        if state == WebSocket::CONNECTING || state == WebSocket::OPEN {
            self.websocket.close().ok();
        }
    }
}
