/*!
This crate streams live video from a robot into the browser.

# Overview

The robot and the browser never talk directly until the media flows.
A relay server forwards `WebRTC` signaling between them over a `WebSocket`,
and a small HTTP control API tells the robot when to start or stop producing video.

[`StreamController`] is the entry point. Select a robot, call [`StreamController::start`],
and observe [`StreamStatus`] until the negotiated media stream is available.
Stopping, switching robots, losing the relay or tearing the page down
all converge on the same idempotent teardown.

All `web-sys` specifics live behind the [`Platform`] trait, [`web::BrowserPlatform`]
being the implementation used in the browser.
JavaScript consumers use the [`bindings::RobotStream`] facade instead.
*/

#![allow(
    clippy::module_name_repetitions,
    clippy::future_not_send, // false positive in WASM (single threaded) context
)]
// clippy WARN level lints
#![warn(
    // missing_docs,
    clippy::cargo,
    clippy::pedantic,
    // clippy::nursery,
    clippy::dbg_macro,
    clippy::unwrap_used,
    clippy::integer_division,
    clippy::large_include_file,
    clippy::map_err_ignore,
    // clippy::missing_docs_in_private_items,
    clippy::panic,
    clippy::todo,
    clippy::undocumented_unsafe_blocks,
    clippy::unimplemented,
    clippy::unreachable
)]
// clippy WARN level lints, that can be upgraded to DENY if preferred
#![warn(
    clippy::float_arithmetic,
    clippy::arithmetic_side_effects,
    clippy::modulo_arithmetic,
    clippy::as_conversions,
    clippy::assertions_on_result_states,
    clippy::clone_on_ref_ptr,
    clippy::create_dir,
    clippy::default_union_representation,
    clippy::deref_by_slicing,
    clippy::empty_drop,
    clippy::empty_structs_with_brackets,
    clippy::exit,
    clippy::filetype_is_file,
    clippy::float_cmp_const,
    clippy::if_then_some_else_none,
    clippy::indexing_slicing,
    clippy::let_underscore_must_use,
    clippy::lossy_float_literal,
    clippy::pattern_type_mismatch,
    clippy::string_slice,
    clippy::try_err
)]
// clippy DENY level lints, they always have a quick fix that should be preferred
#![deny(
    clippy::wildcard_imports,
    clippy::multiple_inherent_impl,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_name_method,
    clippy::self_named_module_files,
    clippy::separated_literal_suffix,
    clippy::shadow_unrelated,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::unnecessary_self_imports,
    clippy::unneeded_field_pattern,
    clippy::unseparated_literal_suffix,
    clippy::verbose_file_reads
)]

pub mod bindings;
pub mod config;
pub(crate) mod constants;
pub mod controller;
mod error;
#[cfg(test)]
mod mock;
pub mod peer_session;
pub mod platform;
pub mod signaling;
pub mod web;

pub use config::{ConnectionType, StreamConfig};
pub use controller::{StreamController, StreamEvent, StreamState, StreamStatus};
pub use error::{Error, NegotiationViolation, Result};
pub use peer_session::{NegotiationState, PeerSession};
pub use platform::{EventSink, Generation, PeerConnection, Platform, SdpKind, SessionEvent, Transport};
pub use robot_stream_protocol::{ControlCommand, IceCandidate, RobotId, SignalMessage};
pub use signaling::SignalingChannel;
