pub const DEFAULT_RELAY_URL: &str = "ws://localhost:8080";
pub const DEFAULT_CONTROL_URL: &str = "http://localhost:8000/api/robots";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

pub const DEFAULT_START_TIMEOUT_MS: u64 = 20_000;
