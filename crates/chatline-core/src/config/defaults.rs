/// Default broker endpoint (the in-process broker)
pub const DEFAULT_BROKER_URL: &str = "memory://local";

/// Delay before each reconnect attempt (milliseconds)
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Expected interval between broker heartbeats (milliseconds)
pub const DEFAULT_HEARTBEAT_INCOMING_MS: u64 = 4000;

/// Interval between client heartbeats (milliseconds)
pub const DEFAULT_HEARTBEAT_OUTGOING_MS: u64 = 4000;

/// Append own private messages to private history after publishing
pub const DEFAULT_ECHO_PRIVATE: bool = true;
