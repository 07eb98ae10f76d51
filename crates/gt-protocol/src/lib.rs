// gt-protocol: Location telemetry wire protocol (v1).
//
// One request per newline-terminated line, one reply line per request.
// Requests are classified lexically (handshake, marked location payload,
// anything else) before any JSON parsing happens.

pub mod classify;
pub mod decode;
pub mod reply;

pub use classify::{ClassifiedMessage, classify};
pub use decode::{DecodeError, DecodedPayload, LocationRecord, decode, decode_at};
pub use reply::Reply;

/// Version of the field naming and reply format implemented by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Probe sent by clients to check connectivity before sending data.
pub const HANDSHAKE_TOKEN: &str = "TEST_CONNECTION";
/// Fixed reply to [`HANDSHAKE_TOKEN`].
pub const HANDSHAKE_ACK: &str = "CONNECTION_OK";

/// Prefix identifying a location payload.
pub const LOCATION_MARKER: &str = "LOCATION_DATA:";

pub const OK_MARKER: &str = "OK: ";
pub const ERROR_MARKER: &str = "ERROR: ";
pub const ECHO_MARKER: &str = "ECHO: ";

/// Upper bound, in characters, for any client- or error-derived text echoed
/// back in a reply.
pub const MAX_REPLY_DETAIL: usize = 256;
