use crate::decode::DecodeError;
use crate::{HANDSHAKE_TOKEN, LOCATION_MARKER};

/// Lexical classification of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedMessage {
    Handshake,
    /// Text believed to hold a location document, with the marker removed.
    LocationPayload(String),
    /// Anything else; echoed back to the sender.
    Opaque(String),
}

/// Classify a raw request.
///
/// Surrounding whitespace is ignored. A request starting with
/// [`LOCATION_MARKER`] is a location payload; so is an unmarked request that
/// starts like a JSON object or array (older clients omit the marker).
/// Invalid UTF-8 fails with `DecodeError("invalid encoding")`.
pub fn classify(raw: &[u8]) -> Result<ClassifiedMessage, DecodeError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| DecodeError::new("invalid encoding"))?
        .trim();

    if text == HANDSHAKE_TOKEN {
        return Ok(ClassifiedMessage::Handshake);
    }
    if let Some(payload) = text.strip_prefix(LOCATION_MARKER) {
        return Ok(ClassifiedMessage::LocationPayload(payload.trim_start().to_owned()));
    }
    if text.starts_with('{') || text.starts_with('[') {
        return Ok(ClassifiedMessage::LocationPayload(text.to_owned()));
    }
    Ok(ClassifiedMessage::Opaque(text.to_owned()))
}
