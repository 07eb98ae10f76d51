use crate::{ECHO_MARKER, ERROR_MARKER, HANDSHAKE_ACK, MAX_REPLY_DETAIL, OK_MARKER};
use std::fmt;

/// One reply line, without the trailing newline.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    HandshakeAck,
    /// `first` carries the coordinates when exactly one record was stored.
    Stored {
        count: usize,
        first: Option<(f64, f64)>,
    },
    Echo(String),
    Error(String),
}

impl Reply {
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::HandshakeAck => f.write_str(HANDSHAKE_ACK),
            Reply::Stored {
                count: 1,
                first: Some((lat, lon)),
            } => write!(f, "{OK_MARKER}stored 1 record at {lat}, {lon}"),
            Reply::Stored { count: 1, .. } => write!(f, "{OK_MARKER}stored 1 record"),
            Reply::Stored { count, .. } => write!(f, "{OK_MARKER}stored {count} records"),
            Reply::Echo(text) => write!(f, "{ECHO_MARKER}{}", bounded(text)),
            Reply::Error(reason) => write!(f, "{ERROR_MARKER}{}", bounded(reason)),
        }
    }
}

/// Collapse line breaks and cap the length so a reply stays one short line.
pub fn bounded(text: &str) -> String {
    let single_line = text.replace(['\r', '\n'], " ");
    match single_line.char_indices().nth(MAX_REPLY_DETAIL) {
        Some((cut, _)) => format!("{}...", &single_line[..cut]),
        None => single_line,
    }
}
