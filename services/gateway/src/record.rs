use chrono::{DateTime, Utc};
use gt_protocol::LocationRecord;

/// A decoded record stamped with the server's receipt time.
///
/// Only the persister builds these; clients cannot supply `received_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedRecord {
    pub record: LocationRecord,
    pub received_at: DateTime<Utc>,
}

impl ReceivedRecord {
    pub fn stamp(record: LocationRecord, received_at: DateTime<Utc>) -> Self {
        ReceivedRecord {
            record,
            received_at,
        }
    }
}
