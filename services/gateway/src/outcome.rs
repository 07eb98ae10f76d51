//! Turn outcomes and their reply lines.

use crate::persister::PersistReport;
use gt_protocol::{DecodeError, Reply};
use std::fmt::Write as _;

/// What a successful persist is summarised as in the reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub count: usize,
    /// Coordinates of the record when exactly one was stored.
    pub coordinates: Option<(f64, f64)>,
}

impl RecordSummary {
    pub fn of(report: &PersistReport) -> Self {
        let coordinates = match report.records.as_slice() {
            [only] => Some((only.record.latitude, only.record.longitude)),
            _ => None,
        };
        RecordSummary {
            count: report.records.len(),
            coordinates,
        }
    }
}

/// Result of one turn; computed once and never retried.
#[derive(Debug)]
pub enum IngestionOutcome {
    Handshake,
    Success(RecordSummary),
    EchoAck(String),
    /// The request bytes could not be read as a message at all.
    TransportError(String),
    DecodeError(DecodeError),
    PersistenceError(PersistReport),
}

impl IngestionOutcome {
    pub fn from_report(report: PersistReport) -> Self {
        if report.is_complete() {
            IngestionOutcome::Success(RecordSummary::of(&report))
        } else {
            IngestionOutcome::PersistenceError(report)
        }
    }
}

/// Render the single reply line for an outcome.
pub fn compose(outcome: &IngestionOutcome) -> String {
    let reply = match outcome {
        IngestionOutcome::Handshake => Reply::HandshakeAck,
        IngestionOutcome::Success(summary) => Reply::Stored {
            count: summary.count,
            first: summary.coordinates,
        },
        IngestionOutcome::EchoAck(text) => Reply::Echo(text.clone()),
        IngestionOutcome::TransportError(reason) => Reply::Error(reason.clone()),
        IngestionOutcome::DecodeError(err) => Reply::Error(err.to_string()),
        IngestionOutcome::PersistenceError(report) => Reply::Error(persistence_detail(report)),
    };
    reply.render()
}

/// Sink-level detail, e.g.
/// `persistence incomplete: log ok (3 appended); store 2 stored, 1 failed (record 2: ...)`.
fn persistence_detail(report: &PersistReport) -> String {
    let mut detail = String::from("persistence incomplete: log ");
    match &report.log {
        Ok(appended) => {
            let _ = write!(detail, "ok ({appended} appended)");
        }
        Err(e) => {
            let _ = write!(detail, "failed ({e})");
        }
    }

    let failures: Vec<String> = report
        .store_failures()
        .map(|(i, e)| format!("record {}: {e}", i + 1))
        .collect();
    let _ = write!(
        detail,
        "; store {} stored, {} failed",
        report.stored(),
        failures.len()
    );
    if !failures.is_empty() {
        let _ = write!(detail, " ({})", failures.join(", "));
    }
    detail
}
