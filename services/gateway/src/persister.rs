//! Dual-sink persistence.
//!
//! Each persist call stamps the records with one receipt time, appends them
//! to the log, then inserts them into the store one by one. Both sinks are
//! always attempted and every call is bounded by `sink_timeout`.
//!
//! A timed-out insert is dropped, not rolled back: when the timeout lands
//! after the commit, the row is stored but reported as failed. Resends after
//! such a reply can therefore duplicate a row; an acknowledged record is
//! always present.

use crate::append_log::{AppendLog, LogError};
use crate::record::ReceivedRecord;
use crate::store::{LocationStore, StoreError};
use chrono::Utc;
use gt_protocol::LocationRecord;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Per-sink results of one persist call.
#[derive(Debug)]
pub struct PersistReport {
    pub records: Vec<ReceivedRecord>,
    /// Number of records appended to the log.
    pub log: Result<usize, LogError>,
    /// One entry per record, in record order.
    pub store: Vec<Result<(), StoreError>>,
}

impl PersistReport {
    pub fn stored(&self) -> usize {
        self.store.iter().filter(|r| r.is_ok()).count()
    }

    /// Failed store inserts as (zero-based record index, error).
    pub fn store_failures(&self) -> impl Iterator<Item = (usize, &StoreError)> {
        self.store
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }

    /// Both sinks accepted every record.
    pub fn is_complete(&self) -> bool {
        self.log.is_ok() && self.store.iter().all(Result::is_ok)
    }
}

pub struct Persister<S> {
    log: AppendLog,
    store: S,
    sink_timeout: Duration,
}

impl<S: LocationStore> Persister<S> {
    pub fn new(log: AppendLog, store: S, sink_timeout: Duration) -> Self {
        Persister {
            log,
            store,
            sink_timeout,
        }
    }

    pub fn log(&self) -> &AppendLog {
        &self.log
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn persist(&self, records: Vec<LocationRecord>) -> PersistReport {
        let received_at = Utc::now();
        let records: Vec<ReceivedRecord> = records
            .into_iter()
            .map(|r| ReceivedRecord::stamp(r, received_at))
            .collect();

        let log = match timeout(self.sink_timeout, self.log.append(&records)).await {
            Ok(result) => result,
            Err(_) => Err(LogError::Timeout(self.sink_timeout)),
        };
        if let Err(e) = &log {
            warn!(path = %self.log.path().display(), error = %e, "append log write failed");
        }

        let mut store = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let result = match timeout(self.sink_timeout, self.store.insert(record)).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(self.sink_timeout)),
            };
            if let Err(e) = &result {
                warn!(record = i + 1, error = %e, "store insert failed");
            }
            store.push(result);
        }

        let report = PersistReport {
            records,
            log,
            store,
        };
        if report.is_complete() {
            info!(records = report.records.len(), "records persisted");
        }
        report
    }
}
