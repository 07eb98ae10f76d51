//! Append log sink: a single JSON array of location documents on disk.
//!
//! Every append is a read-modify-write of the whole document set, so the
//! cycle runs under the log's mutex and finishes with an atomic replace
//! (`<path>.tmp` is written and fsynced, then renamed over the log). A
//! missing log reads as empty. A log that is not a JSON array is reported
//! as corrupt and never overwritten.

use crate::record::ReceivedRecord;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::Value;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt log: {0}")]
    Corrupt(String),
    #[error("JSON: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Document shape written for each record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogEntry<'a> {
    /// Milliseconds since the epoch.
    timestamp: i64,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    accuracy: f64,
    speed: f64,
    network_type: &'a str,
    signal_level: &'a str,
    received_at: String,
}

pub fn log_document(received: &ReceivedRecord) -> Result<Value, LogError> {
    let r = &received.record;
    let entry = LogEntry {
        timestamp: r.timestamp.timestamp_millis(),
        latitude: r.latitude,
        longitude: r.longitude,
        altitude: r.altitude,
        accuracy: r.accuracy,
        speed: r.speed,
        network_type: &r.network_type,
        signal_level: &r.signal_level,
        received_at: received
            .received_at
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    Ok(serde_json::to_value(entry)?)
}

/// The append log, shared by every session.
pub struct AppendLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AppendLog {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every document in the log; empty if the log does not exist.
    pub async fn load(&self) -> Result<Vec<Value>, LogError> {
        let _guard = self.lock.lock().await;
        read_documents(&self.path).await
    }

    /// Atomically replace the log with `documents`.
    pub async fn save(&self, documents: &[Value]) -> Result<(), LogError> {
        let _guard = self.lock.lock().await;
        write_documents(&self.path, documents).await
    }

    /// Append records to the log, returning how many were appended.
    pub async fn append(&self, records: &[ReceivedRecord]) -> Result<usize, LogError> {
        let entries = records
            .iter()
            .map(log_document)
            .collect::<Result<Vec<_>, _>>()?;

        let _guard = self.lock.lock().await;
        let mut documents = read_documents(&self.path).await?;
        documents.extend(entries);
        write_documents(&self.path, &documents).await?;
        Ok(records.len())
    }
}

async fn read_documents(path: &Path) -> Result<Vec<Value>, LogError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LogError::Io(e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Array(documents)) => Ok(documents),
        Ok(_) => Err(LogError::Corrupt(format!(
            "'{}' does not hold a JSON array",
            path.display()
        ))),
        Err(e) => Err(LogError::Corrupt(format!("'{}': {}", path.display(), e))),
    }
}

async fn write_documents(path: &Path, documents: &[Value]) -> Result<(), LogError> {
    let mut bytes = serde_json::to_vec_pretty(documents)?;
    bytes.push(b'\n');

    let tmp_path = tmp_path_for(path);
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gt_protocol::LocationRecord;
    use std::sync::Arc;

    fn received(lat: f64) -> ReceivedRecord {
        ReceivedRecord::stamp(
            LocationRecord {
                timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
                latitude: lat,
                longitude: 37.61,
                altitude: 0.0,
                accuracy: 12.0,
                speed: 0.0,
                network_type: "LTE".to_owned(),
                signal_level: String::new(),
            },
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 6).unwrap(),
        )
    }

    #[tokio::test]
    async fn missing_log_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::new(dir.path().join("loc.json"));
        assert!(log.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_accumulates_documents() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::new(dir.path().join("loc.json"));

        assert_eq!(log.append(&[received(1.0)]).await.unwrap(), 1);
        assert_eq!(
            log.append(&[received(2.0), received(3.0)]).await.unwrap(),
            2
        );

        let docs = log.load().await.unwrap();
        let lats: Vec<f64> = docs
            .iter()
            .map(|d| d["latitude"].as_f64().unwrap())
            .collect();
        assert_eq!(lats, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn document_carries_received_at_and_millis() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::new(dir.path().join("loc.json"));
        log.append(&[received(55.75)]).await.unwrap();

        let doc = &log.load().await.unwrap()[0];
        assert_eq!(doc["receivedAt"], "2025-01-02T03:04:06.000Z");
        assert_eq!(
            doc["timestamp"].as_i64().unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5)
                .unwrap()
                .timestamp_millis()
        );
        assert_eq!(doc["networkType"], "LTE");
        assert_eq!(doc["signalLevel"], "");
    }

    #[tokio::test]
    async fn save_of_load_leaves_bytes_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loc.json");
        let log = AppendLog::new(&path);
        log.append(&[received(1.0), received(2.0)]).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        let docs = log.load().await.unwrap();
        log.save(&docs).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn foreign_documents_survive_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loc.json");
        std::fs::write(&path, r#"[{"latitude": 9.5, "source": "import"}]"#).unwrap();
        let log = AppendLog::new(&path);

        log.append(&[received(1.0)]).await.unwrap();

        let docs = log.load().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["source"], "import");
    }

    #[tokio::test]
    async fn corrupt_log_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loc.json");
        std::fs::write(&path, r#"{"not": "an array"}"#).unwrap();
        let log = AppendLog::new(&path);

        let err = log.append(&[received(1.0)]).await.unwrap_err();

        assert!(matches!(err, LogError::Corrupt(_)), "{err}");
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            r#"{"not": "an array"}"#
        );
    }

    #[tokio::test]
    async fn blank_log_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loc.json");
        std::fs::write(&path, "\n  \n").unwrap();
        let log = AppendLog::new(&path);
        assert!(log.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_temp_file_is_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loc.json");
        let log = AppendLog::new(&path);
        log.append(&[received(1.0)]).await.unwrap();

        assert!(!tmp_path_for(&path).exists());
        assert_eq!(tmp_path_for(&path), dir.path().join("loc.json.tmp"));
    }

    #[tokio::test]
    async fn write_into_missing_directory_fails_with_io() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::new(dir.path().join("nope").join("loc.json"));
        let err = log.append(&[received(1.0)]).await.unwrap_err();
        assert!(matches!(err, LogError::Io(_)), "{err}");
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_lose_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AppendLog::new(dir.path().join("loc.json")));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let log = Arc::clone(&log);
            tasks.push(tokio::spawn(async move {
                log.append(&[received(f64::from(i))]).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(log.load().await.unwrap().len(), 16);
    }
}
