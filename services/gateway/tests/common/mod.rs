//! Shared fixtures for the gateway integration suites.
#![allow(dead_code)]

use gateway::append_log::AppendLog;
use gateway::persister::Persister;
use gateway::record::ReceivedRecord;
use gateway::server::Gateway;
use gateway::store::{LocationStore, StoreError};
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Duration;

pub const SINK_TIMEOUT: Duration = Duration::from_secs(2);
pub const MAX_MESSAGE_BYTES: usize = 4096;

/// In-memory store that fails chosen insert calls (1-based, counted across
/// the store's lifetime).
#[derive(Default)]
pub struct ScriptedStore {
    inserted: Mutex<Vec<ReceivedRecord>>,
    calls: AtomicUsize,
    fail_calls: Vec<usize>,
    delay: Option<Duration>,
    /// Stall after the record is stored, like a commit whose ack is slow.
    stall_after_store: Option<Duration>,
}

impl ScriptedStore {
    pub fn failing_on(calls: &[usize]) -> Self {
        ScriptedStore {
            fail_calls: calls.to_vec(),
            ..ScriptedStore::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        ScriptedStore {
            delay: Some(delay),
            ..ScriptedStore::default()
        }
    }

    pub fn stalling_after_store(stall: Duration) -> Self {
        ScriptedStore {
            stall_after_store: Some(stall),
            ..ScriptedStore::default()
        }
    }

    pub fn inserted(&self) -> Vec<ReceivedRecord> {
        self.inserted.lock().unwrap().clone()
    }
}

impl LocationStore for ScriptedStore {
    async fn insert(&self, record: &ReceivedRecord) -> Result<(), StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_calls.contains(&call) {
            return Err(StoreError::Constraint(format!(
                "scripted failure on insert {call}"
            )));
        }
        self.inserted.lock().unwrap().push(record.clone());
        if let Some(stall) = self.stall_after_store {
            tokio::time::sleep(stall).await;
        }
        Ok(())
    }
}

pub fn persister(log_path: &Path, store: ScriptedStore) -> Arc<Persister<ScriptedStore>> {
    persister_with_timeout(log_path, store, SINK_TIMEOUT)
}

pub fn persister_with_timeout(
    log_path: &Path,
    store: ScriptedStore,
    sink_timeout: Duration,
) -> Arc<Persister<ScriptedStore>> {
    Arc::new(Persister::new(AppendLog::new(log_path), store, sink_timeout))
}

pub struct RunningGateway {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RunningGateway {
    /// Request shutdown and wait for the acceptor and all sessions to end.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("gateway did not stop")
            .expect("gateway task panicked");
    }
}

pub async fn start_gateway(persister: Arc<Persister<ScriptedStore>>) -> RunningGateway {
    let gateway = Gateway::bind("127.0.0.1:0", persister, MAX_MESSAGE_BYTES)
        .await
        .expect("bind");
    let addr = gateway.local_addr().expect("local addr");
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        gateway
            .serve(async {
                let _ = stop_rx.await;
            })
            .await;
    });
    RunningGateway {
        addr,
        stop: Some(stop_tx),
        task,
    }
}

/// Captures formatted log output on the current thread while alive.
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

impl LogCapture {
    pub fn start() -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || CaptureWriter(Arc::clone(&sink)))
            .finish();
        LogCapture {
            buf,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
