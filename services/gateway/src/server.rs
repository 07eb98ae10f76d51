//! TCP acceptor: one session task per connection, all sharing one persister.

use crate::persister::Persister;
use crate::session::Session;
use crate::store::LocationStore;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub struct Gateway<S> {
    listener: TcpListener,
    persister: Arc<Persister<S>>,
    max_message_bytes: usize,
}

impl<S: LocationStore> Gateway<S> {
    pub async fn bind(
        addr: &str,
        persister: Arc<Persister<S>>,
        max_message_bytes: usize,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Gateway {
            listener,
            persister,
            max_message_bytes,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves, then let open sessions
    /// finish their current turn and wait for them.
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        if let Ok(addr) = self.local_addr() {
            info!(addr = %addr, "gateway listening");
        }

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let session = Session::new(Arc::clone(&self.persister), peer);
                        let stop = stop_rx.clone();
                        let max = self.max_message_bytes;
                        sessions.spawn(async move { session.run(stream, max, stop).await });
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "session task failed");
                    }
                }
            }
        }

        let _ = stop_tx.send(true);
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "session task failed");
            }
        }
    }
}
