use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use meteo_wire::encode_line;

use crate::table::SensorTable;

/// Serves the entire current table to any client that connects: the
/// connection itself is the request, the dump is the response, and the
/// server-side close marks end of message. No filtering by freshness;
/// staleness judgment is left to the client.
pub struct SnapshotServer {
    listener: TcpListener,
    table: Arc<SensorTable>,
}

impl SnapshotServer {
    /// Bind the listening socket. Failure here is fatal at startup.
    pub async fn bind(addr: &str, table: Arc<SensorTable>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, table })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown. Each client is served on its
    /// own task; per-connection errors are logged, never fatal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Snapshot server accepting connections");
        loop {
            select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "Snapshot client connected");
                            let table = Arc::clone(&self.table);
                            tokio::spawn(async move {
                                if let Err(e) = serve_snapshot(stream, &table).await {
                                    warn!(error = %e, %peer, "Snapshot write failed");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "Accept failed"),
                    }
                }
            }
        }
    }
}

/// Write a point-in-time copy of the table, one line per entry in
/// native units, then close.
async fn serve_snapshot(mut stream: TcpStream, table: &SensorTable) -> std::io::Result<()> {
    let mut message = String::new();
    for (key, reading) in table.snapshot() {
        message.push_str(&encode_line(&key, &reading));
        message.push('\n');
    }

    stream.write_all(message.as_bytes()).await?;
    stream.shutdown().await
}
