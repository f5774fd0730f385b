use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SourceError;

/// In-flight notification bound. Ingestion drains quickly; the bound
/// only smooths bursts from the bridge.
const NOTIFY_CHANNEL_DEPTH: usize = 100;

/// A remote sensor-data source: something that can be located on the
/// network, announces a service interface, and streams fixed-size binary
/// notification records once subscribed.
#[async_trait]
pub trait SensorSource: Send {
    /// Locate the advertised source and establish a connection.
    async fn connect(&mut self) -> Result<(), SourceError>;

    /// Verify the announced service interface and register the
    /// notification stream. The returned channel closing means the
    /// subscription was lost.
    async fn subscribe(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, SourceError>;

    /// Tear down the connection. Idempotent; safe to call after errors.
    async fn close(&mut self) -> Result<(), SourceError>;
}

/// Sensor source reached over TCP through a radio bridge. The bridge
/// opens with a single `<device-name> <record-len>` announcement line,
/// then carries back-to-back binary records.
pub struct TcpSensorSource {
    addr: String,
    device_name: String,
    stream: Option<TcpStream>,
    reader_task: Option<JoinHandle<()>>,
}

impl TcpSensorSource {
    pub fn new(addr: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            device_name: device_name.into(),
            stream: None,
            reader_task: None,
        }
    }
}

#[async_trait]
impl SensorSource for TcpSensorSource {
    async fn connect(&mut self) -> Result<(), SourceError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| SourceError::ConnectFailed(format!("{}: {}", self.addr, e)))?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, SourceError> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| SourceError::ConnectFailed("not connected".to_string()))?;
        let mut reader = BufReader::new(stream);

        let mut banner = String::new();
        reader.read_line(&mut banner).await?;
        let mut fields = banner.split_whitespace();
        let name = fields.next().unwrap_or_default();
        let record_len: usize = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);

        if name != self.device_name {
            return Err(SourceError::ServiceNotFound(format!(
                "device {:?} announced, expected {:?}",
                name, self.device_name
            )));
        }
        // The announced record length fixes the payload revision for
        // this subscription; revisions are never mixed within a stream.
        if record_len != meteo_wire::RECORD_LEN && record_len != meteo_wire::LEGACY_RECORD_LEN {
            return Err(SourceError::ServiceNotFound(format!(
                "unsupported record length {}",
                record_len
            )));
        }

        let (tx, rx) = mpsc::channel(NOTIFY_CHANNEL_DEPTH);
        self.reader_task = Some(tokio::spawn(async move {
            let mut record = vec![0u8; record_len];
            loop {
                match reader.read_exact(&mut record).await {
                    // EOF or a read error drops the sender, which the
                    // consumer observes as a lost subscription.
                    Err(_) => break,
                    Ok(_) => {
                        if tx.send(record.clone()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }));

        Ok(rx)
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.stream = None;
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        Ok(())
    }
}
