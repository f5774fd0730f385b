use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;
use tokio::select;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use meteo_metadata::SensorNames;
use meteo_wire::decode_record;

use crate::config::CollectorConfig;
use crate::error::SourceError;
use crate::source::SensorSource;
use crate::table::SensorTable;

/// Where the discovery loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiscoveryState {
    Idle = 0,
    Scanning = 1,
    AwaitingService = 2,
    Subscribed = 3,
}

impl DiscoveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryState::Idle => "idle",
            DiscoveryState::Scanning => "scanning",
            DiscoveryState::AwaitingService => "awaiting_service",
            DiscoveryState::Subscribed => "subscribed",
        }
    }
}

/// Shared atomic view of the discovery state, for health reporting.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn set(&self, state: DiscoveryState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> DiscoveryState {
        match self.0.load(Ordering::SeqCst) {
            1 => DiscoveryState::Scanning,
            2 => DiscoveryState::AwaitingService,
            3 => DiscoveryState::Subscribed,
            _ => DiscoveryState::Idle,
        }
    }
}

enum Pass {
    Retry,
    Shutdown,
}

/// Drives the source through scan / connect / subscribe passes and
/// ingests its notifications into the shared table. Failures are never
/// fatal: every failed pass sleeps a fixed backoff and rescans, forever.
pub struct Discovery<S: SensorSource> {
    source: S,
    table: Arc<SensorTable>,
    names: Arc<SensorNames>,
    config: CollectorConfig,
    state: Arc<StateCell>,
    /// Unix timestamp (seconds) of the last ingested notification.
    last_notification_epoch_secs: Arc<AtomicU64>,
}

impl<S: SensorSource> Discovery<S> {
    pub fn new(
        source: S,
        table: Arc<SensorTable>,
        names: Arc<SensorNames>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            source,
            table,
            names,
            config,
            state: Arc::new(StateCell::default()),
            last_notification_epoch_secs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns a handle to the current discovery state.
    pub fn state_handle(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    /// Returns a handle to the last-notification timestamp.
    pub fn last_notification_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.last_notification_epoch_secs)
    }

    /// Run discovery passes until shutdown. Each pass that fails to
    /// reach `Subscribed`, and each lost subscription, is followed by
    /// the fixed retry backoff; the sleep races shutdown so cancellation
    /// is prompt.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.state.set(DiscoveryState::Scanning);

            let outcome = self.pass(&mut shutdown).await;
            self.source.close().await.ok();

            if matches!(outcome, Pass::Shutdown) {
                self.state.set(DiscoveryState::Idle);
                return;
            }

            self.state.set(DiscoveryState::Scanning);
            select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.state.set(DiscoveryState::Idle);
                        return;
                    }
                }
                _ = tokio::time::sleep(self.config.retry_backoff) => {}
            }
        }
    }

    /// One discovery pass: locate, connect, subscribe, then drain
    /// notifications until the stream is lost or shutdown is requested.
    async fn pass(&mut self, shutdown: &mut watch::Receiver<bool>) -> Pass {
        if let Err(e) = self.source.connect().await {
            debug!(error = %e, device = %self.config.device_name, "No data source found");
            return Pass::Retry;
        }
        self.state.set(DiscoveryState::AwaitingService);

        let mut rx = match self.source.subscribe().await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "Expected service not available");
                return Pass::Retry;
            }
        };
        self.state.set(DiscoveryState::Subscribed);
        info!(device = %self.config.device_name, "Subscribed to sensor notifications");

        loop {
            select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Shutdown signal received");
                        return Pass::Shutdown;
                    }
                }
                payload = rx.recv() => {
                    match payload {
                        Some(payload) => self.ingest(&payload),
                        None => {
                            let e = SourceError::SubscriptionLost(
                                "notification stream closed".to_string(),
                            );
                            warn!(error = %e, "Rescanning");
                            return Pass::Retry;
                        }
                    }
                }
            }
        }
    }

    /// Decode one notification and merge it into the table. Failures
    /// drop the record; they never end the subscription.
    fn ingest(&self, payload: &[u8]) {
        match decode_record(payload, Local::now()) {
            Ok((key, reading)) => {
                let stored = self.table.merge(key, reading);
                let name = self
                    .names
                    .resolve(key.sensor_id, key.channel)
                    .unwrap_or("?");
                debug!(
                    sensor = key.sensor_id,
                    channel = key.channel,
                    name,
                    unit = %key.unit.letter(),
                    temp = reading.temperature(),
                    humidity = reading.humidity,
                    low_power = reading.low_power,
                    stored,
                    "Sensor notification"
                );
                self.touch();
            }
            Err(e) => {
                warn!(error = %e, len = payload.len(), "Dropping undecodable notification");
            }
        }
    }

    fn touch(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.last_notification_epoch_secs
            .store(now, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Scripted source: pops one connect result and one subscription
    /// per pass, and counts teardowns.
    struct MockSource {
        connects: VecDeque<Result<(), SourceError>>,
        subscriptions: VecDeque<mpsc::Receiver<Vec<u8>>>,
        closes: Arc<AtomicUsize>,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                connects: VecDeque::new(),
                subscriptions: VecDeque::new(),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl SensorSource for MockSource {
        async fn connect(&mut self) -> Result<(), SourceError> {
            self.connects
                .pop_front()
                .unwrap_or_else(|| Err(SourceError::ConnectFailed("exhausted".to_string())))
        }

        async fn subscribe(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, SourceError> {
            self.subscriptions
                .pop_front()
                .ok_or_else(|| SourceError::ServiceNotFound("exhausted".to_string()))
        }

        async fn close(&mut self) -> Result<(), SourceError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_config() -> CollectorConfig {
        CollectorConfig {
            retry_backoff: Duration::from_millis(10),
            ..CollectorConfig::default()
        }
    }

    fn discovery(source: MockSource) -> (Discovery<MockSource>, Arc<SensorTable>) {
        let table = Arc::new(SensorTable::new());
        let discovery = Discovery::new(
            source,
            Arc::clone(&table),
            Arc::new(SensorNames::default()),
            test_config(),
        );
        (discovery, table)
    }

    #[tokio::test]
    async fn test_notifications_merged_into_table() {
        let mut source = MockSource::new();
        let (tx, rx) = mpsc::channel(10);
        source.connects.push_back(Ok(()));
        source.subscriptions.push_back(rx);

        let (mut discovery, table) = discovery(source);
        let state = discovery.state_handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { discovery.run(shutdown_rx).await });

        tx.send(vec![0xD5, 0x00, 5, 1, 44, 0, 0]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(state.get(), DiscoveryState::Subscribed);
        assert_eq!(table.select(5, 1).unwrap().temperature_tenths, 213);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_payload_does_not_end_subscription() {
        let mut source = MockSource::new();
        let (tx, rx) = mpsc::channel(10);
        source.connects.push_back(Ok(()));
        source.subscriptions.push_back(rx);

        let (mut discovery, table) = discovery(source);
        let state = discovery.state_handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { discovery.run(shutdown_rx).await });

        tx.send(vec![1, 2, 3]).await.unwrap();
        tx.send(vec![0xD5, 0x00, 5, 1, 44, 0, 0]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(state.get(), DiscoveryState::Subscribed);
        assert_eq!(table.len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_lost_subscription_triggers_rescan() {
        let mut source = MockSource::new();
        let (tx1, rx1) = mpsc::channel(10);
        let (tx2, rx2) = mpsc::channel::<Vec<u8>>(10);
        source.connects.push_back(Ok(()));
        source.connects.push_back(Ok(()));
        source.subscriptions.push_back(rx1);
        source.subscriptions.push_back(rx2);
        let closes = Arc::clone(&source.closes);

        let (mut discovery, table) = discovery(source);
        let state = discovery.state_handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { discovery.run(shutdown_rx).await });

        tx1.send(vec![0xD5, 0x00, 5, 1, 44, 0, 0]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Drop the first stream: the runner must tear down, back off,
        // and resubscribe on the second.
        drop(tx1);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(state.get(), DiscoveryState::Subscribed);
        assert!(closes.load(Ordering::SeqCst) >= 1);
        assert_eq!(table.len(), 1);

        drop(tx2);
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failures_retry_forever() {
        let mut source = MockSource::new();
        // Two failed passes, then success.
        source
            .connects
            .push_back(Err(SourceError::ConnectFailed("down".to_string())));
        source
            .connects
            .push_back(Err(SourceError::ConnectFailed("down".to_string())));
        source.connects.push_back(Ok(()));
        let (_tx, rx) = mpsc::channel(10);
        source.subscriptions.push_back(rx);

        let (mut discovery, _table) = discovery(source);
        let state = discovery.state_handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { discovery.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.get(), DiscoveryState::Subscribed);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() {
        let mut source = MockSource::new();
        source
            .connects
            .push_back(Err(SourceError::ConnectFailed("down".to_string())));

        let config = CollectorConfig {
            retry_backoff: Duration::from_secs(3600),
            ..CollectorConfig::default()
        };
        let mut discovery = Discovery::new(
            source,
            Arc::new(SensorTable::new()),
            Arc::new(SensorNames::default()),
            config,
        );
        let state = discovery.state_handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { discovery.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();

        // Must return promptly despite the hour-long backoff.
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("shutdown should interrupt the backoff")
            .unwrap();
        assert_eq!(state.get(), DiscoveryState::Idle);
    }
}
