//! The single point of truth for what feeds the pipeline.
//!
//! Every reconfiguration runs under one async mutex and always stops the
//! previous producer before starting the next, so zero or one producer is
//! active at any instant.

use crate::catalog::DatasetCatalog;
use crate::device::{subscribe_live, Credentials, DeviceFeed};
use crate::error::{SwitchError, SwitchResult};
use crate::producer::Producer;
use crate::registry::Broadcaster;
use crate::scheduler::ReplayScheduler;
use crate::types::{CurrentSource, DatasetDescriptor};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Title shown before any source is selected
pub const IDLE_TITLE: &str = "No source selected";

/// Title shown while the live device feeds the pipeline
pub const LIVE_TITLE: &str = "Live device";

struct PipelineState {
    current: CurrentSource,
    title: String,
    scheduler: ReplayScheduler,
    live: Option<Producer>,
}

impl PipelineState {
    fn stop_producers(&mut self) {
        self.scheduler.stop();
        if let Some(mut live) = self.live.take() {
            live.stop();
            info!("Live subscription cancelled");
        }
    }

    fn status(&self) -> SourceStatus {
        let producer_active = match self.current {
            CurrentSource::None => false,
            CurrentSource::Live => self.live.as_ref().is_some_and(|p| !p.is_finished()),
            CurrentSource::Replay { .. } => self.scheduler.is_running(),
        };
        SourceStatus {
            current: self.current.clone(),
            title: self.title.clone(),
            producer_active,
        }
    }
}

/// Point-in-time view of the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatus {
    pub current: CurrentSource,
    pub title: String,
    pub producer_active: bool,
}

pub struct SourceSwitch {
    state: Mutex<PipelineState>,
    /// Last completed reconfiguration, readable while a switch is in flight
    committed: RwLock<SourceStatus>,
    catalog: Arc<DatasetCatalog>,
    hub: Broadcaster,
    device: Arc<dyn DeviceFeed>,
    credentials: Credentials,
    replay_interval: Duration,
}

impl SourceSwitch {
    pub fn new(
        catalog: Arc<DatasetCatalog>,
        hub: Broadcaster,
        device: Arc<dyn DeviceFeed>,
        credentials: Credentials,
        replay_interval: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(PipelineState {
                current: CurrentSource::None,
                title: IDLE_TITLE.to_string(),
                scheduler: ReplayScheduler::new(hub.clone()),
                live: None,
            }),
            committed: RwLock::new(SourceStatus {
                current: CurrentSource::None,
                title: IDLE_TITLE.to_string(),
                producer_active: false,
            }),
            catalog,
            hub,
            device,
            credentials,
            replay_interval,
        }
    }

    pub fn catalog(&self) -> &DatasetCatalog {
        &self.catalog
    }

    /// Switch to the live device feed.
    ///
    /// Login happens first; on failure the current source keeps running.
    pub async fn select_live(&self) -> SwitchResult<()> {
        let mut state = self.state.lock().await;

        self.device.login(&self.credentials).await?;

        state.stop_producers();
        state.current = CurrentSource::Live;
        state.title = LIVE_TITLE.to_string();
        self.hub.announce_source(state.title.clone(), None);
        state.live = Some(subscribe_live(&self.hub, self.device.clone()));
        self.commit(&state);

        info!("Source switched to live device");
        Ok(())
    }

    /// Switch replay to the dataset with this 1-based id
    pub async fn select_replay_by_id(&self, dataset_id: i64) -> SwitchResult<DatasetDescriptor> {
        let descriptor = self
            .catalog
            .get(dataset_id)
            .cloned()
            .ok_or(SwitchError::UnknownDataset(dataset_id))?;
        self.select_replay(&descriptor).await?;
        Ok(descriptor)
    }

    /// Switch replay to `descriptor`.
    ///
    /// The dataset is loaded before anything is stopped, so a broken file
    /// leaves the previous source active.
    pub async fn select_replay(&self, descriptor: &DatasetDescriptor) -> SwitchResult<()> {
        let dataset_id = self
            .catalog
            .id_of(descriptor)
            .ok_or_else(|| SwitchError::UnknownDataset(0))?;

        let mut state = self.state.lock().await;
        let samples = self.catalog.load(descriptor).await?;

        state.stop_producers();
        state.current = CurrentSource::Replay { dataset_id };
        state.title = descriptor.title();
        self.hub
            .announce_source(state.title.clone(), Some(descriptor.clone()));

        let started = state.scheduler.start(samples, self.replay_interval);
        if started.is_err() {
            state.current = CurrentSource::None;
        }
        self.commit(&state);
        started?;

        info!(
            "Source switched to dataset {} ({})",
            dataset_id, descriptor.relative_path
        );
        Ok(())
    }

    /// Stop whatever is producing; used on shutdown
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        state.stop_producers();
        state.current = CurrentSource::None;
        self.commit(&state);
    }

    /// Current pipeline status without waiting for an in-flight switch.
    ///
    /// While a reconfiguration holds the pipeline lock (a slow device login,
    /// a large dataset load) this reports the last committed status.
    pub fn status(&self) -> SourceStatus {
        match self.state.try_lock() {
            Ok(state) => state.status(),
            Err(_) => self.committed.read().clone(),
        }
    }

    pub fn current_source(&self) -> CurrentSource {
        self.status().current
    }

    fn commit(&self, state: &PipelineState) {
        *self.committed.write() = state.status();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CalmReading;
    use crate::error::DeviceError;
    use crate::registry::SessionHandle;
    use crate::types::ServerEvent;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time;

    /// Device that emits 0.99 every 100ms while streaming
    struct FakeDevice {
        accept: AtomicBool,
    }

    #[async_trait]
    impl DeviceFeed for FakeDevice {
        async fn login(&self, _credentials: &Credentials) -> Result<(), DeviceError> {
            if self.accept.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(DeviceError::Authentication("denied".to_string()))
            }
        }

        async fn stream_calm(&self, sender: mpsc::Sender<CalmReading>) -> Result<(), DeviceError> {
            loop {
                time::sleep(Duration::from_millis(100)).await;
                let reading = CalmReading {
                    probability: 0.99,
                    timestamp: Some(0),
                };
                if sender.send(reading).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        switch: SourceSwitch,
        rx: mpsc::Receiver<ServerEvent>,
        device: Arc<FakeDevice>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("breathing")).unwrap();
        fs::write(dir.path().join("breathing/sample1.json"), "[0.2, 0.8]").unwrap();
        fs::write(dir.path().join("breathing/broken.json"), "{oops").unwrap();

        let catalog = Arc::new(DatasetCatalog::scan(dir.path()));
        let hub = Broadcaster::new(catalog.grouped(), IDLE_TITLE);
        let (session, mut rx) = SessionHandle::new(1024);
        hub.register(session);
        while rx.try_recv().is_ok() {}

        let device = Arc::new(FakeDevice {
            accept: AtomicBool::new(true),
        });
        let credentials = Credentials {
            device_id: "d".to_string(),
            email: "e".to_string(),
            password: "p".to_string(),
        };
        let switch = SourceSwitch::new(
            catalog,
            hub,
            device.clone(),
            credentials,
            Duration::from_millis(1000),
        );

        Fixture {
            _dir: dir,
            switch,
            rx,
            device,
        }
    }

    fn id_of(switch: &SourceSwitch, name: &str) -> i64 {
        switch
            .catalog()
            .infos()
            .into_iter()
            .find(|d| d.name == name)
            .unwrap()
            .id as i64
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn calm_values(events: &[ServerEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::Calm { probability, .. } => Some(*probability),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_idle() {
        let fx = fixture();
        let status = fx.switch.status();
        assert_eq!(status.current, CurrentSource::None);
        assert_eq!(status.title, IDLE_TITLE);
        assert!(!status.producer_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_replay_announces_then_streams() {
        let mut fx = fixture();
        let id = id_of(&fx.switch, "sample1.json");

        fx.switch.select_replay_by_id(id).await.unwrap();
        let events = drain(&mut fx.rx);

        assert_eq!(
            events[0],
            ServerEvent::DatasetTitle {
                title: "Breathing: sample1.json".to_string()
            }
        );
        assert!(matches!(events[1], ServerEvent::DatasetSelected { .. }));
        assert_eq!(calm_values(&events), vec![0.2]);
        assert_eq!(
            fx.switch.current_source(),
            CurrentSource::Replay { dataset_id: id as usize }
        );

        time::sleep(Duration::from_millis(2001)).await;
        assert_eq!(calm_values(&drain(&mut fx.rx)), vec![0.8, 0.2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_dataset_keeps_previous_source() {
        let mut fx = fixture();
        let good = id_of(&fx.switch, "sample1.json");
        let broken = id_of(&fx.switch, "broken.json");

        fx.switch.select_replay_by_id(good).await.unwrap();
        let result = fx.switch.select_replay_by_id(broken).await;
        assert!(matches!(result, Err(SwitchError::Dataset(_))));

        let status = fx.switch.status();
        assert_eq!(status.current, CurrentSource::Replay { dataset_id: good as usize });
        assert!(status.producer_active);

        drain(&mut fx.rx);
        time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(calm_values(&drain(&mut fx.rx)), vec![0.8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_id_is_rejected() {
        let fx = fixture();
        assert!(matches!(
            fx.switch.select_replay_by_id(0).await,
            Err(SwitchError::UnknownDataset(0))
        ));
        assert!(matches!(
            fx.switch.select_replay_by_id(99).await,
            Err(SwitchError::UnknownDataset(99))
        ));
        assert_eq!(fx.switch.current_source(), CurrentSource::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_replaces_replay() {
        let mut fx = fixture();
        let id = id_of(&fx.switch, "sample1.json");

        fx.switch.select_replay_by_id(id).await.unwrap();
        fx.switch.select_live().await.unwrap();
        drain(&mut fx.rx);

        time::sleep(Duration::from_millis(2550)).await;
        let values = calm_values(&drain(&mut fx.rx));
        assert!(!values.is_empty());
        assert!(values.iter().all(|p| *p == 0.99), "replay leaked: {values:?}");

        let status = fx.switch.status();
        assert_eq!(status.current, CurrentSource::Live);
        assert_eq!(status.title, LIVE_TITLE);
        assert!(status.producer_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_replaces_live() {
        let mut fx = fixture();
        let id = id_of(&fx.switch, "sample1.json");

        fx.switch.select_live().await.unwrap();
        fx.switch.select_replay_by_id(id).await.unwrap();
        drain(&mut fx.rx);

        time::sleep(Duration::from_millis(1550)).await;
        assert_eq!(calm_values(&drain(&mut fx.rx)), vec![0.8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_login_keeps_replay() {
        let mut fx = fixture();
        let id = id_of(&fx.switch, "sample1.json");

        fx.switch.select_replay_by_id(id).await.unwrap();
        fx.device.accept.store(false, Ordering::SeqCst);

        assert!(matches!(
            fx.switch.select_live().await,
            Err(SwitchError::Device(DeviceError::Authentication(_)))
        ));
        assert_eq!(
            fx.switch.current_source(),
            CurrentSource::Replay { dataset_id: id as usize }
        );

        drain(&mut fx.rx);
        time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(calm_values(&drain(&mut fx.rx)), vec![0.8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_selection_keeps_one_producer() {
        let mut fx = fixture();
        let id = id_of(&fx.switch, "sample1.json");

        for _ in 0..5 {
            fx.switch.select_replay_by_id(id).await.unwrap();
        }
        drain(&mut fx.rx);

        time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(calm_values(&drain(&mut fx.rx)), vec![0.8, 0.2, 0.8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_silences_pipeline() {
        let mut fx = fixture();
        let id = id_of(&fx.switch, "sample1.json");

        fx.switch.select_replay_by_id(id).await.unwrap();
        fx.switch.stop().await;
        drain(&mut fx.rx);

        time::sleep(Duration::from_millis(3001)).await;
        assert!(calm_values(&drain(&mut fx.rx)).is_empty());
        assert_eq!(fx.switch.current_source(), CurrentSource::None);
    }

    /// Device whose bridge accepts the connection but never answers login
    struct StalledDevice;

    #[async_trait]
    impl DeviceFeed for StalledDevice {
        async fn login(&self, _credentials: &Credentials) -> Result<(), DeviceError> {
            std::future::pending().await
        }

        async fn stream_calm(&self, _sender: mpsc::Sender<CalmReading>) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_status_during_stalled_login() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("breathing")).unwrap();
        fs::write(dir.path().join("breathing/sample1.json"), "[0.2, 0.8]").unwrap();

        let catalog = Arc::new(DatasetCatalog::scan(dir.path()));
        let hub = Broadcaster::new(catalog.grouped(), IDLE_TITLE);
        let credentials = Credentials {
            device_id: "d".to_string(),
            email: "e".to_string(),
            password: "p".to_string(),
        };
        let switch = Arc::new(SourceSwitch::new(
            catalog,
            hub,
            Arc::new(StalledDevice),
            credentials,
            Duration::from_millis(1000),
        ));
        switch.select_replay_by_id(1).await.unwrap();

        let pending = {
            let switch = switch.clone();
            tokio::spawn(async move { switch.select_live().await })
        };
        time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        let status = switch.status();
        assert_eq!(status.current, CurrentSource::Replay { dataset_id: 1 });
        assert_eq!(status.title, "Breathing: sample1.json");
        assert!(status.producer_active);

        pending.abort();
        let _ = pending.await;
        switch.stop().await;
        assert_eq!(switch.current_source(), CurrentSource::None);
    }
}
