use anyhow::{Context, Result};
use stake_execution::{
    Clock, Directory, Engine, Key, LifecycleSnapshot, Memory, Prefix, State, StaticDirectory,
    Status, Value,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

mod api;
pub use api::Api;

mod blob_store;
pub use blob_store::LocalBlobStore;
mod config;
pub use config::{DataSourceKind, ServerConfig};
mod fixture;
pub use fixture::Fixture;
mod metrics;
pub use metrics::{HttpMetrics, HttpMetricsSnapshot, LatencySnapshot, RouteFamily};
mod persistence;
pub use persistence::SqliteState;

/// Entity store picked once at startup.
pub enum DataSource {
    Live(SqliteState),
    Fixture(Memory),
}

impl DataSource {
    pub fn kind(&self) -> DataSourceKind {
        match self {
            DataSource::Live(_) => DataSourceKind::Live,
            DataSource::Fixture(_) => DataSourceKind::Fixture,
        }
    }

    fn inner(&self) -> &dyn State {
        match self {
            DataSource::Live(store) => store,
            DataSource::Fixture(memory) => memory,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn State {
        match self {
            DataSource::Live(store) => store,
            DataSource::Fixture(memory) => memory,
        }
    }
}

impl State for DataSource {
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        self.inner().get(key)
    }

    fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.inner_mut().insert(key, value)
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        self.inner_mut().delete(key)
    }

    fn scan(&self, prefix: &Prefix) -> Result<Vec<(Key, Value)>> {
        self.inner().scan(prefix)
    }

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        self.inner_mut().apply(changes)
    }
}

/// Shared state behind every HTTP handler.
pub struct Server {
    pub config: ServerConfig,
    engine: Engine<DataSource>,
    blobs: LocalBlobStore,
    http_metrics: HttpMetrics,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        store: DataSource,
        directory: Arc<dyn Directory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let blobs = LocalBlobStore::new(config.proof_dir.clone(), &config.proof_base_url);
        Self {
            engine: Engine::new(store, directory, clock),
            blobs,
            http_metrics: HttpMetrics::default(),
            config,
        }
    }

    /// Open the configured data source and directory.
    pub async fn open(config: ServerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let directory_override = config
            .directory_path
            .as_deref()
            .map(Fixture::load)
            .transpose()?;
        if let Some(directory) = &directory_override {
            if directory.has_entities() {
                anyhow::bail!("directory file must not contain bets, participants or stakes");
            }
        }

        let (store, directory) = match config.data_source {
            DataSourceKind::Live => {
                let path = config
                    .sqlite_path
                    .as_deref()
                    .context("--sqlite-path is required with --data-source live")?;
                let store = SqliteState::open(path)?;
                info!(path = %path.display(), entities = store.count()?, "live data source opened");
                let directory = match &directory_override {
                    Some(directory) => directory.directory(),
                    None => {
                        warn!("no directory file configured; every actor is unknown to circles and friendships");
                        StaticDirectory::default()
                    }
                };
                (DataSource::Live(store), directory)
            }
            DataSourceKind::Fixture => {
                let fixture = match &config.fixture_path {
                    Some(path) => Fixture::load(path)?,
                    None => Fixture::default(),
                };
                let memory = fixture.memory()?;
                info!(
                    entities = memory.len(),
                    users = fixture.users.len(),
                    "fixture data source loaded"
                );
                let directory = match &directory_override {
                    Some(directory) => directory.directory(),
                    None => fixture.directory(),
                };
                (DataSource::Fixture(memory), directory)
            }
        };

        let server = Self::new(config, store, Arc::new(directory), clock);
        server.blobs.ensure_root().await?;
        Ok(server)
    }

    pub fn engine(&self) -> &Engine<DataSource> {
        &self.engine
    }

    pub fn blobs(&self) -> &LocalBlobStore {
        &self.blobs
    }

    pub fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }

    pub fn http_metrics_snapshot(&self) -> HttpMetricsSnapshot {
        self.http_metrics.snapshot()
    }

    pub fn lifecycle_metrics_snapshot(&self) -> LifecycleSnapshot {
        self.engine.metrics()
    }

    /// Whether the entity store answers reads.
    pub fn is_ready(&self) -> bool {
        self.engine
            .read(|state, _| Ok(state.get(&Key::Bet(String::new()))?))
            .is_ok()
    }
}

/// Persist deadline locks every `interval` until the task is aborted.
pub fn spawn_sweeper(server: Arc<Server>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match server.engine().sweep_expired().await {
                Ok(locked) if !locked.is_empty() => {
                    info!(count = locked.len(), "locked expired bets")
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "deadline sweep failed"),
            }
        }
    })
}
