use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::store::{MongoStore, StoreError};
use crate::types::{Play, Sla};

pub mod ai;
pub mod strategy;

pub use ai::{AiStrategy, ChatModel, MetricsTool, OpenAiChatModel};
pub use strategy::{BasicStrategy, Strategy};

const DEFAULT_FREQUENCY: Duration = Duration::from_secs(3600);

/// Store seam the reconciliation loop reads and writes through.
#[async_trait]
pub trait PlayStore: Send + Sync {
    async fn get_play_by_slice_id(&self, slice_id: &str) -> Result<Play, StoreError>;
    async fn get_sla_by_slice_id(&self, slice_id: &str) -> Result<Sla, StoreError>;
    async fn update_play(&self, play: Play) -> Result<Play, StoreError>;
    async fn update_sla(&self, sla: Sla) -> Result<Sla, StoreError>;
}

#[async_trait]
impl PlayStore for MongoStore {
    async fn get_play_by_slice_id(&self, slice_id: &str) -> Result<Play, StoreError> {
        MongoStore::get_play_by_slice_id(self, slice_id).await
    }

    async fn get_sla_by_slice_id(&self, slice_id: &str) -> Result<Sla, StoreError> {
        MongoStore::get_sla_by_slice_id(self, slice_id).await
    }

    async fn update_play(&self, play: Play) -> Result<Play, StoreError> {
        MongoStore::update_play(self, play).await
    }

    async fn update_sla(&self, sla: Sla) -> Result<Sla, StoreError> {
        MongoStore::update_sla(self, sla).await
    }
}

/// Cluster seam the loop applies new Plays through.
#[async_trait]
pub trait PlayApplier: Send + Sync {
    async fn apply_play(&self, play: &Play, namespace: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl PlayApplier for crate::kubeclient::KubeClient {
    async fn apply_play(&self, play: &Play, namespace: &str) -> anyhow::Result<()> {
        crate::kubeclient::KubeClient::apply_play(self, play, namespace).await
    }
}

struct ControllerState {
    running: bool,
    frequency: Duration,
    /// Reconciliation order follows insertion order.
    slices: Vec<String>,
    strategies: Vec<Arc<dyn Strategy>>,
    active: Option<Arc<dyn Strategy>>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// Snapshot served by the controller API.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub running: bool,
    pub frequency: Duration,
    pub slices: Vec<String>,
    pub strategies: Vec<String>,
    pub used_strategy: String,
}

/// The closed-loop controller: every tick it asks the active strategy for a
/// new Play per registered slice, applies it and persists it. One mutex
/// guards all scalar state; the loop task is cancelled through a watch
/// channel that is recreated on stop so start can resume.
pub struct Controller {
    store: Arc<dyn PlayStore>,
    applier: Arc<dyn PlayApplier>,
    namespace: String,
    inner: tokio::sync::Mutex<ControllerState>,
}

impl Controller {
    pub fn new(
        store: Arc<dyn PlayStore>,
        applier: Arc<dyn PlayApplier>,
        namespace: &str,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            applier,
            namespace: namespace.to_string(),
            inner: tokio::sync::Mutex::new(ControllerState {
                running: false,
                frequency: DEFAULT_FREQUENCY,
                slices: Vec::new(),
                strategies: Vec::new(),
                active: None,
                stop_tx: None,
                task: None,
            }),
        })
    }

    /// Spawns the loop; calling start on a running controller is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.inner.lock().await;
        if state.running {
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        state.stop_tx = Some(stop_tx);
        state.running = true;

        let controller = Arc::clone(self);
        let frequency = state.frequency;
        state.task = Some(tokio::spawn(async move {
            controller.run_loop(frequency, stop_rx).await;
        }));
        tracing::info!(frequency = ?frequency, "controller started");
    }

    /// Cancels the loop and waits for it to exit. A subsequent start gets a
    /// fresh stop channel.
    pub async fn stop(&self) {
        let (stop_tx, task) = {
            let mut state = self.inner.lock().await;
            if !state.running {
                return;
            }
            state.running = false;
            (state.stop_tx.take(), state.task.take())
        };

        if let Some(tx) = stop_tx {
            let _ = tx.send(true);
        }
        if let Some(task) = task {
            let _ = task.await;
        }
        tracing::info!("controller stopped");
    }

    /// Updates the tick period; a running loop is restarted onto it.
    pub async fn set_frequency(self: &Arc<Self>, frequency: Duration) {
        let restart = {
            let mut state = self.inner.lock().await;
            state.frequency = frequency;
            state.running
        };
        if restart {
            self.stop().await;
            self.start().await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.running
    }

    pub async fn frequency(&self) -> Duration {
        self.inner.lock().await.frequency
    }

    pub async fn add_slice(&self, slice_id: &str) {
        let mut state = self.inner.lock().await;
        if !state.slices.iter().any(|s| s == slice_id) {
            state.slices.push(slice_id.to_string());
        }
    }

    pub async fn remove_slice(&self, slice_id: &str) {
        let mut state = self.inner.lock().await;
        state.slices.retain(|s| s != slice_id);
    }

    pub async fn list_slices(&self) -> Vec<String> {
        self.inner.lock().await.slices.clone()
    }

    /// Registers a strategy; a second registration under the same name is
    /// rejected.
    pub async fn register_strategy(&self, strategy: Arc<dyn Strategy>) -> Result<(), String> {
        let mut state = self.inner.lock().await;
        if state.strategies.iter().any(|s| s.name() == strategy.name()) {
            return Err(format!("strategy {:?} already registered", strategy.name()));
        }
        state.strategies.push(strategy);
        Ok(())
    }

    pub async fn unregister_strategy(&self, name: &str) {
        let mut state = self.inner.lock().await;
        state.strategies.retain(|s| s.name() != name);
        if state.active.as_ref().map(|s| s.name() == name).unwrap_or(false) {
            state.active = None;
        }
    }

    pub async fn get_strategy_by_name(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        let state = self.inner.lock().await;
        state.strategies.iter().find(|s| s.name() == name).cloned()
    }

    pub async fn list_strategies(&self) -> Vec<String> {
        let state = self.inner.lock().await;
        state.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Selects the active strategy by name; unknown names are refused.
    pub async fn set_strategy(&self, name: &str) -> Result<(), String> {
        let mut state = self.inner.lock().await;
        let strategy = state
            .strategies
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| format!("strategy {:?} not registered", name))?;
        state.active = Some(strategy);
        Ok(())
    }

    pub async fn active_strategy(&self) -> Option<String> {
        let state = self.inner.lock().await;
        state.active.as_ref().map(|s| s.name().to_string())
    }

    pub async fn status(&self) -> ControllerStatus {
        let state = self.inner.lock().await;
        ControllerStatus {
            running: state.running,
            frequency: state.frequency,
            slices: state.slices.clone(),
            strategies: state.strategies.iter().map(|s| s.name().to_string()).collect(),
            used_strategy: state
                .active
                .as_ref()
                .map(|s| s.name().to_string())
                .unwrap_or_default(),
        }
    }

    async fn run_loop(self: Arc<Self>, frequency: Duration, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first interval tick fires immediately; consume it so ticks land
        // on period boundaries.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop_rx.changed() => return,
                _ = ticker.tick() => {
                    let (slices, active) = {
                        let state = self.inner.lock().await;
                        (state.slices.clone(), state.active.clone())
                    };

                    let Some(strategy) = active else {
                        tracing::warn!("controller tick with no active strategy");
                        continue;
                    };

                    for slice_id in slices {
                        if let Err(e) = self.control(&slice_id, strategy.as_ref()).await {
                            tracing::error!(
                                slice_id = %slice_id,
                                error = %e,
                                "reconciliation failed, skipping slice"
                            );
                        }
                    }
                }
            }
        }
    }

    /// One reconciliation: read SLA and Play, ask the strategy, apply, persist.
    async fn control(&self, slice_id: &str, strategy: &dyn Strategy) -> anyhow::Result<()> {
        let sla = self.store.get_sla_by_slice_id(slice_id).await?;
        let play = self.store.get_play_by_slice_id(slice_id).await?;

        let new_play = strategy.reconcile(play, sla.clone()).await?;

        self.applier.apply_play(&new_play, &self.namespace).await?;
        self.store.update_play(new_play).await?;
        self.store.update_sla(sla).await?;

        tracing::info!(slice_id, "reconciliation complete");
        Ok(())
    }
}
