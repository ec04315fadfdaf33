//! # Sync Coordinator
//!
//! Background task that decides when the processor drains.
//!
//! `Idle` ticks on the long interval, `Active` on the short one, `Paused`
//! not at all. New work switches to `Active`; a drain that leaves nothing
//! dispatchable falls back to `Idle`. Items held for a credential count only
//! once a usable token exists. Going to the background or offline pauses;
//! coming back drains once straight away.

use std::sync::Arc;
use std::time::Duration;

use config::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info};

use crate::context::SyncContext;
use crate::events::SyncEvent;
use crate::processor::SyncProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum CoordinatorState {
    Idle,
    Active,
    Paused
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum AppLifecycle {
    Foreground,
    Background
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Connectivity {
    Online,
    Offline
}

pub struct SyncCoordinator {
    ctx: Arc<SyncContext>,
    processor: Arc<SyncProcessor>,
    active_interval: Duration,
    idle_interval: Duration
}

/// Control surface of a running coordinator.
pub struct CoordinatorHandle {
    state: watch::Receiver<CoordinatorState>,
    lifecycle: watch::Sender<AppLifecycle>,
    connectivity: watch::Sender<Connectivity>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>
}

impl CoordinatorHandle {
    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CoordinatorState> {
        self.state.clone()
    }

    pub fn set_lifecycle(&self, lifecycle: AppLifecycle) {
        self.lifecycle.send_replace(lifecycle);
    }

    pub fn set_connectivity(&self, connectivity: Connectivity) {
        self.connectivity.send_replace(connectivity);
    }

    /// Stops the loop and waits for an in-progress drain to finish.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            error!("Sync coordinator task ended abnormally: {e}");
        }
    }
}

struct Signals {
    lifecycle: watch::Receiver<AppLifecycle>,
    connectivity: watch::Receiver<Connectivity>,
    shutdown: watch::Receiver<bool>
}

impl Signals {
    fn paused(&self) -> bool {
        *self.lifecycle.borrow() == AppLifecycle::Background
            || *self.connectivity.borrow() == Connectivity::Offline
    }
}

impl SyncCoordinator {
    pub fn new(
        ctx: Arc<SyncContext>,
        processor: Arc<SyncProcessor>,
        config: &CoordinatorConfig
    ) -> Self {
        Self {
            ctx,
            processor,
            active_interval: Duration::from_secs(config.active_interval_secs),
            idle_interval: Duration::from_secs(config.idle_interval_secs)
        }
    }

    pub fn spawn(self) -> CoordinatorHandle {
        let (state_tx, state_rx) = watch::channel(CoordinatorState::Idle);
        let (lifecycle_tx, lifecycle_rx) = watch::channel(AppLifecycle::Foreground);
        let (connectivity_tx, connectivity_rx) = watch::channel(Connectivity::Online);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let signals = Signals {
            lifecycle: lifecycle_rx,
            connectivity: connectivity_rx,
            shutdown: shutdown_rx
        };
        let events = self.ctx.events.subscribe();
        let task = tokio::spawn(self.run(state_tx, signals, events));

        CoordinatorHandle {
            state: state_rx,
            lifecycle: lifecycle_tx,
            connectivity: connectivity_tx,
            shutdown: shutdown_tx,
            task
        }
    }

    #[tracing::instrument(skip_all)]
    async fn run(
        self,
        state: watch::Sender<CoordinatorState>,
        mut signals: Signals,
        mut events: broadcast::Receiver<SyncEvent>
    ) {
        let mut deadline = self.initial_deadline(&state).await;
        info!(state = %*state.borrow(), "Sync coordinator started");

        loop {
            let paused = signals.paused();
            tokio::select! {
                biased;

                changed = signals.shutdown.changed() => {
                    if changed.is_err() || *signals.shutdown.borrow() {
                        break;
                    }
                }
                changed = signals.lifecycle.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    deadline = self.on_signal(&state, &signals, deadline);
                }
                changed = signals.connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    deadline = self.on_signal(&state, &signals, deadline);
                }
                event = events.recv() => {
                    let new_work = match event {
                        Ok(event) => event.is_new_work(),
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Coordinator lagged behind sync events");
                            true
                        }
                        Err(RecvError::Closed) => break
                    };
                    if new_work && !paused {
                        state.send_replace(CoordinatorState::Active);
                        deadline = deadline.min(Instant::now() + self.active_interval);
                    }
                }
                _ = sleep_until(deadline), if !paused => {
                    deadline = self.tick(&state).await;
                }
            }
        }

        info!("Sync coordinator stopped");
    }

    async fn initial_deadline(&self, state: &watch::Sender<CoordinatorState>) -> Instant {
        match self.ctx.dispatchable_work().await {
            Ok(0) => {
                state.send_replace(CoordinatorState::Idle);
                Instant::now() + self.idle_interval
            }
            Ok(_) => {
                state.send_replace(CoordinatorState::Active);
                Instant::now()
            }
            Err(e) => {
                error!("Failed to inspect sync queue: {e}");
                state.send_replace(CoordinatorState::Active);
                Instant::now() + self.active_interval
            }
        }
    }

    fn on_signal(
        &self,
        state: &watch::Sender<CoordinatorState>,
        signals: &Signals,
        deadline: Instant
    ) -> Instant {
        let paused = signals.paused();
        let was_paused = *state.borrow() == CoordinatorState::Paused;
        if paused && !was_paused {
            info!("Sync coordinator paused");
            state.send_replace(CoordinatorState::Paused);
            deadline
        } else if !paused && was_paused {
            info!("Sync coordinator resumed");
            state.send_replace(CoordinatorState::Active);
            Instant::now()
        } else {
            deadline
        }
    }

    async fn tick(&self, state: &watch::Sender<CoordinatorState>) -> Instant {
        metrics::counter!("sync.coordinator.drains").increment(1);
        if let Err(e) = self.processor.drain().await {
            error!("Sync drain failed: {e}");
            state.send_replace(CoordinatorState::Active);
            return Instant::now() + self.active_interval;
        }

        match self.ctx.dispatchable_work().await {
            Ok(0) => {
                debug!("Sync queue empty, backing off");
                state.send_replace(CoordinatorState::Idle);
                Instant::now() + self.idle_interval
            }
            Ok(pending) => {
                debug!(pending, "Sync work remains");
                state.send_replace(CoordinatorState::Active);
                Instant::now() + self.active_interval
            }
            Err(e) => {
                error!("Failed to inspect sync queue: {e}");
                state.send_replace(CoordinatorState::Active);
                Instant::now() + self.active_interval
            }
        }
    }
}
