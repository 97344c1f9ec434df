//! Polling engine
//!
//! The PollingEngine is the host-side scheduler. It is responsible for:
//! - Accepting entities from integration lifecycles (`EntityRegistrar`)
//! - Refreshing every registered entity once per scan interval
//! - Reporting what happened as `EngineEvent`s
//! - Flushing the config entry store on shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  register_entities  ┌────────────────┐
//! │  Lifecycle   │────────────────────▶│ PollingEngine  │
//! └──────────────┘                     └────────────────┘
//!                                              │ tick
//!                                              ▼
//!                                     ┌────────────────┐
//!                                     │ SensorEntity   │ (sequentially)
//!                                     └────────────────┘
//!                                              │
//!                          ┌───────────────────┼───────────────────┐
//!                          ▼                   ▼                   ▼
//!                 ┌────────────────┐  ┌────────────────┐  ┌────────────────┐
//!                 │ThrottledFetcher│  │   project()    │  │     Events     │
//!                 │  (shared)      │  │   (pure)       │  │   (notify)     │
//!                 └────────────────┘  └────────────────┘  └────────────────┘
//! ```
//!
//! ## Scheduling
//!
//! All refreshes of one tick run one after another on the engine's task, in
//! registration order. A failing entity never stops the tick; it reports a
//! stale outcome and the next entity is refreshed.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, PollingConfig};
use crate::error::{Error, ErrorClass, Result};
use crate::traits::{ConfigEntryStore, Entity, EntityRegistrar, RefreshOutcome};

/// Events emitted by the PollingEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Entities added for an owner
    EntitiesRegistered {
        owner: String,
        count: usize,
    },

    /// Entities removed for an owner
    EntitiesRemoved {
        owner: String,
        count: usize,
    },

    /// An entity kept its previous value after a failed fetch
    EntityStale {
        unique_id: String,
        class: ErrorClass,
        error: String,
    },

    /// A tick finished
    TickCompleted {
        tick: u64,
        published: usize,
        stale: usize,
    },

    /// Engine started
    Started {
        entity_count: usize,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickSummary {
    /// Tick number, starting at 1
    pub tick: u64,
    /// Entities that published a new value
    pub published: usize,
    /// Entities that kept their previous value
    pub stale: usize,
}

struct Registered {
    owner: String,
    entity: Arc<dyn Entity>,
}

/// Cooperative polling scheduler
///
/// ## Lifecycle
///
/// 1. Create with [`PollingEngine::new()`]
/// 2. Let lifecycles register entities through [`EntityRegistrar`]
/// 3. Drive with [`PollingEngine::run()`] (or [`PollingEngine::tick()`] by hand)
/// 4. Tear down lifecycles after `run` returns
///
/// ## Load Resistance
///
/// - **Bounded event channel**: events are dropped (logged) when it is full
/// - **Sequential refresh**: one refresh in flight at a time
/// - **Delayed ticks**: a slow tick postpones the next one instead of bursting
pub struct PollingEngine {
    /// Interval between ticks
    scan_interval: Duration,

    /// Entities in registration order
    entities: RwLock<Vec<Registered>>,

    /// Store flushed on shutdown
    entry_store: Option<Arc<dyn ConfigEntryStore>>,

    /// Ticks run so far
    ticks: AtomicU64,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl PollingEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        polling: &PollingConfig,
        engine: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        polling.validate()?;
        engine.validate()?;

        let (tx, rx) = mpsc::channel(engine.event_channel_capacity);

        let engine = Self {
            scan_interval: polling.scan_interval(),
            entities: RwLock::new(Vec::new()),
            entry_store: None,
            ticks: AtomicU64::new(0),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Flush `store` when the engine stops
    pub fn with_entry_store(mut self, store: Arc<dyn ConfigEntryStore>) -> Self {
        self.entry_store = Some(store);
        self
    }

    /// Registered entities, in registration order
    pub async fn entities(&self) -> Vec<Arc<dyn Entity>> {
        self.entities
            .read()
            .await
            .iter()
            .map(|r| Arc::clone(&r.entity))
            .collect()
    }

    /// Look up an entity by unique id
    pub async fn entity(&self, unique_id: &str) -> Option<Arc<dyn Entity>> {
        self.entities
            .read()
            .await
            .iter()
            .find(|r| r.entity.unique_id() == unique_id)
            .map(|r| Arc::clone(&r.entity))
    }

    /// Number of registered entities
    pub async fn entity_count(&self) -> usize {
        self.entities.read().await.len()
    }

    /// Refresh every registered entity once
    ///
    /// Never fails; failures are counted as stale and reported as events.
    pub async fn tick(&self) -> TickSummary {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        // Entities registered mid-tick join the next one
        let entities = self.entities().await;

        let mut summary = TickSummary {
            tick,
            ..TickSummary::default()
        };

        for entity in entities {
            match entity.refresh().await {
                RefreshOutcome::Published => summary.published += 1,
                RefreshOutcome::Stale { class, message } => {
                    summary.stale += 1;
                    self.emit_event(EngineEvent::EntityStale {
                        unique_id: entity.unique_id().to_string(),
                        class,
                        error: message,
                    });
                }
            }
        }

        debug!(
            "Tick {} done: {} published, {} stale",
            tick, summary.published, summary.stale
        );
        self.emit_event(EngineEvent::TickCompleted {
            tick,
            published: summary.published,
            stale: summary.stale,
        });

        summary
    }

    /// Run the engine until CTRL-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The entry store could not be flushed
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine until `shutdown_rx` fires
    ///
    /// With `None`, waits for CTRL-C like [`PollingEngine::run()`]. A dropped
    /// sender counts as a shutdown request.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            entity_count: self.entity_count().await,
        });
        info!(
            "Polling engine started, scan interval {:?}",
            self.scan_interval
        );

        let mut interval = tokio::time::interval(self.scan_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for CTRL-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }

                Some(_) = ticks.next() => {
                    self.tick().await;
                }
            }
        }

        if let Some(store) = &self.entry_store {
            store.flush().await?;
            info!("Config entries flushed, engine stopped");
        }

        Ok(())
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}

#[async_trait::async_trait]
impl EntityRegistrar for PollingEngine {
    async fn register_entities(
        &self,
        owner: &str,
        entities: Vec<Arc<dyn Entity>>,
        update_before_add: bool,
    ) -> Result<usize> {
        {
            let registered = self.entities.read().await;
            let mut seen: HashSet<&str> =
                registered.iter().map(|r| r.entity.unique_id()).collect();
            for entity in &entities {
                if !seen.insert(entity.unique_id()) {
                    return Err(Error::config(format!(
                        "Entity {} is already registered",
                        entity.unique_id()
                    )));
                }
            }
        }

        if update_before_add {
            for entity in &entities {
                if let RefreshOutcome::Stale { message, .. } = entity.refresh().await {
                    debug!(
                        "Entity {} added without an initial value: {}",
                        entity.unique_id(),
                        message
                    );
                }
            }
        }

        let count = entities.len();
        {
            let mut registered = self.entities.write().await;
            registered.extend(entities.into_iter().map(|entity| Registered {
                owner: owner.to_string(),
                entity,
            }));
        }

        info!("Registered {} entities for {}", count, owner);
        self.emit_event(EngineEvent::EntitiesRegistered {
            owner: owner.to_string(),
            count,
        });
        Ok(count)
    }

    async fn remove_entities(&self, owner: &str) -> usize {
        let removed = {
            let mut registered = self.entities.write().await;
            let before = registered.len();
            registered.retain(|r| r.owner != owner);
            before - registered.len()
        };

        if removed > 0 {
            info!("Removed {} entities for {}", removed, owner);
            self.emit_event(EngineEvent::EntitiesRemoved {
                owner: owner.to_string(),
                count: removed,
            });
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_clone() {
        let event = EngineEvent::EntityStale {
            unique_id: "asuswrt_router_qos".to_string(),
            class: ErrorClass::Transient,
            error: "timeout".to_string(),
        };
        assert_eq!(event.clone(), event);
    }

    #[tokio::test]
    async fn test_tick_without_entities() {
        let (engine, mut rx) =
            PollingEngine::new(&PollingConfig::default(), &EngineConfig::default()).unwrap();

        let summary = engine.tick().await;
        assert_eq!(summary, TickSummary { tick: 1, published: 0, stale: 0 });
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::TickCompleted { tick: 1, published: 0, stale: 0 }
        );
    }

    #[test]
    fn test_invalid_polling_is_rejected() {
        let polling = PollingConfig {
            scan_interval_secs: 0,
            ..PollingConfig::default()
        };
        assert!(PollingEngine::new(&polling, &EngineConfig::default()).is_err());
    }
}
