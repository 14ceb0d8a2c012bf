//! Reloads the registry when the `CURRENT` pointer changes on disk

use super::{ModelBundle, ModelRegistry, CURRENT_FILE};
use crate::error::{EnsembleError, Result};
use crate::health::{components, HealthRegistry};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pause after the first event so a burst of writes triggers one reload
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Watches a bundle store root and reloads the registry on publish
pub struct BundleWatcher {
    registry: Arc<ModelRegistry>,
    health: HealthRegistry,
}

/// Stops watching when dropped
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl BundleWatcher {
    pub fn new(registry: Arc<ModelRegistry>, health: HealthRegistry) -> Self {
        Self { registry, health }
    }

    /// True for create/modify events on the pointer file
    fn touches_pointer(event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name().map_or(false, |n| n == CURRENT_FILE))
    }

    pub async fn start(self) -> Result<WatcherHandle> {
        let root = self.registry.store().root().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| EnsembleError::io(&root, e))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!(error = %e, "Filesystem watcher error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::NonRecursive)?;
        info!(path = %root.display(), "Watching models directory for new bundles");
        self.health.set_healthy(components::WATCHER).await;

        let registry = self.registry;
        let health = self.health;
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !Self::touches_pointer(&event) {
                    continue;
                }
                tokio::time::sleep(SETTLE_DELAY).await;
                while rx.try_recv().is_ok() {}

                debug!("CURRENT pointer changed, reloading bundle");
                if let Err(e) = Self::reload(&registry, &health).await {
                    warn!(error = %e, "Watcher-triggered reload failed");
                }
            }
            debug!("Watcher channel closed");
        });

        Ok(WatcherHandle {
            _watcher: watcher,
            task,
        })
    }

    /// Reload on the blocking pool and mirror the outcome into health
    pub async fn reload(registry: &Arc<ModelRegistry>, health: &HealthRegistry) -> Result<Arc<ModelBundle>> {
        let worker = Arc::clone(registry);
        let outcome = tokio::task::spawn_blocking(move || worker.reload())
            .await
            .map_err(|e| EnsembleError::Task(e.to_string()))?;
        match outcome {
            Ok(bundle) => {
                health.set_healthy(components::BUNDLE).await;
                health.set_ready(true).await;
                Ok(bundle)
            }
            Err(e) => {
                if registry.is_loaded() {
                    health
                        .set_degraded(components::BUNDLE, format!("reload failed: {}", e))
                        .await;
                } else {
                    health.set_unhealthy(components::BUNDLE, e.to_string()).await;
                    health.set_ready(false).await;
                }
                Err(e)
            }
        }
    }
}
