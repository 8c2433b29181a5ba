//! Bounded-retry polling of drive metadata after optical media changes.
//!
//! An optical drive reports insertion before the volume is mounted, and no
//! event announces the end of the mount. The poller re-reads the drive's
//! label and icon at a fixed interval until they differ from the last known
//! values or the attempt budget runs out. Only the final commit is sent to
//! the owner thread.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::{PollConfig, SyncConfig};
use crate::error::{Result, TreeError};
use crate::marshal::UiMarshaller;
use crate::provider::{IconHandle, MetadataResolver};
use crate::reconciler::ChangeReconciler;
use crate::taxonomy;
use crate::tree::DriveTable;
use crate::watch::WatchEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaChange {
    Inserted,
    Ejected,
}

impl MediaChange {
    pub fn into_event(self, root: String) -> WatchEvent {
        match self {
            MediaChange::Inserted => WatchEvent::OpticalMediaInserted(root),
            MediaChange::Ejected => WatchEvent::OpticalMediaEjected(root),
        }
    }
}

/// Result of one polling task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Metadata reads performed.
    pub attempts: u32,
    /// False when the budget ran out before the metadata changed.
    pub stabilized: bool,
    /// False when the owner thread could no longer be reached.
    pub committed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DriveLabel {
    display_name: String,
    icon: IconHandle,
}

impl DriveLabel {
    fn read(resolver: &dyn MetadataResolver, root: &str) -> Self {
        Self {
            display_name: resolver.display_name(root),
            icon: resolver.icon(root),
        }
    }
}

pub struct MediaPoller {
    resolver: Arc<dyn MetadataResolver>,
    drives: DriveTable,
    marshaller: Arc<dyn UiMarshaller>,
    config: PollConfig,
    runtime: Handle,
}

impl std::fmt::Debug for MediaPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPoller")
            .field("config", &self.config)
            .field("drives", &self.drives.len())
            .finish_non_exhaustive()
    }
}

impl MediaPoller {
    pub fn new(
        resolver: Arc<dyn MetadataResolver>,
        drives: DriveTable,
        marshaller: Arc<dyn UiMarshaller>,
        config: PollConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            resolver,
            drives,
            marshaller,
            config,
            runtime,
        }
    }

    /// Poller using `SyncConfig::media_poll`.
    pub fn from_config(
        resolver: Arc<dyn MetadataResolver>,
        drives: DriveTable,
        marshaller: Arc<dyn UiMarshaller>,
        config: &SyncConfig,
        runtime: Handle,
    ) -> Self {
        Self::new(resolver, drives, marshaller, config.media_poll, runtime)
    }

    #[inline]
    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Starts polling the drive owning `path`.
    ///
    /// The stale label is the one recorded in the drive table, or a fresh
    /// read for a drive the tree does not know yet. Awaiting the handle
    /// yields the outcome; aborting it drops the commit.
    pub fn spawn(&self, path: &str, change: MediaChange) -> Result<JoinHandle<PollOutcome>> {
        let root =
            taxonomy::drive_root_of(path).ok_or_else(|| TreeError::InvalidPath(path.to_string()))?;
        let stale = match self.drives.lookup(&root) {
            Some(entry) => DriveLabel {
                display_name: entry.display_name,
                icon: entry.icon,
            },
            None => DriveLabel::read(self.resolver.as_ref(), &root),
        };

        let resolver = self.resolver.clone();
        let marshaller = self.marshaller.clone();
        let config = self.config;
        log::debug!(
            "media poll started root={} change={:?} max_attempts={}",
            root,
            change,
            config.max_attempts
        );
        Ok(self.runtime.spawn(async move {
            let (attempts, stabilized) =
                wait_for_label_change(resolver.as_ref(), &root, &stale, config).await;
            if !stabilized {
                log::warn!(
                    "media poll exhausted root={} attempts={}",
                    root,
                    attempts
                );
            }
            let event = change.into_event(root.clone());
            let job = Box::new(move |reconciler: &mut ChangeReconciler| {
                reconciler.handle(event);
            });
            let committed = match marshaller.run_on_ui_thread(job) {
                Ok(()) => true,
                Err(error) => {
                    log::warn!("media commit dropped root={} error={}", root, error);
                    false
                }
            };
            PollOutcome {
                attempts,
                stabilized,
                committed,
            }
        }))
    }
}

async fn wait_for_label_change(
    resolver: &dyn MetadataResolver,
    root: &str,
    stale: &DriveLabel,
    config: PollConfig,
) -> (u32, bool) {
    for attempt in 1..=config.max_attempts {
        sleep(config.interval()).await;
        if DriveLabel::read(resolver, root) != *stale {
            return (attempt, true);
        }
    }
    (config.max_attempts, false)
}
