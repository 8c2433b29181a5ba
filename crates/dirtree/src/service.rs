//! Event pump between the watch source and the owner thread.
//!
//! Watch callbacks only push `WatchEvent`s into a channel. The pump drains
//! it on its own thread, batches and coalesces what arrived together, and
//! forwards each event: optical media changes go to the `MediaPoller`,
//! everything else is marshalled to the owner as a reconcile job.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::error::{Result, TreeError};
use crate::marshal::UiMarshaller;
use crate::media::{MediaChange, MediaPoller, PollOutcome};
use crate::provider::MetadataResolver;
use crate::reconciler::ChangeReconciler;
use crate::taxonomy;
use crate::watch::{coalesce, WatchEvent, WatchSource};

/// How a single event was forwarded.
#[derive(Debug)]
pub enum Dispatch {
    Marshalled,
    Polling(tokio::task::JoinHandle<PollOutcome>),
}

pub struct EventPump {
    marshaller: Arc<dyn UiMarshaller>,
    resolver: Arc<dyn MetadataResolver>,
    poller: MediaPoller,
    watches: Option<Arc<Mutex<WatchSource>>>,
}

impl std::fmt::Debug for EventPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPump")
            .field("poller", &self.poller)
            .field("watches", &self.watches.is_some())
            .finish_non_exhaustive()
    }
}

impl EventPump {
    pub fn new(
        marshaller: Arc<dyn UiMarshaller>,
        resolver: Arc<dyn MetadataResolver>,
        poller: MediaPoller,
    ) -> Self {
        Self {
            marshaller,
            resolver,
            poller,
            watches: None,
        }
    }

    /// Keeps per-drive watchers in step with media arrival and removal.
    pub fn with_watch_source(mut self, watches: Arc<Mutex<WatchSource>>) -> Self {
        self.watches = Some(watches);
        self
    }

    /// Forwards one event.
    pub fn dispatch(&self, event: WatchEvent) -> Result<Dispatch> {
        let media = match &event {
            WatchEvent::OpticalMediaInserted(path) => Some((path.clone(), MediaChange::Inserted)),
            WatchEvent::OpticalMediaEjected(path) => Some((path.clone(), MediaChange::Ejected)),
            _ => None,
        };

        if let Some((path, change)) = media {
            let root = taxonomy::drive_root_of(&path)
                .ok_or_else(|| TreeError::InvalidPath(path.clone()))?;
            self.rearm_watch(&root, change);
            if self.resolver.drive_type(&root).is_cdrom_like() {
                return Ok(Dispatch::Polling(self.poller.spawn(&root, change)?));
            }
        }

        self.marshaller
            .run_on_ui_thread(Box::new(move |reconciler: &mut ChangeReconciler| {
                reconciler.handle(event);
            }))?;
        Ok(Dispatch::Marshalled)
    }

    /// Coalesces a batch and forwards what remains.
    ///
    /// A per-event failure is logged and skipped; a lost owner thread
    /// aborts the batch.
    pub fn dispatch_batch(&self, events: Vec<WatchEvent>) -> Result<Vec<Dispatch>> {
        let mut dispatched = Vec::with_capacity(events.len());
        for event in coalesce(events) {
            let kind = event.kind();
            match self.dispatch(event) {
                Ok(dispatch) => dispatched.push(dispatch),
                Err(TreeError::Disconnected) => return Err(TreeError::Disconnected),
                Err(error) => log::warn!("dispatch failed event={} error={}", kind, error),
            }
        }
        Ok(dispatched)
    }

    /// Runs the pump on a dedicated thread until the event channel closes
    /// or the owner thread goes away. The thread returns the number of
    /// events forwarded.
    pub fn spawn(self, events: Receiver<WatchEvent>) -> JoinHandle<usize> {
        thread::spawn(move || {
            let mut forwarded = 0;
            while let Ok(first) = events.recv() {
                let mut batch = vec![first];
                batch.extend(events.try_iter());
                match self.dispatch_batch(batch) {
                    Ok(dispatched) => forwarded += dispatched.len(),
                    Err(error) => {
                        log::warn!("event pump stopped error={}", error);
                        break;
                    }
                }
            }
            log::debug!("event pump finished forwarded={}", forwarded);
            forwarded
        })
    }

    fn rearm_watch(&self, root: &str, change: MediaChange) {
        let Some(watches) = &self.watches else {
            return;
        };
        let mut watches = watches.lock();
        match change {
            MediaChange::Inserted => match watches.watch_drive(root) {
                Ok(_) => {}
                Err(TreeError::WatchTarget(path)) => {
                    log::debug!("drive watch deferred path={}", path)
                }
                Err(error) => log::warn!("drive watch failed path={} error={}", root, error),
            },
            MediaChange::Ejected => {
                watches.unwatch_drive(root);
            }
        }
    }
}
