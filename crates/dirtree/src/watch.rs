//! Filesystem watch source.
//!
//! One recursive `notify` watcher per drive root plus one non-recursive
//! watcher on the current directory. Callbacks translate raw events into
//! `WatchEvent`s and send them through a crossbeam channel; they never touch
//! tree state. Media arrival and departure come from the host's volume
//! monitor and are injected through the same channel.

use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::Sender;
use fnv::{FnvHashMap, FnvHashSet};
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::config::SyncConfig;
use crate::error::{Result, TreeError};
use crate::provider::TreeObserver;
use crate::taxonomy;

/// A change the reconciler consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Something below `path` changed; removals are inferred by diffing.
    Changed(String),
    Created(String),
    Renamed { old_path: String, new_path: String },
    OpticalMediaInserted(String),
    OpticalMediaEjected(String),
}

impl WatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Changed(_) => "changed",
            Self::Created(_) => "created",
            Self::Renamed { .. } => "renamed",
            Self::OpticalMediaInserted(_) => "media_inserted",
            Self::OpticalMediaEjected(_) => "media_ejected",
        }
    }
}

fn path_string(path: &Path) -> String {
    taxonomy::normalize(&path.to_string_lossy())
}

fn parent_changed(path: &str) -> WatchEvent {
    WatchEvent::Changed(taxonomy::parent_of(path).unwrap_or_else(|| path.to_string()))
}

/// Source half of a rename waiting for its destination.
#[derive(Debug, Clone)]
struct PendingRename {
    tracker: Option<usize>,
    path: String,
}

/// Translates `notify` events of one watcher into `WatchEvent`s.
///
/// Deletions carry no trustworthy signal at drive roots, so removals are
/// reported as a change of the parent directory and resolved by diff.
///
/// Backends report a rename in halves: Windows sends `From` then `To`
/// without a tracker, inotify sends `From`, `To` and then `Both` sharing a
/// cookie. The halves are joined into one `Renamed` and the trailing `Both`
/// is dropped. A `From` that never meets its `To` was a move out of the
/// watched tree; it is reported as a parent change once the pairing gives
/// up, or on `flush`.
#[derive(Debug, Default)]
pub struct EventTranslator {
    pending: Option<PendingRename>,
    last_pair: Option<(String, String)>,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, event: &Event) -> Vec<WatchEvent> {
        let mut paths: Vec<String> = event.paths.iter().map(|p| path_string(p)).collect();
        let tracker = event.attrs.tracker();
        let mut out = Vec::new();

        match (&event.kind, paths.len()) {
            (EventKind::Access(_), _) => {}
            (EventKind::Modify(ModifyKind::Name(RenameMode::From)), 1) => {
                out.extend(self.flush());
                self.pending = Some(PendingRename {
                    tracker,
                    path: paths.remove(0),
                });
            }
            (EventKind::Modify(ModifyKind::Name(RenameMode::To)), 1) => {
                let new_path = paths.remove(0);
                match self.take_source(tracker, &mut out) {
                    Some(old_path) => {
                        self.last_pair = Some((old_path.clone(), new_path.clone()));
                        out.push(WatchEvent::Renamed { old_path, new_path });
                    }
                    None => out.push(WatchEvent::Created(new_path)),
                }
            }
            (EventKind::Modify(ModifyKind::Name(RenameMode::Both)), 2) => {
                let new_path = paths.remove(1);
                let old_path = paths.remove(0);
                let paired = self
                    .last_pair
                    .take()
                    .is_some_and(|(old, new)| old == old_path && new == new_path);
                if !paired {
                    out.extend(self.flush());
                    out.push(WatchEvent::Renamed { old_path, new_path });
                }
            }
            (EventKind::Create(_), _) => {
                out.extend(self.flush_untracked());
                out.extend(paths.into_iter().map(WatchEvent::Created));
            }
            (EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_), _) => {
                out.extend(self.flush_untracked());
                out.extend(paths.iter().map(|path| parent_changed(path)));
            }
            _ => {
                out.extend(self.flush_untracked());
                out.extend(paths.into_iter().map(WatchEvent::Changed));
            }
        }
        out
    }

    /// Reports a rename source still waiting for its destination.
    pub fn flush(&mut self) -> Option<WatchEvent> {
        self.pending.take().map(|pending| parent_changed(&pending.path))
    }

    /// Without a tracker only adjacency pairs the halves, so any other event
    /// ends the wait. Tracked sources survive interleaved events.
    fn flush_untracked(&mut self) -> Option<WatchEvent> {
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.tracker.is_none())
        {
            self.flush()
        } else {
            None
        }
    }

    fn take_source(&mut self, tracker: Option<usize>, out: &mut Vec<WatchEvent>) -> Option<String> {
        let pending = self.pending.take()?;
        let matches = match (pending.tracker, tracker) {
            (Some(from), Some(to)) => from == to,
            _ => true,
        };
        if matches {
            Some(pending.path)
        } else {
            out.push(parent_changed(&pending.path));
            None
        }
    }
}

/// Drops repeated `Changed` events for the same path within one batch.
///
/// The diff enumerates the live directory when it runs, so one pass per
/// path observes every removal that happened up to that point.
pub fn coalesce(events: Vec<WatchEvent>) -> Vec<WatchEvent> {
    if events.len() <= 1 {
        return events;
    }
    let mut seen = FnvHashSet::default();
    events
        .into_iter()
        .filter(|event| match event {
            WatchEvent::Changed(path) => seen.insert(path.clone()),
            _ => true,
        })
        .collect()
}

fn create_watcher(
    target: &str,
    mode: RecursiveMode,
    event_tx: Sender<WatchEvent>,
) -> Result<RecommendedWatcher> {
    if !Path::new(target).exists() {
        return Err(TreeError::WatchTarget(target.to_string()));
    }

    let mut translator = EventTranslator::new();
    let mut watcher =
        recommended_watcher(move |event_result: notify::Result<Event>| match event_result {
            Ok(event) => {
                for translated in translator.translate(&event) {
                    let _ = event_tx.send(translated);
                }
            }
            Err(error) => {
                log::warn!("filesystem watcher error: {}", error);
            }
        })?;
    watcher.watch(Path::new(target), mode)?;
    Ok(watcher)
}

/// Owns the armed watchers.
pub struct WatchSource {
    event_tx: Sender<WatchEvent>,
    drives: FnvHashMap<String, RecommendedWatcher>,
    current: Option<(String, RecommendedWatcher)>,
}

impl std::fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSource")
            .field("drives", &self.drives.keys().collect::<Vec<_>>())
            .field("current", &self.current.as_ref().map(|(path, _)| path))
            .finish()
    }
}

impl WatchSource {
    pub fn new(event_tx: Sender<WatchEvent>) -> Self {
        Self {
            event_tx,
            drives: FnvHashMap::default(),
            current: None,
        }
    }

    /// Sender for events injected by the host, such as media changes.
    pub fn sender(&self) -> Sender<WatchEvent> {
        self.event_tx.clone()
    }

    /// Arms a recursive watcher on a drive root. Returns false if one is
    /// already armed.
    pub fn watch_drive(&mut self, root: &str) -> Result<bool> {
        let root = taxonomy::normalize(root);
        if self.drives.contains_key(&root) {
            return Ok(false);
        }
        let watcher = create_watcher(&root, RecursiveMode::Recursive, self.event_tx.clone())?;
        log::info!("drive watcher armed root={}", root);
        self.drives.insert(root, watcher);
        Ok(true)
    }

    /// Arms watchers on every root. Missing targets are skipped; a later
    /// media arrival re-arms them. Returns the number armed.
    pub fn watch_drives<S: AsRef<str>>(&mut self, roots: &[S]) -> usize {
        let mut armed = 0;
        for root in roots {
            match self.watch_drive(root.as_ref()) {
                Ok(true) => armed += 1,
                Ok(false) => {}
                Err(TreeError::WatchTarget(path)) => {
                    log::debug!("drive watcher skipped missing root={}", path);
                }
                Err(error) => {
                    log::warn!(
                        "drive watcher disabled root={} error={}",
                        root.as_ref(),
                        error
                    );
                }
            }
        }
        armed
    }

    pub fn unwatch_drive(&mut self, root: &str) -> bool {
        let removed = self.drives.remove(&taxonomy::normalize(root)).is_some();
        if removed {
            log::info!("drive watcher dropped root={}", root);
        }
        removed
    }

    pub fn watched_drives(&self) -> Vec<String> {
        let mut roots: Vec<String> = self.drives.keys().cloned().collect();
        roots.sort();
        roots
    }

    /// Moves the non-recursive watcher to `path`.
    pub fn watch_current_directory(&mut self, path: &str) -> Result<()> {
        let path = taxonomy::normalize(path);
        if self
            .current
            .as_ref()
            .is_some_and(|(current, _)| *current == path)
        {
            return Ok(());
        }
        self.current = None;
        let watcher = create_watcher(&path, RecursiveMode::NonRecursive, self.event_tx.clone())?;
        self.current = Some((path, watcher));
        Ok(())
    }

    pub fn current_directory(&self) -> Option<&str> {
        self.current.as_ref().map(|(path, _)| path.as_str())
    }

    pub fn clear_current_directory(&mut self) {
        self.current = None;
    }
}

/// Observer that follows the selection with the current-directory watcher
/// before forwarding every notification to `inner`.
pub struct CurrentDirectoryWatcher {
    source: Arc<Mutex<WatchSource>>,
    inner: Arc<dyn TreeObserver>,
    enabled: bool,
}

impl CurrentDirectoryWatcher {
    pub fn new(source: Arc<Mutex<WatchSource>>, inner: Arc<dyn TreeObserver>) -> Self {
        Self {
            source,
            inner,
            enabled: true,
        }
    }

    /// Honours `SyncConfig::watch_current_directory`; when disabled the
    /// observer only forwards.
    pub fn from_config(
        source: Arc<Mutex<WatchSource>>,
        inner: Arc<dyn TreeObserver>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            enabled: config.watch_current_directory,
            ..Self::new(source, inner)
        }
    }
}

impl TreeObserver for CurrentDirectoryWatcher {
    fn current_directory_changed(&self, path: &str) {
        if !self.enabled {
            self.inner.current_directory_changed(path);
            return;
        }
        match self.source.lock().watch_current_directory(path) {
            Ok(()) => {}
            Err(TreeError::WatchTarget(target)) => {
                log::debug!("current directory watcher skipped missing path={}", target);
            }
            Err(error) => {
                log::warn!(
                    "current directory watcher disabled path={} error={}",
                    path,
                    error
                );
            }
        }
        self.inner.current_directory_changed(path);
    }

    fn item_created(&self, path: &str) {
        self.inner.item_created(path);
    }

    fn item_deleted(&self, path: &str) {
        self.inner.item_deleted(path);
    }

    fn item_renamed(&self, old_path: &str, new_path: &str) {
        self.inner.item_renamed(old_path, new_path);
    }
}
