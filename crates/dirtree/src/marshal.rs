//! Hand-off of tree mutations to the owning thread.
//!
//! Watch callbacks and media pollers run on arbitrary threads. They never
//! touch the tree; they send a job through the marshaller and the owner
//! thread drains the queue with a `UiDispatcher`.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::{Result, TreeError};
use crate::reconciler::ChangeReconciler;

/// A mutation to run on the owner thread.
pub type UiJob = Box<dyn FnOnce(&mut ChangeReconciler) + Send>;

/// Single entry point for work that must run on the owner thread.
pub trait UiMarshaller: Send + Sync {
    fn run_on_ui_thread(&self, job: UiJob) -> Result<()>;
}

/// Marshaller backed by a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelMarshaller {
    tx: Sender<UiJob>,
}

impl UiMarshaller for ChannelMarshaller {
    fn run_on_ui_thread(&self, job: UiJob) -> Result<()> {
        self.tx.send(job).map_err(|_| TreeError::Disconnected)
    }
}

/// Owner-side end of a `ChannelMarshaller`.
#[derive(Debug)]
pub struct UiDispatcher {
    rx: Receiver<UiJob>,
}

/// Creates a connected marshaller/dispatcher pair.
pub fn channel() -> (ChannelMarshaller, UiDispatcher) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ChannelMarshaller { tx }, UiDispatcher { rx })
}

impl UiDispatcher {
    /// Runs every job queued so far without blocking.
    pub fn run_pending(&self, reconciler: &mut ChangeReconciler) -> usize {
        let mut ran = 0;
        for job in self.rx.try_iter() {
            job(reconciler);
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for one job, then drains the rest of the queue.
    pub fn run_timeout(
        &self,
        reconciler: &mut ChangeReconciler,
        timeout: Duration,
    ) -> Result<usize> {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job(reconciler);
                Ok(1 + self.run_pending(reconciler))
            }
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(TreeError::Disconnected),
        }
    }

    /// Runs jobs until every marshaller has been dropped.
    pub fn run_until_disconnected(&self, reconciler: &mut ChangeReconciler) -> usize {
        let mut ran = 0;
        for job in self.rx.iter() {
            job(reconciler);
            ran += 1;
        }
        ran
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
