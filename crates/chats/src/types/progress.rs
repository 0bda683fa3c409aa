//! Upload progress reporting.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

const ACKNOWLEDGED: u8 = 100;
const LAST_UNACKNOWLEDGED: u8 = 99;

/// Monotonic percentage published while an object is being stored.
///
/// Intermediate updates are clamped to 99 so that 100 is only ever observed
/// after [`ProgressReporter::complete`] is called on storage acknowledgment.
/// Clones share the same channel.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: Arc<watch::Sender<u8>>,
    batch: Option<(Arc<Batch>, usize)>,
}

#[derive(Debug)]
struct Batch {
    parent: ProgressReporter,
    slots: Mutex<Vec<u8>>,
}

impl Batch {
    fn record(&self, slot: usize, percent: u8) {
        let (mean, finished) = {
            let Ok(mut slots) = self.slots.lock() else {
                return;
            };
            if let Some(value) = slots.get_mut(slot) {
                *value = percent;
            }
            let total: u32 = slots.iter().map(|value| u32::from(*value)).sum();
            let len = slots.len().max(1) as u32;
            let finished = slots.iter().all(|value| *value == ACKNOWLEDGED);
            ((total / len) as u8, finished)
        };

        if finished {
            self.parent.complete();
        } else {
            self.parent.advance(mean);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            sender: Arc::new(sender),
            batch: None,
        }
    }

    /// Raise the reported percentage. Lower values are ignored and anything
    /// above 99 is held at 99 until completion.
    pub fn advance(&self, percent: u8) {
        let target = percent.min(LAST_UNACKNOWLEDGED);
        let changed = self.sender.send_if_modified(|current| {
            if target > *current {
                *current = target;
                true
            } else {
                false
            }
        });
        if changed {
            self.propagate(target);
        }
    }

    /// Mark the upload as acknowledged by the store.
    pub fn complete(&self) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == ACKNOWLEDGED {
                false
            } else {
                *current = ACKNOWLEDGED;
                true
            }
        });
        if changed {
            self.propagate(ACKNOWLEDGED);
        }
    }

    /// Start over at zero for a new upload.
    pub fn reset(&self) {
        self.sender.send_replace(0);
    }

    pub fn percent(&self) -> u8 {
        *self.sender.borrow()
    }

    pub fn is_complete(&self) -> bool {
        self.percent() == ACKNOWLEDGED
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.sender.subscribe()
    }

    /// Create `count` child reporters whose mean drives this reporter.
    ///
    /// The parent completes once every child has completed.
    pub fn split(&self, count: usize) -> Vec<ProgressReporter> {
        let batch = Arc::new(Batch {
            parent: self.clone(),
            slots: Mutex::new(vec![0; count]),
        });

        (0..count)
            .map(|slot| {
                let (sender, _) = watch::channel(0);
                ProgressReporter {
                    sender: Arc::new(sender),
                    batch: Some((Arc::clone(&batch), slot)),
                }
            })
            .collect()
    }

    fn propagate(&self, percent: u8) {
        if let Some((batch, slot)) = &self.batch {
            batch.record(*slot, percent);
        }
    }
}
