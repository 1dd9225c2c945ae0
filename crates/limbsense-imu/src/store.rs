use crate::types::InertialSample;
use tokio::sync::watch;

/// Single-slot, last-value-wins cache of the newest inertial sample.
///
/// Backed by a `watch` channel: publishing swaps the slot under a short
/// internal lock and reading copies the value out, so a reader never sees a
/// half-written sample and neither side waits on the other's progress.
#[derive(Debug)]
pub struct SampleStore {
    slot: watch::Sender<InertialSample>,
}

impl SampleStore {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(InertialSample::ZERO);
        Self { slot }
    }

    /// Overwrite the slot with `sample`. Works with or without subscribers.
    pub fn publish(&self, sample: InertialSample) {
        self.slot.send_replace(sample);
    }

    /// The most recent sample, or [`InertialSample::ZERO`] if none has arrived.
    pub fn latest(&self) -> InertialSample {
        *self.slot.borrow()
    }

    /// Subscribe for change notifications (async consumers).
    pub fn subscribe(&self) -> watch::Receiver<InertialSample> {
        self.slot.subscribe()
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}
