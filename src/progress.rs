use serde::Serialize;
use tokio::sync::{mpsc, watch};

/// Engine-side end of a progress stream. Dropping it ends the stream.
pub type ProgressSender = mpsc::UnboundedSender<f64>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<f64>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Scales an engine fraction to a whole percentage.
pub fn percent(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Per-file percentages for a batch, observable through `subscribe`.
#[derive(Debug)]
pub struct BatchProgress {
    tx: watch::Sender<Vec<u8>>,
}

impl BatchProgress {
    pub fn new(len: usize) -> Self {
        let (tx, _rx) = watch::channel(vec![0; len]);
        BatchProgress { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<u8>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.tx.borrow().clone()
    }

    /// Only `index` changes; other entries keep their values.
    pub fn set(&self, index: usize, value: u8) {
        self.tx.send_modify(|values| {
            if let Some(slot) = values.get_mut(index) {
                *slot = value;
            }
        });
    }

    pub fn reset(&self, len: usize) {
        self.tx.send_replace(vec![0; len]);
    }
}

#[derive(Debug)]
pub struct SingleProgress {
    tx: watch::Sender<u8>,
}

impl SingleProgress {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        SingleProgress { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.tx.subscribe()
    }

    pub fn get(&self) -> u8 {
        *self.tx.borrow()
    }

    pub fn set(&self, value: u8) {
        self.tx.send_replace(value);
    }

    pub fn reset(&self) {
        self.set(0);
    }
}

impl Default for SingleProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressPayload {
    pub id: String,
    pub index: usize,
    pub progress: u8,
    pub status: String,
}
