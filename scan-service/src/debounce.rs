use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Trailing-edge debouncer over a signal channel.
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Waits for the next burst of signals and returns once no signal has
    /// arrived for a full window. Returns `false` when the channel closed with
    /// nothing pending. A burst cut short by the channel closing still counts.
    pub async fn settle<T>(&self, signals: &mut mpsc::Receiver<T>) -> bool {
        if signals.recv().await.is_none() {
            return false;
        }

        loop {
            tokio::select! {
                signal = signals.recv() => {
                    if signal.is_none() {
                        return true;
                    }
                }
                _ = sleep(self.window) => return true,
            }
        }
    }
}
