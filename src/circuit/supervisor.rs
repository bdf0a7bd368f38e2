//! Background recovery of errored circuits.
//!
//! # Responsibilities
//! - Periodically restart circuit slots whose construction failed
//! - Exit on the shutdown broadcast

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::circuit::CircuitPool;

pub struct CircuitSupervisor {
    circuits: CircuitPool,
    interval: Duration,
}

impl CircuitSupervisor {
    pub fn new(circuits: CircuitPool, interval: Duration) -> Self {
        Self { circuits, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            circuits = self.circuits.capacity(),
            "Circuit supervisor starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; circuits are still being built.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Circuit supervisor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Restarts every errored circuit slot. Returns how many were restarted.
    pub fn sweep(&self) -> usize {
        let errored = self.circuits.err_entries();
        for (index, error) in &errored {
            tracing::info!(index, error = %error, "Rebuilding failed circuit");
            if let Err(e) = self.circuits.restart(*index) {
                tracing::warn!(index, error = %e, "Circuit restart rejected");
            }
        }
        errored.len()
    }
}
