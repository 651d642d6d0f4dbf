//! Periodic animation timer

use posecube_core::UiEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Running animation timer. Dropping it stops the timer.
pub struct AnimationTimer {
    generation: u64,
    task: JoinHandle<()>,
}

impl AnimationTimer {
    /// Start sending `Tick { generation }` every `period`, first one after a
    /// full period.
    pub fn start(generation: u64, period: Duration, events: mpsc::Sender<UiEvent>) -> Self {
        info!(generation, period_ms = period.as_millis() as u64, "Starting animation loop");
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(UiEvent::Tick { generation }).await.is_err() {
                    debug!(generation, "Component gone, stopping animation loop");
                    break;
                }
            }
        });
        Self { generation, task }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stop(self) {
        info!(generation = self.generation, "Stopping animation loop");
        // Drop aborts the task
    }
}

impl Drop for AnimationTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
