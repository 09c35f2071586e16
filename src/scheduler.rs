//! Paced, looping replay of a recorded sample sequence.
//!
//! `Idle -> Running` on [`ReplayScheduler::start`], back to `Idle` on
//! [`ReplayScheduler::stop`]. Starting while running stops the previous run
//! first, so at most one replay timer is ever outstanding.

use crate::error::SchedulerError;
use crate::producer::{Emitter, Producer};
use crate::registry::Broadcaster;
use crate::types::Sample;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::info;

/// Default replay cadence
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

pub struct ReplayScheduler {
    hub: Broadcaster,
    active: Option<Producer>,
}

impl ReplayScheduler {
    pub fn new(hub: Broadcaster) -> Self {
        Self { hub, active: None }
    }

    /// Replay `sequence` forever at `interval`.
    ///
    /// The first sample is published before this returns. An empty sequence
    /// is rejected and any current run is left untouched.
    pub fn start(
        &mut self,
        sequence: Vec<Sample>,
        interval: Duration,
    ) -> Result<(), SchedulerError> {
        if sequence.is_empty() {
            return Err(SchedulerError::EmptySequence);
        }

        self.stop();

        let samples: Arc<[Sample]> = sequence.into();
        let producer = Producer::spawn(&self.hub, move |emitter| {
            emitter.publish(&samples[0]);
            replay_loop(emitter, samples, interval)
        });

        self.active = Some(producer);
        Ok(())
    }

    /// Cancel the pending tick; safe to call when idle
    pub fn stop(&mut self) {
        if let Some(mut producer) = self.active.take() {
            producer.stop();
            info!("Replay stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|p| !p.is_finished())
    }
}

async fn replay_loop(emitter: Emitter, samples: Arc<[Sample]>, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut index = 1;

    loop {
        tokio::select! {
            _ = emitter.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if index >= samples.len() {
            index = 0;
            info!("Replay loop: restarting from the first of {} samples", samples.len());
        }

        if !emitter.publish(&samples[index]) {
            break;
        }
        index += 1;
    }
}
