//! Single-slot retry timer
//!
//! The client owns exactly one [`Timer`]. Starting it always cancels the
//! previous arming first, so at most one periodic task is ever live. Every
//! arming gets a new generation number which is carried by its fire events;
//! fires from a replaced or cancelled arming are recognised by the client
//! and dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::service::ClientEvent;

/// First delay and repeat period of a timer arming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerCadence {
    /// Delay before the first fire
    pub initial: Duration,

    /// Delay between subsequent fires
    pub period: Duration,
}

impl TimerCadence {
    pub fn new(initial: Duration, period: Duration) -> Self {
        Self { initial, period }
    }
}

/// Cancellation handle for a scheduled task
pub trait TimerHandle: Send {
    /// Stop the task. Calling this more than once has no effect.
    fn cancel(&mut self);
}

/// Schedules repeating tasks that report fires as [`ClientEvent::TimerFired`]
pub trait TaskScheduler: Send + Sync {
    fn schedule(&self, generation: u64, cadence: TimerCadence) -> Box<dyn TimerHandle>;
}

struct ActiveTimer {
    generation: u64,
    cadence: TimerCadence,
    handle: Box<dyn TimerHandle>,
}

/// The client's single timer slot
pub struct Timer {
    scheduler: Arc<dyn TaskScheduler>,
    active: Option<ActiveTimer>,
    generation: u64,
}

impl Timer {
    pub fn new(scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self {
            scheduler,
            active: None,
            generation: 0,
        }
    }

    /// Replace any pending arming with a new one. Returns its generation.
    pub fn start(&mut self, cadence: TimerCadence) -> u64 {
        self.cancel();
        self.generation = self.generation.wrapping_add(1);
        let handle = self.scheduler.schedule(self.generation, cadence);
        self.active = Some(ActiveTimer {
            generation: self.generation,
            cadence,
            handle,
        });
        self.generation
    }

    /// Cancel the pending arming, if any
    pub fn cancel(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.handle.cancel();
        }
    }

    /// True if `generation` belongs to the live arming
    pub fn is_current(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    /// Cadence of the live arming
    pub fn cadence(&self) -> Option<TimerCadence> {
        self.active.as_ref().map(|active| active.cadence)
    }

    pub fn is_armed(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Scheduler backed by tokio tasks feeding the client event channel
#[derive(Clone)]
pub struct TokioScheduler {
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl TokioScheduler {
    pub fn new(events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { events }
    }
}

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, generation: u64, cadence: TimerCadence) -> Box<dyn TimerHandle> {
        let events = self.events.clone();
        // interval_at panics on a zero period
        let period = cadence.period.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + cadence.initial, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if events.send(ClientEvent::TimerFired { generation }).is_err() {
                    break;
                }
            }
        });

        Box::new(TokioTimerHandle { task: Some(task) })
    }
}

struct TokioTimerHandle {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle for TokioTimerHandle {
    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioTimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
