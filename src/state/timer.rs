//! Per-room timer registry with generation-based cancellation.
//!
//! Every armed timer posts back into the room's command queue instead of
//! touching room state directly, so the room worker stays the single writer.
//! Cancellation is logical: bumping the generation makes firings armed under
//! an older generation detectably stale; the sleeps themselves are left to
//! run out and be discarded on arrival.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

/// What an armed timer should trigger when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Next tick of the pre-quiz countdown.
    CountdownTick {
        /// Seconds left after this tick.
        remaining: u32,
    },
    /// Answer deadline of the question at `index`.
    QuestionDeadline {
        /// Question the deadline was armed for.
        index: usize,
    },
    /// End of the post-question review pause.
    ReviewPause {
        /// Question to open next.
        next_index: usize,
    },
    /// Grace window after finalization ran out; tear the room down.
    Teardown,
}

/// A timer firing, tagged with the generation it was armed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFire {
    /// Generation at arm time; stale when it no longer matches the set.
    pub generation: u64,
    /// What to trigger.
    pub kind: TimerKind,
}

/// The set of pending timers owned by one room worker.
#[derive(Debug)]
pub struct TimerSet<T> {
    generation: u64,
    tx: mpsc::UnboundedSender<T>,
}

impl<T: From<TimerFire> + Send + 'static> TimerSet<T> {
    /// Create a timer set posting into the given command queue.
    pub fn new(tx: mpsc::UnboundedSender<T>) -> Self {
        Self { generation: 0, tx }
    }

    /// Arm a timer under the current generation.
    pub fn arm(&self, kind: TimerKind, after: Duration) {
        let generation = self.generation;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            sleep(after).await;
            // The room may already be gone; a closed queue is fine.
            let _ = tx.send(TimerFire { generation, kind }.into());
        });
    }

    /// Invalidate every pending timer. Their firings become stale no-ops.
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    /// Whether a firing belongs to the current generation.
    pub fn is_current(&self, fire: &TimerFire) -> bool {
        fire.generation == self.generation
    }
}
