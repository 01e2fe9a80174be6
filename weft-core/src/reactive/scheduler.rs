//! Effect Scheduler
//!
//! When a trigger raises an effect from clean to dirty, the effect's
//! scheduler callback is not run inline. It is pushed onto a FIFO that
//! drains only when the schedule-pause depth returns to zero. This gives
//! batched mutations (a sequence `push`, a multi-key trigger fan-out) a
//! single well-defined drain point and keeps user schedulers from observing
//! half-applied mutations.
//!
//! The queue and depth counter are thread-local, matching the engine's
//! single-mutator model. An unbalanced [`reset_scheduling`] saturates at
//! zero instead of panicking.

use std::cell::RefCell;
use std::collections::VecDeque;

use super::effect::SchedulerFn;

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState {
        pause_depth: 0,
        queue: VecDeque::new(),
    });
}

struct SchedulerState {
    pause_depth: usize,
    queue: VecDeque<SchedulerFn>,
}

/// Defer scheduler callbacks until the matching [`reset_scheduling`].
pub fn pause_scheduling() {
    SCHEDULER.with(|s| s.borrow_mut().pause_depth += 1);
}

/// Decrement the pause depth and, once it reaches zero, drain pending
/// scheduler callbacks in enqueue order.
///
/// Jobs are popped one at a time with no borrow held while they run, so a
/// job may itself pause/reset scheduling or enqueue further jobs.
pub fn reset_scheduling() {
    SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        s.pause_depth = s.pause_depth.saturating_sub(1);
    });
    loop {
        let job = SCHEDULER.with(|s| {
            let mut s = s.borrow_mut();
            if s.pause_depth == 0 {
                s.queue.pop_front()
            } else {
                None
            }
        });
        match job {
            Some(job) => job(),
            None => break,
        }
    }
}

/// Enqueue a scheduler callback for the next drain.
pub(crate) fn queue_scheduler(job: SchedulerFn) {
    SCHEDULER.with(|s| s.borrow_mut().queue.push_back(job));
}

/// Guard that pauses scheduling for its lifetime and drains on drop.
pub(crate) struct PauseScheduling;

impl PauseScheduling {
    pub(crate) fn new() -> Self {
        pause_scheduling();
        PauseScheduling
    }
}

impl Drop for PauseScheduling {
    fn drop(&mut self) {
        reset_scheduling();
    }
}
