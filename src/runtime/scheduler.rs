//! Frame-tick batching.
//!
//! Stands in for the browser's animation-frame boundary: notifications queue
//! tasks here, and a `tick()` models one frame. Tasks scheduled while a tick
//! runs land in the next tick, never the current one.

use std::cell::RefCell;

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct FrameScheduler {
    queue: RefCell<Vec<Task>>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        FrameScheduler::default()
    }

    pub fn schedule(&self, task: Task) {
        self.queue.borrow_mut().push(task);
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run every task queued before this call; returns how many ran.
    pub fn tick(&self) -> usize {
        let batch: Vec<Task> = self.queue.borrow_mut().drain(..).collect();
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_tick_runs_queued_tasks_in_order() {
        let scheduler = FrameScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            scheduler.schedule(Box::new(move || log.borrow_mut().push(i)));
        }
        assert_eq!(scheduler.tick(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_task_scheduled_during_tick_waits_for_next_tick() {
        let scheduler = Rc::new(FrameScheduler::new());
        let ran = Rc::new(Cell::new(false));
        {
            let scheduler2 = scheduler.clone();
            let ran2 = ran.clone();
            scheduler.schedule(Box::new(move || {
                scheduler2.schedule(Box::new(move || ran2.set(true)));
            }));
        }
        assert_eq!(scheduler.tick(), 1);
        assert!(!ran.get());
        assert_eq!(scheduler.tick(), 1);
        assert!(ran.get());
    }
}
