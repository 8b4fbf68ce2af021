use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use crate::task::TaskResult;

/// Shared queue plus wake signal carrying terminal task outcomes from
/// worker threads to the single monitor thread. The lock here guards only
/// the queue and is never held across registry work.
#[derive(Default)]
pub struct ResultChannel {
    queue: Mutex<VecDeque<TaskResult>>,
    cond: Condvar,
}

impl ResultChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: TaskResult) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(result);
            self.cond.notify_all();
        }
    }

    /// Block until at least one result is queued, then drain everything in
    /// FIFO order. Returns empty when `running` was cleared while waiting.
    pub fn wait_drain(&self, running: &AtomicBool) -> Vec<TaskResult> {
        let Ok(mut queue) = self.queue.lock() else {
            return Vec::new();
        };
        loop {
            if !queue.is_empty() {
                return queue.drain(..).collect();
            }
            if !running.load(Ordering::SeqCst) {
                return Vec::new();
            }
            queue = match self.cond.wait(queue) {
                Ok(guard) => guard,
                Err(_) => return Vec::new(),
            };
        }
    }

    /// Wake the waiting monitor without queueing anything (shutdown path).
    /// The lock is taken so a waiter between its empty-check and its wait
    /// cannot miss the notification.
    pub fn wake(&self) {
        let _queue = self.queue.lock();
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn result(context: &str, status: TaskStatus) -> TaskResult {
        TaskResult {
            context: context.to_string(),
            status,
            log: None,
            button_msg: None,
            is_update: false,
        }
    }

    #[test]
    fn drain_preserves_push_order() {
        let channel = ResultChannel::new();
        let running = AtomicBool::new(true);
        channel.push(result("a", TaskStatus::Success));
        channel.push(result("b", TaskStatus::Failed));
        channel.push(result("a", TaskStatus::Failed));

        let drained = channel.wait_drain(&running);
        let contexts: Vec<&str> = drained.iter().map(|r| r.context.as_str()).collect();
        assert_eq!(contexts, vec!["a", "b", "a"]);
    }

    #[test]
    fn wake_releases_waiter_on_shutdown() {
        let channel = Arc::new(ResultChannel::new());
        let running = Arc::new(AtomicBool::new(true));

        let channel_clone = Arc::clone(&channel);
        let running_clone = Arc::clone(&running);
        let waiter = thread::spawn(move || channel_clone.wait_drain(&running_clone));

        thread::sleep(Duration::from_millis(50));
        running.store(false, Ordering::SeqCst);
        channel.wake();

        let drained = waiter.join().expect("waiter finished");
        assert!(drained.is_empty());
    }

    #[test]
    fn push_wakes_waiter() {
        let channel = Arc::new(ResultChannel::new());
        let running = Arc::new(AtomicBool::new(true));

        let channel_clone = Arc::clone(&channel);
        let running_clone = Arc::clone(&running);
        let waiter = thread::spawn(move || channel_clone.wait_drain(&running_clone));

        thread::sleep(Duration::from_millis(50));
        channel.push(result("c", TaskStatus::Updated));

        let drained = waiter.join().expect("waiter finished");
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].context, "c");
    }
}
