use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct MonitorState {
    owner: Option<ThreadId>,
    count: u32,
}

/// A reentrant mutex with an associated wait queue, the locking
/// primitive behind `monitorenter`/`monitorexit`, synchronized methods
/// and the `wait`/`notify` bridges. Ownership is per OS thread.
pub struct Monitor {
    state: Mutex<MonitorState>,
    entry: Condvar,
    waiters: Condvar,
}

/// Raised when a thread exits, waits on or notifies a monitor it does
/// not own. Surfaced to bytecode as `java/lang/IllegalMonitorStateException`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotOwner;

impl Monitor {
    pub fn new() -> Monitor {
        Monitor {
            state: Mutex::new(MonitorState::default()),
            entry: Condvar::new(),
            waiters: Condvar::new(),
        }
    }

    /// Blocks until the monitor is free or already owned by the calling
    /// thread, then takes one level of ownership.
    pub fn enter(&self) {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        while state.owner.is_some() && state.owner != Some(me) {
            self.entry.wait(&mut state);
        }
        state.owner = Some(me);
        state.count += 1;
    }

    /// Releases one level of ownership; the monitor is free once the
    /// count reaches zero.
    pub fn exit(&self) -> Result<(), NotOwner> {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return Err(NotOwner);
        }
        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            self.entry.notify_one();
        }
        Ok(())
    }

    /// Releases the monitor entirely, blocks until notified or the
    /// timeout elapses, then reacquires the previous ownership depth
    /// before returning.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<(), NotOwner> {
        let me = std::thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return Err(NotOwner);
        }
        let depth = state.count;
        state.owner = None;
        state.count = 0;
        self.entry.notify_one();

        match timeout {
            Some(timeout) => {
                let _ = self.waiters.wait_for(&mut state, timeout);
            }
            None => self.waiters.wait(&mut state),
        }

        while state.owner.is_some() {
            self.entry.wait(&mut state);
        }
        state.owner = Some(me);
        state.count = depth;
        Ok(())
    }

    /// Wakes one waiter, in unspecified order.
    pub fn notify_one(&self) -> Result<(), NotOwner> {
        let state = self.state.lock();
        if state.owner != Some(std::thread::current().id()) {
            return Err(NotOwner);
        }
        self.waiters.notify_one();
        Ok(())
    }

    /// Wakes every waiter.
    pub fn notify_all(&self) -> Result<(), NotOwner> {
        let state = self.state.lock();
        if state.owner != Some(std::thread::current().id()) {
            return Err(NotOwner);
        }
        self.waiters.notify_all();
        Ok(())
    }

    /// Scoped ownership for synchronized method bodies.
    pub fn lock(&self) -> MonitorGuard<'_> {
        self.enter();
        MonitorGuard { monitor: self }
    }
}

impl Default for Monitor {
    fn default() -> Monitor {
        Monitor::new()
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Monitor")
    }
}

pub struct MonitorGuard<'m> {
    monitor: &'m Monitor,
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        // The guard was constructed by a successful enter, so the exit
        // cannot observe a foreign owner.
        let _ = self.monitor.exit();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reentrant_per_thread() {
        let monitor = Monitor::new();
        monitor.enter();
        monitor.enter();
        monitor.exit().unwrap();
        monitor.exit().unwrap();
        assert_eq!(monitor.exit(), Err(NotOwner));
    }

    #[test]
    fn exit_from_non_owner_fails() {
        let monitor = Arc::new(Monitor::new());
        monitor.enter();
        let other = Arc::clone(&monitor);
        std::thread::spawn(move || {
            assert_eq!(other.exit(), Err(NotOwner));
        })
        .join()
        .unwrap();
        monitor.exit().unwrap();
    }

    #[test]
    fn wait_times_out_without_notification() {
        let monitor = Monitor::new();
        monitor.enter();
        monitor
            .wait(Some(Duration::from_millis(10)))
            .expect("owner may wait");
        // Ownership is restored after the timeout.
        monitor.exit().unwrap();
    }

    #[test]
    fn notify_wakes_a_waiter() {
        let monitor = Arc::new(Monitor::new());
        let waiter = Arc::clone(&monitor);
        let handle = std::thread::spawn(move || {
            waiter.enter();
            waiter.wait(None).unwrap();
            waiter.exit().unwrap();
        });
        // Spin until the waiter has released the monitor inside wait().
        loop {
            monitor.enter();
            let woke = monitor.notify_one().is_ok();
            monitor.exit().unwrap();
            if woke && handle.is_finished() {
                break;
            }
            std::thread::yield_now();
        }
        handle.join().unwrap();
    }
}
