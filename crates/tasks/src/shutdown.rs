use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::Notify;

/// Process-wide shutdown flag.  Cloning shares the underlying signal.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the flag and wakes any waiter.
    pub fn send(&self) {
        self.flag.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    pub fn is_sent(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) async fn wait(&self) {
        // bounded waits close the send-vs-register race without a busy loop
        while !self.is_sent() {
            let _ = tokio::time::timeout(Duration::from_millis(100), self.notify.notified()).await;
        }
    }
}

/// Handed to every critical task.  Tasks poll it at their loop heads; the
/// live-task counter it carries is what graceful shutdown waits on.
pub struct ShutdownGuard {
    signal: ShutdownSignal,
    live_tasks: Arc<AtomicUsize>,
}

impl ShutdownGuard {
    pub(crate) fn new(signal: ShutdownSignal, live_tasks: Arc<AtomicUsize>) -> Self {
        live_tasks.fetch_add(1, Ordering::SeqCst);
        Self { signal, live_tasks }
    }

    pub fn should_shutdown(&self) -> bool {
        self.signal.is_sent()
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.live_tasks.fetch_sub(1, Ordering::SeqCst);
    }
}
