use std::{
    any::Any,
    fmt::{Display, Formatter},
    panic,
    sync::{atomic::AtomicUsize, atomic::Ordering, Arc},
    thread,
    time::{Duration, Instant},
};

use tokio::{runtime::Handle, sync::mpsc};
use tracing::*;

use crate::shutdown::{ShutdownGuard, ShutdownSignal};

/// First panic observed in a critical task, with the payload downcast to a
/// string when possible.
#[derive(Debug, thiserror::Error)]
pub struct CriticalTaskError {
    task: String,
    message: Option<String>,
}

impl Display for CriticalTaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "critical task `{}` panicked: {message}", self.task),
            None => write!(f, "critical task `{}` panicked", self.task),
        }
    }
}

impl CriticalTaskError {
    fn from_payload(task: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast::<String>()
            .map(|s| *s)
            .or_else(|p| p.downcast::<&str>().map(|s| s.to_string()))
            .ok();
        Self {
            task: task.to_string(),
            message,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }
}

/// Spawns critical tasks and converts the first panic among them into an
/// error, then drives shutdown of the rest.
pub struct TaskSupervisor {
    tokio_handle: Handle,
    panic_tx: mpsc::UnboundedSender<CriticalTaskError>,
    panic_rx: mpsc::UnboundedReceiver<CriticalTaskError>,
    shutdown: ShutdownSignal,
    live_tasks: Arc<AtomicUsize>,
}

impl TaskSupervisor {
    pub fn new(tokio_handle: Handle) -> Self {
        let (panic_tx, panic_rx) = mpsc::unbounded_channel();
        Self {
            tokio_handle,
            panic_tx,
            panic_rx,
            shutdown: ShutdownSignal::new(),
            live_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            panic_tx: self.panic_tx.clone(),
            shutdown: self.shutdown.clone(),
            live_tasks: self.live_tasks.clone(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Sends shutdown when the process receives SIGINT.
    pub fn listen_for_signals(&self) {
        let shutdown = self.shutdown.clone();
        self.tokio_handle.spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            warn!("got INT, initiating shutdown");
            shutdown.send();
        });
    }

    /// Blocks until a critical task panics or shutdown is requested, then
    /// waits (bounded) for remaining tasks to wind down.  Returns the first
    /// panic if there was one.
    pub fn monitor(mut self, grace: Option<Duration>) -> Result<(), CriticalTaskError> {
        let shutdown = self.shutdown.clone();
        let res = self.tokio_handle.block_on(async {
            tokio::select! {
                err = self.panic_rx.recv() => match err {
                    Some(e) => Err(e),
                    None => Ok(()),
                },
                _ = shutdown.wait() => Ok(()),
            }
        });

        self.shutdown.send();
        if !self.wait_for_idle(grace) {
            info!("shutdown grace period expired, exiting anyway");
        }
        res
    }

    fn wait_for_idle(&self, grace: Option<Duration>) -> bool {
        let deadline = grace.map(|g| Instant::now() + g);
        while self.live_tasks.load(Ordering::SeqCst) > 0 {
            if deadline.is_some_and(|d| Instant::now() > d) {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }
}

/// Cloneable spawner handed to whoever wires up the pipeline.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    panic_tx: mpsc::UnboundedSender<CriticalTaskError>,
    shutdown: ShutdownSignal,
    live_tasks: Arc<AtomicUsize>,
}

impl TaskExecutor {
    /// Spawns `func` on a dedicated thread.  The closure should poll the
    /// guard at its loop head; a panic is reported to the supervisor.
    pub fn spawn_critical<F>(&self, name: &'static str, func: F) -> thread::JoinHandle<()>
    where
        F: FnOnce(ShutdownGuard) + Send + 'static,
    {
        let panic_tx = self.panic_tx.clone();
        let guard = ShutdownGuard::new(self.shutdown.clone(), self.live_tasks.clone());

        info!(%name, "starting critical task");
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if let Err(payload) = panic::catch_unwind(panic::AssertUnwindSafe(|| func(guard))) {
                    let err = CriticalTaskError::from_payload(name, payload);
                    error!(%name, %err, "critical task died");
                    let _ = panic_tx.send(err);
                }
            })
            .expect("tasks: spawn thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_is_reported() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let supervisor = TaskSupervisor::new(rt.handle().clone());
        let exec = supervisor.executor();

        let hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));

        exec.spawn_critical("boom", |_| panic!("intentional"));
        let err = supervisor
            .monitor(Some(Duration::from_secs(5)))
            .expect_err("panic should surface");

        panic::set_hook(hook);

        assert_eq!(err.task(), "boom");
    }

    #[test]
    fn shutdown_stops_tasks() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let supervisor = TaskSupervisor::new(rt.handle().clone());
        let exec = supervisor.executor();

        exec.spawn_critical("worker", |guard| {
            while !guard.should_shutdown() {
                thread::sleep(Duration::from_millis(10));
            }
        });

        let shutdown = supervisor.shutdown_signal();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            shutdown.send();
        });

        let res = supervisor.monitor(Some(Duration::from_secs(5)));
        assert!(res.is_ok());
    }
}
