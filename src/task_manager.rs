//! Tracks the long-running tasks of the bridge and awaits them on shutdown.
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Owns the `JoinHandle`s of named background tasks.
///
/// Delivery tasks spawned by the relay are deliberately not tracked; they are
/// fire-and-forget and may be dropped when the process exits.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskManager {
    pub fn new(shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_rx,
        }
    }

    /// Spawns a task and records its handle under `name`.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!(task_name = name, "Spawning task");
        let handle = tokio::spawn(future);
        match self.handles.lock() {
            Ok(mut handles) => handles.push((name, handle)),
            Err(_) => warn!(task_name = name, "Task registry poisoned, task will not be awaited on shutdown."),
        }
    }

    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Waits up to `grace` for all tasks; the ones still running are aborted.
    pub async fn shutdown(self, grace: Duration) {
        let handles: Vec<_> = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        info!("Waiting for {} tasks to complete...", handles.len());

        let names: Vec<&'static str> = handles.iter().map(|(name, _)| *name).collect();
        let aborts: Vec<_> = handles.iter().map(|(_, h)| h.abort_handle()).collect();

        let joined = tokio::time::timeout(grace, join_all(handles.into_iter().map(|(_, h)| h))).await;
        match joined {
            Ok(results) => {
                for (name, result) in names.iter().zip(results) {
                    match result {
                        Ok(()) => debug!(task_name = name, "Task shut down gracefully."),
                        Err(e) => error!(task_name = name, error = %e, "Task panicked during shutdown."),
                    }
                }
                info!("All tasks shut down gracefully.");
            }
            Err(_) => {
                warn!(tasks = ?names, "Tasks did not finish within {:?}, aborting.", grace);
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}
