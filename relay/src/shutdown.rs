//! Stopping the relay's background tasks.
//!
//! The daemon runs two loops next to the request path: the reconciler
//! ([`crate::Reconciler::run`]) and the optional metrics file writer. Both
//! are started through [`ShutdownController::spawn`], which hands each one a
//! broadcast receiver. On SIGINT/SIGTERM the controller broadcasts once and
//! [`ShutdownController::drain`] joins every task, so a reconciler pass that
//! is mid-way through its ticket queue finishes before the process exits.

use std::future::Future;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            tasks: Vec::new(),
        }
    }

    /// A receiver for loops that are not started through [`Self::spawn`].
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Start a background loop. `task` gets a receiver that fires on
    /// shutdown and must return once it does.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.tx.subscribe()));
        tracing::debug!(task = name, "background task started");
        self.tasks.push((name, handle));
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for SIGTERM or SIGINT, then broadcast shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("received SIGINT, stopping relay"); }
            _ = terminate => { tracing::info!("received SIGTERM, stopping relay"); }
        }

        self.shutdown();
    }

    /// Broadcast shutdown (if not done already) and join every spawned task.
    /// Returns the names of tasks that panicked.
    pub async fn drain(self) -> Vec<&'static str> {
        self.shutdown();
        let mut failed = Vec::new();
        for (name, handle) in self.tasks {
            match handle.await {
                Ok(()) => tracing::debug!(task = name, "background task stopped"),
                Err(e) => {
                    tracing::error!(task = name, error = %e, "background task did not stop cleanly");
                    failed.push(name);
                }
            }
        }
        failed
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
