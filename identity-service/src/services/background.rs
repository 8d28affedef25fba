//! Fire-and-forget side effects (email, asset cleanup).
//!
//! Tasks run on one worker draining a bounded channel. They are detached from the request
//! that submitted them, and their failures are only logged.

use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Task = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

struct Job {
    name: &'static str,
    task: Task,
}

#[derive(Clone)]
pub struct BackgroundQueue {
    sender: mpsc::Sender<Job>,
}

impl BackgroundQueue {
    /// Start the worker. It exits once every queue handle has been dropped and the
    /// remaining jobs are drained.
    pub fn start(capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Job>(capacity);
        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                if let Err(e) = job.task.await {
                    tracing::warn!(task = job.name, error = %e, "Background task failed");
                }
            }
            tracing::debug!("Background queue drained");
        });
        (Self { sender }, worker)
    }

    /// Queue a task without waiting. A full queue drops it.
    pub fn submit<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let job = Job {
            name,
            task: Box::pin(task),
        };
        match self.sender.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                metrics::counter!("background_tasks_dropped_total").increment(1);
                tracing::warn!(task = job.name, "Background queue full, dropping task");
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::error!(task = job.name, "Background queue closed, dropping task");
            }
        }
    }
}
