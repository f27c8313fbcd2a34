//! Per-user message dispatch.
//!
//! Every user gets one worker task that handles their messages strictly in
//! order. Different users are handled concurrently. Command executions the
//! bot spawns are tracked by the worker so that closing the dispatcher waits
//! for them.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::bot::{ReplySink, ShellBot};

struct Worker {
    sender: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

pub struct Dispatcher {
    bot: Arc<ShellBot>,
    replies: ReplySink,
    workers: DashMap<String, Worker>,
}

impl Dispatcher {
    pub fn new(bot: Arc<ShellBot>, replies: ReplySink) -> Self {
        Self {
            bot,
            replies,
            workers: DashMap::new(),
        }
    }

    /// Queue a message for its user's worker, starting the worker if needed.
    pub fn dispatch(&self, user_id: &str, text: String) {
        let sender = self
            .workers
            .entry(user_id.to_string())
            .or_insert_with(|| self.spawn_worker(user_id))
            .sender
            .clone();

        if sender.send(text).is_err() {
            warn!(user_id, "Worker stopped, message dropped");
        }
    }

    /// Number of users with a running worker.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting messages and wait until every queued message and
    /// every spawned task has finished.
    pub async fn close(&self) {
        let user_ids: Vec<String> = self.workers.iter().map(|w| w.key().clone()).collect();
        let tasks: Vec<JoinHandle<()>> = user_ids
            .iter()
            .filter_map(|id| self.workers.remove(id))
            .map(|(_, worker)| {
                drop(worker.sender);
                worker.task
            })
            .collect();

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("Worker task failed: {}", e);
            }
        }
    }

    fn spawn_worker(&self, user_id: &str) -> Worker {
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
        let bot = self.bot.clone();
        let replies = self.replies.clone();
        let user_id = user_id.to_string();

        let task = tokio::spawn(async move {
            debug!(%user_id, "Worker started");
            let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

            while let Some(text) = receiver.recv().await {
                if let Some(spawned) = bot.handle(&user_id, &text, &replies).await {
                    in_flight.retain(|task| !task.is_finished());
                    in_flight.push(spawned);
                }
            }

            join_all(in_flight).await;
            debug!(%user_id, "Worker stopped");
        });

        Worker { sender, task }
    }
}
