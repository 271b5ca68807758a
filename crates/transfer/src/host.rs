//! Task host: runs tasks in the background and reports when they end.

use crate::status::{TaskOutcome, TaskStatus};
use crate::task::Task;
use derive_more::Display;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a task for as long as the host tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("#{_0}")]
pub struct TaskId(u64);

/// Delivered once per task, when it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: TaskId,
    pub outcome: TaskOutcome,
}

struct Running {
    status: watch::Receiver<TaskStatus>,
    cancel: CancellationToken,
    _join: JoinHandle<()>,
}

/// Collection of running tasks.
///
/// Each task runs on its own tokio task with its own cancellation token (a
/// child of the host's) and status channel. When a task ends the host
/// delivers a [`Completion`] through [`next_completion`](Self::next_completion)
/// and stops tracking it. Dropping the host cancels everything still running.
pub struct TaskList {
    running: HashMap<TaskId, Running>,
    cancel: CancellationToken,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl TaskList {
    pub fn new() -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self { running: HashMap::new(), cancel: CancellationToken::new(), completions_tx, completions_rx }
    }

    /// Spawn `task` onto the current tokio runtime.
    pub fn start(&mut self, task: impl Into<Task>) -> TaskId {
        let task = task.into();
        let id = TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed));
        let cancel = self.cancel.child_token();
        let (status_tx, status_rx) = watch::channel(task.initial_status());
        let completions = self.completions_tx.clone();
        tracing::debug!(%id, text = %status_rx.borrow().text, "starting task");

        let token = cancel.clone();
        let last_status = status_rx.clone();
        let join = tokio::spawn(async move {
            let outcome = match tokio::spawn(task.run(status_tx, token)).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(%id, error = %err, "task aborted");
                    let status = last_status.borrow();
                    TaskOutcome::Failed {
                        message: format!("task aborted: {err}"),
                        completed: status.completed,
                        total: status.total,
                    }
                },
            };
            if completions.send(Completion { id, outcome }).is_err() {
                tracing::debug!(%id, "task host dropped before completion");
            }
        });
        self.running.insert(id, Running { status: status_rx, cancel, _join: join });
        id
    }

    /// Latest status of a tracked task.
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.running.get(&id).map(|running| running.status.borrow().clone())
    }

    /// Receiver for every status change of a tracked task.
    pub fn subscribe(&self, id: TaskId) -> Option<watch::Receiver<TaskStatus>> {
        self.running.get(&id).map(|running| running.status.clone())
    }

    /// Ask a task to stop. Returns `false` if the host no longer tracks it.
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.running.get(&id) {
            Some(running) => {
                tracing::debug!(%id, "cancelling task");
                running.cancel.cancel();
                true
            },
            None => false,
        }
    }

    /// Token that cancels a tracked task, for callers that need to cancel it
    /// while waiting on the host.
    pub fn cancel_token(&self, id: TaskId) -> Option<CancellationToken> {
        self.running.get(&id).map(|running| running.cancel.clone())
    }

    /// Ask every task to stop.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Ids of tracked tasks in start order.
    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.running.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Wait for the next task to end and stop tracking it.
    ///
    /// A task that panics ends as [`TaskOutcome::Failed`]. Returns `None` when nothing is running and no completion is pending.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        let completion = match self.completions_rx.try_recv() {
            Ok(completion) => completion,
            Err(_) if self.running.is_empty() => return None,
            Err(_) => self.completions_rx.recv().await?,
        };
        self.running.remove(&completion.id);
        Some(completion)
    }
}
impl Default for TaskList {
    fn default() -> Self {
        Self::new()
    }
}
impl Drop for TaskList {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delete::DeleteSet;
    use crate::download::DownloadSet;
    use crate::status::TaskState;
    use crate::upload::{UploadItem, UploadSet};
    use std::sync::Arc;
    use strata_storage::backend::MockBucket;
    use strata_storage::{Entry, EntryMeta};

    fn upload(mock: &Arc<MockBucket>, name: &str) -> UploadSet {
        UploadSet::new(mock.clone(), "", vec![UploadItem::from_bytes(name, b"data".to_vec())])
    }

    #[tokio::test]
    async fn test_completions_are_delivered() {
        let mock = Arc::new(MockBucket::default());
        let mut tasks = TaskList::new();
        let first = tasks.start(upload(&mock, "a.txt"));
        let second = tasks.start(DeleteSet::new(mock.clone(), ["missing.txt"]));
        assert_ne!(first, second);
        assert_eq!(tasks.ids(), [first, second]);
        assert_eq!(tasks.status(first).unwrap().state, TaskState::Running);

        let mut ended = Vec::new();
        while let Some(completion) = tasks.next_completion().await {
            assert!(completion.outcome.is_success());
            ended.push(completion.id);
        }
        ended.sort();
        assert_eq!(ended, [first, second]);
        assert!(tasks.is_empty());
        assert!(tasks.status(first).is_none());
    }

    #[tokio::test]
    async fn test_cancel_by_id() {
        let mock = Arc::new(MockBucket::default());
        let mut tasks = TaskList::new();
        let cancelled = tasks.start(upload(&mock, "a.txt"));
        let kept = tasks.start(upload(&mock, "b.txt"));
        // Nothing has run yet on the current-thread runtime.
        assert!(tasks.cancel(cancelled));

        let mut outcomes = HashMap::new();
        while let Some(completion) = tasks.next_completion().await {
            outcomes.insert(completion.id, completion.outcome);
        }
        assert_eq!(outcomes[&cancelled], TaskOutcome::Cancelled { completed: 0, total: 1 });
        assert!(outcomes[&kept].is_success());
        assert_eq!(mock.uploads(), ["b.txt"]);
        assert!(!tasks.cancel(cancelled));
    }

    #[tokio::test]
    async fn test_cancel_through_token() {
        let mock = Arc::new(MockBucket::default());
        let mut tasks = TaskList::new();
        let id = tasks.start(upload(&mock, "a.txt"));
        tasks.cancel_token(id).unwrap().cancel();
        let completion = tasks.next_completion().await.unwrap();
        assert_eq!(completion.outcome.state(), TaskState::Cancelled);
        assert!(tasks.cancel_token(id).is_none());
    }

    #[tokio::test]
    async fn test_final_status_is_observable() {
        let mock = Arc::new(MockBucket::default());
        let mut tasks = TaskList::new();
        let id = tasks.start(upload(&mock, "a.txt"));
        let mut status = tasks.subscribe(id).unwrap();
        let completion = tasks.next_completion().await.unwrap();
        assert_eq!(completion.id, id);
        let status = status.borrow_and_update();
        assert_eq!(status.state, TaskState::Succeeded);
        assert_eq!(status.progress, 1.0);
    }

    #[tokio::test]
    async fn test_idle_host_has_no_completion() {
        let mut tasks = TaskList::new();
        assert!(tasks.next_completion().await.is_none());
    }

    #[tokio::test]
    async fn test_panicking_task_still_completes() {
        let mock = Arc::new(MockBucket::with_files([("d/1.txt", b"1".to_vec()), ("d/2.txt", b"2".to_vec())]));
        mock.on_download("d/2.txt", || panic!("backend bug"));
        let dir = tempfile::tempdir().unwrap();
        let selection = vec![Entry::new(mock.clone(), EntryMeta::directory("d/"))];

        let mut tasks = TaskList::new();
        let id = tasks.start(DownloadSet::new(selection, dir.path()));
        let completion = tasks.next_completion().await.unwrap();
        assert_eq!(completion.id, id);
        let TaskOutcome::Failed { message, completed, total } = completion.outcome else {
            panic!("expected failure, got {:?}", completion.outcome);
        };
        assert!(message.starts_with("task aborted"));
        assert_eq!((completed, total), (1, 2));
        assert!(tasks.is_empty());
    }
}
