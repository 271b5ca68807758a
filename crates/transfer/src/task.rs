//! A unit of transfer work and how it turns into a terminal outcome.

use crate::delete::DeleteSet;
use crate::download::DownloadSet;
use crate::error::ErrorKind;
use crate::status::{Reporter, TaskOutcome, TaskStatus};
use crate::upload::UploadSet;
use derive_more::{Display, From};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// One transfer task. Items run sequentially; the first failure aborts the
/// rest.
#[derive(Debug, From)]
pub enum Task {
    Upload(UploadSet),
    Download(DownloadSet),
    Delete(DeleteSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
enum Action {
    #[display("Uploaded")]
    Upload,
    #[display("Downloaded")]
    Download,
    #[display("Deleted")]
    Delete,
}

impl Task {
    /// Status to publish before the task starts running.
    pub fn initial_status(&self) -> TaskStatus {
        match self {
            Self::Upload(set) => TaskStatus::starting(set.text(), set.len()),
            Self::Download(set) => TaskStatus::starting(set.text(), set.len()),
            Self::Delete(set) => TaskStatus::starting(set.text(), set.len()),
        }
    }

    fn total_bytes(&self) -> u64 {
        match self {
            Self::Upload(set) => set.total_bytes(),
            Self::Download(set) => set.known_bytes(),
            Self::Delete(_) => 0,
        }
    }

    fn action(&self) -> Action {
        match self {
            Self::Upload(_) => Action::Upload,
            Self::Download(_) => Action::Download,
            Self::Delete(_) => Action::Delete,
        }
    }

    /// Run the task to completion, publishing status snapshots on `status`.
    ///
    /// Never fails: errors and cancellation become the returned
    /// [`TaskOutcome`], which is also reflected in the final snapshot.
    pub async fn run(self, status: watch::Sender<TaskStatus>, cancel: CancellationToken) -> TaskOutcome {
        let reporter = Reporter::new(status, self.total_bytes());
        let action = self.action();
        let result = match self {
            Self::Upload(set) => set.run(&reporter, &cancel).await,
            Self::Download(set) => set.run(&reporter, &cancel).await,
            Self::Delete(set) => set.run(&reporter, &cancel).await,
        };

        let (completed, total) = (reporter.completed(), reporter.total());
        let outcome = match result {
            Ok(()) => {
                tracing::info!(%action, total, "task succeeded");
                TaskOutcome::Succeeded { total }
            },
            // Backends surface cancellation in their own ways; a stop that
            // was asked for is never a failure.
            Err(err) if cancel.is_cancelled() || matches!(&*err, ErrorKind::Cancelled) => {
                tracing::info!(%action, completed, total, "task cancelled");
                TaskOutcome::Cancelled { completed, total }
            },
            Err(err) => {
                let message = (*err).to_string();
                tracing::info!(%action, completed, total, error = %message, "task failed");
                TaskOutcome::Failed { message, completed, total }
            },
        };
        reporter.finish(&outcome, summary(action, &outcome));
        outcome
    }
}

fn summary(action: Action, outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Succeeded { total } => format!("{action} {total} files"),
        TaskOutcome::Failed { message, completed, total } => {
            format!("Failed after {completed} of {total} files: {message}")
        },
        TaskOutcome::Cancelled { completed, total } => format!("Cancelled after {completed} of {total} files"),
    }
}
