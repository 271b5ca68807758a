//! Transfer tasks for strata: uploads, downloads and deletes that run in the
//! background, publish their progress and can be cancelled.
//!
//! A [`Task`] is built from one of [`UploadSet`], [`DownloadSet`] or
//! [`DeleteSet`] and run either directly with [`Task::run`] or on a
//! [`TaskList`], which spawns it, tracks it by [`TaskId`] and reports a
//! [`Completion`] when it ends.

mod delete;
mod download;
pub mod error;
mod host;
mod status;
mod task;
mod upload;

pub use crate::delete::DeleteSet;
pub use crate::download::DownloadSet;
pub use crate::host::{Completion, TaskId, TaskList};
pub use crate::status::{TaskOutcome, TaskState, TaskStatus};
pub use crate::task::Task;
pub use crate::upload::{UploadItem, UploadSet};
