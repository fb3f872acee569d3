//! Bounded task queue drained by a single dedicated worker.
//!
//! [`TaskQueue`] accepts closures from any number of producers and runs them
//! strictly one after another, in acceptance order. The buffer is bounded:
//! producers wait for room when it is full. Shutdown is either abrupt
//! ([`TaskQueue::cancel`]) or a drain to completion ([`TaskQueue::finish`]).
//!
//! ```no_run
//! # async fn demo() -> Result<(), serial_queue::SubmitError> {
//! use serial_queue::{TaskQueue, TaskQueueConfig};
//!
//! let queue = TaskQueue::new(TaskQueueConfig::new("flush").capacity(16));
//! queue.start().expect("fresh queue");
//! queue.submit(|| println!("first")).await?;
//! queue.submit(|| println!("second")).await?;
//! let report = queue.finish().await;
//! assert_eq!(report.stats().executed, 2);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod exit;
mod mailbox;
mod queue;
mod spawn;

use tokio::task::JoinError;

pub use config::{DEFAULT_CAPACITY, FailurePolicy, TaskQueueConfig};
pub use error::{StartError, SubmitError};
pub use exit::{QueueStats, ShutdownReport, TaskFailure, WorkerExit};
pub use queue::{QueueState, TaskQueue};

/// Receiver for [`TaskFailure`] reports, see [`TaskQueue::subscribe_failures`].
pub type FailureReceiver = tokio::sync::broadcast::Receiver<TaskFailure>;

/// Renders the panic payload of a failed task. `None` if it did not panic.
pub(crate) fn join_error_panic_message(err: JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	let payload = err.into_panic();
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return Some(msg.clone());
	}
	Some("task panicked with a non-string payload".to_string())
}
