//! Worker exit reasons, failure reports and shutdown summaries.

use std::sync::atomic::{AtomicU64, Ordering};

/// One task that panicked on the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
	id: u64,
	message: String,
}

impl TaskFailure {
	pub(crate) fn new(id: u64, message: String) -> Self {
		Self { id, message }
	}

	/// Diagnostic id assigned when the task was accepted.
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Rendered panic payload.
	pub fn message(&self) -> &str {
		&self.message
	}
}

/// Why the worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WorkerExit {
	/// `finish` closed the queue and every accepted task ran.
	Drained,
	/// `cancel` stopped the worker; queued tasks were abandoned.
	Cancelled,
	/// A task failed under [`FailurePolicy::StopWorker`](crate::FailurePolicy::StopWorker).
	TaskFailed(TaskFailure),
}

impl WorkerExit {
	pub fn is_failure(&self) -> bool {
		matches!(self, Self::TaskFailed(_))
	}
}

/// Counter snapshot for one queue. Advisory, not synchronized with
/// concurrent submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
	/// Tasks accepted into the buffer.
	pub submitted: u64,
	/// Tasks that ran to completion.
	pub executed: u64,
	/// Tasks that panicked.
	pub failed: u64,
	/// Submissions refused because the queue was finishing or terminated.
	pub rejected: u64,
	/// Accepted tasks dropped unrun by cancellation or worker failure.
	pub discarded: u64,
	/// Tasks currently waiting in the buffer.
	pub pending: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
	pub(crate) submitted: AtomicU64,
	pub(crate) executed: AtomicU64,
	pub(crate) failed: AtomicU64,
	pub(crate) rejected: AtomicU64,
	pub(crate) discarded: AtomicU64,
}

impl Counters {
	pub(crate) fn bump(counter: &AtomicU64) {
		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn add(counter: &AtomicU64, n: usize) {
		counter.fetch_add(n as u64, Ordering::Relaxed);
	}

	pub(crate) fn snapshot(&self, pending: usize) -> QueueStats {
		QueueStats {
			submitted: self.submitted.load(Ordering::Relaxed),
			executed: self.executed.load(Ordering::Relaxed),
			failed: self.failed.load(Ordering::Relaxed),
			rejected: self.rejected.load(Ordering::Relaxed),
			discarded: self.discarded.load(Ordering::Relaxed),
			pending,
		}
	}
}

/// Result of [`TaskQueue::finish`](crate::TaskQueue::finish).
#[derive(Debug, Clone)]
pub struct ShutdownReport {
	pub(crate) exit: Option<WorkerExit>,
	pub(crate) timed_out: bool,
	pub(crate) stats: QueueStats,
}

impl ShutdownReport {
	/// True when the worker has exited.
	pub fn completed(&self) -> bool {
		self.exit.is_some()
	}

	/// True when a bounded shutdown fell back to cancellation.
	pub fn timed_out(&self) -> bool {
		self.timed_out
	}

	pub fn exit(&self) -> Option<&WorkerExit> {
		self.exit.as_ref()
	}

	pub fn stats(&self) -> QueueStats {
		self.stats
	}
}
