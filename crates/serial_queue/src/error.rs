//! Error types returned by [`TaskQueue`](crate::TaskQueue).

use thiserror::Error;

/// Why a task was not accepted. The task is dropped without running.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
	/// `finish` has begun; only already queued tasks will run.
	#[error("task queue is finishing and no longer accepts tasks")]
	Finishing,
	/// The queue was cancelled or its worker has stopped.
	#[error("task queue is terminated")]
	Terminated,
	/// The buffer is at capacity and a non-blocking submit was used.
	#[error("task queue is full")]
	Full,
}

/// Misuse of [`TaskQueue::start`](crate::TaskQueue::start).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
	/// The worker is already running; no second worker is spawned.
	#[error("task queue worker already started")]
	AlreadyStarted,
	/// The queue is terminated and can not be restarted.
	#[error("task queue is terminated")]
	Terminated,
}
