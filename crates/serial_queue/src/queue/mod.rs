use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{FailurePolicy, TaskQueueConfig};
use crate::error::{StartError, SubmitError};
use crate::exit::{Counters, QueueStats, ShutdownReport, TaskFailure, WorkerExit};
use crate::mailbox::{self, MailboxReceiver, MailboxSendError, MailboxSender};
use crate::{FailureReceiver, spawn};

mod join_ctrl;

use join_ctrl::WorkerJoinCtrl;

/// One unit of work. Runs once, on the worker, for its side effects.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueuedTask {
	id: u64,
	task: Task,
}

/// Lifecycle state of a [`TaskQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
	/// Accepting tasks, worker not started.
	Created,
	/// Worker is consuming tasks.
	Running,
	/// `finish` began: no new tasks, queued ones still run.
	Finishing,
	/// Worker stopped or will stop before its next dequeue. Absorbing.
	Terminated,
}

impl QueueState {
	const fn as_u8(self) -> u8 {
		match self {
			Self::Created => 0,
			Self::Running => 1,
			Self::Finishing => 2,
			Self::Terminated => 3,
		}
	}

	const fn from_u8(raw: u8) -> Self {
		match raw {
			0 => Self::Created,
			1 => Self::Running,
			2 => Self::Finishing,
			_ => Self::Terminated,
		}
	}
}

struct QueueShared {
	name: String,
	state: AtomicU8,
	cancel: CancellationToken,
	counters: Counters,
	failures: broadcast::Sender<TaskFailure>,
	last_exit: Mutex<Option<WorkerExit>>,
}

impl QueueShared {
	fn state(&self) -> QueueState {
		QueueState::from_u8(self.state.load(Ordering::Acquire))
	}

	fn transition(&self, from: QueueState, to: QueueState) -> bool {
		self.state
			.compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}

	/// Moves to `Terminated`, returning the previous state.
	fn terminate(&self) -> QueueState {
		QueueState::from_u8(self.state.swap(QueueState::Terminated.as_u8(), Ordering::AcqRel))
	}

	fn record_exit(&self, exit: WorkerExit) {
		let mut last = self.last_exit.lock();
		if last.is_none() {
			*last = Some(exit);
		}
	}
}

/// Bounded FIFO task queue drained by one dedicated worker.
///
/// Producers [`submit`](Self::submit) closures from any number of tasks; the
/// worker runs them one at a time in acceptance order once
/// [`start`](Self::start)ed. A full buffer suspends producers until the
/// worker makes room.
///
/// Shutdown is either [`cancel`](Self::cancel) (stop before the next dequeue,
/// abandon the rest) or [`finish`](Self::finish) (stop accepting, run
/// everything already accepted, then stop). Dropping the queue cancels it.
pub struct TaskQueue {
	shared: Arc<QueueShared>,
	tx: MailboxSender<QueuedTask>,
	rx: Mutex<Option<MailboxReceiver<QueuedTask>>>,
	policy: FailurePolicy,
	next_id: AtomicU64,
	join_ctrl: WorkerJoinCtrl,
}

impl Default for TaskQueue {
	fn default() -> Self {
		Self::new(TaskQueueConfig::default())
	}
}

impl Drop for TaskQueue {
	fn drop(&mut self) {
		self.cancel();
	}
}

impl TaskQueue {
	/// Creates a queue. The worker is not started.
	pub fn new(config: TaskQueueConfig) -> Self {
		let (tx, rx) = mailbox::bounded(config.capacity);
		let (failures, _) = broadcast::channel(config.failure_buffer);
		Self {
			shared: Arc::new(QueueShared {
				name: config.name,
				state: AtomicU8::new(QueueState::Created.as_u8()),
				cancel: CancellationToken::new(),
				counters: Counters::default(),
				failures,
				last_exit: Mutex::new(None),
			}),
			tx,
			rx: Mutex::new(Some(rx)),
			policy: config.failure_policy,
			next_id: AtomicU64::new(0),
			join_ctrl: WorkerJoinCtrl::new(),
		}
	}

	/// Creates a default-configured queue with the given capacity.
	///
	/// # Panics
	///
	/// Panics if `capacity` is zero.
	pub fn with_capacity(capacity: usize) -> Self {
		Self::new(TaskQueueConfig::default().capacity(capacity))
	}

	/// Queue name, as configured.
	pub fn name(&self) -> &str {
		&self.shared.name
	}

	/// Buffer capacity, fixed at construction.
	pub fn capacity(&self) -> usize {
		self.tx.capacity()
	}

	/// Current lifecycle state.
	pub fn state(&self) -> QueueState {
		self.shared.state()
	}

	/// Number of queued tasks not yet picked up by the worker. Advisory.
	pub fn size(&self) -> usize {
		self.tx.len()
	}

	/// Counter snapshot. Advisory, like [`size`](Self::size).
	pub fn stats(&self) -> QueueStats {
		self.shared.counters.snapshot(self.tx.len())
	}

	/// Exit reason once the worker has stopped.
	pub fn last_exit(&self) -> Option<WorkerExit> {
		self.shared.last_exit.lock().clone()
	}

	/// Subscribes to reports of tasks that panic on the worker.
	pub fn subscribe_failures(&self) -> FailureReceiver {
		self.shared.failures.subscribe()
	}

	/// Spawns the worker. Tasks submitted before this call wait in the buffer.
	///
	/// A queue has at most one worker: a second call returns
	/// [`StartError::AlreadyStarted`].
	pub fn start(&self) -> Result<(), StartError> {
		let result = self.start_worker();
		if result == Err(StartError::AlreadyStarted) {
			tracing::warn!(queue = %self.shared.name, "task queue already started");
		}
		result
	}

	fn start_worker(&self) -> Result<(), StartError> {
		self.join_ctrl.spawn_with(|exited| {
			if !self.shared.transition(QueueState::Created, QueueState::Running) {
				return Err(match self.shared.state() {
					QueueState::Terminated => StartError::Terminated,
					_ => StartError::AlreadyStarted,
				});
			}
			// Only `cancel` takes the receiver from a started queue.
			let rx = self.rx.lock().take().ok_or(StartError::Terminated)?;
			tracing::debug!(queue = %self.shared.name, pending = self.tx.len(), "serial_queue.start");
			let worker = run_worker(rx, Arc::clone(&self.shared), self.policy);
			Ok(spawn::spawn_worker(&self.shared.name, async move {
				let _exited = exited;
				worker.await;
			}))
		})
	}

	/// Appends `task`, waiting while the buffer is full.
	///
	/// Returns [`SubmitError::Finishing`] or [`SubmitError::Terminated`]
	/// without queuing once shutdown has begun, including when shutdown
	/// happens while this call waits for space. Dropping the future while it
	/// waits abandons the submission and drops `task`.
	pub async fn submit<F>(&self, task: F) -> Result<(), SubmitError>
	where
		F: FnOnce() + Send + 'static,
	{
		self.ensure_open()?;
		let queued = self.wrap(task);
		let id = queued.id;
		match self.tx.send(queued).await {
			Ok(()) => {
				self.accepted(id);
				Ok(())
			}
			Err(_) => Err(self.reject()),
		}
	}

	/// Appends `task` without waiting. A full buffer yields [`SubmitError::Full`].
	pub fn try_submit<F>(&self, task: F) -> Result<(), SubmitError>
	where
		F: FnOnce() + Send + 'static,
	{
		self.ensure_open()?;
		let queued = self.wrap(task);
		let id = queued.id;
		match self.tx.try_send(queued) {
			Ok(()) => {
				self.accepted(id);
				Ok(())
			}
			Err(MailboxSendError::Full) => Err(SubmitError::Full),
			Err(MailboxSendError::Closed) => Err(self.reject()),
		}
	}

	fn ensure_open(&self) -> Result<(), SubmitError> {
		match self.shared.state() {
			QueueState::Finishing | QueueState::Terminated => Err(self.reject()),
			QueueState::Created | QueueState::Running => Ok(()),
		}
	}

	fn wrap<F>(&self, task: F) -> QueuedTask
	where
		F: FnOnce() + Send + 'static,
	{
		QueuedTask {
			id: self.next_id.fetch_add(1, Ordering::Relaxed),
			task: Box::new(task),
		}
	}

	fn accepted(&self, id: u64) {
		Counters::bump(&self.shared.counters.submitted);
		tracing::trace!(queue = %self.shared.name, task = id, "serial_queue.submit");
	}

	fn reject(&self) -> SubmitError {
		// The buffer only closes after the state has left Created/Running.
		let err = match self.shared.state() {
			QueueState::Finishing => SubmitError::Finishing,
			_ => SubmitError::Terminated,
		};
		Counters::bump(&self.shared.counters.rejected);
		tracing::debug!(queue = %self.shared.name, reason = %err, "serial_queue.submit.rejected");
		err
	}

	/// Stops the worker before its next dequeue and abandons queued tasks.
	///
	/// A task already executing runs to completion. Producers waiting for
	/// space are released with [`SubmitError::Terminated`]. Calling this on a
	/// terminated queue does nothing.
	pub fn cancel(&self) {
		let prev = self.shared.terminate();
		if prev == QueueState::Terminated {
			return;
		}
		tracing::debug!(queue = %self.shared.name, from = ?prev, pending = self.tx.len(), "serial_queue.cancel");
		self.shared.cancel.cancel();
		self.tx.close();

		// Never started: nobody else will drain the buffer.
		if let Some(rx) = self.join_ctrl.locked(|| self.rx.lock().take()) {
			Counters::add(&self.shared.counters.discarded, rx.discard_all());
			self.shared.record_exit(WorkerExit::Cancelled);
		}
	}

	/// Stops accepting tasks, waits until every accepted task has run, then
	/// stops the worker.
	///
	/// Starts the worker first if it was never started. Safe to call again
	/// or after [`cancel`](Self::cancel); it then only waits for the worker
	/// to exit.
	pub async fn finish(&self) -> ShutdownReport {
		self.begin_finish();
		self.join_ctrl.join_forever().await;
		self.report(false)
	}

	/// Like [`finish`](Self::finish), but cancels if the worker has not
	/// exited within `timeout`.
	///
	/// On timeout the report has `timed_out` set and the call returns without
	/// waiting for the task in flight; the worker exits once it returns.
	pub async fn finish_timeout(&self, timeout: Duration) -> ShutdownReport {
		self.begin_finish();
		if self.join_ctrl.join_with_timeout(timeout).await {
			return self.report(false);
		}
		tracing::warn!(queue = %self.shared.name, ?timeout, "graceful finish timed out; cancelling");
		self.cancel();
		self.report(true)
	}

	fn begin_finish(&self) {
		if self.shared.state() == QueueState::Created {
			let _ = self.start_worker();
		}
		if self.shared.transition(QueueState::Running, QueueState::Finishing) {
			tracing::debug!(queue = %self.shared.name, pending = self.tx.len(), "serial_queue.finish");
			self.tx.close();
		}
	}

	fn report(&self, timed_out: bool) -> ShutdownReport {
		ShutdownReport {
			exit: self.last_exit(),
			timed_out,
			stats: self.stats(),
		}
	}
}

async fn run_worker(rx: MailboxReceiver<QueuedTask>, shared: Arc<QueueShared>, policy: FailurePolicy) {
	let exit = loop {
		let next = tokio::select! {
			biased;
			_ = shared.cancel.cancelled() => break WorkerExit::Cancelled,
			next = rx.recv() => next,
		};
		let Some(QueuedTask { id, task }) = next else {
			break WorkerExit::Drained;
		};
		if shared.cancel.is_cancelled() {
			Counters::bump(&shared.counters.discarded);
			break WorkerExit::Cancelled;
		}

		// Not raced against cancellation: a started task always completes.
		match spawn::run_task(&shared.name, id, task).await {
			Ok(()) => Counters::bump(&shared.counters.executed),
			Err(err) => {
				let message = crate::join_error_panic_message(err).unwrap_or_else(|| "task was cancelled by the runtime".to_string());
				let failure = TaskFailure::new(id, message);
				Counters::bump(&shared.counters.failed);
				tracing::warn!(queue = %shared.name, task = id, message = failure.message(), "serial_queue.task.failed");
				let _ = shared.failures.send(failure.clone());
				if policy == FailurePolicy::StopWorker {
					break WorkerExit::TaskFailed(failure);
				}
			}
		}
	};

	shared.record_exit(exit.clone());
	shared.terminate();
	let discarded = rx.discard_all();
	Counters::add(&shared.counters.discarded, discarded);

	let stats = shared.counters.snapshot(0);
	tracing::debug!(
		queue = %shared.name,
		exit = ?exit,
		executed = stats.executed,
		failed = stats.failed,
		discarded = stats.discarded,
		"serial_queue.worker.exit"
	);
}
