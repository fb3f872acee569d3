//! Queue configuration.

/// Buffer capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 100;

const DEFAULT_FAILURE_BUFFER: usize = 64;

/// What the worker does when a task panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
	/// The first failing task terminates the worker. Tasks still queued are
	/// discarded and the queue becomes terminated.
	#[default]
	StopWorker,
	/// The failure is reported and the worker moves on to the next task.
	Isolate,
}

/// Builder configuration for one [`TaskQueue`](crate::TaskQueue).
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
	pub(crate) name: String,
	pub(crate) capacity: usize,
	pub(crate) failure_policy: FailurePolicy,
	pub(crate) failure_buffer: usize,
}

impl TaskQueueConfig {
	/// Creates a default configuration with the given queue name.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Self::default()
		}
	}

	/// Sets the buffer capacity.
	///
	/// # Panics
	///
	/// Panics if `capacity` is zero.
	#[must_use]
	pub fn capacity(mut self, capacity: usize) -> Self {
		assert!(capacity > 0, "task queue capacity must be > 0");
		self.capacity = capacity;
		self
	}

	/// Sets the task failure policy.
	#[must_use]
	pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
		self.failure_policy = policy;
		self
	}

	/// Sets how many failure reports are retained for lagging subscribers.
	///
	/// # Panics
	///
	/// Panics if `size` is zero.
	#[must_use]
	pub fn failure_buffer(mut self, size: usize) -> Self {
		assert!(size > 0, "failure buffer size must be > 0");
		self.failure_buffer = size;
		self
	}
}

impl Default for TaskQueueConfig {
	fn default() -> Self {
		Self {
			name: "serial-queue".to_string(),
			capacity: DEFAULT_CAPACITY,
			failure_policy: FailurePolicy::default(),
			failure_buffer: DEFAULT_FAILURE_BUFFER,
		}
	}
}
