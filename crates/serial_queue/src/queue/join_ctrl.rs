use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

enum JoinState {
	/// The worker was never spawned.
	Idle,
	/// Worker spawned; `exited` fires once its future is gone.
	Spawned { _worker: JoinHandle<()> },
}

/// Join coordination for the worker task.
///
/// The worker future owns a drop guard of `exited`, so joiners wait on the
/// token rather than on the handle. Any number of callers may join, and a
/// joiner that is dropped mid-wait leaves nothing behind.
pub(super) struct WorkerJoinCtrl {
	state: Mutex<JoinState>,
	exited: CancellationToken,
}

impl WorkerJoinCtrl {
	pub(super) fn new() -> Self {
		Self {
			state: Mutex::new(JoinState::Idle),
			exited: CancellationToken::new(),
		}
	}

	/// Runs `spawn` under the join lock and records the worker it returns,
	/// so a concurrent join never observes a started but unrecorded worker.
	///
	/// `spawn` receives the guard the worker future must hold until it ends.
	pub(super) fn spawn_with<E>(&self, spawn: impl FnOnce(DropGuard) -> Result<JoinHandle<()>, E>) -> Result<(), E> {
		let mut st = self.state.lock();
		let handle = spawn(self.exited.clone().drop_guard())?;
		*st = JoinState::Spawned { _worker: handle };
		Ok(())
	}

	/// Runs `f` under the join lock, excluding a concurrent `spawn_with`.
	pub(super) fn locked<R>(&self, f: impl FnOnce() -> R) -> R {
		let _st = self.state.lock();
		f()
	}

	fn spawned(&self) -> bool {
		matches!(*self.state.lock(), JoinState::Spawned { .. })
	}

	/// Waits until the worker has exited. Returns immediately if it never ran.
	pub(super) async fn join_forever(&self) {
		if self.spawned() {
			self.exited.cancelled().await;
		}
	}

	/// Joins with a deadline. Returns `true` if the worker exited in time.
	pub(super) async fn join_with_timeout(&self, timeout: Duration) -> bool {
		if !self.spawned() {
			return true;
		}
		tokio::time::timeout(timeout, self.exited.cancelled()).await.is_ok()
	}
}
