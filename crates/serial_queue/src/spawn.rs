use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("serial-queue-global")
			.build()
			.expect("failed to build serial-queue global tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns the worker loop of the named queue.
///
/// Uses the ambient runtime when called from inside one, otherwise a lazily
/// built shared runtime.
pub(crate) fn spawn_worker<F>(queue: &str, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(queue, "serial_queue.spawn");
	runtime_handle().spawn(fut)
}

/// Runs one task on the blocking pool of the current worker runtime.
pub(crate) fn run_task<F, R>(queue: &str, id: u64, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(queue, task = id, "serial_queue.run_task");
	runtime_handle().spawn_blocking(f)
}
