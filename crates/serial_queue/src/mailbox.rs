use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Mailbox send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MailboxSendError {
	/// Mailbox is closed.
	Closed,
	/// Queue is full and non-blocking send was used.
	Full,
}

struct MailboxState<T> {
	queue: VecDeque<T>,
	closed: bool,
}

struct MailboxInner<T> {
	capacity: usize,
	state: Mutex<MailboxState<T>>,
	notify_recv: Notify,
	notify_send: Notify,
}

impl<T> MailboxInner<T> {
	fn close(&self) -> bool {
		let mut state = self.state.lock();
		if state.closed {
			return false;
		}
		state.closed = true;
		drop(state);
		self.notify_recv.notify_waiters();
		self.notify_send.notify_waiters();
		true
	}
}

/// Multi-producer sender half of a bounded FIFO mailbox.
pub(crate) struct MailboxSender<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Single-consumer receiver half of a bounded FIFO mailbox.
pub(crate) struct MailboxReceiver<T> {
	inner: Arc<MailboxInner<T>>,
}

impl<T> Clone for MailboxSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

/// Creates a bounded backpressure mailbox.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub(crate) fn bounded<T>(capacity: usize) -> (MailboxSender<T>, MailboxReceiver<T>) {
	assert!(capacity > 0, "mailbox capacity must be > 0");
	let inner = Arc::new(MailboxInner {
		capacity,
		state: Mutex::new(MailboxState {
			queue: VecDeque::with_capacity(capacity),
			closed: false,
		}),
		notify_recv: Notify::new(),
		notify_send: Notify::new(),
	});
	(
		MailboxSender { inner: Arc::clone(&inner) },
		MailboxReceiver { inner },
	)
}

impl<T> MailboxSender<T> {
	/// Closes the mailbox to senders. The receiver drains what is already
	/// queued, then observes `None`. Returns `false` if already closed.
	pub(crate) fn close(&self) -> bool {
		self.inner.close()
	}

	/// Non-blocking enqueue.
	pub(crate) fn try_send(&self, msg: T) -> Result<(), MailboxSendError> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(MailboxSendError::Closed);
		}
		if state.queue.len() >= self.inner.capacity {
			return Err(MailboxSendError::Full);
		}
		state.queue.push_back(msg);
		drop(state);
		self.inner.notify_recv.notify_one();
		Ok(())
	}

	/// Enqueues `msg`, waiting for capacity while the mailbox is full.
	///
	/// Dropping the returned future while it waits drops `msg`.
	pub(crate) async fn send(&self, msg: T) -> Result<(), MailboxSendError> {
		loop {
			// Register before checking capacity so a pop between the unlock
			// and the await still wakes us.
			let notified = self.inner.notify_send.notified();

			{
				let mut state = self.inner.state.lock();
				if state.closed {
					return Err(MailboxSendError::Closed);
				}
				if state.queue.len() < self.inner.capacity {
					state.queue.push_back(msg);
					drop(state);
					self.inner.notify_recv.notify_one();
					return Ok(());
				}
			}
			notified.await;
		}
	}

	/// Returns current queue length.
	pub(crate) fn len(&self) -> usize {
		self.inner.state.lock().queue.len()
	}

	/// Returns queue capacity.
	pub(crate) fn capacity(&self) -> usize {
		self.inner.capacity
	}
}

impl<T> MailboxReceiver<T> {
	/// Receives one message. Returns `None` once the mailbox is closed and drained.
	pub(crate) async fn recv(&self) -> Option<T> {
		loop {
			let notified = self.inner.notify_recv.notified();

			{
				let mut state = self.inner.state.lock();
				if let Some(msg) = state.queue.pop_front() {
					drop(state);
					self.inner.notify_send.notify_one();
					return Some(msg);
				}
				if state.closed {
					return None;
				}
			}
			notified.await;
		}
	}

	/// Closes the mailbox and drops everything still queued, returning how
	/// many messages were discarded.
	pub(crate) fn discard_all(&self) -> usize {
		self.inner.close();
		let drained: Vec<T> = self.inner.state.lock().queue.drain(..).collect();
		drained.len()
	}
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn try_send_returns_full_when_at_capacity() {
		let (tx, rx) = bounded(3);

		assert_eq!(tx.try_send(1u32), Ok(()));
		assert_eq!(tx.try_send(2), Ok(()));
		assert_eq!(tx.try_send(3), Ok(()));
		assert_eq!(tx.try_send(4), Err(MailboxSendError::Full));
		assert_eq!(tx.len(), 3);

		tx.close();
		assert_eq!(rx.recv().await, Some(1));
		assert_eq!(rx.recv().await, Some(2));
		assert_eq!(rx.recv().await, Some(3));
		assert_eq!(rx.recv().await, None);
	}

	#[tokio::test]
	async fn send_blocks_until_capacity_freed() {
		let (tx, rx) = bounded(2);

		let _ = tx.send(1u32).await;
		let _ = tx.send(2).await;

		let tx2 = tx.clone();
		let send_task = tokio::spawn(async move { tx2.send(3).await });

		tokio::time::sleep(Duration::from_millis(10)).await;
		assert!(!send_task.is_finished(), "send must wait while the mailbox is full");

		assert_eq!(rx.recv().await, Some(1));

		let result = tokio::time::timeout(Duration::from_millis(200), send_task)
			.await
			.expect("send should unblock after pop")
			.unwrap();
		assert_eq!(result, Ok(()));

		tx.close();
		assert_eq!(rx.recv().await, Some(2));
		assert_eq!(rx.recv().await, Some(3));
		assert_eq!(rx.recv().await, None);
	}

	#[tokio::test]
	async fn close_releases_blocked_sender() {
		let (tx, _rx) = bounded(1);
		let _ = tx.send(1u32).await;

		let tx2 = tx.clone();
		let send_task = tokio::spawn(async move { tx2.send(2).await });
		tokio::time::sleep(Duration::from_millis(10)).await;

		assert!(tx.close());
		let result = tokio::time::timeout(Duration::from_millis(200), send_task)
			.await
			.expect("close should release the blocked sender")
			.unwrap();
		assert_eq!(result, Err(MailboxSendError::Closed));
		assert!(!tx.close(), "second close is a no-op");
	}

	#[tokio::test]
	async fn recv_wakes_on_send() {
		let (tx, rx) = bounded(4);

		let recv_task = tokio::spawn(async move { rx.recv().await });
		tokio::time::sleep(Duration::from_millis(10)).await;

		let _ = tx.send(7u32).await;
		let got = tokio::time::timeout(Duration::from_millis(200), recv_task)
			.await
			.expect("recv should wake once a message arrives")
			.unwrap();
		assert_eq!(got, Some(7));
	}

	#[tokio::test]
	async fn discard_all_drops_queued_and_rejects_senders() {
		let (tx, rx) = bounded(4);
		let _ = tx.send(1u32).await;
		let _ = tx.send(2).await;

		assert_eq!(rx.discard_all(), 2);
		assert_eq!(tx.len(), 0);
		assert_eq!(tx.send(3).await, Err(MailboxSendError::Closed));
		assert_eq!(rx.recv().await, None);
	}

	#[test]
	#[should_panic(expected = "mailbox capacity must be > 0")]
	fn zero_capacity_panics() {
		let _ = bounded::<u32>(0);
	}
}
