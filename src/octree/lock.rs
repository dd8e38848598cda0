//! The two locks held by every node.
//!
//! The structural lock is taken while a transaction passes through a node
//! and is released as soon as the transaction has moved on. The data lock
//! is a reader/writer lock that stays held from Begin to End, so it can't
//! be a scoped guard. Both are small state machines over a
//! [parking_lot::Mutex] and [parking_lot::Condvar].

use std::{
	sync::Arc,
	thread::{self, ThreadId},
	time::Instant,
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::node::DataNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
	Read,
	Write,
}

/// Why a lock couldn't be taken or released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockFailure {
	/// The calling thread already holds this lock.
	Reentrant,
	/// The deadline passed. Carries the name of the current holder.
	Timeout(String),
	NotHeld,
}

/// Waits on `condvar` until `blocked` returns false or the deadline passes.
/// Returns false on timeout.
fn wait_while<T, F: Fn(&T) -> bool>(
	condvar: &Condvar,
	guard: &mut MutexGuard<'_, T>,
	deadline: Option<Instant>,
	blocked: F,
) -> bool {
	while blocked(&**guard) {
		match deadline {
			Some(deadline) => {
				if condvar.wait_until(guard, deadline).timed_out() {
					return !blocked(&**guard);
				}
			}
			None => condvar.wait(guard),
		}
	}
	true
}

#[derive(Debug, Default)]
struct GateState {
	locked: bool,
	holder: String,
}

/// Exclusive, non-reentrant gate guarding whether a node is a leaf.
#[derive(Debug, Default)]
pub struct StructuralLock {
	state: Mutex<GateState>,
	released: Condvar,
}

impl StructuralLock {
	pub fn new() -> Self {
		Self::default()
	}

	fn acquire(&self, name: &str, deadline: Option<Instant>) -> Result<(), LockFailure> {
		let mut state = self.state.lock();
		if !wait_while(&self.released, &mut state, deadline, |s| s.locked) {
			return Err(LockFailure::Timeout(state.holder.clone()));
		}
		state.locked = true;
		state.holder.clear();
		state.holder.push_str(name);
		Ok(())
	}

	fn release(&self) {
		let mut state = self.state.lock();
		debug_assert!(state.locked);
		state.locked = false;
		state.holder.clear();
		drop(state);
		self.released.notify_one();
	}

	pub fn is_locked(&self) -> bool {
		self.state.lock().locked
	}
}

/// Holds the structural lock of a node until dropped.
pub struct StructuralGuard {
	node: Arc<DataNode>,
}

impl StructuralGuard {
	pub fn lock(node: Arc<DataNode>, name: &str, deadline: Option<Instant>) -> Result<Self, LockFailure> {
		node.structure.acquire(name, deadline)?;
		log::trace!("structural lock on {:?} taken by {name}", node.id());
		Ok(Self {
			node,
		})
	}

	pub fn node(&self) -> &Arc<DataNode> {
		&self.node
	}
}

impl Drop for StructuralGuard {
	fn drop(&mut self) {
		self.node.structure.release();
	}
}

#[derive(Debug, Default)]
struct DataState {
	writer: Option<ThreadId>,
	readers: Vec<ThreadId>,
	holder: String,
}

impl DataState {
	fn held_by(&self, thread: ThreadId, kind: LockKind) -> bool {
		match kind {
			LockKind::Read => self.readers.contains(&thread),
			LockKind::Write => self.writer == Some(thread),
		}
	}
}

/// Reader/writer lock over a node's data, held for a whole transaction.
#[derive(Debug, Default)]
pub struct DataLock {
	state: Mutex<DataState>,
	changed: Condvar,
}

impl DataLock {
	pub fn new() -> Self {
		Self::default()
	}

	/// Takes one hold of `kind`. A thread may stack read holds, but asking
	/// for anything while it writes, or for a write while it reads, is reentrant.
	pub fn acquire(&self, kind: LockKind, name: &str, deadline: Option<Instant>) -> Result<(), LockFailure> {
		let current = thread::current().id();
		let mut state = self.state.lock();
		if state.held_by(current, LockKind::Write)
			|| (kind == LockKind::Write && state.held_by(current, LockKind::Read)) {
			return Err(LockFailure::Reentrant);
		}
		let acquired = match kind {
			LockKind::Read => wait_while(&self.changed, &mut state, deadline, |s| s.writer.is_some()),
			LockKind::Write => wait_while(&self.changed, &mut state, deadline, |s| {
				s.writer.is_some() || !s.readers.is_empty()
			}),
		};
		if !acquired {
			return Err(LockFailure::Timeout(state.holder.clone()));
		}
		match kind {
			LockKind::Read => state.readers.push(current),
			LockKind::Write => state.writer = Some(current),
		}
		state.holder.clear();
		state.holder.push_str(name);
		Ok(())
	}

	/// Releases one hold of `kind` taken by `owner`. The releasing thread
	/// doesn't need to be the owner.
	pub fn release(&self, kind: LockKind, owner: ThreadId) -> Result<(), LockFailure> {
		let mut state = self.state.lock();
		match kind {
			LockKind::Read => {
				let Some(index) = state.readers.iter().position(|&id| id == owner) else {
					return Err(LockFailure::NotHeld);
				};
				state.readers.swap_remove(index);
				if !state.readers.is_empty() {
					return Ok(());
				}
			}
			LockKind::Write => {
				if state.writer != Some(owner) {
					return Err(LockFailure::NotHeld);
				}
				state.writer = None;
			}
		}
		state.holder.clear();
		drop(state);
		self.changed.notify_all();
		Ok(())
	}

	pub fn is_locked_for_write(&self) -> bool {
		self.state.lock().writer.is_some()
	}

	pub fn is_locked_for_read(&self) -> bool {
		!self.state.lock().readers.is_empty()
	}

	/// Tests if `owner` holds this lock with `kind`.
	pub fn is_held_by(&self, owner: ThreadId, kind: LockKind) -> bool {
		self.state.lock().held_by(owner, kind)
	}

	/// Tests if the calling thread holds this lock with `kind`.
	pub fn is_held_by_current_thread(&self, kind: LockKind) -> bool {
		self.is_held_by(thread::current().id(), kind)
	}
}
