//! The reactivity interceptor.
//!
//! An [`Observer`] addresses one canonical path of an engine's data graph.
//! Writes and list operations made through it are applied to the data, described as a [`ChangeDescriptor`](`crate::ChangeDescriptor`)
//! and refreshed before the call returns.

use crate::{Error, Value};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use std::rc::Rc;

/// A list operation as requested, before normalisation against the current length.
#[derive(Debug, Clone)]
pub(crate) enum Mutation {
	Push(Vec<Value>),
	Pop,
	Shift,
	Unshift(Vec<Value>),
	Splice { start: isize, delete_count: Option<usize>, items: Vec<Value> },
}

impl Mutation {
	/// Converts the items this adds.
	pub(crate) fn map_items(self, f: &dyn Fn(Value) -> Value) -> Self {
		let map = |items: Vec<Value>| -> Vec<Value> { items.into_iter().map(f).collect() };
		match self {
			Mutation::Push(items) => Mutation::Push(map(items)),
			Mutation::Unshift(items) => Mutation::Unshift(map(items)),
			Mutation::Splice { start, delete_count, items } => Mutation::Splice {
				start,
				delete_count,
				items: map(items),
			},
			Mutation::Pop | Mutation::Shift => self,
		}
	}
}

/// What an [`Observer`] needs from its engine.
pub(crate) trait Reactor {
	fn read(&self, path: &str) -> Value;
	fn write(&self, path: &str, value: Value) -> Result<(), Error>;
	/// Returns the removed items.
	fn mutate(&self, path: &str, mutation: Mutation) -> Result<Vec<Value>, Error>;
}

/// A handle to one location in the observed data.
///
/// Child observers are created lazily by [`at`](`Observer::at`) and cached,
/// so repeated descent into the same key doesn't allocate again.
/// Clones share their cache.
#[derive(Clone)]
pub struct Observer {
	reactor: Rc<dyn Reactor>,
	path: Rc<str>,
	children: Rc<RefCell<HashMap<String, Observer>>>,
}

impl Debug for Observer {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Observer").field("path", &self.path).finish_non_exhaustive()
	}
}

fn join(path: &str, key: &str) -> String {
	if path.is_empty() {
		key.to_owned()
	} else {
		format!("{}.{}", path, key)
	}
}

impl Observer {
	pub(crate) fn new(reactor: Rc<dyn Reactor>, path: impl Into<Rc<str>>) -> Self {
		Self {
			reactor,
			path: path.into(),
			children: Rc::default(),
		}
	}

	/// The canonical path. Empty for the root.
	#[must_use]
	pub fn path(&self) -> &str {
		&self.path
	}

	/// A snapshot of the current value.
	#[must_use]
	pub fn value(&self) -> Value {
		self.reactor.read(&self.path)
	}

	/// A snapshot of the value at the (dot-separated) `key` below this one.
	#[must_use]
	pub fn get(&self, key: &str) -> Value {
		self.reactor.read(&join(&self.path, key))
	}

	/// The child observer for `key`.
	#[must_use]
	pub fn at(&self, key: &str) -> Observer {
		if let Some(child) = self.children.borrow().get(key) {
			return child.clone();
		}
		let child = Observer::new(Rc::clone(&self.reactor), join(&self.path, key));
		self.children.borrow_mut().insert(key.to_owned(), child.clone());
		child
	}

	/// Writes `value` at `key` below this observer and refreshes everything that shows it.
	///
	/// # Errors
	///
	/// [`Error::PathNotFound`] or [`Error::ReadOnly`] for an invalid target, or any error raised while refreshing.
	///
	/// [`Error::Deferred`] if called while the engine is rendering or refreshing.
	/// The write is then applied before the outermost call into the engine returns.
	pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), Error> {
		self.reactor.write(&join(&self.path, key), value.into())
	}

	fn mutate(&self, mutation: Mutation) -> Result<Vec<Value>, Error> {
		let result = self.reactor.mutate(&self.path, mutation);
		if let Ok(_) | Err(Error::Deferred { .. }) = result {
			self.children.borrow_mut().clear()
		}
		result
	}

	/// Appends `items`. Returns the new length.
	///
	/// # Errors
	///
	/// [`Error::NotAList`] if this observer's value isn't a list, or any error raised while refreshing.
	///
	/// [`Error::Deferred`] if called while the engine is rendering or refreshing.
	/// The operation is then applied before the outermost call into the engine returns, and its result is lost.
	pub fn push(&self, items: impl IntoIterator<Item = Value>) -> Result<usize, Error> {
		self.mutate(Mutation::Push(items.into_iter().collect()))?;
		Ok(self.len())
	}

	/// # Errors
	///
	/// See [`push`](`Observer::push`).
	pub fn pop(&self) -> Result<Option<Value>, Error> {
		Ok(self.mutate(Mutation::Pop)?.pop())
	}

	/// Removes the first item.
	///
	/// # Errors
	///
	/// See [`push`](`Observer::push`).
	pub fn shift(&self) -> Result<Option<Value>, Error> {
		Ok(self.mutate(Mutation::Shift)?.pop())
	}

	/// Prepends `items`. Returns the new length.
	///
	/// # Errors
	///
	/// See [`push`](`Observer::push`).
	pub fn unshift(&self, items: impl IntoIterator<Item = Value>) -> Result<usize, Error> {
		self.mutate(Mutation::Unshift(items.into_iter().collect()))?;
		Ok(self.len())
	}

	/// Removes `delete_count` items (or all to the end for [`None`]) from `start` and inserts `items` there.
	/// A negative `start` counts from the end. Returns the removed items.
	///
	/// # Errors
	///
	/// See [`push`](`Observer::push`).
	pub fn splice(&self, start: isize, delete_count: Option<usize>, items: impl IntoIterator<Item = Value>) -> Result<Vec<Value>, Error> {
		self.mutate(Mutation::Splice {
			start,
			delete_count,
			items: items.into_iter().collect(),
		})
	}

	/// The list length, or 0 for anything that isn't a list.
	#[must_use]
	pub fn len(&self) -> usize {
		self.value().as_list().map_or(0, <[Value]>::len)
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Passed to `action-*` handlers.
#[derive(Debug, Clone)]
pub struct ActionContext {
	/// The event name, like `click`.
	pub event: String,
	/// The innermost iteration item the element was rendered for, or the root outside of any list.
	pub item: Observer,
	pub root: Observer,
	/// The live index of `item` in its list.
	pub index: Option<usize>,
}
