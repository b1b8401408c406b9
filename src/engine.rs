use crate::{
	dependencies::Dependencies,
	error::ResultExt,
	observe::{Mutation, Observer, Reactor},
	path::{self, ContextStack, Params, Redirect},
	refresh::{ChangeDescriptor, Operation},
	registry::{Registry, SubscriptionId},
	template::{Node, Templates},
	Error, OutputTree, Value,
};
use core::{
	cell::{RefCell, RefMut},
	fmt::{self, Debug, Formatter},
};
use std::{
	collections::VecDeque,
	rc::{Rc, Weak},
};
use tracing::{debug, error, instrument, trace_span, warn};

/// Runtime limits and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	/// Maximum number of nested `EACH` bindings.
	pub max_context_depth: usize,
	/// Maximum `TEMPLATE-USE` nesting, which bounds recursive templates.
	pub depth_limit: usize,
	/// Tag of `IF` wrappers that don't name one.
	pub default_wrapper: String,
	/// `class` of the `span`s rendered for `GET` nodes.
	pub value_class: String,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			max_context_depth: 32,
			depth_limit: 256,
			default_wrapper: "div".to_owned(),
			value_class: "get-resolved".to_owned(),
		}
	}
}

pub(crate) struct State<T: OutputTree> {
	pub(crate) data: Value,
	pub(crate) tree: T,
	pub(crate) registry: Registry<T::Node>,
	pub(crate) dependencies: Dependencies,
	pub(crate) templates: Templates,
	pub(crate) config: Config,
	/// Subscriptions registered by the renders in progress, innermost last.
	pub(crate) scopes: Vec<Vec<SubscriptionId>>,
	/// Handed to event listeners.
	pub(crate) this: Weak<Shared<T>>,
}

/// A change requested while the state was borrowed.
enum Pending {
	Write { path: String, value: Value },
	Mutate { path: String, mutation: Mutation },
	Refresh(ChangeDescriptor),
}

impl Pending {
	fn path(&self) -> &str {
		match self {
			Pending::Write { path, .. } | Pending::Mutate { path, .. } => path,
			Pending::Refresh(change) => &change.path,
		}
	}
}

pub(crate) struct Shared<T: OutputTree> {
	pub(crate) state: RefCell<State<T>>,
	pending: RefCell<VecDeque<Pending>>,
}

impl<T: OutputTree + 'static> State<T> {
	pub(crate) fn read(&self, path: &str) -> Value {
		path::read(path, &self.data, &Params::default())
	}

	fn apply_pending(&mut self, pending: Pending) -> Result<Vec<Value>, Error> {
		match pending {
			Pending::Write { path, value } => self.write(&path, value).map(|()| Vec::new()),
			Pending::Mutate { path, mutation } => self.mutate(&path, mutation),
			Pending::Refresh(change) => self.refresh(&change).map(|()| Vec::new()),
		}
	}

	fn write(&mut self, path: &str, value: Value) -> Result<(), Error> {
		let span = trace_span!("write", path);
		let _enter = span.enter();

		match path::redirect(path, &self.data)? {
			Some(Redirect::Item(source)) => {
				debug!(path, source = source.as_str(), "Writing through a mapped list.");
				return self.write(&source, value);
			}
			Some(Redirect::List { .. }) => return Err(Error::ReadOnly { path: path.to_owned() }),
			None => (),
		}
		path::write(path, &mut self.data, value)?;
		self.refresh(&ChangeDescriptor {
			path: path.to_owned(),
			operation: Operation::Update,
		})
		.context(|| format!("while refreshing after setting {:?}", path))
	}

	fn mutate(&mut self, path: &str, mutation: Mutation) -> Result<Vec<Value>, Error> {
		let span = trace_span!("mutate", path);
		let _enter = span.enter();

		match path::redirect(path, &self.data)? {
			Some(Redirect::Item(source)) => return self.mutate(&source, mutation),
			Some(Redirect::List { source, mapping }) => {
				debug!(path, source = source.as_str(), "Forwarding a list operation to the source of a mapped list.");
				return self.mutate(&source, mutation.map_items(&*mapping.reverse));
			}
			None => (),
		}

		let list = match path::get_mut(path, &mut self.data)? {
			Value::List(items) => items,
			other => {
				return Err(Error::NotAList {
					path: path.to_owned(),
					kind: other.kind(),
				})
			}
		};

		let (removed, operation) = match mutation {
			Mutation::Push(items) => {
				list.extend(items.iter().cloned());
				(Vec::new(), (!items.is_empty()).then(|| Operation::Push { items }))
			}
			Mutation::Pop => match list.pop() {
				Some(item) => (vec![item], Some(Operation::Pop)),
				None => (Vec::new(), None),
			},
			Mutation::Shift => {
				if list.is_empty() {
					(Vec::new(), None)
				} else {
					(vec![list.remove(0)], Some(Operation::Shift))
				}
			}
			Mutation::Unshift(items) => {
				list.splice(0..0, items.iter().cloned());
				(Vec::new(), (!items.is_empty()).then(|| Operation::Unshift { items }))
			}
			Mutation::Splice { start, delete_count, items } => {
				let len = list.len();
				let start = if start < 0 {
					len.saturating_sub(start.unsigned_abs())
				} else {
					start.unsigned_abs().min(len)
				};
				let delete_count = delete_count.map_or(len - start, |count| count.min(len - start));
				let removed = list.splice(start..start + delete_count, items.iter().cloned()).collect();
				let operation = (delete_count > 0 || !items.is_empty()).then(|| Operation::Splice { start, delete_count, items });
				(removed, operation)
			}
		};

		if let Some(operation) = operation {
			let name = operation.name();
			self.refresh(&ChangeDescriptor {
				path: path.to_owned(),
				operation,
			})
			.context(|| format!("while refreshing after {} on {:?}", name, path))?;
		}
		Ok(removed)
	}
}

impl<T: OutputTree + 'static> Shared<T> {
	/// Applies `pending` now or, if a render or refresh is in progress, queues it and reports [`Error::Deferred`].
	fn dispatch(&self, pending: Pending) -> Result<Vec<Value>, Error> {
		let result = match self.state.try_borrow_mut() {
			Ok(mut state) => state.apply_pending(pending),
			Err(_) => {
				let path = pending.path().to_owned();
				debug!(path = path.as_str(), "Engine busy. Deferring change.");
				self.pending.borrow_mut().push_back(pending);
				return Err(Error::Deferred { path });
			}
		};
		self.drain();
		result
	}

	/// Applies queued changes in order. Their errors have no caller to go to, so they are logged.
	fn drain(&self) {
		loop {
			let pending = match self.pending.borrow_mut().pop_front() {
				Some(pending) => pending,
				None => return,
			};
			let mut state = match self.state.try_borrow_mut() {
				Ok(state) => state,
				Err(_) => return self.pending.borrow_mut().push_front(pending),
			};
			let path = pending.path().to_owned();
			if let Err(error) = state.apply_pending(pending) {
				let chain = error.report().to_string();
				error!(path = path.as_str(), error = chain.as_str(), "Deferred change failed.");
			}
		}
	}
}

impl<T: OutputTree + 'static> Reactor for Shared<T> {
	fn read(&self, path: &str) -> Value {
		match self.state.try_borrow() {
			Ok(state) => state.read(path),
			Err(_) => {
				warn!(path, "Read during a render or refresh. Reading as undefined.");
				Value::Undefined
			}
		}
	}

	fn write(&self, path: &str, value: Value) -> Result<(), Error> {
		self.dispatch(Pending::Write { path: path.to_owned(), value }).map(drop)
	}

	fn mutate(&self, path: &str, mutation: Mutation) -> Result<Vec<Value>, Error> {
		self.dispatch(Pending::Mutate { path: path.to_owned(), mutation })
	}
}

/// Owns one data graph, its output tree and all bookkeeping between them.
///
/// Engines are independent of each other. Event listeners only hold weak references to their engine,
/// so once it and all of its [`Observer`]s are dropped, the rendered tree stops reacting.
///
/// Callbacks stored in the data should use the [`ActionContext`](`crate::ActionContext`) they're called with
/// rather than capturing an [`Observer`], which would keep the engine alive.
pub struct Engine<T: OutputTree + 'static> {
	shared: Rc<Shared<T>>,
}

impl<T: OutputTree + 'static> Debug for Engine<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Engine");
		if let Ok(state) = self.shared.state.try_borrow() {
			debug
				.field("config", &state.config)
				.field("templates", &state.templates.len())
				.field("subscriptions", &state.registry.len());
		}
		debug.finish_non_exhaustive()
	}
}

impl<T: OutputTree + 'static> Engine<T> {
	pub fn new(tree: T, data: impl Into<Value>) -> Self {
		Self::with_config(tree, data, Config::default())
	}

	pub fn with_config(tree: T, data: impl Into<Value>, config: Config) -> Self {
		let data = data.into();
		Self {
			shared: Rc::new_cyclic(|this| Shared {
				state: RefCell::new(State {
					data,
					tree,
					registry: Registry::new(),
					dependencies: Dependencies::new(),
					templates: Templates::default(),
					config,
					scopes: Vec::new(),
					this: Weak::clone(this),
				}),
				pending: RefCell::default(),
			}),
		}
	}

	fn state(&self) -> Result<RefMut<'_, State<T>>, Error> {
		self.shared.state.try_borrow_mut().map_err(|_| Error::Busy)
	}

	/// Defines (or replaces) the template `TEMPLATE-USE` nodes refer to as `id`.
	///
	/// # Errors
	///
	/// [`Error::Busy`] iff called from within a render or refresh of this engine.
	pub fn define_template(&self, id: impl Into<String>, content: Vec<Node>) -> Result<(), Error> {
		self.state()?.templates.define(id, content);
		Ok(())
	}

	/// Declares that the values at `dependents` are computed from `source`,
	/// so changes at or below `source` also refresh them.
	///
	/// # Errors
	///
	/// [`Error::Busy`] iff called from within a render or refresh of this engine.
	pub fn declare_dependency(&self, source: impl Into<String>, dependents: impl IntoIterator<Item = impl Into<String>>) -> Result<(), Error> {
		self.state()?.dependencies.declare(source, dependents);
		Ok(())
	}

	/// Renders `entry` into the element named by its `mount-id` and returns the root [`Observer`].
	///
	/// # Errors
	///
	/// [`Error::InvalidTemplate`] iff `entry` isn't a [`Node::TemplateUse`] with `mount-id`,
	/// [`Error::MountNotFound`] iff the tree has no such element, or any error raised while rendering.
	#[instrument(skip(self, entry))]
	pub fn run(&self, entry: &Node) -> Result<Observer, Error> {
		self.state()?.run(entry)?;
		self.shared.drain();
		Ok(self.observe())
	}

	/// Renders `nodes` at the end of `container`, outside of any iteration or template parameters.
	///
	/// # Errors
	///
	/// Any error raised while rendering.
	pub fn render_into(&self, nodes: &[Node], container: &T::Node) -> Result<(), Error> {
		self.state()?
			.render_nodes(nodes, container, None, &ContextStack::new(), &Params::default(), 0)
			.context(|| "while rendering into a container")?;
		self.shared.drain();
		Ok(())
	}

	/// The root observer.
	#[must_use]
	pub fn observe(&self) -> Observer {
		let reactor: Rc<dyn Reactor> = self.shared.clone();
		Observer::new(reactor, "")
	}

	/// Refreshes everything showing `change.path` (and its dependents) as if `change` had been made through an [`Observer`].
	///
	/// For data that was changed some other way.
	///
	/// # Errors
	///
	/// Any error raised while refreshing, or [`Error::Deferred`] if called from within a render or refresh of this engine.
	pub fn refresh(&self, change: &ChangeDescriptor) -> Result<(), Error> {
		self.shared.dispatch(Pending::Refresh(change.clone())).map(drop)
	}

	/// Reads the value at a canonical path.
	#[must_use]
	pub fn read(&self, path: &str) -> Value {
		self.shared.read(path)
	}

	/// The number of live subscriptions.
	///
	/// # Errors
	///
	/// [`Error::Busy`] iff called from within a render or refresh of this engine.
	pub fn subscription_count(&self) -> Result<usize, Error> {
		Ok(self.shared.state.try_borrow().map_err(|_| Error::Busy)?.registry.len())
	}

	/// The number of live subscriptions registered for exactly `path`.
	///
	/// # Errors
	///
	/// [`Error::Busy`] iff called from within a render or refresh of this engine.
	pub fn subscriptions_at(&self, path: &str) -> Result<usize, Error> {
		Ok(self.state()?.registry.lookup(path).map_or(0, |ids| ids.len()))
	}

	/// # Errors
	///
	/// [`Error::Busy`] iff called from within a render or refresh of this engine.
	pub fn with_tree<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, Error> {
		let state = self.shared.state.try_borrow().map_err(|_| Error::Busy)?;
		Ok(f(&state.tree))
	}
}
