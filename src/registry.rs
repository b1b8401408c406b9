//! Node holders by canonical path.
//!
//! A trie keyed by path segment. Each level lists the subscriptions registered for exactly that path,
//! and the levels below a list path are keyed by item index, which is what [`Registry::reindex`] renumbers.

use crate::{
	path::{ContextStack, Params},
	template::{Each, If},
};
use core::{cell::Cell, cell::RefCell, mem};
use hashbrown::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A "node holder": binds a rendered artifact to the path it displays, together with how to refresh it.
#[derive(Debug)]
pub struct Subscription<N> {
	/// The value span, conditional wrapper, list end marker or bound element.
	pub artifact: N,
	pub binding: Binding<N>,
}

/// The update strategy, with whatever the first render needs to run again.
#[derive(Debug, Clone)]
pub enum Binding<N> {
	/// Re-read and replace the text content.
	Value,
	/// Re-test and repaint the wrapper's content.
	Conditional(Rc<ConditionalBinding>),
	/// Splice rendered items.
	List(Rc<ListBinding<N>>),
	/// Re-apply an attribute, style or property.
	Attribute(AttributeTarget),
}

impl<N> Binding<N> {
	fn same_target(&self, other: &Self) -> bool {
		match (self, other) {
			(Binding::Value, Binding::Value) | (Binding::Conditional(_), Binding::Conditional(_)) | (Binding::List(_), Binding::List(_)) => true,
			(Binding::Attribute(a), Binding::Attribute(b)) => a == b,
			_ => false,
		}
	}

	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Binding::Value => "value",
			Binding::Conditional(_) => "conditional",
			Binding::List(_) => "list",
			Binding::Attribute(_) => "attribute",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeTarget {
	Attribute(String),
	Style(String),
	Property(String),
}

#[derive(Debug)]
pub struct ConditionalBinding {
	pub(crate) node: Rc<If>,
	pub(crate) context: ContextStack,
	pub(crate) params: Params,
	pub(crate) depth: usize,
	/// Registered while rendering the wrapper's current content.
	pub(crate) children: RefCell<Vec<SubscriptionId>>,
}

#[derive(Debug)]
pub struct ListBinding<N> {
	pub(crate) node: Rc<Each>,
	/// The list reference after indirection, still relative to `context`.
	pub(crate) of: Rc<str>,
	pub(crate) context: ContextStack,
	pub(crate) params: Params,
	pub(crate) depth: usize,
	/// Follows the last item. Its parent is the list's container.
	pub(crate) end: N,
	pub(crate) items: RefCell<Vec<ItemRecord<N>>>,
}

/// One rendered list item: everything from `marker` up to the next item's marker (or the list's end marker).
#[derive(Debug)]
pub struct ItemRecord<N> {
	pub(crate) marker: N,
	pub(crate) index: Rc<Cell<usize>>,
	pub(crate) subscriptions: Vec<SubscriptionId>,
}

#[derive(Debug, Default)]
struct Level {
	holders: Vec<SubscriptionId>,
	children: HashMap<String, Level>,
}

impl Level {
	fn is_empty(&self) -> bool {
		self.holders.is_empty() && self.children.is_empty()
	}

	/// Moves the holders in `owned`, at any depth, into a new level of the same shape.
	fn extract(&mut self, owned: &HashSet<SubscriptionId>) -> Level {
		let (taken, kept): (Vec<_>, Vec<_>) = mem::take(&mut self.holders).into_iter().partition(|id| owned.contains(id));
		self.holders = kept;
		let mut extracted = Level {
			holders: taken,
			children: HashMap::new(),
		};
		for (segment, child) in &mut self.children {
			let part = child.extract(owned);
			if !part.is_empty() {
				extracted.children.insert(segment.clone(), part);
			}
		}
		self.children.retain(|_, child| !child.is_empty());
		extracted
	}

	fn merge(&mut self, other: Level) {
		self.holders.extend(other.holders);
		for (segment, child) in other.children {
			self.children.entry(segment).or_default().merge(child)
		}
	}

	/// Takes `owned`'s holders out of the child level `key`, dropping it once it's empty.
	fn extract_child(&mut self, key: &str, owned: &HashSet<SubscriptionId>) -> Option<Level> {
		let child = self.children.get_mut(key)?;
		let extracted = child.extract(owned);
		if child.is_empty() {
			self.children.remove(key);
		}
		Some(extracted)
	}

	fn collect(&self, ids: &mut Vec<SubscriptionId>) {
		ids.extend_from_slice(&self.holders);
		for child in self.children.values() {
			child.collect(ids)
		}
	}

	fn collect_with_paths(&self, path: &str, out: &mut Vec<(String, SubscriptionId)>) {
		out.extend(self.holders.iter().map(|&id| (path.to_owned(), id)));
		for (segment, child) in &self.children {
			child.collect_with_paths(&format!("{}.{}", path, segment), out)
		}
	}
}

#[derive(Debug)]
pub struct Registry<N> {
	root: Level,
	subscriptions: HashMap<SubscriptionId, Subscription<N>>,
	next_id: u64,
}

impl<N> Default for Registry<N> {
	fn default() -> Self {
		Self {
			root: Level::default(),
			subscriptions: HashMap::new(),
			next_id: 0,
		}
	}
}

impl<N: PartialEq> Registry<N> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn level(&self, path: &str) -> Option<&Level> {
		path.split('.').try_fold(&self.root, |level, segment| level.children.get(segment))
	}

	fn level_mut(&mut self, path: &str) -> Option<&mut Level> {
		let mut level = &mut self.root;
		for segment in path.split('.') {
			level = level.children.get_mut(segment)?;
		}
		Some(level)
	}

	/// Registers `subscription` under `path`, creating intermediate levels.
	///
	/// Idempotent per path, artifact and binding target: registering the same one again returns the existing id.
	pub fn register(&mut self, path: &str, subscription: Subscription<N>) -> SubscriptionId {
		let subscriptions = &self.subscriptions;
		let mut level = &mut self.root;
		for segment in path.split('.') {
			level = level.children.entry(segment.to_owned()).or_default();
		}
		level.holders.retain(|id| subscriptions.contains_key(id));

		if let Some(&existing) = level.holders.iter().find(|id| {
			subscriptions
				.get(*id)
				.map_or(false, |s| s.artifact == subscription.artifact && s.binding.same_target(&subscription.binding))
		}) {
			trace!(path, ?existing, "Already registered.");
			return existing;
		}

		let id = SubscriptionId(self.next_id);
		self.next_id += 1;
		level.holders.push(id);
		trace!(path, ?id, kind = subscription.binding.kind(), "Registered.");
		self.subscriptions.insert(id, subscription);
		id
	}

	/// The live subscriptions registered for exactly `path`, if any. Never creates levels.
	pub fn lookup(&mut self, path: &str) -> Option<Vec<SubscriptionId>> {
		let subscriptions = &self.subscriptions;
		let mut level = &mut self.root;
		for segment in path.split('.') {
			level = level.children.get_mut(segment)?;
		}
		level.holders.retain(|id| subscriptions.contains_key(id));
		if level.holders.is_empty() {
			None
		} else {
			Some(level.holders.clone())
		}
	}

	/// The live subscriptions registered strictly below `path`, with their current paths.
	#[must_use]
	pub fn descendants(&self, path: &str) -> Vec<(String, SubscriptionId)> {
		let mut found = Vec::new();
		if let Some(level) = self.level(path) {
			for (segment, child) in &level.children {
				child.collect_with_paths(&format!("{}.{}", path, segment), &mut found)
			}
		}
		found.retain(|(_, id)| self.subscriptions.contains_key(id));
		found.sort_by(|a, b| a.0.cmp(&b.0));
		found
	}

	#[must_use]
	pub fn get(&self, id: SubscriptionId) -> Option<&Subscription<N>> {
		self.subscriptions.get(&id)
	}

	/// Live subscription count.
	#[must_use]
	pub fn len(&self) -> usize {
		self.subscriptions.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.subscriptions.is_empty()
	}

	/// Moves the subscriptions in `owned` from the index-keyed levels `start..=max` below `path` by `shift`.
	///
	/// Anything else registered there, like a reference with a fixed index, stays at its path.
	/// Runs back to front for positive shifts and front to back for negative ones,
	/// so no level receives items before its own have moved away.
	pub fn reindex(&mut self, path: &str, start: usize, shift: isize, max: usize, owned: &HashSet<SubscriptionId>) {
		if shift == 0 || max < start {
			return;
		}
		let level = match self.level_mut(path) {
			Some(level) => level,
			None => return,
		};

		let mut move_level = |from: usize| {
			let moving = match level.extract_child(&from.to_string(), owned) {
				Some(moving) if !moving.is_empty() => moving,
				_ => return,
			};
			let to = if shift > 0 {
				from.checked_add(shift.unsigned_abs())
			} else {
				from.checked_sub(shift.unsigned_abs())
			};
			match to {
				Some(to) => level.children.entry(to.to_string()).or_default().merge(moving),
				None => warn!(path, from, shift, "Reindexing below index 0. Dropping the level."),
			}
		};

		if shift > 0 {
			(start..=max).rev().for_each(&mut move_level)
		} else {
			(start..=max).for_each(&mut move_level)
		}
	}

	/// Unregisters the subscriptions in `owned` from the index-keyed levels `start..start + count` below `path`.
	/// Must run before [`reindex`](`Registry::reindex`) for the same structural change.
	pub fn delete_range(&mut self, path: &str, start: usize, count: usize, owned: &HashSet<SubscriptionId>) {
		let mut ids = Vec::new();
		if let Some(level) = self.level_mut(path) {
			for i in start..start + count {
				if let Some(removed) = level.extract_child(&i.to_string(), owned) {
					removed.collect(&mut ids)
				}
			}
		}
		self.unregister_all(ids)
	}

	/// `roots` and everything registered while rendering their content, transitively.
	#[must_use]
	pub fn scope_closure(&self, roots: impl IntoIterator<Item = SubscriptionId>) -> HashSet<SubscriptionId> {
		let mut closure = HashSet::new();
		let mut pending: Vec<_> = roots.into_iter().collect();
		while let Some(id) = pending.pop() {
			if !closure.insert(id) {
				continue;
			}
			match self.subscriptions.get(&id).map(|subscription| &subscription.binding) {
				Some(Binding::Conditional(conditional)) => pending.extend(conditional.children.borrow().iter().copied()),
				Some(Binding::List(list)) => {
					for item in list.items.borrow().iter() {
						pending.extend(item.subscriptions.iter().copied())
					}
				}
				_ => (),
			}
		}
		closure
	}

	/// Removes a subscription along with every subscription registered while rendering its content.
	pub fn unregister(&mut self, id: SubscriptionId) {
		self.unregister_all(vec![id])
	}

	pub fn unregister_all(&mut self, mut pending: Vec<SubscriptionId>) {
		while let Some(id) = pending.pop() {
			let subscription = match self.subscriptions.remove(&id) {
				Some(subscription) => subscription,
				None => continue,
			};
			trace!(?id, kind = subscription.binding.kind(), "Unregistered.");
			match subscription.binding {
				Binding::Conditional(conditional) => pending.append(&mut mem::take(&mut *conditional.children.borrow_mut())),
				Binding::List(list) => {
					for item in list.items.borrow_mut().iter_mut() {
						pending.append(&mut item.subscriptions)
					}
				}
				Binding::Value | Binding::Attribute(_) => (),
			}
		}
	}
}
