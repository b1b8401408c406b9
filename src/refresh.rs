//! Patching the output tree after a change.

use crate::{
	engine::State,
	error::ResultExt,
	registry::{Binding, ListBinding, SubscriptionId},
	Error, OutputTree, Value,
};
use num_traits::ToPrimitive;
use std::rc::Rc;
use tracing::{trace, trace_span};

/// One mutation of the data graph, in terms of canonical paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeDescriptor {
	pub path: String,
	pub operation: Operation,
}

/// For [`Operation::Splice`], `start` is normalised against the list's length before the mutation
/// and `delete_count` is the number of items actually removed.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
	/// The value at the path was overwritten.
	Update,
	Push { items: Vec<Value> },
	Pop,
	Shift,
	Unshift { items: Vec<Value> },
	Splice { start: usize, delete_count: usize, items: Vec<Value> },
}

impl Operation {
	#[must_use]
	pub fn name(&self) -> &'static str {
		match self {
			Operation::Update => "update",
			Operation::Push { .. } => "push",
			Operation::Pop => "pop",
			Operation::Shift => "shift",
			Operation::Unshift { .. } => "unshift",
			Operation::Splice { .. } => "splice",
		}
	}

	/// `len` is the list's length after the mutation.
	fn plan(&self, len: usize) -> Plan {
		match self {
			Operation::Update => Plan::default(),
			Operation::Push { items } => Plan {
				insert: range(len.saturating_sub(items.len()), items.len()),
				..Plan::default()
			},
			Operation::Pop => Plan {
				delete: Some((len, 1)),
				..Plan::default()
			},
			Operation::Shift => Plan {
				delete: Some((0, 1)),
				reindex: Some((1, -1, len)),
				..Plan::default()
			},
			Operation::Unshift { items } => {
				let previous = len.saturating_sub(items.len());
				Plan {
					insert: range(0, items.len()),
					reindex: (previous > 0).then(|| (0, delta(items.len(), 0), previous - 1)),
					..Plan::default()
				}
			}
			&Operation::Splice { start, delete_count, ref items } => {
				let previous = (len + delete_count).saturating_sub(items.len());
				let tail = start + delete_count;
				Plan {
					delete: range(start, delete_count),
					insert: range(start, items.len()),
					reindex: (items.len() != delete_count && previous > tail).then(|| (tail, delta(items.len(), delete_count), previous - 1)),
				}
			}
		}
	}
}

/// Index arithmetic for one structural change.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Plan {
	/// `(start, count)`
	delete: Option<(usize, usize)>,
	/// `(start, count)`
	insert: Option<(usize, usize)>,
	/// `(start, shift, max)`
	reindex: Option<(usize, isize, usize)>,
}

/// Whether `at` lies below one of the items of the list at `path`.
fn below_index(path: &str, at: &str) -> bool {
	at.get(path.len() + 1..)
		.and_then(|rest| rest.split('.').next())
		.map_or(false, |segment| segment.parse::<usize>().is_ok())
}

fn range(start: usize, count: usize) -> Option<(usize, usize)> {
	(count > 0).then(|| (start, count))
}

fn delta(inserted: usize, deleted: usize) -> isize {
	if inserted >= deleted {
		(inserted - deleted).to_isize().unwrap_or(isize::MAX)
	} else {
		-(deleted - inserted).to_isize().unwrap_or(isize::MAX)
	}
}

impl<T: OutputTree + 'static> State<T> {
	/// Patches everything showing `change.path`, then everything derived from it.
	pub(crate) fn refresh(&mut self, change: &ChangeDescriptor) -> Result<(), Error> {
		let span = trace_span!("refresh", path = change.path.as_str(), operation = change.operation.name());
		let _enter = span.enter();

		self.apply(change)?;
		for dependent in self.dependencies.matches(&change.path) {
			let change = ChangeDescriptor {
				path: dependent,
				operation: change.operation.clone(),
			};
			self.apply(&change).context(|| format!("while refreshing dependent {:?}", change.path))?;
		}
		Ok(())
	}

	fn apply(&mut self, change: &ChangeDescriptor) -> Result<(), Error> {
		let path = change.path.as_str();
		if let Operation::Update = change.operation {
			return self.apply_update(path);
		}

		let plan = self.read(path).as_list().map_or_else(Plan::default, |items| change.operation.plan(items.len()));
		trace!(path, ?plan, "Structural change.");

		// Only what the items rendered moves with them. Anything else below the list is re-read in place.
		let views = self.registry.lookup(path).unwrap_or_default();
		let owned = self.registry.scope_closure(views.iter().copied());
		let fixed: Vec<_> = self
			.registry
			.descendants(path)
			.into_iter()
			.filter(|(at, id)| !(owned.contains(id) && below_index(path, at)))
			.collect();

		if let Some((start, count)) = plan.delete {
			self.registry.delete_range(path, start, count, &owned)
		}
		if let Some((start, shift, max)) = plan.reindex {
			self.registry.reindex(path, start, shift, max, &owned)
		}

		for id in views {
			let list = match self.registry.get(id).map(|subscription| &subscription.binding) {
				Some(Binding::List(list)) => Some(Rc::clone(list)),
				Some(_) => None,
				None => continue,
			};
			match list {
				Some(list) => self
					.splice_items(&list, plan)
					.context(|| format!("in <EACH of={:?} as={:?}>", list.node.of, list.node.r#as))?,
				// A non-list view of the list, like `<GET>todos</GET>`.
				None => self.update(path, id)?,
			}
		}

		for (at, id) in fixed {
			self.update(&at, id)?
		}
		Ok(())
	}

	fn apply_update(&mut self, path: &str) -> Result<(), Error> {
		let below = if self.read(path).is_compound() {
			self.registry.descendants(path)
		} else {
			Vec::new()
		};

		let direct = self.registry.lookup(path).unwrap_or_default();
		if direct.is_empty() && below.is_empty() {
			trace!(path, "Nothing shows this path.");
		}
		for id in direct {
			self.update(path, id)?
		}
		for (path, id) in below {
			self.update(&path, id)?
		}
		Ok(())
	}

	/// Re-runs exactly the routine `id`'s binding calls for. Subscriptions removed by an earlier update are skipped.
	fn update(&mut self, path: &str, id: SubscriptionId) -> Result<(), Error> {
		let (artifact, binding) = match self.registry.get(id) {
			Some(subscription) => (subscription.artifact.clone(), subscription.binding.clone()),
			None => return Ok(()),
		};
		let span = if cfg!(feature = "log-paths") {
			trace_span!("update", kind = binding.kind(), path, ?id)
		} else {
			trace_span!("update", kind = binding.kind(), ?id)
		};
		let _enter = span.enter();

		let value = self.read(path);
		if cfg!(feature = "dangerous-logging") {
			trace!(?value, "Updating.");
		}
		match binding {
			Binding::Value => {
				self.tree.set_text_content(&artifact, &value.to_string());
				Ok(())
			}
			Binding::Attribute(target) => self.apply_target(&artifact, &target, &value),
			Binding::Conditional(conditional) => self
				.paint_conditional(&artifact, &conditional, &value)
				.context(|| format!("in <IF test={:?}>", conditional.node.test)),
			Binding::List(list) => self
				.replace_items(&list)
				.context(|| format!("in <EACH of={:?} as={:?}>", list.node.of, list.node.r#as)),
		}
	}

	/// Removes the doomed items and renders the inserted ones. Everything else stays untouched.
	fn splice_items(&mut self, list: &Rc<ListBinding<T::Node>>, plan: Plan) -> Result<(), Error> {
		if let Some((start, count)) = plan.delete {
			self.remove_items(list, start, count)
		}
		if let Some((start, count)) = plan.insert {
			self.render_items(list, start, count)?
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn item_levels() {
		assert!(below_index("todos", "todos.0.text"));
		assert!(below_index("a.todos", "a.todos.12"));
		assert!(!below_index("todos", "todos.length"));
		assert!(!below_index("todos", "todos"));
	}

	fn items(n: usize) -> Vec<Value> {
		(0..n).map(Value::from).collect()
	}

	#[test]
	fn push_and_pop() {
		assert_eq!(
			Operation::Push { items: items(2) }.plan(5),
			Plan {
				insert: Some((3, 2)),
				..Plan::default()
			}
		);
		assert_eq!(
			Operation::Pop.plan(4),
			Plan {
				delete: Some((4, 1)),
				..Plan::default()
			}
		);
	}

	#[test]
	fn shift_and_unshift_reindex_the_rest() {
		assert_eq!(
			Operation::Shift.plan(3),
			Plan {
				delete: Some((0, 1)),
				reindex: Some((1, -1, 3)),
				..Plan::default()
			}
		);
		assert_eq!(
			Operation::Unshift { items: items(2) }.plan(5),
			Plan {
				insert: Some((0, 2)),
				reindex: Some((0, 2, 2)),
				..Plan::default()
			}
		);
		assert_eq!(
			Operation::Unshift { items: items(2) }.plan(2),
			Plan {
				insert: Some((0, 2)),
				..Plan::default()
			}
		);
	}

	#[test]
	fn splice() {
		// [a b c d e].splice(1, 2, x) → [a x d e]
		assert_eq!(
			Operation::Splice {
				start: 1,
				delete_count: 2,
				items: items(1)
			}
			.plan(4),
			Plan {
				delete: Some((1, 2)),
				insert: Some((1, 1)),
				reindex: Some((3, -1, 4)),
			}
		);
		// [a b].splice(1, 0, x, y) → [a x y b]
		assert_eq!(
			Operation::Splice {
				start: 1,
				delete_count: 0,
				items: items(2)
			}
			.plan(4),
			Plan {
				insert: Some((1, 2)),
				reindex: Some((1, 2, 1)),
				..Plan::default()
			}
		);
		// [a b c].splice(1, 1, x) → [a x c]
		assert_eq!(
			Operation::Splice {
				start: 1,
				delete_count: 1,
				items: items(1)
			}
			.plan(3),
			Plan {
				delete: Some((1, 1)),
				insert: Some((1, 1)),
				..Plan::default()
			}
		);
		// [a b c].splice(1) → [a]
		assert_eq!(
			Operation::Splice {
				start: 1,
				delete_count: 2,
				items: vec![]
			}
			.plan(1),
			Plan {
				delete: Some((1, 2)),
				..Plan::default()
			}
		);
	}
}
