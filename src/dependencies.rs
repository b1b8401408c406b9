//! Declared derivations between canonical paths.

use hashbrown::HashSet;
use std::collections::VecDeque;
use tracing::{trace, warn};

/// Source path → paths computed from it, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
	declarations: Vec<(String, Vec<String>)>,
}

impl Dependencies {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds to any earlier declaration for the same source.
	pub fn declare(&mut self, source: impl Into<String>, dependents: impl IntoIterator<Item = impl Into<String>>) {
		let source = source.into();
		let dependents = dependents.into_iter().map(Into::into);
		match self.declarations.iter_mut().find(|(s, _)| *s == source) {
			Some((_, existing)) => {
				for dependent in dependents {
					if !existing.contains(&dependent) {
						existing.push(dependent)
					}
				}
			}
			None => self.declarations.push((source, dependents.collect())),
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.declarations.is_empty()
	}

	fn direct(&self, path: &str, out: &mut Vec<String>) {
		for (source, dependents) in &self.declarations {
			if path == source {
				out.extend(dependents.iter().cloned())
			} else if let Some(suffix) = path.strip_prefix(source.as_str()).filter(|suffix| suffix.starts_with('.')) {
				out.extend(dependents.iter().map(|dependent| format!("{}{}", dependent, suffix)))
			}
		}
	}

	/// Every path derived from `changed`, directly or transitively, each exactly once.
	///
	/// A change below a declared source matches too, with the remainder appended to each dependent
	/// (`model.people.0.name` → `pretty.0.name` for `model.people → pretty`).
	#[must_use]
	pub fn matches(&self, changed: &str) -> Vec<String> {
		if self.declarations.is_empty() {
			return Vec::new();
		}

		let mut visited = HashSet::new();
		visited.insert(changed.to_owned());
		let mut matches = Vec::new();
		let mut queue = VecDeque::new();
		queue.push_back(changed.to_owned());

		let mut direct = Vec::new();
		while let Some(path) = queue.pop_front() {
			self.direct(&path, &mut direct);
			for dependent in direct.drain(..) {
				if dependent == changed {
					warn!(changed, via = %path, "Cyclic dependency declaration. Ignoring the cycle.");
				} else if visited.insert(dependent.clone()) {
					matches.push(dependent.clone());
					queue.push_back(dependent);
				}
			}
		}

		trace!(changed, count = matches.len(), "Matched dependencies.");
		matches
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exact_and_nested_matches() {
		let mut dependencies = Dependencies::new();
		dependencies.declare("model.people", vec!["pretty"]);
		dependencies.declare("model.first", vec!["full", "initials"]);

		assert_eq!(dependencies.matches("model.first"), ["full", "initials"]);
		assert_eq!(dependencies.matches("model.people.0.name"), ["pretty.0.name"]);
		assert!(dependencies.matches("model.peopleCount").is_empty());
		assert!(dependencies.matches("model").is_empty());
	}

	#[test]
	fn transitive_closure_visits_each_path_once() {
		let mut dependencies = Dependencies::new();
		dependencies.declare("a", vec!["b", "c"]);
		dependencies.declare("b", vec!["d"]);
		dependencies.declare("c", vec!["d"]);
		dependencies.declare("d", vec!["e"]);

		assert_eq!(dependencies.matches("a"), ["b", "c", "d", "e"]);
	}

	#[test]
	fn cycles_terminate() {
		let mut dependencies = Dependencies::new();
		dependencies.declare("a", vec!["b"]);
		dependencies.declare("b", vec!["c"]);
		dependencies.declare("c", vec!["a", "b"]);

		assert_eq!(dependencies.matches("a"), ["b", "c"]);
	}

	#[test]
	fn redeclaration_merges() {
		let mut dependencies = Dependencies::new();
		dependencies.declare("a", vec!["b"]);
		dependencies.declare("a", vec!["b", "c"]);
		assert_eq!(dependencies.matches("a"), ["b", "c"]);
	}
}
