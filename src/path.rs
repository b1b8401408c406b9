//! Key resolution.
//!
//! Templates refer to data relative to the iteration variables in scope (`t.text` inside `<each of="todos" as="t">`).
//! Subscriptions and change descriptors only ever use canonical paths (`todos.2.text`), which this module produces.

use crate::{
	value::{Mapping, Segment},
	Error, Value,
};
use hashbrown::HashMap;
use std::{borrow::Cow, cell::Cell, rc::Rc};
use tracing::{trace, warn};

/// One active iteration binding.
///
/// The list reference is kept as written (after indirection) and resolved against the enclosing bindings on use,
/// and the index is shared with the owning list binding, which keeps it equal to the item's live position.
/// Both together keep saved stacks valid across structural list changes.
#[derive(Debug, Clone)]
pub struct ContextEntry {
	of: Rc<str>,
	index: Rc<Cell<usize>>,
}

impl ContextEntry {
	pub(crate) fn new(of: Rc<str>, index: Rc<Cell<usize>>) -> Self {
		Self { of, index }
	}

	#[must_use]
	pub fn of(&self) -> &str {
		&self.of
	}

	#[must_use]
	pub fn index(&self) -> usize {
		self.index.get()
	}
}

/// Iteration variable name → [`ContextEntry`], outermost first.
#[derive(Debug, Clone, Default)]
pub struct ContextStack {
	entries: Vec<(Rc<str>, ContextEntry)>,
}

impl ContextStack {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// # Errors
	///
	/// Iff the stack already holds `max_depth` entries.
	pub fn with(&self, name: &str, entry: ContextEntry, max_depth: usize) -> Result<Self, Error> {
		if self.entries.len() >= max_depth {
			return Err(Error::invalid_template(format!(
				"iteration nesting deeper than {} (binding {:?})",
				max_depth, name
			)));
		}
		let mut entries = self.entries.clone();
		entries.push((name.into(), entry));
		Ok(Self { entries })
	}

	/// The innermost iteration variable and its entry.
	#[must_use]
	pub fn innermost(&self) -> Option<(&str, &ContextEntry)> {
		self.entries.last().map(|(name, entry)| (&**name, entry))
	}
}

/// Caller-supplied `TEMPLATE-USE` parameters. Matched only against the first segment of a reference, and never decomposed.
#[derive(Debug, Clone, Default)]
pub struct Params(Rc<HashMap<String, Value>>);

impl Params {
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.0.get(name)
	}

	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.0.contains_key(name)
	}

	/// Inherits all parameters of `self`, with `entries` taking precedence.
	#[must_use]
	pub fn overlay(&self, entries: impl IntoIterator<Item = (String, Value)>) -> Self {
		let mut entries = entries.into_iter().peekable();
		if entries.peek().is_none() {
			return self.clone();
		}
		let mut map = (*self.0).clone();
		map.extend(entries);
		Self(Rc::new(map))
	}
}

fn split_first(key: &str) -> (&str, Option<&str>) {
	match key.find('.') {
		Some(i) => (&key[..i], Some(&key[i + 1..])),
		None => (key, None),
	}
}

/// Rewrites a leading iteration variable into `<list path>.<index>`, repeatedly, until the key no longer starts with one.
///
/// Each rewrite only considers bindings declared outside the one just used,
/// so the loop runs at most once per stack entry even when variable names shadow each other.
#[must_use]
pub fn resolve_relative(key: &str, context: &ContextStack) -> String {
	let mut key = key.to_owned();
	let mut visible = context.entries.len();
	loop {
		let (first, rest) = split_first(&key);
		let position = match context.entries[..visible].iter().rposition(|(name, _)| &**name == first) {
			Some(position) => position,
			None => return key,
		};
		let entry = &context.entries[position].1;
		key = match rest {
			Some(rest) => format!("{}.{}.{}", entry.of, entry.index(), rest),
			None => format!("{}.{}", entry.of, entry.index()),
		};
		visible = position;
	}
}

/// Applies `*name` indirection: the named parameter holds the actual reference.
///
/// # Errors
///
/// Iff `key` is indirect but doesn't name a string parameter.
pub fn dereference<'a>(key: &'a str, params: &Params) -> Result<Cow<'a, str>, Error> {
	let name = match key.strip_prefix('*') {
		Some(name) => name,
		None => return Ok(Cow::Borrowed(key)),
	};
	match params.get(name) {
		Some(Value::String(reference)) => Ok(Cow::Owned(reference.clone())),
		Some(other) => Err(Error::invalid_template(format!(
			"indirect reference {:?} must name a string parameter, but it's a {}",
			key,
			other.kind()
		))),
		None => Err(Error::invalid_template(format!("indirect reference {:?} doesn't name a declared parameter", key))),
	}
}

fn evaluate<'a>(value: Cow<'a, Value>, root: &Value) -> Cow<'a, Value> {
	if let Value::Computed(computed) = &*value {
		return Cow::Owned(computed.evaluate(root));
	}
	value
}

fn step<'a>(value: Cow<'a, Value>, segment: &str) -> Option<Cow<'a, Value>> {
	match value {
		Cow::Borrowed(value) => value.segment(segment).map(|next| match next {
			Segment::Borrowed(next) => Cow::Borrowed(next),
			Segment::Length(len) => Cow::Owned(len.into()),
		}),
		Cow::Owned(value) => value.segment(segment).map(|next| {
			Cow::Owned(match next {
				Segment::Borrowed(next) => next.clone(),
				Segment::Length(len) => len.into(),
			})
		}),
	}
}

/// Reads the value at a canonical path.
///
/// A parameter named by the first segment wins over the data graph.
/// Missing data degrades to [`Value::Undefined`], since templates may refer to optional data.
#[must_use]
pub fn read(path: &str, data: &Value, params: &Params) -> Value {
	if path.is_empty() {
		return evaluate(Cow::Borrowed(data), data).into_owned();
	}

	let (first, _) = split_first(path);
	if let Some(param) = params.get(first) {
		return param.clone();
	}

	let mut current = Cow::Borrowed(data);
	let mut segments = path.split('.').peekable();
	while let Some(segment) = segments.next() {
		current = match step(evaluate(current, data), segment) {
			Some(next) => next,
			None => {
				if segments.peek().is_some() {
					warn!(path, segment, "Missing intermediate segment; reading as undefined.");
				} else {
					trace!(path, "Reading missing value as undefined.");
				}
				return Value::Undefined;
			}
		};
	}
	evaluate(current, data).into_owned()
}

/// Overwrites the value at a canonical path.
///
/// Unlike [`read`], this is strict: every segment but the last must exist.
///
/// # Errors
///
/// [`Error::PathNotFound`] for a missing intermediate segment (or list index), [`Error::ReadOnly`] when passing through a computed value.
pub fn write(path: &str, data: &mut Value, value: Value) -> Result<(), Error> {
	if path.is_empty() {
		return Err(Error::PathNotFound {
			path: String::new(),
			segment: String::new(),
		});
	}
	let (parent, last) = match path.rfind('.') {
		Some(i) => (Some(&path[..i]), &path[i + 1..]),
		None => (None, path),
	};
	let not_found = |segment: &str| Error::PathNotFound {
		path: path.to_owned(),
		segment: segment.to_owned(),
	};
	let read_only = || Error::ReadOnly { path: path.to_owned() };

	let mut target = data;
	for segment in parent.into_iter().flat_map(|parent| parent.split('.')) {
		if let Value::Computed(_) = target {
			return Err(read_only());
		}
		target = match target.segment_mut(segment) {
			Some(next) => next,
			None => return Err(not_found(segment)),
		};
	}

	match target {
		Value::Object(entries) => {
			if let Some(Value::Computed(_)) = entries.get(last) {
				return Err(read_only());
			}
			entries.insert(last.to_owned(), value);
			Ok(())
		}
		Value::List(items) => {
			let slot = match last.parse::<usize>() {
				Ok(i) => items.get_mut(i),
				Err(_) => None,
			};
			match slot {
				Some(Value::Computed(_)) => Err(read_only()),
				Some(slot) => {
					*slot = value;
					Ok(())
				}
				None => Err(not_found(last)),
			}
		}
		Value::Computed(_) => Err(read_only()),
		_ => Err(not_found(last)),
	}
}

/// Strict mutable access, for list operations.
///
/// # Errors
///
/// Like [`write`].
pub fn get_mut<'a>(path: &str, data: &'a mut Value) -> Result<&'a mut Value, Error> {
	let mut target = data;
	for segment in path.split('.').filter(|_| !path.is_empty()) {
		if let Value::Computed(_) = target {
			return Err(Error::ReadOnly { path: path.to_owned() });
		}
		target = match target.segment_mut(segment) {
			Some(next) => next,
			None => {
				return Err(Error::PathNotFound {
					path: path.to_owned(),
					segment: segment.to_owned(),
				})
			}
		};
	}
	match target {
		Value::Computed(_) => Err(Error::ReadOnly { path: path.to_owned() }),
		target => Ok(target),
	}
}

/// Where a change to a path through a mapped list lands instead.
#[derive(Clone)]
pub(crate) enum Redirect {
	/// A writable property of a mapped item, as its path in the source.
	Item(String),
	/// The mapped list itself.
	List { source: String, mapping: Rc<Mapping> },
}

/// Finds the first computed value along `path`. Plain ones leave the target alone, so that [`write`] rejects it.
///
/// # Errors
///
/// [`Error::ReadOnly`] for anything inside a mapped list but its writable item properties.
pub(crate) fn redirect(path: &str, data: &Value) -> Result<Option<Redirect>, Error> {
	let segments: Vec<&str> = path.split('.').filter(|_| !path.is_empty()).collect();
	let mut current = Cow::Borrowed(data);
	for (consumed, segment) in segments.iter().copied().map(Some).chain(Some(None)).enumerate() {
		if let Value::Computed(computed) = &*current {
			let mapping = match computed.mapping() {
				Some(mapping) => mapping,
				None => return Ok(None),
			};
			return match segments[consumed..] {
				[] => Ok(Some(Redirect::List {
					source: mapping.source.clone(),
					mapping: Rc::clone(mapping),
				})),
				[index, prop] if index.parse::<usize>().is_ok() => match mapping.writable.get(prop) {
					Some(source_prop) => Ok(Some(Redirect::Item(format!("{}.{}.{}", mapping.source, index, source_prop)))),
					None => Err(Error::ReadOnly { path: path.to_owned() }),
				},
				_ => Err(Error::ReadOnly { path: path.to_owned() }),
			};
		}
		let segment = match segment {
			Some(segment) => segment,
			None => return Ok(None),
		};
		current = match step(current, segment) {
			Some(next) => next,
			None => return Ok(None),
		};
	}
	Ok(None)
}

/// A reference resolved against its rendering environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
	pub path: String,
	pub value: Value,
	/// The path names a parameter, which is static and therefore never observed.
	pub from_param: bool,
}

/// Indirection, then context rewriting, then [`read`].
///
/// # Errors
///
/// See [`dereference`].
pub fn resolve(key: &str, data: &Value, context: &ContextStack, params: &Params) -> Result<Resolved, Error> {
	let key = dereference(key, params)?;
	let path = resolve_relative(&key, context);
	let value = read(&path, data, params);
	let from_param = params.contains(split_first(&path).0);
	Ok(Resolved { path, value, from_param })
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn entry(of: &str, index: usize) -> ContextEntry {
		ContextEntry::new(of.into(), Rc::new(Cell::new(index)))
	}

	#[test]
	fn relative_keys_resolve_through_nested_bindings() {
		let context = ContextStack::new()
			.with("t", entry("todos", 2), 8)
			.unwrap()
			.with("tag", entry("t.tags", 1), 8)
			.unwrap();

		assert_eq!(resolve_relative("tag", &context), "todos.2.tags.1");
		assert_eq!(resolve_relative("tag.label", &context), "todos.2.tags.1.label");
		assert_eq!(resolve_relative("t.completed", &context), "todos.2.completed");
		assert_eq!(resolve_relative("filter", &context), "filter");
	}

	#[test]
	fn shadowed_names_terminate() {
		let context = ContextStack::new()
			.with("x", entry("tree", 0), 8)
			.unwrap()
			.with("x", entry("x.children", 3), 8)
			.unwrap();

		assert_eq!(resolve_relative("x.name", &context), "tree.0.children.3.name");
	}

	#[test]
	fn shared_index_cells_track_moves() {
		let index = Rc::new(Cell::new(4));
		let context = ContextStack::new().with("t", ContextEntry::new("todos".into(), Rc::clone(&index)), 8).unwrap();
		index.set(1);
		assert_eq!(resolve_relative("t.text", &context), "todos.1.text");
	}

	#[test]
	fn nesting_is_bounded() {
		let context = ContextStack::new().with("a", entry("l", 0), 1).unwrap();
		assert!(matches!(context.with("b", entry("a.l", 0), 1), Err(Error::InvalidTemplate(_))));
	}

	#[test]
	fn reads_degrade_to_undefined() {
		let data = Value::from(json!({ "user": { "name": "Ada" }, "todos": [{ "text": "a" }] }));
		let params = Params::default();

		assert_eq!(read("user.name", &data, &params), Value::from("Ada"));
		assert_eq!(read("todos.0.text", &data, &params), Value::from("a"));
		assert_eq!(read("todos.length", &data, &params), Value::from(1));
		assert_eq!(read("user.email", &data, &params), Value::Undefined);
		assert_eq!(read("account.owner.name", &data, &params), Value::Undefined);
		assert_eq!(read("todos.5.text", &data, &params), Value::Undefined);
	}

	#[test]
	fn params_shadow_data_at_the_first_segment_only() {
		let data = Value::from(json!({ "title": "data", "nested": { "title": "nested" } }));
		let params = Params::default().overlay(vec![("title".to_owned(), Value::from("param"))]);

		assert_eq!(read("title", &data, &params), Value::from("param"));
		assert_eq!(read("title.whatever", &data, &params), Value::from("param"));
		assert_eq!(read("nested.title", &data, &params), Value::from("nested"));
	}

	#[test]
	fn computed_values_are_evaluated_against_the_root() {
		let mut data = Value::from(json!({ "first": "Ada", "last": "Lovelace" }));
		if let Value::Object(entries) = &mut data {
			entries.insert(
				"full".to_owned(),
				Value::computed(|root| Value::from(format!("{} {}", read("first", root, &Params::default()), read("last", root, &Params::default())))),
			);
		}

		assert_eq!(read("full", &data, &Params::default()), Value::from("Ada Lovelace"));
		assert_eq!(write("full", &mut data, Value::from("x")), Err(Error::ReadOnly { path: "full".to_owned() }));
	}

	#[test]
	fn writes_are_strict() {
		let mut data = Value::from(json!({ "todos": [{ "completed": false }] }));

		write("todos.0.completed", &mut data, Value::from(true)).unwrap();
		assert_eq!(read("todos.0.completed", &data, &Params::default()), Value::from(true));

		write("todos.0.note", &mut data, Value::from("new")).unwrap();
		assert_eq!(read("todos.0.note", &data, &Params::default()), Value::from("new"));

		assert_eq!(
			write("todos.3.completed", &mut data, Value::from(true)),
			Err(Error::PathNotFound {
				path: "todos.3.completed".to_owned(),
				segment: "3".to_owned()
			})
		);
		assert!(matches!(write("missing.flag", &mut data, Value::from(true)), Err(Error::PathNotFound { .. })));
		assert!(matches!(write("todos.7", &mut data, Value::Null), Err(Error::PathNotFound { .. })));
	}

	#[test]
	fn strict_access_reaches_lists() {
		let mut data = Value::from(json!({ "todos": [] }));
		assert!(matches!(get_mut("todos", &mut data), Ok(Value::List(_))));
		assert!(matches!(get_mut("todos.0", &mut data), Err(Error::PathNotFound { .. })));
		assert!(matches!(get_mut("", &mut data), Ok(Value::Object(_))));
	}

	#[test]
	fn indirection_requires_a_string_parameter() {
		let params = Params::default().overlay(vec![("list".to_owned(), Value::from("todos")), ("count".to_owned(), Value::from(3))]);

		assert_eq!(dereference("*list", &params).unwrap(), "todos");
		assert_eq!(dereference("plain.key", &params).unwrap(), "plain.key");
		assert!(matches!(dereference("*count", &params), Err(Error::InvalidTemplate(_))));
		assert!(matches!(dereference("*nope", &params), Err(Error::InvalidTemplate(_))));
	}

	#[test]
	fn resolve_marks_parameter_paths() {
		let data = Value::from(json!({ "todos": ["a"] }));
		let params = Params::default().overlay(vec![("label".to_owned(), Value::from("Todos"))]);
		let context = ContextStack::new().with("t", entry("todos", 0), 8).unwrap();

		let resolved = resolve("t", &data, &context, &params).unwrap();
		assert_eq!(resolved.path, "todos.0");
		assert_eq!(resolved.value, Value::from("a"));
		assert!(!resolved.from_param);

		assert!(resolve("label", &data, &context, &params).unwrap().from_param);
	}
}
