//! The observed data graph.

use crate::{
	observe::ActionContext,
	path::{self, Params},
	Error,
};
use core::fmt::{self, Debug, Display, Formatter};
use hashbrown::HashMap;
use num_traits::ToPrimitive;
use std::rc::Rc;

/// A node of the data graph the engine projects onto the output tree.
///
/// The graph is owned by the [`Engine`](`crate::Engine`).
/// Hosts read and mutate it through an [`Observer`](`crate::Observer`) so that every write is seen by the refresh engine.
#[derive(Clone)]
pub enum Value {
	Undefined,
	Null,
	Bool(bool),
	Number(f64),
	String(String),
	List(Vec<Value>),
	Object(HashMap<String, Value>),
	/// Target of `action-*` attributes.
	Function(Callback),
	/// Re-evaluated against the root on each read.
	Computed(Computed),
}

impl Default for Value {
	fn default() -> Self {
		Self::Undefined
	}
}

/// An event handler stored in the data graph.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&ActionContext) -> Result<(), Error>>);

impl Callback {
	pub fn call(&self, context: &ActionContext) -> Result<(), Error> {
		(self.0)(context)
	}
}

/// A derived value, evaluated against the root of the data graph whenever it's read.
///
/// Declare a dependency from the source path(s) to the computed path so that views of it are refreshed,
/// see [`Engine::declare_dependency`](`crate::Engine::declare_dependency`).
///
/// Plain computed values are read-only. Lists made with [`Value::mapped`] pass writes on to their source.
#[derive(Clone)]
pub struct Computed {
	evaluate: Rc<dyn Fn(&Value) -> Value>,
	mapping: Option<Rc<Mapping>>,
}

impl Computed {
	#[must_use]
	pub fn evaluate(&self, root: &Value) -> Value {
		(self.evaluate)(root)
	}

	pub(crate) fn mapping(&self) -> Option<&Rc<Mapping>> {
		self.mapping.as_ref()
	}
}

/// Write-back of a mapped list.
pub(crate) struct Mapping {
	/// Canonical path of the source list.
	pub(crate) source: String,
	/// Item property → source item property.
	pub(crate) writable: HashMap<String, String>,
	/// Turns items added to the mapped list into source items.
	pub(crate) reverse: Rc<dyn Fn(Value) -> Value>,
}

impl Value {
	pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
		Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}

	pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
		Self::List(items.into_iter().collect())
	}

	pub fn function(f: impl Fn(&ActionContext) -> Result<(), Error> + 'static) -> Self {
		Self::Function(Callback(Rc::new(f)))
	}

	pub fn computed(f: impl Fn(&Value) -> Value + 'static) -> Self {
		Self::Computed(Computed {
			evaluate: Rc::new(f),
			mapping: None,
		})
	}

	/// A list computed item by item from the list at the canonical path `source`.
	///
	/// Each item is `transform(source item, index)`, except that the properties named as keys of `writable`
	/// always show (and write to) the source item's property named by the value.
	/// List operations on the mapped list are applied to the source, with added items passed through `reverse` first.
	///
	/// Declare a dependency from `source` to wherever this value is stored so that its views are refreshed.
	pub fn mapped<K: Into<String>>(
		source: impl Into<String>,
		transform: impl Fn(&Value, usize) -> Value + 'static,
		writable: impl IntoIterator<Item = (K, K)>,
		reverse: impl Fn(Value) -> Value + 'static,
	) -> Self {
		let mapping = Rc::new(Mapping {
			source: source.into(),
			writable: writable.into_iter().map(|(prop, source_prop)| (prop.into(), source_prop.into())).collect(),
			reverse: Rc::new(reverse),
		});
		let evaluate = {
			let mapping = Rc::clone(&mapping);
			move |root: &Value| match path::read(&mapping.source, root, &Params::default()) {
				Value::List(items) => Value::List(
					items
						.iter()
						.enumerate()
						.map(|(index, item)| {
							let mut mapped = transform(item, index);
							if let Value::Object(entries) = &mut mapped {
								for (prop, source_prop) in &mapping.writable {
									let shown = item.segment(source_prop).map_or(Value::Undefined, |segment| match segment {
										Segment::Borrowed(value) => value.clone(),
										Segment::Length(len) => len.into(),
									});
									entries.insert(prop.clone(), shown);
								}
							}
							mapped
						})
						.collect(),
				),
				_ => Value::Undefined,
			}
		};
		Self::Computed(Computed {
			evaluate: Rc::new(evaluate),
			mapping: Some(mapping),
		})
	}

	#[must_use]
	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	/// Objects and lists. Writing one of these replaces a whole subtree.
	#[must_use]
	pub fn is_compound(&self) -> bool {
		matches!(self, Value::List(_) | Value::Object(_))
	}

	#[must_use]
	pub fn as_bool(&self) -> Option<bool> {
		match *self {
			Value::Bool(b) => Some(b),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(s) => Some(s),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_f64(&self) -> Option<f64> {
		match *self {
			Value::Number(n) => Some(n),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_list(&self) -> Option<&[Value]> {
		match self {
			Value::List(items) => Some(items),
			_ => None,
		}
	}

	/// Name of the variant, for diagnostics.
	#[must_use]
	pub fn kind(&self) -> &'static str {
		match self {
			Value::Undefined => "undefined",
			Value::Null => "null",
			Value::Bool(_) => "boolean",
			Value::Number(_) => "number",
			Value::String(_) => "string",
			Value::List(_) => "list",
			Value::Object(_) => "object",
			Value::Function(_) => "function",
			Value::Computed(_) => "computed",
		}
	}

	/// Property or index access. Lists also answer `length`.
	pub(crate) fn segment(&self, segment: &str) -> Option<Segment<'_>> {
		match self {
			Value::Object(entries) => entries.get(segment).map(Segment::Borrowed),
			Value::List(items) if segment == "length" => Some(Segment::Length(items.len())),
			Value::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)).map(Segment::Borrowed),
			_ => None,
		}
	}

	pub(crate) fn segment_mut(&mut self, segment: &str) -> Option<&mut Value> {
		match self {
			Value::Object(entries) => entries.get_mut(segment),
			Value::List(items) => match segment.parse::<usize>() {
				Ok(i) => items.get_mut(i),
				Err(_) => None,
			},
			_ => None,
		}
	}
}

pub(crate) enum Segment<'a> {
	Borrowed(&'a Value),
	Length(usize),
}

impl Debug for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Value::Undefined => f.write_str("Undefined"),
			Value::Null => f.write_str("Null"),
			Value::Bool(b) => write!(f, "Bool({:?})", b),
			Value::Number(n) => write!(f, "Number({:?})", n),
			Value::String(s) => write!(f, "String({:?})", s),
			Value::List(items) => f.debug_list().entries(items).finish(),
			Value::Object(entries) => f.debug_map().entries(entries).finish(),
			Value::Function(_) => f.write_str("Function(..)"),
			Value::Computed(_) => f.write_str("Computed(..)"),
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			#[allow(clippy::float_cmp)]
			(Value::Number(a), Value::Number(b)) => a == b,
			(Value::String(a), Value::String(b)) => a == b,
			(Value::List(a), Value::List(b)) => a == b,
			(Value::Object(a), Value::Object(b)) => a == b,
			(Value::Function(a), Value::Function(b)) => Rc::ptr_eq(&a.0, &b.0),
			(Value::Computed(a), Value::Computed(b)) => Rc::ptr_eq(&a.evaluate, &b.evaluate),
			_ => false,
		}
	}
}

/// The text written into the output tree for this value.
impl Display for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Value::Undefined => Ok(()),
			Value::Null => f.write_str("null"),
			Value::Bool(b) => Display::fmt(b, f),
			Value::Number(n) => fmt_number(*n, f),
			Value::String(s) => f.write_str(s),
			Value::List(items) => {
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(",")?;
					}
					Display::fmt(item, f)?;
				}
				Ok(())
			}
			Value::Object(_) => f.write_str("[object Object]"),
			Value::Function(_) => f.write_str("[function]"),
			Value::Computed(_) => f.write_str("[computed]"),
		}
	}
}

fn fmt_number(n: f64, f: &mut Formatter<'_>) -> fmt::Result {
	if n.is_nan() {
		f.write_str("NaN")
	} else if n.is_infinite() {
		f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
	} else if n.fract() == 0.0 && n.abs() < 1e21 {
		match n.to_i64() {
			Some(i) => Display::fmt(&i, f),
			None => Display::fmt(&n, f),
		}
	} else {
		Display::fmt(&n, f)
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<f64> for Value {
	fn from(n: f64) -> Self {
		Self::Number(n)
	}
}

impl From<i32> for Value {
	fn from(n: i32) -> Self {
		Self::Number(n.into())
	}
}

impl From<i64> for Value {
	fn from(n: i64) -> Self {
		Self::Number(n.to_f64().unwrap_or(f64::NAN))
	}
}

impl From<usize> for Value {
	fn from(n: usize) -> Self {
		Self::Number(n.to_f64().unwrap_or(f64::NAN))
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::String(s.to_owned())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::String(s)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Self::List(items)
	}
}

impl From<serde_json::Value> for Value {
	fn from(json: serde_json::Value) -> Self {
		match json {
			serde_json::Value::Null => Value::Null,
			serde_json::Value::Bool(b) => Value::Bool(b),
			serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
			serde_json::Value::String(s) => Value::String(s),
			serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
			serde_json::Value::Object(entries) => Value::Object(entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn text_follows_host_string_conversion() {
		assert_eq!(Value::from(1).to_string(), "1");
		assert_eq!(Value::from(1.5).to_string(), "1.5");
		assert_eq!(Value::from(-0.0).to_string(), "0");
		assert_eq!(Value::from(true).to_string(), "true");
		assert_eq!(Value::Null.to_string(), "null");
		assert_eq!(Value::Undefined.to_string(), "");
		assert_eq!(Value::from(json!([1, "a", false])).to_string(), "1,a,false");
		assert_eq!(Value::from(json!({})).to_string(), "[object Object]");
	}

	#[test]
	fn lists_answer_length_and_indices() {
		let list = Value::from(json!(["a", "b"]));
		assert!(matches!(list.segment("length"), Some(Segment::Length(2))));
		assert!(matches!(list.segment("1"), Some(Segment::Borrowed(Value::String(s))) if s == "b"));
		assert!(list.segment("2").is_none());
		assert!(list.segment("x").is_none());
	}

	#[test]
	fn functions_compare_by_identity() {
		let f = Value::function(|_| Ok(()));
		assert_eq!(f, f.clone());
		assert_ne!(f, Value::function(|_| Ok(())));
	}
}
