//! The browser [`OutputTree`], over [`web_sys`].

use crate::{closure_map::ClosureMap, output::OutputTree, Error, Value};
use core::cell::RefCell;
use js_sys::{Array, Object, Reflect};
use std::rc::Rc;
use tracing::{instrument, trace, warn};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlElement, Node};

/// Renders into a live [`Document`].
///
/// Event listener closures are released when their node (or an ancestor) is removed through this tree.
/// Nodes removed by other means keep theirs until the [`DomTree`] is dropped.
#[derive(Debug, Clone)]
pub struct DomTree {
	document: Document,
	closures: Rc<RefCell<ClosureMap>>,
}

impl DomTree {
	#[must_use]
	pub fn new(document: Document) -> Self {
		Self {
			document,
			closures: Rc::new(RefCell::new(ClosureMap::new())),
		}
	}

	#[must_use]
	pub fn document(&self) -> &Document {
		&self.document
	}

	/// The number of event listener closures currently kept alive.
	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.closures.borrow().len()
	}
}

fn output_error(what: &str, error: &JsValue) -> Error {
	Error::Output(format!("{}: {:?}", what, error))
}

/// Scalars convert directly. Lists become arrays and objects plain objects. Functions and computed values can't be passed.
#[must_use]
pub fn to_js(value: &Value) -> JsValue {
	match value {
		Value::Undefined | Value::Function(_) | Value::Computed(_) => JsValue::UNDEFINED,
		Value::Null => JsValue::NULL,
		Value::Bool(b) => JsValue::from_bool(*b),
		Value::Number(n) => JsValue::from_f64(*n),
		Value::String(s) => JsValue::from_str(s),
		Value::List(items) => items.iter().map(to_js).collect::<Array>().into(),
		Value::Object(entries) => {
			let object = Object::new();
			for (key, value) in entries {
				if let Err(error) = Reflect::set(&object, &JsValue::from_str(key), &to_js(value)) {
					warn!(key = key.as_str(), ?error, "Could not convert object entry.");
				}
			}
			object.into()
		}
	}
}

/// The inverse of [`to_js`] for scalars and arrays. Other objects read as [`Value::Undefined`].
#[must_use]
pub fn from_js(value: &JsValue) -> Value {
	if value.is_undefined() {
		Value::Undefined
	} else if value.is_null() {
		Value::Null
	} else if let Some(b) = value.as_bool() {
		Value::Bool(b)
	} else if let Some(n) = value.as_f64() {
		Value::Number(n)
	} else if let Some(s) = value.as_string() {
		Value::String(s)
	} else if let Some(array) = value.dyn_ref::<Array>() {
		Value::List(array.iter().map(|item| from_js(&item)).collect())
	} else {
		Value::Undefined
	}
}

impl OutputTree for DomTree {
	type Node = Node;

	fn create_element(&self, name: &str) -> Result<Node, Error> {
		self.document
			.create_element(name)
			.map(Into::into)
			.map_err(|error| output_error(&format!("could not create <{}>", name), &error))
	}

	fn create_text(&self, text: &str) -> Node {
		self.document.create_text_node(text).into()
	}

	fn create_marker(&self) -> Node {
		self.document.create_comment("").into()
	}

	fn create_fragment(&self) -> Node {
		self.document.create_document_fragment().into()
	}

	fn mount(&self, node: &Node, container: &Node, before: Option<&Node>) -> Result<(), Error> {
		container
			.insert_before(node, before)
			.map(drop)
			.map_err(|error| output_error("could not insert node", &error))
	}

	#[instrument(skip(self))]
	fn remove(&self, node: &Node) {
		if let Some(parent) = node.parent_node() {
			if let Err(error) = parent.remove_child(node) {
				warn!(?error, "Failed to remove node.");
			}
		}
		self.closures.borrow_mut().unpublish(node)
	}

	fn parent(&self, node: &Node) -> Option<Node> {
		node.parent_node()
	}

	fn first_child(&self, node: &Node) -> Option<Node> {
		node.first_child()
	}

	fn next_sibling(&self, node: &Node) -> Option<Node> {
		node.next_sibling()
	}

	fn set_text_content(&self, node: &Node, text: &str) {
		node.set_text_content(Some(text))
	}

	fn set_attribute(&self, node: &Node, name: &str, value: &str) -> Result<(), Error> {
		let element = node
			.dyn_ref::<Element>()
			.ok_or_else(|| Error::Output(format!("can't set attribute {:?} on a non-element", name)))?;
		element
			.set_attribute(name, value)
			.map_err(|error| output_error(&format!("could not set attribute {:?}", name), &error))
	}

	fn set_style_property(&self, node: &Node, name: &str, value: &str) {
		let style = match node.dyn_ref::<HtmlElement>() {
			Some(element) => element.style(),
			None => return warn!(name, "Can't style a non-HTML element."),
		};
		let result = if value.is_empty() {
			style.remove_property(name).map(drop)
		} else {
			style.set_property(name, value)
		};
		if let Err(error) = result {
			warn!(name, ?error, "Could not set style property.");
		}
	}

	fn set_property(&self, node: &Node, name: &str, value: &Value) {
		if let Err(error) = Reflect::set(node, &JsValue::from_str(name), &to_js(value)) {
			warn!(name, ?error, "Could not set property.");
		}
	}

	fn property(&self, node: &Node, name: &str) -> Value {
		match Reflect::get(node, &JsValue::from_str(name)) {
			Ok(value) => from_js(&value),
			Err(error) => {
				warn!(name, ?error, "Could not get property.");
				Value::Undefined
			}
		}
	}

	fn add_event_listener(&self, node: &Node, event: &str, listener: Rc<dyn Fn()>) {
		let mut closures = self.closures.borrow_mut();
		let js_closure = closures.publish(node, listener);
		if let Err(error) = node.add_event_listener_with_callback(event, js_closure.as_ref().unchecked_ref()) {
			warn!(event, ?error, "Could not add event listener.");
		} else {
			trace!(event, "Added event listener.");
		}
	}

	fn element_by_id(&self, id: &str) -> Option<Node> {
		self.document.get_element_by_id(id).map(Into::into)
	}
}
