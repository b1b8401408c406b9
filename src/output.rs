//! The retained output tree the engine patches.

use crate::{Error, Value};
use core::fmt::Debug;
use std::rc::Rc;

/// Primitive operations over a retained-mode UI tree.
///
/// Implementations are handle-based and cheap to clone: the engine never holds a borrow into the tree across calls,
/// and event listeners may call back into the engine synchronously.
pub trait OutputTree {
	/// A handle to one node. Equality must be node identity.
	type Node: Clone + PartialEq + Debug + 'static;

	/// Templates are Rust values, so this replaces cloning a template element.
	///
	/// # Errors
	///
	/// Iff `name` isn't a valid element name.
	fn create_element(&self, name: &str) -> Result<Self::Node, Error>;
	fn create_text(&self, text: &str) -> Self::Node;
	/// An invisible placeholder that can be used as insertion anchor.
	fn create_marker(&self) -> Self::Node;
	/// A container whose children move into the target when it's mounted.
	fn create_fragment(&self) -> Self::Node;

	/// Inserts `node` into `container`, before `before` or at the end.
	///
	/// # Errors
	///
	/// Iff `container` can't have children or `before` isn't one of them.
	fn mount(&self, node: &Self::Node, container: &Self::Node, before: Option<&Self::Node>) -> Result<(), Error>;
	/// Detaches `node` from its parent, if any.
	fn remove(&self, node: &Self::Node);

	fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
	fn first_child(&self, node: &Self::Node) -> Option<Self::Node>;
	fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

	fn set_text_content(&self, node: &Self::Node, text: &str);
	/// # Errors
	///
	/// Iff `name` isn't a valid attribute name.
	fn set_attribute(&self, node: &Self::Node, name: &str, value: &str) -> Result<(), Error>;
	/// An empty `value` removes the property.
	fn set_style_property(&self, node: &Self::Node, name: &str, value: &str);
	/// Sets a live (non-attribute) property like `value` or `checked`.
	fn set_property(&self, node: &Self::Node, name: &str, value: &Value);
	fn property(&self, node: &Self::Node, name: &str) -> Value;

	/// The listener stays registered for as long as the node exists.
	fn add_event_listener(&self, node: &Self::Node, event: &str, listener: Rc<dyn Fn()>);

	/// Searches the attached tree.
	fn element_by_id(&self, id: &str) -> Option<Self::Node>;
}
