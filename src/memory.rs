//! A headless [`OutputTree`].
//!
//! Nodes live in an arena and are addressed by copyable ids.
//! Removed nodes stay in the arena (detached), so handles never dangle.

use crate::{output::OutputTree, Error, Value};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter, Write as _},
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryNode(usize);

enum Kind {
	Element {
		name: String,
		attributes: Vec<(String, String)>,
		style: Vec<(String, String)>,
		properties: HashMap<String, Value>,
	},
	Text(String),
	Marker,
	Fragment,
}

struct Entry {
	kind: Kind,
	parent: Option<usize>,
	children: Vec<usize>,
	listeners: Vec<(String, Rc<dyn Fn()>)>,
}

#[derive(Default)]
struct Arena {
	entries: Vec<Entry>,
}

impl Arena {
	fn push(&mut self, kind: Kind) -> MemoryNode {
		self.entries.push(Entry {
			kind,
			parent: None,
			children: Vec::new(),
			listeners: Vec::new(),
		});
		MemoryNode(self.entries.len() - 1)
	}

	fn detach(&mut self, node: usize) {
		if let Some(parent) = self.entries[node].parent.take() {
			self.entries[parent].children.retain(|&child| child != node)
		}
	}

	fn attribute(&self, node: usize, name: &str) -> Option<&str> {
		match &self.entries[node].kind {
			Kind::Element { attributes, .. } => attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str()),
			_ => None,
		}
	}

	fn write_markup(&self, node: usize, out: &mut String) {
		let entry = &self.entries[node];
		match &entry.kind {
			Kind::Element { name, attributes, style, .. } => {
				out.push('<');
				out.push_str(name);
				for (name, value) in attributes {
					let _ = write!(out, " {}={:?}", name, value);
				}
				if !style.is_empty() {
					let style: Vec<_> = style.iter().map(|(name, value)| format!("{}: {}", name, value)).collect();
					let _ = write!(out, " style={:?}", style.join("; "));
				}
				out.push('>');
				for &child in &entry.children {
					self.write_markup(child, out)
				}
				let _ = write!(out, "</{}>", name);
			}
			Kind::Text(text) => out.push_str(text),
			Kind::Marker => (),
			Kind::Fragment => {
				for &child in &entry.children {
					self.write_markup(child, out)
				}
			}
		}
	}

	fn write_text(&self, node: usize, out: &mut String) {
		let entry = &self.entries[node];
		match &entry.kind {
			Kind::Text(text) => out.push_str(text),
			Kind::Marker => (),
			Kind::Element { .. } | Kind::Fragment => {
				for &child in &entry.children {
					self.write_text(child, out)
				}
			}
		}
	}
}

/// Shared handle to an in-memory tree. Clones refer to the same tree.
#[derive(Clone)]
pub struct MemoryTree {
	arena: Rc<RefCell<Arena>>,
	root: MemoryNode,
}

impl Debug for MemoryTree {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryTree")
			.field("nodes", &self.arena.borrow().entries.len())
			.field("root", &self.root)
			.finish()
	}
}

impl Default for MemoryTree {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryTree {
	/// An empty tree with a `body` root element.
	#[must_use]
	pub fn new() -> Self {
		let mut arena = Arena::default();
		let root = arena.push(Kind::Element {
			name: "body".to_owned(),
			attributes: Vec::new(),
			style: Vec::new(),
			properties: HashMap::new(),
		});
		Self {
			arena: Rc::new(RefCell::new(arena)),
			root,
		}
	}

	#[must_use]
	pub fn root(&self) -> MemoryNode {
		self.root
	}

	/// Appends an empty `<div id=…>` to the root, for use as `mount-id` target.
	pub fn add_mount(&self, id: &str) -> MemoryNode {
		let mut arena = self.arena.borrow_mut();
		let node = arena.push(Kind::Element {
			name: "div".to_owned(),
			attributes: vec![("id".to_owned(), id.to_owned())],
			style: Vec::new(),
			properties: HashMap::new(),
		});
		arena.entries[node.0].parent = Some(self.root.0);
		arena.entries[self.root.0].children.push(node.0);
		node
	}

	/// HTML-like serialisation of `node`'s children. Markers are omitted, text is not escaped.
	#[must_use]
	pub fn inner_markup(&self, node: MemoryNode) -> String {
		let arena = self.arena.borrow();
		let mut out = String::new();
		for &child in &arena.entries[node.0].children {
			arena.write_markup(child, &mut out)
		}
		out
	}

	/// HTML-like serialisation of `node` itself. Markers are omitted, text is not escaped.
	#[must_use]
	pub fn markup(&self, node: MemoryNode) -> String {
		let mut out = String::new();
		self.arena.borrow().write_markup(node.0, &mut out);
		out
	}

	/// Concatenated text content.
	#[must_use]
	pub fn text(&self, node: MemoryNode) -> String {
		let mut out = String::new();
		self.arena.borrow().write_text(node.0, &mut out);
		out
	}

	#[must_use]
	pub fn attribute(&self, node: MemoryNode, name: &str) -> Option<String> {
		self.arena.borrow().attribute(node.0, name).map(ToOwned::to_owned)
	}

	#[must_use]
	pub fn style(&self, node: MemoryNode, name: &str) -> Option<String> {
		match &self.arena.borrow().entries[node.0].kind {
			Kind::Element { style, .. } => style.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()),
			_ => None,
		}
	}

	/// Element and text children, markers excluded.
	#[must_use]
	pub fn children(&self, node: MemoryNode) -> Vec<MemoryNode> {
		let arena = self.arena.borrow();
		arena.entries[node.0]
			.children
			.iter()
			.copied()
			.filter(|&child| !matches!(arena.entries[child].kind, Kind::Marker))
			.map(MemoryNode)
			.collect()
	}

	/// Whether `node` is (transitively) a child of the root.
	#[must_use]
	pub fn is_attached(&self, node: MemoryNode) -> bool {
		let arena = self.arena.borrow();
		let mut current = node.0;
		loop {
			if current == self.root.0 {
				return true;
			}
			match arena.entries[current].parent {
				Some(parent) => current = parent,
				None => return false,
			}
		}
	}

	/// Elements with tag `name` below `node`, in document order.
	#[must_use]
	pub fn find_all(&self, node: MemoryNode, name: &str) -> Vec<MemoryNode> {
		let arena = self.arena.borrow();
		let mut found = Vec::new();
		let mut pending: Vec<usize> = arena.entries[node.0].children.iter().rev().copied().collect();
		while let Some(current) = pending.pop() {
			if matches!(&arena.entries[current].kind, Kind::Element { name: n, .. } if n == name) {
				found.push(MemoryNode(current))
			}
			pending.extend(arena.entries[current].children.iter().rev().copied())
		}
		found
	}

	/// Calls every `event` listener of `node`.
	///
	/// The tree isn't borrowed while listeners run, so they may mutate it.
	pub fn fire(&self, node: MemoryNode, event: &str) {
		let listeners: Vec<Rc<dyn Fn()>> = self.arena.borrow().entries[node.0]
			.listeners
			.iter()
			.filter(|(name, _)| name == event)
			.map(|(_, listener)| Rc::clone(listener))
			.collect();
		trace!(?node, event, count = listeners.len(), "Firing.");
		for listener in listeners {
			listener()
		}
	}

	/// Total number of nodes ever created, attached or not.
	#[must_use]
	pub fn node_count(&self) -> usize {
		self.arena.borrow().entries.len()
	}
}

impl OutputTree for MemoryTree {
	type Node = MemoryNode;

	fn create_element(&self, name: &str) -> Result<MemoryNode, Error> {
		if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '<' || c == '>') {
			return Err(Error::Output(format!("invalid element name {:?}", name)));
		}
		Ok(self.arena.borrow_mut().push(Kind::Element {
			name: name.to_ascii_lowercase(),
			attributes: Vec::new(),
			style: Vec::new(),
			properties: HashMap::new(),
		}))
	}

	fn create_text(&self, text: &str) -> MemoryNode {
		self.arena.borrow_mut().push(Kind::Text(text.to_owned()))
	}

	fn create_marker(&self) -> MemoryNode {
		self.arena.borrow_mut().push(Kind::Marker)
	}

	fn create_fragment(&self) -> MemoryNode {
		self.arena.borrow_mut().push(Kind::Fragment)
	}

	fn mount(&self, node: &MemoryNode, container: &MemoryNode, before: Option<&MemoryNode>) -> Result<(), Error> {
		let mut arena = self.arena.borrow_mut();
		if matches!(arena.entries[container.0].kind, Kind::Text(_) | Kind::Marker) {
			return Err(Error::Output(format!("{:?} can't have children", container)));
		}

		if let Some(before) = before {
			if arena.entries[before.0].parent != Some(container.0) || before == node {
				return Err(Error::Output(format!("{:?} is not a child of {:?}", before, container)));
			}
		}

		let moved = if matches!(arena.entries[node.0].kind, Kind::Fragment) {
			let children = std::mem::take(&mut arena.entries[node.0].children);
			for &child in &children {
				arena.entries[child].parent = None
			}
			children
		} else {
			arena.detach(node.0);
			vec![node.0]
		};

		let siblings = &arena.entries[container.0].children;
		let position = before
			.and_then(|before| siblings.iter().position(|&child| child == before.0))
			.unwrap_or_else(|| siblings.len());
		for &child in &moved {
			arena.entries[child].parent = Some(container.0)
		}
		arena.entries[container.0].children.splice(position..position, moved);
		Ok(())
	}

	fn remove(&self, node: &MemoryNode) {
		self.arena.borrow_mut().detach(node.0)
	}

	fn parent(&self, node: &MemoryNode) -> Option<MemoryNode> {
		self.arena.borrow().entries[node.0].parent.map(MemoryNode)
	}

	fn first_child(&self, node: &MemoryNode) -> Option<MemoryNode> {
		self.arena.borrow().entries[node.0].children.first().copied().map(MemoryNode)
	}

	fn next_sibling(&self, node: &MemoryNode) -> Option<MemoryNode> {
		let arena = self.arena.borrow();
		let parent = arena.entries[node.0].parent?;
		let siblings = &arena.entries[parent].children;
		let position = siblings.iter().position(|&child| child == node.0)?;
		siblings.get(position + 1).copied().map(MemoryNode)
	}

	fn set_text_content(&self, node: &MemoryNode, text: &str) {
		let mut arena = self.arena.borrow_mut();
		if let Kind::Text(content) = &mut arena.entries[node.0].kind {
			return *content = text.to_owned();
		}
		for child in std::mem::take(&mut arena.entries[node.0].children) {
			arena.entries[child].parent = None
		}
		if !text.is_empty() {
			let text = arena.push(Kind::Text(text.to_owned()));
			arena.entries[text.0].parent = Some(node.0);
			arena.entries[node.0].children.push(text.0);
		}
	}

	fn set_attribute(&self, node: &MemoryNode, name: &str, value: &str) -> Result<(), Error> {
		if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '=' || c == '"') {
			return Err(Error::Output(format!("invalid attribute name {:?}", name)));
		}
		match &mut self.arena.borrow_mut().entries[node.0].kind {
			Kind::Element { attributes, .. } => {
				match attributes.iter_mut().find(|(n, _)| n == name) {
					Some((_, v)) => *v = value.to_owned(),
					None => attributes.push((name.to_owned(), value.to_owned())),
				}
				Ok(())
			}
			_ => Err(Error::Output(format!("{:?} is not an element", node))),
		}
	}

	fn set_style_property(&self, node: &MemoryNode, name: &str, value: &str) {
		if let Kind::Element { style, .. } = &mut self.arena.borrow_mut().entries[node.0].kind {
			style.retain(|(n, _)| n != name);
			if !value.is_empty() {
				style.push((name.to_owned(), value.to_owned()))
			}
		}
	}

	fn set_property(&self, node: &MemoryNode, name: &str, value: &Value) {
		if let Kind::Element { properties, .. } = &mut self.arena.borrow_mut().entries[node.0].kind {
			properties.insert(name.to_owned(), value.clone());
		}
	}

	fn property(&self, node: &MemoryNode, name: &str) -> Value {
		match &self.arena.borrow().entries[node.0].kind {
			Kind::Element { properties, .. } => properties.get(name).cloned().unwrap_or_default(),
			_ => Value::Undefined,
		}
	}

	fn add_event_listener(&self, node: &MemoryNode, event: &str, listener: Rc<dyn Fn()>) {
		self.arena.borrow_mut().entries[node.0].listeners.push((event.to_owned(), listener))
	}

	fn element_by_id(&self, id: &str) -> Option<MemoryNode> {
		let arena = self.arena.borrow();
		let mut pending = vec![self.root.0];
		while let Some(current) = pending.pop() {
			if arena.attribute(current, "id") == Some(id) {
				return Some(MemoryNode(current));
			}
			pending.extend(arena.entries[current].children.iter().rev().copied())
		}
		None
	}
}
