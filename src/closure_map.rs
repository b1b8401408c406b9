use std::rc::Rc;
use tracing::trace;
use wasm_bindgen::closure::Closure;

/// Keeps the JavaScript side of event listeners alive for as long as their node can still fire them.
#[derive(Debug, Default)]
pub(crate) struct ClosureMap {
	entries: Vec<(web_sys::Node, Closure<dyn Fn()>)>,
}

impl ClosureMap {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn publish(&mut self, node: &web_sys::Node, listener: Rc<dyn Fn()>) -> &Closure<dyn Fn()> {
		let js_closure = Closure::wrap(Box::new(move || listener()) as Box<dyn Fn()>);
		self.entries.push((node.clone(), js_closure));
		trace!(count = self.entries.len(), "Created Closure.");
		&self.entries[self.entries.len() - 1].1
	}

	/// Drops the closures of `removed` and its descendants.
	///
	/// Their listeners stay registered on the nodes and throw into JavaScript if fired anyway.
	pub(crate) fn unpublish(&mut self, removed: &web_sys::Node) {
		let before = self.entries.len();
		self.entries.retain(|(node, _)| !removed.contains(Some(node)));
		if self.entries.len() < before {
			trace!(destroyed = before - self.entries.len(), "Destroyed Closure(s).");
		}
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}
}
