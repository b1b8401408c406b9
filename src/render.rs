//! The initial walk over a control-node tree, and the partial re-renders refreshes are made of.

use crate::{
	engine::State,
	error::ResultExt,
	path::{self, ContextEntry, ContextStack, Params},
	registry::{Binding, ConditionalBinding, ItemRecord, ListBinding, Subscription, SubscriptionId},
	template::{Each, Element, If, Node, TemplateUse},
	Error, OutputTree, Value,
};
use core::{cell::Cell, cell::RefCell, mem};
use std::rc::Rc;
use tracing::{level_filters::STATIC_MAX_LEVEL, trace, trace_span, Level};

impl<T: OutputTree + 'static> State<T> {
	pub(crate) fn run(&mut self, entry: &Node) -> Result<(), Error> {
		let template_use = match entry {
			Node::TemplateUse(template_use) => template_use,
			other => {
				return Err(Error::invalid_template(format!(
					"the entry node must be a <TEMPLATE-USE>, not <{}>",
					other.kind()
				)))
			}
		};
		let mount_id = match template_use.mount_id.as_deref() {
			Some(mount_id) if !mount_id.is_empty() => mount_id,
			_ => return Err(Error::invalid_template("the entry <TEMPLATE-USE> needs a mount-id")),
		};
		let container = self.tree.element_by_id(mount_id).ok_or_else(|| Error::MountNotFound { id: mount_id.to_owned() })?;

		self.render_node(entry, &container, None, &ContextStack::new(), &Params::default(), 0)
			.context(|| "during initial render")
	}

	/// Registers into the innermost render scope, if any.
	pub(crate) fn register(&mut self, path: &str, artifact: T::Node, binding: Binding<T::Node>) {
		let id = self.registry.register(path, Subscription { artifact, binding });
		if let Some(scope) = self.scopes.last_mut() {
			if !scope.contains(&id) {
				scope.push(id)
			}
		}
	}

	/// Runs `f` in a fresh render scope and returns what it registered, even on failure.
	fn in_scope<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R, Error>) -> (Result<R, Error>, Vec<SubscriptionId>) {
		self.scopes.push(Vec::new());
		let result = f(self);
		let scope = self.scopes.pop().unwrap_or_default();
		(result, scope)
	}

	pub(crate) fn render_nodes(
		&mut self,
		nodes: &[Node],
		container: &T::Node,
		before: Option<&T::Node>,
		context: &ContextStack,
		params: &Params,
		depth: usize,
	) -> Result<(), Error> {
		for node in nodes {
			self.render_node(node, container, before, context, params, depth)?
		}
		Ok(())
	}

	fn render_node(&mut self, node: &Node, container: &T::Node, before: Option<&T::Node>, context: &ContextStack, params: &Params, depth: usize) -> Result<(), Error> {
		match node {
			Node::Text(text) => {
				let text = self.tree.create_text(text);
				self.tree.mount(&text, container, before)
			}
			Node::Comment(_) => Ok(()),
			Node::Get(key) => self
				.render_get(key, container, before, context, params)
				.context(|| format!("in <GET>{}</GET>", key)),
			Node::Each(each) => self
				.render_each(each, container, before, context, params, depth)
				.context(|| format!("in <EACH of={:?} as={:?}>", each.of, each.r#as)),
			Node::If(r#if) => self
				.render_if(r#if, container, before, context, params, depth)
				.context(|| format!("in <IF test={:?}>", r#if.test)),
			Node::TemplateUse(template_use) => self
				.render_template_use(template_use, container, before, context, params, depth)
				.context(|| format!("in <TEMPLATE-USE template-id={:?}>", template_use.template_id)),
			Node::Element(element) => self
				.render_element(element, container, before, context, params, depth)
				.context(|| format!("in <{}>", element.name)),
		}
	}

	fn render_get(&mut self, key: &str, container: &T::Node, before: Option<&T::Node>, context: &ContextStack, params: &Params) -> Result<(), Error> {
		let span = trace_span!("GET", key);
		let _enter = span.enter();

		if key.is_empty() {
			return Err(Error::invalid_template("<GET> needs a key"));
		}
		let resolved = path::resolve(key, &self.data, context, params)?;
		if cfg!(feature = "dangerous-logging") {
			trace!(path = resolved.path.as_str(), value = ?resolved.value, "Resolved.");
		} else {
			trace!(path = resolved.path.as_str(), "Resolved.");
		}

		let artifact = self.tree.create_element("span")?;
		self.tree.set_attribute(&artifact, "class", &self.config.value_class)?;
		self.tree.set_text_content(&artifact, &resolved.value.to_string());
		self.tree.mount(&artifact, container, before)?;

		if !resolved.from_param {
			self.register(&resolved.path, artifact, Binding::Value)
		}
		Ok(())
	}

	fn render_if(&mut self, node: &Rc<If>, container: &T::Node, before: Option<&T::Node>, context: &ContextStack, params: &Params, depth: usize) -> Result<(), Error> {
		let span = trace_span!("IF", test = node.test.as_str());
		let _enter = span.enter();

		if node.test.is_empty() {
			return Err(Error::invalid_template("<IF> needs a test"));
		}
		let resolved = path::resolve(&node.test, &self.data, context, params)?;
		let wrapper = self.tree.create_element(node.wrapper.as_deref().unwrap_or(&self.config.default_wrapper))?;
		let binding = Rc::new(ConditionalBinding {
			node: Rc::clone(node),
			context: context.clone(),
			params: params.clone(),
			depth,
			children: RefCell::default(),
		});
		self.paint_conditional(&wrapper, &binding, &resolved.value)?;
		self.tree.mount(&wrapper, container, before)?;

		if !resolved.from_param {
			self.register(&resolved.path, wrapper, Binding::Conditional(binding))
		}
		Ok(())
	}

	/// Replaces the wrapper's content according to `test`. The wrapper itself is kept.
	pub(crate) fn paint_conditional(&mut self, wrapper: &T::Node, binding: &ConditionalBinding, test: &Value) -> Result<(), Error> {
		let shown = match test {
			Value::Bool(shown) => *shown,
			other => {
				return Err(Error::invalid_template(format!(
					"<IF test={:?}> must resolve to a boolean, not a {}",
					binding.node.test,
					other.kind()
				)))
			}
		};
		trace!(shown, "Painting conditional.");

		let stale = mem::take(&mut *binding.children.borrow_mut());
		self.registry.unregister_all(stale);
		while let Some(child) = self.tree.first_child(wrapper) {
			self.tree.remove(&child)
		}
		self.tree.set_style_property(wrapper, "display", if shown { "" } else { "none" });

		if shown {
			let (result, scope) = self.in_scope(|state| state.render_nodes(&binding.node.content, wrapper, None, &binding.context, &binding.params, binding.depth));
			match result {
				Ok(()) => *binding.children.borrow_mut() = scope,
				Err(error) => {
					self.registry.unregister_all(scope);
					return Err(error);
				}
			}
		}
		Ok(())
	}

	fn render_each(&mut self, node: &Rc<Each>, container: &T::Node, before: Option<&T::Node>, context: &ContextStack, params: &Params, depth: usize) -> Result<(), Error> {
		let span = trace_span!("EACH", of = node.of.as_str(), binding = node.r#as.as_str());
		let _enter = span.enter();

		if node.of.is_empty() || node.r#as.is_empty() {
			return Err(Error::invalid_template("<EACH> needs both `of` and `as`"));
		}
		let of: Rc<str> = path::dereference(&node.of, params)?.into();
		let resolved = path::resolve(&of, &self.data, context, params)?;
		let len = list_len(&node.of, &resolved.value)?;

		let end = self.tree.create_marker();
		self.tree.mount(&end, container, before)?;
		let binding = Rc::new(ListBinding {
			node: Rc::clone(node),
			of,
			context: context.clone(),
			params: params.clone(),
			depth,
			end: end.clone(),
			items: RefCell::default(),
		});
		self.render_items(&binding, 0, len)?;

		if !resolved.from_param {
			self.register(&resolved.path, end, Binding::List(binding))
		}
		Ok(())
	}

	/// Renders the list's items `start..start + count` (as far as they exist) in one batch,
	/// before the item currently at `start` or at the end.
	pub(crate) fn render_items(&mut self, binding: &Rc<ListBinding<T::Node>>, start: usize, count: usize) -> Result<(), Error> {
		let list_path = path::resolve_relative(&binding.of, &binding.context);
		let available = path::read(&list_path, &self.data, &binding.params).as_list().map_or(0, <[Value]>::len);

		let (start, anchor) = {
			let items = binding.items.borrow();
			let start = start.min(items.len());
			(start, items.get(start).map_or_else(|| binding.end.clone(), |item| item.marker.clone()))
		};
		let count = count.min(available.saturating_sub(start));
		if count == 0 {
			return Ok(());
		}
		trace!(path = list_path.as_str(), start, count, "Rendering items.");
		let container = self
			.tree
			.parent(&anchor)
			.ok_or_else(|| Error::Output(format!("the end marker of {:?} is detached", list_path)))?;

		let fragment = self.tree.create_fragment();
		let mut records = Vec::with_capacity(count);
		for index in start..start + count {
			match self.render_item(binding, index, &fragment) {
				Ok(record) => records.push(record),
				Err(error) => {
					self.registry.unregister_all(records.into_iter().flat_map(|record| record.subscriptions).collect());
					return Err(error).context(|| format!("in item {}", index));
				}
			}
		}

		if let Err(error) = self.tree.mount(&fragment, &container, Some(&anchor)) {
			self.registry.unregister_all(records.into_iter().flat_map(|record| record.subscriptions).collect());
			return Err(error);
		}
		binding.items.borrow_mut().splice(start..start, records);
		renumber(binding);

		if STATIC_MAX_LEVEL >= Level::TRACE {
			trace!(rendered = count, total = binding.items.borrow().len(), "Items rendered.");
		}
		Ok(())
	}

	fn render_item(&mut self, binding: &ListBinding<T::Node>, index: usize, fragment: &T::Node) -> Result<ItemRecord<T::Node>, Error> {
		let cell = Rc::new(Cell::new(index));
		let context = binding.context.with(
			&binding.node.r#as,
			ContextEntry::new(Rc::clone(&binding.of), Rc::clone(&cell)),
			self.config.max_context_depth,
		)?;

		let marker = self.tree.create_marker();
		self.tree.mount(&marker, fragment, None)?;
		let (result, subscriptions) = self.in_scope(|state| state.render_nodes(&binding.node.content, fragment, None, &context, &binding.params, binding.depth));
		match result {
			Ok(()) => Ok(ItemRecord {
				marker,
				index: cell,
				subscriptions,
			}),
			Err(error) => {
				self.registry.unregister_all(subscriptions);
				Err(error)
			}
		}
	}

	/// Removes the items `start..start + count` (as far as they exist) from the output tree and unregisters their subscriptions.
	pub(crate) fn remove_items(&mut self, binding: &ListBinding<T::Node>, start: usize, count: usize) {
		let (doomed, stop) = {
			let mut items = binding.items.borrow_mut();
			let start = start.min(items.len());
			let end = start.saturating_add(count).min(items.len());
			let doomed: Vec<_> = items.drain(start..end).collect();
			(doomed, items.get(start).map_or_else(|| binding.end.clone(), |item| item.marker.clone()))
		};
		let first = match doomed.first() {
			Some(first) => first.marker.clone(),
			None => return,
		};
		trace!(removed = doomed.len(), "Removing items.");

		let mut next = Some(first);
		while let Some(current) = next {
			if current == stop {
				break;
			}
			next = self.tree.next_sibling(&current);
			self.tree.remove(&current);
		}

		self.registry.unregister_all(doomed.into_iter().flat_map(|record| record.subscriptions).collect());
		renumber(binding);
	}

	/// Whole-list replacement.
	pub(crate) fn replace_items(&mut self, binding: &Rc<ListBinding<T::Node>>) -> Result<(), Error> {
		let list_path = path::resolve_relative(&binding.of, &binding.context);
		let len = list_len(&binding.node.of, &path::read(&list_path, &self.data, &binding.params))?;
		let count = binding.items.borrow().len();
		self.remove_items(binding, 0, count);
		self.render_items(binding, 0, len)
	}

	fn render_template_use(
		&mut self,
		template_use: &TemplateUse,
		container: &T::Node,
		before: Option<&T::Node>,
		context: &ContextStack,
		params: &Params,
		depth: usize,
	) -> Result<(), Error> {
		let span = trace_span!("TEMPLATE-USE", template_id = template_use.template_id.as_str(), depth);
		let _enter = span.enter();

		if template_use.template_id.is_empty() {
			return Err(Error::invalid_template("<TEMPLATE-USE> needs a template-id"));
		}
		if depth >= self.config.depth_limit {
			return Err(Error::invalid_template(format!("templates nested deeper than {}", self.config.depth_limit)));
		}
		let content = self.templates.get(&template_use.template_id).ok_or_else(|| Error::TemplateNotFound {
			id: template_use.template_id.clone(),
		})?;
		let params = params.overlay(template_use.params.iter().map(|(name, value)| (name.clone(), Value::from(value.as_str()))));

		self.render_nodes(&content, container, before, context, &params, depth + 1)
	}

	fn render_element(&mut self, element: &Element, container: &T::Node, before: Option<&T::Node>, context: &ContextStack, params: &Params, depth: usize) -> Result<(), Error> {
		let node = self.tree.create_element(&element.name)?;
		for attribute in &element.attributes {
			self.apply_attribute(&node, attribute, context, params)
				.context(|| format!("in attribute {}={:?}", attribute.name, attribute.value))?;
		}
		self.render_nodes(&element.content, &node, None, context, params, depth)?;
		self.tree.mount(&node, container, before)
	}
}

fn list_len(key: &str, value: &Value) -> Result<usize, Error> {
	match value {
		Value::List(items) => Ok(items.len()),
		other => Err(Error::invalid_template(format!("<EACH of={:?}> must resolve to a list, not a {}", key, other.kind()))),
	}
}

fn renumber<N>(binding: &ListBinding<N>) {
	for (i, item) in binding.items.borrow().iter().enumerate() {
		item.index.set(i)
	}
}
