//! Attribute prefixes of plain elements: `action-<event>`, `bind-<event>-<property>`, `attr-<name>` and `style-<name>`.
//!
//! Anything else is copied verbatim.

use crate::{
	engine::{Shared, State},
	observe::{ActionContext, Observer, Reactor},
	path::{self, ContextStack, Params},
	registry::{AttributeTarget, Binding},
	template::Attribute,
	Error, OutputTree, Value,
};
use std::rc::{Rc, Weak};
use tracing::{debug, error, trace, trace_span, warn};

impl<T: OutputTree + 'static> State<T> {
	pub(crate) fn apply_attribute(&mut self, element: &T::Node, attribute: &Attribute, context: &ContextStack, params: &Params) -> Result<(), Error> {
		let name = attribute.name.as_str();
		if let Some(event) = name.strip_prefix("action-") {
			self.bind_action(element, attribute, event, context, params)
		} else if let Some(binding) = name.strip_prefix("bind-") {
			let (event, property) = match binding.split_once('-') {
				Some((event, property)) if !event.is_empty() && !property.is_empty() => (event, property),
				_ => {
					return Err(Error::invalid_template(format!(
						"{:?} must have the form bind-<event>-<property>",
						name
					)))
				}
			};
			self.bind_property(element, attribute, event, property, context, params)
		} else if let Some(target) = name.strip_prefix("attr-") {
			self.bind_target(element, attribute, AttributeTarget::Attribute(target.to_owned()), context, params)
		} else if let Some(target) = name.strip_prefix("style-") {
			self.bind_target(element, attribute, AttributeTarget::Style(target.to_owned()), context, params)
		} else {
			self.tree.set_attribute(element, name, &attribute.value)
		}
	}

	fn bind_target(&mut self, element: &T::Node, attribute: &Attribute, target: AttributeTarget, context: &ContextStack, params: &Params) -> Result<(), Error> {
		match &target {
			AttributeTarget::Attribute(name) | AttributeTarget::Style(name) | AttributeTarget::Property(name) if name.is_empty() => {
				return Err(Error::invalid_template(format!("{:?} names no target", attribute.name)))
			}
			_ => (),
		}
		let resolved = path::resolve(&attribute.value, &self.data, context, params)?;
		self.apply_target(element, &target, &resolved.value)?;
		if !resolved.from_param {
			self.register(&resolved.path, element.clone(), Binding::Attribute(target))
		}
		Ok(())
	}

	pub(crate) fn apply_target(&mut self, element: &T::Node, target: &AttributeTarget, value: &Value) -> Result<(), Error> {
		match target {
			AttributeTarget::Attribute(name) => self.tree.set_attribute(element, name, &value.to_string()),
			AttributeTarget::Style(name) => {
				self.tree.set_style_property(element, name, &value.to_string());
				Ok(())
			}
			AttributeTarget::Property(name) => {
				self.tree.set_property(element, name, value);
				Ok(())
			}
		}
	}

	/// Sets the property now and writes it back to the data whenever `event` fires.
	fn bind_property(&mut self, element: &T::Node, attribute: &Attribute, event: &str, property: &str, context: &ContextStack, params: &Params) -> Result<(), Error> {
		let key = path::dereference(&attribute.value, params)?.into_owned();
		let resolved = path::resolve(&attribute.value, &self.data, context, params)?;
		let target = AttributeTarget::Property(property.to_owned());
		self.apply_target(element, &target, &resolved.value)?;
		if resolved.from_param {
			trace!(key = key.as_str(), "Parameters are static. Not binding back.");
			return Ok(());
		}
		self.register(&resolved.path, element.clone(), Binding::Attribute(target));

		let this = Weak::clone(&self.this);
		let node = element.clone();
		let property = property.to_owned();
		let context = context.clone();
		self.tree.add_event_listener(
			element,
			event,
			Rc::new(move || {
				let shared = match this.upgrade() {
					Some(shared) => shared,
					None => return trace!("Engine dropped. Ignoring event."),
				};
				// Resolved on each event, since the element's item may have moved.
				let path = path::resolve_relative(&key, &context);
				let span = trace_span!("bind", path = path.as_str(), property = property.as_str());
				let _enter = span.enter();

				let value = match shared.state.try_borrow() {
					Ok(state) => state.tree.property(&node, &property),
					Err(_) => return warn!("Bound event fired during a render or refresh. Ignoring it."),
				};
				if let Err(error) = shared.write(&path, value) {
					let chain = error.report().to_string();
					error!(error = chain.as_str(), "Writing back a bound property failed.");
				}
			}),
		);
		Ok(())
	}

	fn bind_action(&mut self, element: &T::Node, attribute: &Attribute, event: &str, context: &ContextStack, params: &Params) -> Result<(), Error> {
		if event.is_empty() {
			return Err(Error::invalid_template(format!("{:?} names no event", attribute.name)));
		}
		let resolved = path::resolve(&attribute.value, &self.data, context, params)?;
		let callback = match resolved.value {
			Value::Function(callback) => callback,
			_ => {
				return Err(Error::MissingFunctionBinding {
					attribute: attribute.name.clone(),
					key: attribute.value.clone(),
				})
			}
		};

		let this: Weak<Shared<T>> = Weak::clone(&self.this);
		let event_name = event.to_owned();
		let context = context.clone();
		self.tree.add_event_listener(
			element,
			event,
			Rc::new(move || {
				let shared = match this.upgrade() {
					Some(shared) => shared,
					None => return trace!("Engine dropped. Ignoring event."),
				};
				let span = trace_span!("action", event = event_name.as_str());
				let _enter = span.enter();

				let (item, index) = match context.innermost() {
					Some((name, entry)) => (path::resolve_relative(name, &context), Some(entry.index())),
					None => (String::new(), None),
				};
				let reactor: Rc<dyn Reactor> = shared;
				let action_context = ActionContext {
					event: event_name.clone(),
					item: Observer::new(Rc::clone(&reactor), item),
					root: Observer::new(reactor, ""),
					index,
				};
				match callback.call(&action_context) {
					Ok(()) => (),
					Err(Error::Deferred { path }) => debug!(path = path.as_str(), "Action deferred a change."),
					Err(error) => {
						let chain = error.report().to_string();
						error!(error = chain.as_str(), "Action failed.");
					}
				}
			}),
		);
		Ok(())
	}
}
