//! Reads control-node trees out of a live DOM, for example from `<template>` elements.

use crate::{
	error::ResultExt,
	template::{self, Attribute, If, Node, TemplateUse},
	Engine, Error, OutputTree,
};
use std::rc::Rc;
use tracing::{debug, trace};
use wasm_bindgen::JsCast;
use web_sys::{Attr, Comment, Document, Element, HtmlTemplateElement, NamedNodeMap, Node as wNode, NodeList, Text};

/// # Errors
///
/// Iff a control element lacks a required attribute.
pub fn load_child_nodes(child_nodes: &NodeList) -> Result<Vec<Node>, Error> {
	let mut nodes = Vec::with_capacity(child_nodes.length() as usize);
	for i in 0..child_nodes.length() {
		if let Some(child) = child_nodes.item(i) {
			if let Some(node) = load_node(&child)? {
				nodes.push(node)
			}
		}
	}
	Ok(nodes)
}

/// Elements, text and comments. Anything else (like processing instructions) is skipped.
///
/// # Errors
///
/// Iff a control element lacks a required attribute.
pub fn load_node(node: &wNode) -> Result<Option<Node>, Error> {
	if let Some(element) = node.dyn_ref::<Element>() {
		load_element(element).map(Some)
	} else if let Some(text) = node.dyn_ref::<Text>() {
		Ok(Some(Node::Text(text.data())))
	} else if let Some(comment) = node.dyn_ref::<Comment>() {
		Ok(Some(Node::Comment(comment.data())))
	} else {
		trace!(node_type = node.node_type(), "Skipping unrecognised node.");
		Ok(None)
	}
}

fn required(element: &Element, name: &str) -> Result<String, Error> {
	match element.get_attribute(name) {
		Some(value) if !value.is_empty() => Ok(value),
		_ => Err(Error::invalid_template(format!(
			"<{}> needs a non-empty {:?} attribute",
			element.tag_name(),
			name
		))),
	}
}

/// # Errors
///
/// Iff `element` or one of its descendants is a control element without a required attribute.
pub fn load_element(element: &Element) -> Result<Node, Error> {
	let node: &wNode = element.as_ref();
	let content = || load_child_nodes(&node.child_nodes());
	Ok(match element.tag_name().to_ascii_uppercase().as_str() {
		"GET" => Node::Get(element.text_content().unwrap_or_default().trim().to_owned()),
		"EACH" => Node::each(required(element, "of")?, required(element, "as")?, content()?),
		"IF" => Node::If(Rc::new(If {
			test: required(element, "test")?,
			wrapper: element.get_attribute("wrapper").filter(|wrapper| !wrapper.is_empty()),
			content: content()?,
		})),
		"TEMPLATE-USE" => Node::TemplateUse(load_template_use(element)?),
		_ => Node::Element(template::Element {
			name: element.local_name(),
			attributes: load_attributes(&element.attributes()),
			content: content()?,
		}),
	})
}

fn load_template_use(element: &Element) -> Result<TemplateUse, Error> {
	let params = load_attributes(&element.attributes())
		.into_iter()
		.filter_map(|Attribute { name, value }| name.strip_prefix("data-").map(|name| (dataset_name(name), value)))
		.collect();
	Ok(TemplateUse {
		template_id: required(element, "template-id")?,
		mount_id: element.get_attribute("mount-id"),
		params,
	})
}

/// `user-id` → `userId`, the way `dataset` names attributes.
fn dataset_name(attribute: &str) -> String {
	let mut name = String::with_capacity(attribute.len());
	let mut upper = false;
	for c in attribute.chars() {
		match c {
			'-' => upper = true,
			c if upper && c.is_ascii_lowercase() => {
				name.push(c.to_ascii_uppercase());
				upper = false
			}
			c => {
				if upper {
					name.push('-');
					upper = false
				}
				name.push(c)
			}
		}
	}
	if upper {
		name.push('-')
	}
	name
}

#[must_use]
pub fn load_attributes(attributes: &NamedNodeMap) -> Vec<Attribute> {
	(0..attributes.length())
		.filter_map(|i| attributes.item(i))
		.map(|attribute| load_attribute(&attribute))
		.collect()
}

#[must_use]
pub fn load_attribute(attribute: &Attr) -> Attribute {
	Attribute {
		name: attribute.local_name(),
		value: attribute.value(),
	}
}

/// Defines every `<template id=…>` of `document` on `engine`. Returns how many there were.
///
/// # Errors
///
/// Iff a template is malformed or the engine is busy.
pub fn load_templates<T: OutputTree + 'static>(document: &Document, engine: &Engine<T>) -> Result<usize, Error> {
	let templates = document
		.query_selector_all("template[id]")
		.map_err(|error| Error::Output(format!("could not query templates: {:?}", error)))?;

	let mut count = 0;
	for i in 0..templates.length() {
		let template = match templates.item(i).and_then(|node| node.dyn_into::<HtmlTemplateElement>().ok()) {
			Some(template) => template,
			None => continue,
		};
		let id = template.id();
		let fragment = template.content();
		let content: &wNode = fragment.as_ref();
		let nodes = load_child_nodes(&content.child_nodes()).context(|| format!("in <template id={:?}>", id))?;
		debug!(id = id.as_str(), nodes = nodes.len(), "Loaded template.");
		engine.define_template(id, nodes)?;
		count += 1;
	}
	Ok(count)
}
