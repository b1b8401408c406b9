//! The parsed control-node tree.

use hashbrown::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
	Text(String),
	/// Skipped by the renderer.
	Comment(String),
	/// Value interpolation. Holds the (relative) key.
	Get(String),
	Each(Rc<Each>),
	If(Rc<If>),
	TemplateUse(TemplateUse),
	Element(Element),
}

/// `<each of="todos" as="t">…</each>`
#[derive(Debug, Clone, PartialEq)]
pub struct Each {
	pub of: String,
	pub r#as: String,
	pub content: Vec<Node>,
}

/// `<if test="flag" wrapper="span">…</if>`
#[derive(Debug, Clone, PartialEq)]
pub struct If {
	pub test: String,
	/// Tag name of the wrapper element. Falls back to [`Config::default_wrapper`](`crate::Config::default_wrapper`).
	pub wrapper: Option<String>,
	pub content: Vec<Node>,
}

/// `<template-use template-id="row" mount-id="app" data-label="…">`
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateUse {
	pub template_id: String,
	/// Only meaningful on the entry node passed to [`Engine::run`](`crate::Engine::run`).
	pub mount_id: Option<String>,
	/// Parameter name → static string value. Values starting with `*` aren't special here.
	pub params: Vec<(String, String)>,
}

impl TemplateUse {
	#[must_use]
	pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.push((name.into(), value.into()));
		self
	}

	#[must_use]
	pub fn mount_id(mut self, mount_id: impl Into<String>) -> Self {
		self.mount_id = Some(mount_id.into());
		self
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
	pub name: String,
	pub attributes: Vec<Attribute>,
	pub content: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	pub name: String,
	pub value: String,
}

impl Node {
	pub fn text(text: impl Into<String>) -> Self {
		Self::Text(text.into())
	}

	pub fn get(key: impl Into<String>) -> Self {
		Self::Get(key.into())
	}

	pub fn each(of: impl Into<String>, r#as: impl Into<String>, content: Vec<Node>) -> Self {
		Self::Each(Rc::new(Each {
			of: of.into(),
			r#as: r#as.into(),
			content,
		}))
	}

	/// An `IF` node with the default wrapper.
	pub fn when(test: impl Into<String>, content: Vec<Node>) -> Self {
		Self::If(Rc::new(If {
			test: test.into(),
			wrapper: None,
			content,
		}))
	}

	pub fn element<N: Into<String>, V: Into<String>>(name: impl Into<String>, attributes: impl IntoIterator<Item = (N, V)>, content: Vec<Node>) -> Self {
		Self::Element(Element {
			name: name.into(),
			attributes: attributes
				.into_iter()
				.map(|(name, value)| Attribute {
					name: name.into(),
					value: value.into(),
				})
				.collect(),
			content,
		})
	}

	pub fn template_use(template_id: impl Into<String>) -> TemplateUse {
		TemplateUse {
			template_id: template_id.into(),
			mount_id: None,
			params: Vec::new(),
		}
	}

	/// Name used in spans and error contexts.
	#[must_use]
	pub fn kind(&self) -> &str {
		match self {
			Node::Text(_) => "#text",
			Node::Comment(_) => "#comment",
			Node::Get(_) => "GET",
			Node::Each(_) => "EACH",
			Node::If(_) => "IF",
			Node::TemplateUse(_) => "TEMPLATE-USE",
			Node::Element(element) => &element.name,
		}
	}
}

impl From<TemplateUse> for Node {
	fn from(template_use: TemplateUse) -> Self {
		Self::TemplateUse(template_use)
	}
}

/// Template definitions by id.
#[derive(Debug, Clone, Default)]
pub struct Templates(HashMap<String, Rc<[Node]>>);

impl Templates {
	pub fn define(&mut self, id: impl Into<String>, content: Vec<Node>) {
		self.0.insert(id.into(), content.into());
	}

	#[must_use]
	pub fn get(&self, id: &str) -> Option<Rc<[Node]>> {
		self.0.get(id).cloned()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
