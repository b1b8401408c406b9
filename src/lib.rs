#![doc(html_root_url = "https://docs.rs/bindweed/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Subscription-driven template rendering.
//!
//! An [`Engine`] renders a control-node tree ([`Node`]) against a data graph ([`Value`]) into an [`OutputTree`],
//! registering a subscription for each canonical path a rendered artifact shows.
//! Changes made through an [`Observer`] are turned into [`ChangeDescriptor`]s, and only the artifacts subscribed to the changed path
//! (and to paths declared as derived from it) are patched.
//!
//! [`MemoryTree`] is a headless tree for tests and servers, [`DomTree`] renders into a browser document.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

mod attributes;
mod closure_map;
mod dependencies;
mod engine;
mod error;
pub mod load;
mod memory;
mod observe;
mod output;
pub mod path;
mod refresh;
pub mod registry;
mod render;
pub mod template;
mod value;
mod web;

pub use dependencies::Dependencies;
pub use engine::{Config, Engine};
pub use error::{Error, Report, ResultExt};
pub use memory::{MemoryNode, MemoryTree};
pub use observe::{ActionContext, Observer};
pub use output::OutputTree;
pub use refresh::{ChangeDescriptor, Operation};
pub use template::{Attribute, Each, Element, If, Node, TemplateUse, Templates};
pub use value::{Callback, Computed, Value};
pub use web::{from_js, to_js, DomTree};
