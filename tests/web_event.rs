#![cfg(target_arch = "wasm32")]

use bindweed::{ActionContext, DomTree, Engine, Node, Value};
use serde_json::json;
use std::{convert::TryFrom, sync::Once};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, Document, HtmlElement, HtmlInputElement};

wasm_bindgen_test_configure!(run_in_browser);

fn document() -> Document {
	static LOG: Once = Once::new();
	//TODO: Fail on Warning or Error.
	LOG.call_once(tracing_wasm::set_as_global_default);
	window().unwrap().document().unwrap()
}

fn buttons(document: &Document, selector: &str) -> Vec<HtmlElement> {
	let list = document.query_selector_all(selector).unwrap();
	(0..list.length())
		.filter_map(|i| list.item(i))
		.map(|node| node.dyn_into().unwrap())
		.collect()
}

#[wasm_bindgen_test]
fn click() {
	let document = document();
	document.body().unwrap().set_inner_html(r#"<div id="click-app"></div>"#);

	let data = Value::object(vec![
		("todos", Value::from(json!([{ "text": "a" }, { "text": "b" }]))),
		(
			"remove",
			Value::function(|context: &ActionContext| {
				let index = isize::try_from(context.index.unwrap_or_default()).unwrap();
				context.root.at("todos").splice(index, Some(1), vec![]).map(drop)
			}),
		),
	]);
	let tree = DomTree::new(document.clone());
	let engine = Engine::new(tree.clone(), data);
	engine
		.define_template(
			"app",
			vec![Node::each(
				"todos",
				"t",
				vec![Node::element("button", vec![("action-click", "remove")], vec![Node::get("t.text")])],
			)],
		)
		.unwrap();
	engine.run(&Node::template_use("app").mount_id("click-app").into()).unwrap();
	assert_eq!(tree.listener_count(), 2);

	buttons(&document, "#click-app button")[0].click();
	let remaining = buttons(&document, "#click-app button");
	assert_eq!(remaining.len(), 1);
	assert_eq!(remaining[0].text_content().as_deref(), Some("b"));
	assert_eq!(tree.listener_count(), 1);

	remaining[0].click();
	assert!(buttons(&document, "#click-app button").is_empty());
	assert_eq!(tree.listener_count(), 0);
}

#[wasm_bindgen_test]
fn input() {
	let document = document();
	document.body().unwrap().set_inner_html(r#"<div id="input-app"></div>"#);

	let engine = Engine::new(DomTree::new(document.clone()), json!({ "name": "Ada" }));
	engine
		.define_template(
			"app",
			vec![Node::element("input", vec![("bind-input-value", "name")], vec![]), Node::get("name")],
		)
		.unwrap();
	engine.run(&Node::template_use("app").mount_id("input-app").into()).unwrap();

	let input: HtmlInputElement = document.query_selector("#input-app input").unwrap().unwrap().dyn_into().unwrap();
	assert_eq!(input.value(), "Ada");

	input.set_value("Grace");
	input.dispatch_event(&web_sys::Event::new("input").unwrap()).unwrap();
	assert_eq!(engine.read("name"), Value::from("Grace"));
	assert_eq!(
		document.query_selector("#input-app span").unwrap().unwrap().text_content().as_deref(),
		Some("Grace")
	);
}
