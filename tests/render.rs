use bindweed::{Engine, Error, MemoryNode, MemoryTree, Node, Observer, OutputTree, Value};
use serde_json::json;
use std::rc::Rc;

fn got(text: &str) -> String {
	format!(r#"<span class="get-resolved">{}</span>"#, text)
}

fn setup(app: Vec<Node>, data: serde_json::Value) -> (MemoryTree, MemoryNode, Engine<MemoryTree>, Result<Observer, Error>) {
	let tree = MemoryTree::new();
	let mount = tree.add_mount("app");
	let engine = Engine::new(tree.clone(), data);
	engine.define_template("app", app).unwrap();
	let root = engine.run(&Node::template_use("app").mount_id("app").into());
	(tree, mount, engine, root)
}

#[test]
fn list_scenario() {
	let (tree, app, engine, root) = setup(
		vec![Node::each("todos", "t", vec![Node::get("t.text")])],
		json!({ "todos": [{ "id": 1, "text": "a", "completed": false }] }),
	);
	let root = root.unwrap();
	assert_eq!(tree.inner_markup(app), got("a"));
	assert_eq!(engine.subscriptions_at("todos"), Ok(1));
	assert_eq!(engine.subscriptions_at("todos.0.text"), Ok(1));

	let first = tree.find_all(app, "span")[0];
	root.at("todos")
		.push(vec![Value::from(json!({ "id": 2, "text": "b", "completed": false }))])
		.unwrap();
	assert_eq!(tree.inner_markup(app), got("a") + &got("b"));
	assert_eq!(tree.find_all(app, "span")[0], first);
}

#[test]
fn text_comments_and_elements() {
	let (tree, app, _engine, root) = setup(
		vec![
			Node::element(
				"H1",
				vec![("class", "title")],
				vec![Node::text("Hello, "), Node::Comment("ignored".to_owned()), Node::get("user.name")],
			),
			Node::get("missing.deeply"),
		],
		json!({ "user": { "name": "Ada" } }),
	);
	root.unwrap();
	assert_eq!(
		tree.inner_markup(app),
		format!(r#"<h1 class="title">Hello, {}</h1>{}"#, got("Ada"), got(""))
	);
}

#[test]
fn scalars_render_like_host_strings() {
	let (tree, app, _engine, root) = setup(
		vec![Node::get("n"), Node::get("f"), Node::get("b"), Node::get("z"), Node::get("list.length")],
		json!({ "n": 3, "f": 0.5, "b": true, "z": null, "list": [1, 2] }),
	);
	root.unwrap();
	assert_eq!(tree.inner_markup(app), [got("3"), got("0.5"), got("true"), got("null"), got("2")].concat());
}

#[test]
fn conditionals_start_hidden_or_shown() {
	let (tree, app, engine, root) = setup(
		vec![
			Node::when("shown", vec![Node::text("yes")]),
			Node::If(Rc::new(bindweed::If {
				test: "hidden".to_owned(),
				wrapper: Some("span".to_owned()),
				content: vec![Node::text("no")],
			})),
		],
		json!({ "shown": true, "hidden": false }),
	);
	root.unwrap();
	assert_eq!(tree.inner_markup(app), r#"<div>yes</div><span style="display: none"></span>"#);
	assert_eq!(engine.subscription_count(), Ok(2));
}

#[test]
fn nested_lists() {
	let (tree, app, engine, root) = setup(
		vec![Node::each(
			"todos",
			"t",
			vec![Node::element(
				"li",
				Vec::<(String, String)>::new(),
				vec![Node::get("t.text"), Node::each("t.tags", "tag", vec![Node::get("tag")])],
			)],
		)],
		json!({ "todos": [{ "text": "a", "tags": ["x"] }, { "text": "b", "tags": [] }] }),
	);
	root.unwrap();
	assert_eq!(tree.inner_markup(app), format!("<li>{}{}</li><li>{}</li>", got("a"), got("x"), got("b")));
	assert_eq!(engine.subscriptions_at("todos.0.tags.0"), Ok(1));
	assert_eq!(engine.subscriptions_at("todos.1.tags"), Ok(1));
}

#[test]
fn template_parameters_are_static() {
	let tree = MemoryTree::new();
	let app = tree.add_mount("app");
	let engine = Engine::new(tree.clone(), json!({ "label": "data", "todos": [{ "text": "a" }] }));
	engine.define_template("row", vec![Node::get("label")]).unwrap();
	engine
		.define_template("list", vec![Node::each("*source", "i", vec![Node::get("i.text")])])
		.unwrap();
	engine
		.define_template(
			"app",
			vec![
				Node::template_use("row").param("label", "param").into(),
				Node::template_use("list").param("source", "todos").into(),
			],
		)
		.unwrap();

	let root = engine.run(&Node::template_use("app").mount_id("app").into()).unwrap();
	assert_eq!(tree.inner_markup(app), got("param") + &got("a"));
	assert_eq!(engine.subscriptions_at("label"), Ok(0));
	assert_eq!(engine.subscriptions_at("todos"), Ok(1));

	root.at("todos").push(vec![Value::from(json!({ "text": "b" }))]).unwrap();
	assert_eq!(tree.inner_markup(app), [got("param"), got("a"), got("b")].concat());
}

#[test]
fn recursive_templates_are_bounded() {
	let tree = MemoryTree::new();
	tree.add_mount("app");
	let engine = Engine::with_config(
		tree,
		json!({}),
		bindweed::Config {
			depth_limit: 8,
			..bindweed::Config::default()
		},
	);
	engine.define_template("app", vec![Node::template_use("app").into()]).unwrap();

	let error = engine.run(&Node::template_use("app").mount_id("app").into()).unwrap_err();
	assert!(matches!(error.root_cause(), Error::InvalidTemplate(_)));
	assert_eq!(error.chain().filter(|layer| layer.to_string().starts_with("in <TEMPLATE-USE")).count(), 9);
}

#[test]
fn render_into_any_container() {
	let tree = MemoryTree::new();
	let side = tree.add_mount("side");
	let engine = Engine::new(tree.clone(), json!({ "title": "t" }));
	engine.render_into(&[Node::get("title")], &side).unwrap();
	assert_eq!(tree.inner_markup(side), got("t"));

	engine.observe().set("title", "u").unwrap();
	assert_eq!(tree.inner_markup(side), got("u"));
}

#[test]
fn missing_template() {
	let (_tree, _app, _engine, root) = setup(vec![Node::template_use("missing").into()], json!({}));
	let error = root.unwrap_err();
	assert_eq!(error.root_cause(), &Error::TemplateNotFound { id: "missing".to_owned() });
	assert_eq!(
		error.report().to_string(),
		r#"during initial render: in <TEMPLATE-USE template-id="app">: in <TEMPLATE-USE template-id="missing">: template with id "missing" not found"#
	);
}

#[test]
fn missing_mount() {
	let tree = MemoryTree::new();
	let engine = Engine::new(tree, json!({}));
	engine.define_template("app", vec![]).unwrap();

	assert_eq!(
		engine.run(&Node::template_use("app").mount_id("nowhere").into()).unwrap_err(),
		Error::MountNotFound { id: "nowhere".to_owned() }
	);
	assert!(matches!(
		engine.run(&Node::template_use("app").into()).unwrap_err(),
		Error::InvalidTemplate(_)
	));
	assert!(matches!(engine.run(&Node::text("app")).unwrap_err(), Error::InvalidTemplate(_)));
}

#[test]
fn conditions_must_be_boolean() {
	let (_tree, _app, engine, root) = setup(vec![Node::when("flag", vec![Node::text("X")])], json!({ "flag": "yes" }));
	let error = root.unwrap_err();
	assert!(matches!(error.root_cause(), Error::InvalidTemplate(_)));
	assert!(error.chain().any(|layer| layer.to_string() == r#"in <IF test="flag">"#));
	assert_eq!(engine.subscription_count(), Ok(0));
}

#[test]
fn iterating_a_non_list_fails() {
	let (_tree, _app, _engine, root) = setup(vec![Node::each("todos", "t", vec![])], json!({ "todos": 5 }));
	assert!(matches!(root.unwrap_err().root_cause(), Error::InvalidTemplate(_)));
}

#[test]
fn actions_need_functions() {
	let (_tree, _app, _engine, root) = setup(
		vec![Node::element("button", vec![("action-click", "nothing")], vec![])],
		json!({ "nothing": 1 }),
	);
	assert_eq!(
		root.unwrap_err().root_cause(),
		&Error::MissingFunctionBinding {
			attribute: "action-click".to_owned(),
			key: "nothing".to_owned(),
		}
	);
}

#[test]
fn attributes_and_styles() {
	let (tree, app, engine, root) = setup(
		vec![Node::element(
			"div",
			vec![("id", "box"), ("attr-title", "hint"), ("style-color", "color")],
			vec![],
		)],
		json!({ "hint": "hover me", "color": "red" }),
	);
	let root = root.unwrap();
	let div = tree.element_by_id("box").unwrap();
	assert_eq!(tree.attribute(div, "title").as_deref(), Some("hover me"));
	assert_eq!(tree.style(div, "color").as_deref(), Some("red"));

	root.set("color", "blue").unwrap();
	root.set("hint", "").unwrap();
	assert_eq!(tree.markup(div), r#"<div id="box" title="" style="color: blue"></div>"#);
	assert_eq!(tree.children(app), vec![div]);
	assert_eq!(engine.subscription_count(), Ok(2));
}

#[test]
fn registration_is_idempotent_per_artifact() {
	let (_tree, _app, engine, root) = setup(
		vec![
			Node::element("div", vec![("attr-title", "title"), ("attr-title", "title")], vec![]),
			Node::get("title"),
		],
		json!({ "title": "t" }),
	);
	root.unwrap();
	assert_eq!(engine.subscriptions_at("title"), Ok(2));
}
