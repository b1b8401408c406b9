use bindweed::{path, Engine, Error, MemoryNode, MemoryTree, Node, Observer, OutputTree, Value};
use serde_json::json;
use std::{cell::Cell, rc::Rc};

fn texts(tree: &MemoryTree, app: MemoryNode) -> Vec<String> {
	tree.find_all(app, "span").into_iter().map(|span| tree.text(span)).collect()
}

fn read(root: &Value, path: &str) -> Value {
	path::read(path, root, &path::Params::default())
}

fn run(engine: &Engine<MemoryTree>, app: Vec<Node>) -> Observer {
	engine.define_template("app", app).unwrap();
	engine.run(&Node::template_use("app").mount_id("app").into()).unwrap()
}

#[test]
fn aggregates_follow_structural_changes() {
	let tree = MemoryTree::new();
	let app = tree.add_mount("app");
	let engine = Engine::new(
		tree.clone(),
		Value::object(vec![
			("todos", Value::from(json!([{ "text": "a", "done": false }]))),
			(
				"remaining",
				Value::computed(|root| {
					let todos = read(root, "todos");
					let items = todos.as_list().unwrap_or_default();
					Value::from(items.iter().filter(|todo| read(todo, "done") != Value::from(true)).count())
				}),
			),
		]),
	);
	engine.declare_dependency("todos", vec!["remaining"]).unwrap();
	let root = run(&engine, vec![Node::get("remaining")]);
	assert_eq!(texts(&tree, app), ["1"]);

	let todos = root.at("todos");
	todos.push(vec![Value::from(json!({ "text": "b", "done": false }))]).unwrap();
	assert_eq!(texts(&tree, app), ["2"]);
	todos.splice(0, Some(1), vec![Value::from(json!({ "text": "a", "done": true }))]).unwrap();
	assert_eq!(texts(&tree, app), ["1"]);
	todos.shift().unwrap();
	assert_eq!(texts(&tree, app), ["1"]);
	root.set("todos", Value::list(vec![])).unwrap();
	assert_eq!(texts(&tree, app), ["0"]);
}

fn mapped() -> Value {
	Value::object(vec![
		("people", Value::from(json!([{ "name": "ada" }, { "name": "grace" }]))),
		(
			"pretty",
			Value::computed(|root| {
				let people = read(root, "people");
				Value::list(people.as_list().unwrap_or_default().iter().map(|person| {
					let name = read(person, "name").to_string();
					Value::object(vec![("name", Value::from(name.to_uppercase()))])
				}))
			}),
		),
	])
}

#[test]
fn derived_lists_mirror_their_source() {
	let tree = MemoryTree::new();
	let app = tree.add_mount("app");
	let engine = Engine::new(tree.clone(), mapped());
	engine.declare_dependency("people", vec!["pretty"]).unwrap();
	let root = run(
		&engine,
		vec![
			Node::each("people", "p", vec![Node::get("p.name")]),
			Node::each("pretty", "p", vec![Node::get("p.name")]),
		],
	);
	assert_eq!(texts(&tree, app), ["ada", "grace", "ADA", "GRACE"]);

	root.set("people.1.name", "hopper").unwrap();
	assert_eq!(texts(&tree, app), ["ada", "hopper", "ADA", "HOPPER"]);

	root.at("people").unshift(vec![Value::from(json!({ "name": "barbara" }))]).unwrap();
	assert_eq!(texts(&tree, app), ["barbara", "ada", "hopper", "BARBARA", "ADA", "HOPPER"]);

	root.set("people.2.name", "margaret").unwrap();
	assert_eq!(texts(&tree, app), ["barbara", "ada", "margaret", "BARBARA", "ADA", "MARGARET"]);
	assert_eq!(engine.subscriptions_at("pretty.2.name"), Ok(1));
}

#[test]
fn computed_values_are_read_only() {
	let tree = MemoryTree::new();
	tree.add_mount("app");
	let engine = Engine::new(tree, mapped());
	let root = run(&engine, vec![]);
	assert!(matches!(root.set("pretty.0.name", "x"), Err(Error::ReadOnly { .. })));
	assert!(matches!(root.set("pretty", 1), Err(Error::ReadOnly { .. })));
}

#[test]
fn mapped_lists_write_through() {
	let tree = MemoryTree::new();
	let app = tree.add_mount("app");
	let engine = Engine::new(
		tree.clone(),
		Value::object(vec![
			("people", Value::from(json!([{ "name": "ada" }, { "name": "grace" }]))),
			(
				"pretty",
				Value::mapped(
					"people",
					|person, _| Value::object(vec![("label", Value::from(read(person, "name").to_string().to_uppercase()))]),
					vec![("name", "name")],
					|item| Value::object(vec![("name", Value::from(read(&item, "name").to_string().to_lowercase()))]),
				),
			),
		]),
	);
	engine.declare_dependency("people", vec!["pretty"]).unwrap();
	let root = run(
		&engine,
		vec![
			Node::each("people", "p", vec![Node::get("p.name")]),
			Node::each(
				"pretty",
				"p",
				vec![Node::element("input", vec![("bind-input-value", "p.name")], vec![]), Node::get("p.name")],
			),
		],
	);
	assert_eq!(texts(&tree, app), ["ada", "grace", "ada", "grace"]);
	assert_eq!(engine.read("pretty.1.label"), Value::from("GRACE"));

	root.set("pretty.1.name", "hopper").unwrap();
	assert_eq!(engine.read("people.1.name"), Value::from("hopper"));
	assert_eq!(engine.read("pretty.1.label"), Value::from("HOPPER"));
	assert_eq!(texts(&tree, app), ["ada", "hopper", "ada", "hopper"]);

	let input = tree.find_all(app, "input")[0];
	tree.set_property(&input, "value", &Value::from("lovelace"));
	tree.fire(input, "input");
	assert_eq!(engine.read("people.0.name"), Value::from("lovelace"));
	assert_eq!(texts(&tree, app), ["lovelace", "hopper", "lovelace", "hopper"]);

	assert_eq!(root.at("pretty").push(vec![Value::from(json!({ "name": "Barbara" }))]), Ok(3));
	assert_eq!(engine.read("people.2"), Value::from(json!({ "name": "barbara" })));
	assert_eq!(texts(&tree, app), ["lovelace", "hopper", "barbara", "lovelace", "hopper", "barbara"]);

	assert_eq!(root.at("pretty").shift(), Ok(Some(Value::from(json!({ "name": "lovelace" })))));
	assert_eq!(texts(&tree, app), ["hopper", "barbara", "hopper", "barbara"]);

	assert!(matches!(root.set("pretty.0.label", "x"), Err(Error::ReadOnly { .. })));
	assert!(matches!(root.set("pretty", Value::list(vec![])), Err(Error::ReadOnly { .. })));
}

/// Renders `<GET>d</GET>` for a `d` that counts its evaluations, declares `declarations` and sets `a`.
/// Returns the number of evaluations caused by the write.
fn evaluations_after_write(declarations: &[(&str, &[&str])]) -> usize {
	let evaluations = Rc::new(Cell::new(0));
	let tree = MemoryTree::new();
	let app = tree.add_mount("app");
	let engine = Engine::new(
		tree.clone(),
		Value::object(vec![
			("a", Value::from(1)),
			(
				"d",
				Value::computed({
					let evaluations = Rc::clone(&evaluations);
					move |root| {
						evaluations.set(evaluations.get() + 1);
						Value::from(read(root, "a").as_f64().unwrap_or_default() * 10.0)
					}
				}),
			),
		]),
	);
	for &(source, dependents) in declarations {
		engine.declare_dependency(source, dependents.iter().copied()).unwrap();
	}
	let root = run(&engine, vec![Node::get("d")]);
	assert_eq!(texts(&tree, app), ["10"]);

	let before = evaluations.get();
	root.set("a", 2).unwrap();
	assert_eq!(texts(&tree, app), ["20"]);
	evaluations.get() - before
}

#[test]
fn transitive_dependents_refresh_once() {
	let direct = evaluations_after_write(&[("a", &["d"])]);
	assert!(direct > 0);

	assert_eq!(evaluations_after_write(&[("a", &["b"]), ("b", &["c"]), ("c", &["d"])]), direct);
	assert_eq!(
		evaluations_after_write(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"]), ("a", &["d"])]),
		direct
	);
}

#[test]
fn cycles_terminate() {
	let direct = evaluations_after_write(&[("a", &["d"])]);
	assert_eq!(evaluations_after_write(&[("a", &["d"]), ("d", &["a"])]), direct);
}
