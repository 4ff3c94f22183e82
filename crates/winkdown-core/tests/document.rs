use pretty_assertions::assert_eq;
use serde_json::json;
use winkdown_core::table::table_node;
use winkdown_core::{
    CommandSpec, Document, EditError, Editor, EditorConfig, EditorPlugin, ElementKind, ListType,
    Node, NormalizePass, Op, PluginRegistry, Point, Selection, Transaction, WinkdownValue,
};

#[test]
fn config_fills_defaults_for_missing_and_invalid_values() {
    let config = EditorConfig::from_json_str("{}").unwrap();
    assert_eq!(
        config,
        EditorConfig {
            max_undo: 200,
            max_normalize_iterations: 100,
            default_col_width: 150.0,
            max_list_indent: 10,
            autoformat_max_prefix_chars: 10,
        }
    );

    let config =
        EditorConfig::from_json_str(r#"{ "max_undo": 5, "default_col_width": -20.0 }"#).unwrap();
    assert_eq!(config.max_undo, 5);
    assert_eq!(config.default_col_width, 150.0);

    assert!(EditorConfig::from_json_str(r#"{ "max_undo": "lots" }"#).is_err());
}

#[test]
fn value_round_trips_through_json() {
    let document = Document {
        children: vec![
            Node::heading(2, "Title"),
            Node::list_item(ListType::Ordered, 1, "step"),
            table_node(2, 2, 120.0),
            Node::paragraph("end"),
        ],
    };
    let value = WinkdownValue::from_document(document.clone());
    let json = value.to_json_pretty().unwrap();

    let decoded = WinkdownValue::from_json_str(&json).unwrap();
    assert_eq!(decoded.schema, "winkdown");
    assert_eq!(decoded.version, 1);
    assert_eq!(decoded.into_document(), document);
}

#[test]
fn value_defaults_schema_and_version() {
    let raw = json!({
        "document": {
            "children": [
                { "node": "element", "kind": { "type": "heading", "level": 9 },
                  "children": [{ "node": "text", "text": "big" }] },
                { "node": "element", "kind": { "type": "paragraph" } }
            ]
        }
    });
    let value = WinkdownValue::from_value(raw).unwrap();
    assert_eq!(value.schema, "winkdown");
    assert_eq!(value.version, 1);

    // Loading repairs what the stored tree got wrong.
    let editor = Editor::new(
        value.into_document(),
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::richtext(),
    );
    assert_eq!(
        editor.doc().children,
        vec![Node::heading(6, "big"), Node::paragraph("")]
    );
}

#[test]
fn foreign_or_newer_values_are_rejected() {
    let err = WinkdownValue::from_value(json!({
        "schema": "other-editor",
        "document": { "children": [] }
    }))
    .unwrap_err();
    assert!(err.to_string().contains("unsupported schema"));

    let err = WinkdownValue::from_value(json!({
        "version": 2,
        "document": { "children": [] }
    }))
    .unwrap_err();
    assert!(err.to_string().contains("unsupported version 2"));
}

#[test]
fn empty_documents_get_a_paragraph() {
    let editor = Editor::new(
        Document::default(),
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::core(),
    );
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0], 0));
}

#[test]
fn adjacent_leaves_with_equal_marks_merge() {
    let editor = Editor::new(
        Document {
            children: vec![Node::element(
                ElementKind::Paragraph,
                vec![Node::text("a"), Node::text("b"), Node::text("c")],
            )],
        },
        Selection::collapsed(Point::new(vec![0, 2], 1)),
        PluginRegistry::core(),
    );
    assert_eq!(editor.doc().children, vec![Node::paragraph("abc")]);
    assert_eq!(editor.selection().focus.path, vec![0, 0]);
}

struct Named(&'static str);

impl EditorPlugin for Named {
    fn id(&self) -> &'static str {
        self.0
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![CommandSpec::new("demo.noop", "Do nothing", |_editor, _args| Ok(()))]
    }
}

#[test]
fn duplicate_command_ids_are_rejected() {
    let plugins: Vec<Box<dyn EditorPlugin>> = vec![Box::new(Named("a")), Box::new(Named("b"))];
    let err = PluginRegistry::new(plugins).err().unwrap();
    assert_eq!(err, "Duplicate command id: demo.noop");

    let registry = PluginRegistry::richtext();
    assert!(registry.command("table.merge_cells").is_some());
    assert!(registry.query("list.ordinal").is_some());
    assert!(registry.command("demo.noop").is_none());
}

/// Keeps prefixing a bang to any leaf that starts with one.
struct Bang;

impl NormalizePass for Bang {
    fn id(&self) -> &'static str {
        "demo.bang"
    }

    fn run(&self, doc: &Document, _config: &EditorConfig) -> Vec<Op> {
        match doc.node(&[0, 0]) {
            Some(Node::Text(t)) if t.text.starts_with('!') => vec![Op::InsertText {
                path: vec![0, 0],
                offset: 0,
                text: "!".to_string(),
            }],
            _ => Vec::new(),
        }
    }
}

struct BangPlugin;

impl EditorPlugin for BangPlugin {
    fn id(&self) -> &'static str {
        "demo"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(Bang)]
    }
}

#[test]
fn diverging_normalization_rolls_back() {
    let plugins: Vec<Box<dyn EditorPlugin>> = vec![Box::new(BangPlugin)];
    let mut editor = Editor::new(
        Document {
            children: vec![Node::paragraph("calm")],
        },
        Selection::collapsed(Point::new(vec![0, 0], 0)),
        PluginRegistry::new(plugins).unwrap(),
    )
    .with_config(EditorConfig {
        max_normalize_iterations: 3,
        ..Default::default()
    });

    let err = editor
        .apply(Transaction::new(vec![Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "!".to_string(),
        }]))
        .unwrap_err();

    assert!(matches!(err, EditError::NormalizeDidNotConverge(3)));
    assert_eq!(editor.doc().children, vec![Node::paragraph("calm")]);
    assert!(!editor.can_undo());
}
