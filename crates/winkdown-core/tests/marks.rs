use pretty_assertions::assert_eq;
use winkdown_core::{Document, Editor, Marks, Node, PluginRegistry, Point, Selection, TextNode};

fn leaves(editor: &Editor, block: usize) -> Vec<(String, Marks)> {
    let Node::Element(el) = &editor.doc().children[block] else {
        panic!("expected element block");
    };
    el.children
        .iter()
        .filter_map(|node| match node {
            Node::Text(TextNode { text, marks }) => Some((text.clone(), marks.clone())),
            Node::Element(_) => None,
        })
        .collect()
}

fn bold() -> Marks {
    Marks {
        bold: true,
        ..Default::default()
    }
}

fn italic() -> Marks {
    Marks {
        italic: true,
        ..Default::default()
    }
}

fn editor_with(children: Vec<Node>, selection: Selection) -> Editor {
    Editor::new(Document { children }, selection, PluginRegistry::richtext())
}

#[test]
fn toggle_bold_only_affects_selection_range() {
    let mut editor = editor_with(
        vec![Node::paragraph("abcde")],
        Selection {
            anchor: Point::new(vec![0, 0], 1),
            focus: Point::new(vec![0, 0], 3),
        },
    );

    editor.run_command("marks.toggle_bold", None).unwrap();
    assert_eq!(
        leaves(&editor, 0),
        vec![
            ("a".to_string(), Marks::default()),
            ("bc".to_string(), bold()),
            ("de".to_string(), Marks::default()),
        ]
    );

    // Every selected leaf is bold now, so the second toggle clears it.
    editor.run_command("marks.toggle_bold", None).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("abcde")]);
}

#[test]
fn mixed_selection_is_marked_throughout() {
    let mut editor = editor_with(
        vec![Node::paragraph("abcde")],
        Selection {
            anchor: Point::new(vec![0, 0], 0),
            focus: Point::new(vec![0, 0], 2),
        },
    );
    editor.run_command("marks.toggle_bold", None).unwrap();

    editor.set_selection(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 1], 3),
    });
    editor.run_command("marks.toggle_bold", None).unwrap();
    assert_eq!(leaves(&editor, 0), vec![("abcde".to_string(), bold())]);
}

#[test]
fn toggle_spans_several_blocks() {
    let mut editor = editor_with(
        vec![Node::paragraph("ab"), Node::paragraph("cd")],
        Selection {
            anchor: Point::new(vec![0, 0], 1),
            focus: Point::new(vec![1, 0], 1),
        },
    );
    editor.run_command("marks.toggle_italic", None).unwrap();

    assert_eq!(
        leaves(&editor, 0),
        vec![
            ("a".to_string(), Marks::default()),
            ("b".to_string(), italic()),
        ]
    );
    assert_eq!(
        leaves(&editor, 1),
        vec![
            ("c".to_string(), italic()),
            ("d".to_string(), Marks::default()),
        ]
    );
}

#[test]
fn caret_toggle_marks_the_next_typed_text() {
    let mut editor = editor_with(
        vec![Node::paragraph("abc")],
        Selection::collapsed(Point::new(vec![0, 0], 3)),
    );

    editor.run_command("marks.toggle_bold", None).unwrap();
    assert_eq!(
        editor.run_query::<Marks>("marks.get_active", None).unwrap(),
        bold()
    );

    editor.insert_text("d").unwrap();
    assert_eq!(
        leaves(&editor, 0),
        vec![
            ("abc".to_string(), Marks::default()),
            ("d".to_string(), bold()),
        ]
    );
}

#[test]
fn caret_toggle_in_an_empty_block_sets_the_leaf_marks() {
    let mut editor = Editor::with_richtext_plugins();
    editor.run_command("marks.toggle_code", None).unwrap();
    editor.insert_text("x").unwrap();

    assert_eq!(
        leaves(&editor, 0),
        vec![(
            "x".to_string(),
            Marks {
                code: true,
                ..Default::default()
            }
        )]
    );
}

#[test]
fn unknown_commands_are_reported() {
    let mut editor = Editor::with_richtext_plugins();
    let err = editor.run_command("marks.toggle_strike", None).unwrap_err();
    assert_eq!(err.message(), "Unknown command: marks.toggle_strike");

    let err = editor.run_query_json("marks.nope", None).unwrap_err();
    assert_eq!(err.message(), "Unknown query: marks.nope");
}
