use pretty_assertions::assert_eq;
use winkdown_core::{
    Document, EditError, Editor, EditorConfig, Node, Op, PluginRegistry, Point, Selection,
    Transaction,
};

fn editor_with_text(text: &str) -> Editor {
    let doc = Document {
        children: vec![Node::paragraph(text)],
    };
    let selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    Editor::new(doc, selection, PluginRegistry::core())
}

#[test]
fn undo_redo_handles_multi_op_insert_order() {
    let mut editor = editor_with_text("");

    let tx = Transaction::new(vec![
        Op::InsertText {
            path: vec![0, 0],
            offset: 0,
            text: "a".to_string(),
        },
        Op::InsertText {
            path: vec![0, 0],
            offset: 1,
            text: "b".to_string(),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(vec![0, 0], 2)))
    .source("test:multi_insert");

    editor.apply(tx).unwrap();
    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
    assert_eq!(editor.selection().focus.offset, 2);

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("")]);
    assert_eq!(editor.selection().focus.offset, 0);

    assert!(editor.redo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("ab")]);
    assert_eq!(editor.selection().focus.offset, 2);
}

#[test]
fn undo_redo_restores_split_blocks() {
    let mut editor = editor_with_text("XYZ");
    let selection_before = editor.selection().clone();

    let tx = Transaction::new(vec![
        Op::RemoveText {
            path: vec![0, 0],
            range: 1..3,
        },
        Op::InsertNode {
            path: vec![1],
            node: Node::paragraph("YZ"),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(vec![1, 0], 0)))
    .source("test:split");

    editor.apply(tx).unwrap();
    assert_eq!(
        editor.doc().children,
        vec![Node::paragraph("X"), Node::paragraph("YZ")]
    );

    assert!(editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("XYZ")]);
    assert_eq!(editor.selection(), &selection_before);

    assert!(editor.redo());
    assert_eq!(editor.doc().children.len(), 2);
    assert_eq!(
        editor.selection(),
        &Selection::collapsed(Point::new(vec![1, 0], 0))
    );
}

#[test]
fn failed_transaction_leaves_the_editor_untouched() {
    let mut editor = editor_with_text("keep");
    let before = editor.doc().clone();

    let tx = Transaction::new(vec![
        Op::InsertText {
            path: vec![0, 0],
            offset: 4,
            text: "!".to_string(),
        },
        Op::RemoveNode { path: vec![7] },
    ]);
    let err = editor.apply(tx).unwrap_err();

    assert!(matches!(err, EditError::InvalidPath(_)));
    assert_eq!(editor.doc(), &before);
    assert!(!editor.can_undo());
}

#[test]
fn new_edits_clear_the_redo_stack() {
    let mut editor = editor_with_text("");
    editor.insert_text("a").unwrap();
    editor.insert_text("b").unwrap();

    assert!(editor.undo());
    assert!(editor.can_redo());

    editor.insert_text("c").unwrap();
    assert!(!editor.can_redo());
    assert!(!editor.redo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("ac")]);
}

#[test]
fn history_is_capped_by_config() {
    let mut editor = editor_with_text("").with_config(EditorConfig {
        max_undo: 2,
        ..Default::default()
    });
    for text in ["a", "b", "c"] {
        editor.insert_text(text).unwrap();
    }

    assert!(editor.undo());
    assert!(editor.undo());
    assert!(!editor.undo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("a")]);
}

#[test]
fn undo_with_empty_history_does_nothing() {
    let mut editor = editor_with_text("x");
    assert!(!editor.can_undo());
    assert!(!editor.undo());
    assert!(!editor.redo());
    assert_eq!(editor.doc().children, vec![Node::paragraph("x")]);
}

#[test]
fn preview_does_not_mutate() {
    let editor = editor_with_text("abc");
    let tx = Transaction::new(vec![Op::InsertText {
        path: vec![0, 0],
        offset: 3,
        text: "d".to_string(),
    }])
    .selection_after(Selection::collapsed(Point::new(vec![0, 0], 4)));

    let preview = editor.preview_transaction(&tx).unwrap();
    assert_eq!(preview.doc.children, vec![Node::paragraph("abcd")]);
    assert_eq!(preview.selection.focus.offset, 4);
    assert_eq!(editor.doc().children, vec![Node::paragraph("abc")]);
    assert!(!editor.can_undo());
}

#[test]
fn insert_text_needs_a_collapsed_caret() {
    let mut editor = editor_with_text("abc");
    editor.set_selection(Selection {
        anchor: Point::new(vec![0, 0], 0),
        focus: Point::new(vec![0, 0], 2),
    });
    assert!(!editor.insert_text("x").unwrap().is_applied());
    assert!(!editor.insert_text("").unwrap().is_applied());
    assert_eq!(editor.doc().children, vec![Node::paragraph("abc")]);
}
