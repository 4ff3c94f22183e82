use pretty_assertions::assert_eq;
use winkdown_core::table::{GridRect, SelectionMode, SelectionShape, table_node};
use winkdown_core::{Document, Editor, Node, Op, PluginRegistry, Point, Selection, Transaction};

/// A 3x3 table at `[0]` followed by a paragraph at `[1]`.
fn editor() -> Editor {
    Editor::new(
        Document {
            children: vec![table_node(3, 3, 100.0), Node::paragraph("after")],
        },
        Selection::collapsed(Point::new(vec![0, 0, 0, 0, 0], 0)),
        PluginRegistry::richtext(),
    )
}

fn drag(editor: &mut Editor, from: &[usize], to: &[usize]) {
    editor.start_cell_selection(from).unwrap();
    editor.update_cell_selection(to).unwrap();
    editor.end_cell_selection();
}

#[test]
fn drag_selects_the_rectangle_between_two_cells() {
    let mut editor = editor();
    editor.start_cell_selection(&[0, 2, 2, 0, 0]).unwrap();
    assert_eq!(editor.cell_selection().mode(), SelectionMode::Selecting);
    assert!(!editor.has_cell_selection());

    editor.update_cell_selection(&[0, 1, 1]).unwrap();
    assert!(editor.has_cell_selection());
    editor.end_cell_selection();

    let sel = editor.cell_selection();
    assert_eq!(sel.mode(), SelectionMode::Selected);
    assert_eq!(sel.rect(), Some(GridRect::new(1, 1, 2, 2)));
    assert_eq!(
        editor.selected_cells(),
        &[vec![0, 1, 1], vec![0, 1, 2], vec![0, 2, 1], vec![0, 2, 2]]
    );
}

#[test]
fn drag_over_a_merged_cell_expands_to_cover_it() {
    let mut editor = editor();
    drag(&mut editor, &[0, 0, 0], &[0, 1, 1]);
    editor.run_command("table.merge_cells", None).unwrap();

    // Grid row 1 now holds only (1,2) as cell 0. Dragging from (2,1) to (1,2)
    // clips the merged 2x2 cell, so the rectangle grows over the whole table.
    drag(&mut editor, &[0, 2, 1], &[0, 1, 0]);
    let sel = editor.cell_selection();
    assert_eq!(sel.rect(), Some(GridRect::new(0, 0, 3, 3)));
    assert_eq!(
        editor.selected_cells(),
        &[
            vec![0, 0, 0],
            vec![0, 0, 1],
            vec![0, 1, 0],
            vec![0, 2, 0],
            vec![0, 2, 1],
            vec![0, 2, 2],
        ]
    );
    assert!(sel.is_mergeable());
}

#[test]
fn single_cell_click_is_not_a_selection() {
    let mut editor = editor();
    drag(&mut editor, &[0, 1, 1], &[0, 1, 1]);
    assert!(!editor.has_cell_selection());
    assert_eq!(editor.cell_selection().mode(), SelectionMode::Idle);
    assert!(editor.selected_cells().is_empty());
}

#[test]
fn updates_outside_the_drag_table_are_ignored() {
    let mut editor = editor();
    editor.start_cell_selection(&[0, 0, 0]).unwrap();
    editor.update_cell_selection(&[0, 0, 1]).unwrap();
    editor.update_cell_selection(&[1, 0]).unwrap();
    editor.end_cell_selection();
    assert_eq!(editor.selected_cells(), &[vec![0, 0, 0], vec![0, 0, 1]]);

    // Without a drag in progress updates do nothing.
    editor.update_cell_selection(&[0, 2, 2]).unwrap();
    assert_eq!(editor.selected_cells().len(), 2);
}

#[test]
fn starting_outside_a_table_clears() {
    let mut editor = editor();
    drag(&mut editor, &[0, 0, 0], &[0, 0, 2]);
    assert!(editor.has_cell_selection());

    editor.start_cell_selection(&[1, 0]).unwrap();
    assert!(!editor.has_cell_selection());
    assert_eq!(editor.cell_selection().table_path(), None);
}

#[test]
fn explicit_cell_sets_are_classified() {
    let mut editor = editor();

    editor
        .select_cells(&[vec![0, 0, 2], vec![0, 1, 2], vec![0, 2, 2]])
        .unwrap();
    assert_eq!(
        editor.cell_selection().shape(),
        Some(SelectionShape::Rectangle(GridRect::new(0, 2, 3, 1)))
    );
    assert!(editor.cell_selection().is_mergeable());

    // An L shape.
    editor
        .select_cells(&[vec![0, 0, 0], vec![0, 1, 0], vec![0, 1, 1]])
        .unwrap();
    assert_eq!(
        editor.cell_selection().shape(),
        Some(SelectionShape::Irregular)
    );
    assert!(!editor.cell_selection().is_mergeable());
    let before = editor.doc().clone();
    editor.run_command("table.merge_cells", None).unwrap();
    assert_eq!(editor.doc(), &before);
}

#[test]
fn cells_from_two_tables_select_nothing() {
    let mut editor = Editor::new(
        Document {
            children: vec![table_node(1, 2, 100.0), table_node(1, 2, 100.0)],
        },
        Selection::collapsed(Point::new(vec![0, 0, 0, 0, 0], 0)),
        PluginRegistry::richtext(),
    );
    editor.select_cells(&[vec![0, 0, 0], vec![1, 0, 1]]).unwrap();
    assert!(!editor.has_cell_selection());
}

#[test]
fn moving_the_caret_out_of_the_table_clears() {
    let mut editor = editor();
    drag(&mut editor, &[0, 0, 0], &[0, 1, 1]);

    editor.set_selection(Selection::collapsed(Point::new(vec![0, 2, 2, 0, 0], 0)));
    assert!(editor.has_cell_selection());

    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0], 2)));
    assert!(!editor.has_cell_selection());
}

#[test]
fn edits_that_move_the_caret_out_of_the_table_clear() {
    let mut editor = editor();
    drag(&mut editor, &[0, 0, 0], &[0, 1, 1]);

    editor
        .apply(
            Transaction::new(vec![Op::InsertText {
                path: vec![1, 0],
                offset: 5,
                text: "!".to_string(),
            }])
            .selection_after(Selection::collapsed(Point::new(vec![1, 0], 6))),
        )
        .unwrap();
    assert!(!editor.has_cell_selection());
    assert_eq!(editor.cell_selection().mode(), SelectionMode::Idle);
}

#[test]
fn text_edits_keep_and_structural_edits_clear() {
    let mut editor = editor();
    drag(&mut editor, &[0, 0, 0], &[0, 1, 1]);

    editor.insert_text("typed").unwrap();
    assert!(editor.has_cell_selection());
    assert_eq!(editor.selected_cells().len(), 4);

    editor.run_command("table.insert_row_below", None).unwrap();
    assert!(!editor.has_cell_selection());
}

#[test]
fn undo_and_clear_reset_the_selection() {
    let mut editor = editor();
    editor.insert_text("x").unwrap();
    drag(&mut editor, &[0, 0, 0], &[0, 0, 1]);
    assert!(editor.undo());
    assert!(!editor.has_cell_selection());

    drag(&mut editor, &[0, 0, 0], &[0, 0, 1]);
    editor.clear_cell_selection();
    assert_eq!(editor.cell_selection().mode(), SelectionMode::Idle);
    assert!(editor.selected_cells().is_empty());
}
