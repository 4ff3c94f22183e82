use serde::{Deserialize, Serialize};

use crate::core::{EditError, Editor, Marks, Node, Outcome, Point, Selection};
use crate::ops::{Op, Transaction};
use crate::text::{
    TextBlock, apply_marks_in_block, clamp_to_char_boundary, is_point_in_block, leaf,
    ordered_selection_points, point_for_global_offset, point_global_offset, text_blocks_in_order,
    total_text_len,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkKind {
    Bold,
    Italic,
    Underline,
    Code,
}

impl MarkKind {
    pub fn get(self, marks: &Marks) -> bool {
        match self {
            MarkKind::Bold => marks.bold,
            MarkKind::Italic => marks.italic,
            MarkKind::Underline => marks.underline,
            MarkKind::Code => marks.code,
        }
    }

    pub fn set(self, marks: &mut Marks, value: bool) {
        match self {
            MarkKind::Bold => marks.bold = value,
            MarkKind::Italic => marks.italic = value,
            MarkKind::Underline => marks.underline = value,
            MarkKind::Code => marks.code = value,
        }
    }

    /// Mark bound to Ctrl/Cmd + `key`.
    pub fn from_chord_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'b' => Some(MarkKind::Bold),
            'i' => Some(MarkKind::Italic),
            'u' => Some(MarkKind::Underline),
            '`' => Some(MarkKind::Code),
            _ => None,
        }
    }

    fn source(self) -> &'static str {
        match self {
            MarkKind::Bold => "command:marks.toggle_bold",
            MarkKind::Italic => "command:marks.toggle_italic",
            MarkKind::Underline => "command:marks.toggle_underline",
            MarkKind::Code => "command:marks.toggle_code",
        }
    }
}

/// Marks of the leaf under the caret.
pub fn active_marks(editor: &Editor) -> Marks {
    match editor.doc().node(&editor.selection().focus.path) {
        Some(Node::Text(text)) => text.marks.clone(),
        _ => Marks::default(),
    }
}

/// Toggles `mark` over the selection, or for the next typed text at a caret.
///
/// Over a range the mark is cleared only when every selected leaf already has it.
pub fn toggle_mark(editor: &mut Editor, mark: MarkKind) -> Result<Outcome, EditError> {
    let sel = editor.selection().clone();
    let planned = if sel.is_collapsed() {
        toggle_mark_at_caret(editor, |mut marks| {
            let target = !mark.get(&marks);
            mark.set(&mut marks, target);
            marks
        })
    } else {
        let target = !all_selected_text_nodes_have_mark(editor, &sel, mark);
        apply_mark_range(editor, &sel, &|mut marks: Marks| {
            mark.set(&mut marks, target);
            marks
        })
    };

    let Some((ops, selection_after)) = planned else {
        log::debug!("{mark:?} toggle declined: selection is not in a text block");
        return Ok(Outcome::Noop);
    };
    if ops.is_empty() {
        return Ok(Outcome::Noop);
    }

    editor.apply(
        Transaction::new(ops)
            .selection_after(selection_after)
            .source(mark.source()),
    )?;
    Ok(Outcome::Applied)
}

/// Text blocks covered by `sel`, with the selection's start and end points.
fn blocks_in_selection<'a>(
    editor: &'a Editor,
    sel: &Selection,
) -> Option<(Vec<TextBlock<'a>>, Point, Point)> {
    let (start, end) = ordered_selection_points(sel);
    let (_, start_block_path) = start.path.split_last()?;
    let (_, end_block_path) = end.path.split_last()?;

    let blocks = text_blocks_in_order(editor.doc());
    let start_index = blocks.iter().position(|b| b.path == start_block_path)?;
    let end_index = blocks.iter().position(|b| b.path == end_block_path)?;
    let (a, b) = if start_index <= end_index {
        (start_index, end_index)
    } else {
        (end_index, start_index)
    };

    let selected = blocks.into_iter().take(b + 1).skip(a).collect();
    Some((selected, start, end))
}

/// Global `[start, end)` of the selection inside one of its blocks.
fn selected_range(block: &TextBlock<'_>, start: &Point, end: &Point) -> (usize, usize) {
    let children = block.el.children.as_slice();
    let start_global = if is_point_in_block(start, &block.path) {
        point_global_offset(children, start.path.last().copied().unwrap_or(0), start.offset)
    } else {
        0
    };
    let end_global = if is_point_in_block(end, &block.path) {
        point_global_offset(children, end.path.last().copied().unwrap_or(0), end.offset)
    } else {
        total_text_len(children)
    };
    (start_global, end_global)
}

fn all_selected_text_nodes_have_mark(editor: &Editor, sel: &Selection, mark: MarkKind) -> bool {
    let Some((blocks, start, end)) = blocks_in_selection(editor, sel) else {
        return false;
    };

    for block in &blocks {
        let (start_global, end_global) = selected_range(block, &start, &end);
        if start_global >= end_global {
            continue;
        }

        let mut cursor = 0usize;
        for node in &block.el.children {
            let Node::Text(t) = node else {
                continue;
            };
            let node_start = cursor;
            let node_end = cursor + t.text.len();
            cursor = node_end;
            if end_global <= node_start || start_global >= node_end {
                continue;
            }
            if !mark.get(&t.marks) {
                return false;
            }
        }
    }

    true
}

fn apply_mark_range(
    editor: &Editor,
    sel: &Selection,
    apply: &dyn Fn(Marks) -> Marks,
) -> Option<(Vec<Op>, Selection)> {
    let (blocks, start, end) = blocks_in_selection(editor, sel)?;

    let mut ops: Vec<Op> = Vec::new();
    let mut new_anchor = sel.anchor.clone();
    let mut new_focus = sel.focus.clone();

    for block in &blocks {
        let children = block.el.children.as_slice();
        let (start_global, end_global) = selected_range(block, &start, &end);
        if start_global >= end_global {
            continue;
        }

        let new_children = apply_marks_in_block(children, start_global, end_global, apply);

        for child_ix in (0..children.len()).rev() {
            let mut remove_path = block.path.clone();
            remove_path.push(child_ix);
            ops.push(Op::RemoveNode { path: remove_path });
        }
        for (child_ix, node) in new_children.iter().cloned().enumerate() {
            let mut insert_path = block.path.clone();
            insert_path.push(child_ix);
            ops.push(Op::InsertNode {
                path: insert_path,
                node,
            });
        }

        for point in [&mut new_anchor, &mut new_focus] {
            if is_point_in_block(point, &block.path) {
                let global = point_global_offset(
                    children,
                    point.path.last().copied().unwrap_or(0),
                    point.offset,
                );
                *point = point_for_global_offset(&block.path, &new_children, global);
            }
        }
    }

    Some((
        ops,
        Selection {
            anchor: new_anchor,
            focus: new_focus,
        },
    ))
}

/// Splits the caret leaf around an empty leaf carrying the toggled marks.
fn toggle_mark_at_caret(
    editor: &Editor,
    apply: impl Fn(Marks) -> Marks,
) -> Option<(Vec<Op>, Selection)> {
    let focus = editor.selection().focus.clone();
    let (child_ix, block_path) = focus.path.split_last()?;

    let block = editor.doc().element(block_path)?;
    if !block.kind.is_text_block() {
        return None;
    }
    let Some(Node::Text(text)) = block.children.get(*child_ix) else {
        return None;
    };

    let cursor = clamp_to_char_boundary(&text.text, focus.offset);
    let marks_before = text.marks.clone();
    let marks_after = apply(marks_before.clone());

    if text.text.is_empty() {
        let selection_after = Selection::collapsed(Point::new(focus.path.clone(), 0));
        return Some((
            vec![Op::SetTextMarks {
                path: focus.path.clone(),
                marks: marks_after,
            }],
            selection_after,
        ));
    }

    let mut replacement: Vec<Node> = Vec::new();
    let base_child_ix = *child_ix;
    let mut caret_child_ix = base_child_ix;

    let left = &text.text[..cursor];
    let right = &text.text[cursor..];

    if !left.is_empty() {
        replacement.push(leaf(left, marks_before.clone()));
        caret_child_ix += 1;
    }
    replacement.push(leaf("", marks_after));
    if !right.is_empty() {
        replacement.push(leaf(right, marks_before));
    }

    let mut ops: Vec<Op> = vec![Op::RemoveNode {
        path: focus.path.clone(),
    }];
    for (i, node) in replacement.into_iter().enumerate() {
        let mut path = block_path.to_vec();
        path.push(base_child_ix + i);
        ops.push(Op::InsertNode { path, node });
    }

    let mut caret_path = block_path.to_vec();
    caret_path.push(caret_child_ix);
    Some((ops, Selection::collapsed(Point::new(caret_path, 0))))
}
