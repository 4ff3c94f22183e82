use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Document, EditError, Editor, ElementKind, ListItemAttrs, ListType, Outcome};
use crate::ops::{Op, Path, Transaction};
use crate::text::{ordered_selection_points, text_blocks_in_order};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndentDirection {
    Increase,
    Decrease,
}

fn list_items(doc: &Document) -> Vec<(Path, &ListItemAttrs)> {
    doc.find_paths(&[], |kind| matches!(kind, ElementKind::ListItem(_)))
        .into_iter()
        .filter_map(|path| {
            let attrs = doc.element(&path)?.kind.as_list_item()?;
            Some((path, attrs))
        })
        .collect()
}

/// 1-based position of the list item at `path` among all list items of the
/// same type and indent, in document order.
pub fn ordinal(doc: &Document, path: &[usize]) -> Option<usize> {
    let target = doc.element(path)?.kind.as_list_item()?;
    let mut count = 0usize;
    for (item_path, attrs) in list_items(doc) {
        if attrs.list_type != target.list_type || attrs.indent != target.indent {
            continue;
        }
        count += 1;
        if item_path == path {
            return Some(count);
        }
    }
    None
}

pub fn find_list_item(doc: &Document, id: Uuid) -> Option<Path> {
    list_items(doc)
        .into_iter()
        .find_map(|(path, attrs)| (attrs.id == id).then_some(path))
}

pub fn ordinal_by_id(doc: &Document, id: Uuid) -> Option<usize> {
    ordinal(doc, &find_list_item(doc, id)?)
}

/// Rendered marker: `"3."` for ordered items, a bullet otherwise.
pub fn marker(doc: &Document, path: &[usize]) -> Option<String> {
    let attrs = doc.element(path)?.kind.as_list_item()?;
    match attrs.list_type {
        ListType::Ordered => ordinal(doc, path).map(|n| format!("{n}.")),
        ListType::Unordered => Some("•".to_string()),
    }
}

/// List items touched by the text selection.
pub(crate) fn selected_list_items(editor: &Editor) -> Vec<(Path, ListItemAttrs)> {
    let (start, end) = ordered_selection_points(editor.selection());
    let Some((_, start_block)) = start.path.split_last() else {
        return Vec::new();
    };
    let Some((_, end_block)) = end.path.split_last() else {
        return Vec::new();
    };

    let blocks = text_blocks_in_order(editor.doc());
    let (Some(a), Some(b)) = (
        blocks.iter().position(|blk| blk.path == start_block),
        blocks.iter().position(|blk| blk.path == end_block),
    ) else {
        return Vec::new();
    };
    let (a, b) = (a.min(b), a.max(b));

    blocks
        .into_iter()
        .take(b + 1)
        .skip(a)
        .filter_map(|blk| {
            let attrs = blk.el.kind.as_list_item()?.clone();
            Some((blk.path, attrs))
        })
        .collect()
}

/// Shifts every selected list item one level, clamped to `[0, max_list_indent]`.
pub fn adjust_indent(editor: &mut Editor, direction: IndentDirection) -> Result<Outcome, EditError> {
    let max_indent = editor.config().max_list_indent;
    let mut ops: Vec<Op> = Vec::new();
    for (path, attrs) in selected_list_items(editor) {
        let next = match direction {
            IndentDirection::Increase => attrs.indent.saturating_add(1).min(max_indent),
            IndentDirection::Decrease => attrs.indent.saturating_sub(1),
        };
        if next == attrs.indent {
            continue;
        }
        ops.push(Op::SetNodeKind {
            path,
            kind: ElementKind::ListItem(ListItemAttrs {
                indent: next,
                ..attrs
            }),
        });
    }

    if ops.is_empty() {
        debug!("list indent {direction:?} declined: nothing to change");
        return Ok(Outcome::Noop);
    }

    let source = match direction {
        IndentDirection::Increase => "command:list.indent_increase",
        IndentDirection::Decrease => "command:list.indent_decrease",
    };
    let selection_after = editor.selection().clone();
    editor.apply(
        Transaction::new(ops)
            .selection_after(selection_after)
            .source(source),
    )?;
    Ok(Outcome::Applied)
}
