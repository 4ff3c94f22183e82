use std::collections::BTreeSet;

use log::debug;

use crate::core::{
    CellAlign, CellAttrs, CellBorders, EditError, Editor, ElementKind, ElementNode, Node, Outcome,
    Point, Selection, TableAttrs,
};
use crate::ops::{Op, Path, Transaction};
use crate::table::grid::{CellAddr, GridRect, Layout, TableGrid, plain_cell};
use crate::table::selection::SelectionShape;
use crate::text::{block_of_point, first_text_point_in, last_text_point_in};

/// A fresh table of plain cells, every column `col_width` wide.
pub fn table_node(rows: usize, cols: usize, col_width: f64) -> Node {
    Node::element(
        ElementKind::Table(TableAttrs {
            col_sizes: vec![col_width; cols],
        }),
        (0..rows)
            .map(|_| {
                Node::element(
                    ElementKind::TableRow,
                    (0..cols).map(|_| Node::Element(plain_cell())).collect(),
                )
            })
            .collect(),
    )
}

fn declined(operation: &str, reason: &str) -> Outcome {
    debug!("{operation} declined: {reason}");
    Outcome::Noop
}

/// Cell the edit applies to, with the path of its table.
fn context_cell_path(editor: &Editor) -> Option<(Path, Path)> {
    let doc = editor.doc();
    let cell_path = doc
        .ancestor_path(&editor.selection().focus.path, |kind| {
            matches!(kind, ElementKind::TableCell(_))
        })
        .or_else(|| editor.selected_cells().first().cloned())?;
    let table_path = cell_path.get(..cell_path.len().checked_sub(2)?)?.to_vec();
    doc.element(&table_path)?.kind.as_table()?;
    Some((cell_path, table_path))
}

struct TableContext {
    table_path: Path,
    table: ElementNode,
    grid: TableGrid,
    rect: GridRect,
}

fn table_context(editor: &Editor) -> Result<Option<TableContext>, EditError> {
    let Some((cell_path, table_path)) = context_cell_path(editor) else {
        return Ok(None);
    };
    let Some(table) = editor.doc().element(&table_path) else {
        return Ok(None);
    };
    let grid = TableGrid::resolve(table)?;
    let Some(rect) = grid
        .addr_of(&table_path, &cell_path)
        .and_then(|addr| grid.rect(addr))
    else {
        return Ok(None);
    };
    Ok(Some(TableContext {
        table: table.clone(),
        table_path,
        grid,
        rect,
    }))
}

/// Caret at the start of whichever cell covers grid position `(row, col)`.
fn caret_in_grid_cell(
    table_path: &[usize],
    table: &ElementNode,
    row: usize,
    col: usize,
) -> Option<Selection> {
    let grid = TableGrid::resolve(table).ok()?;
    let row = row.min(grid.rows().checked_sub(1)?);
    let col = col.min(grid.cols().checked_sub(1)?);
    let addr: CellAddr = grid.owner_at(row, col)?;
    let cell = table.children.get(addr.row)?.as_element()?.children.get(addr.cell)?;
    let point = first_text_point_in(cell, &TableGrid::cell_path(table_path, addr))?;
    Some(Selection::collapsed(point))
}

fn replace_table(
    editor: &mut Editor,
    table_path: &[usize],
    table: ElementNode,
    caret_at: (usize, usize),
    source: &str,
) -> Result<Outcome, EditError> {
    let caret = caret_in_grid_cell(table_path, &table, caret_at.0, caret_at.1);
    let mut tx = Transaction::new(vec![
        Op::RemoveNode {
            path: table_path.to_vec(),
        },
        Op::InsertNode {
            path: table_path.to_vec(),
            node: Node::Element(table),
        },
    ])
    .source(source);
    if let Some(caret) = caret {
        tx = tx.selection_after(caret);
    }
    editor.apply(tx)?;
    Ok(Outcome::Applied)
}

/// Inserts a `rows` x `cols` table at the caret. An empty paragraph under the
/// caret is replaced; any other block gets the table after it.
pub fn insert_table(
    editor: &mut Editor,
    rows: usize,
    cols: usize,
    col_width: Option<f64>,
) -> Result<Outcome, EditError> {
    if rows == 0 || cols == 0 {
        return Ok(declined("insert table", "empty dimensions"));
    }
    let width = col_width
        .filter(|w| w.is_finite() && *w > 0.0)
        .unwrap_or(editor.config().default_col_width);

    let focus = editor.selection().focus.clone();
    let Some((block_path, block)) = block_of_point(editor.doc(), &focus) else {
        return Ok(declined("insert table", "caret is not in a text block"));
    };
    let replace = block.kind == ElementKind::Paragraph && block.text().is_empty();
    let Some((&block_ix, parent_path)) = block_path.split_last() else {
        return Ok(declined("insert table", "caret is not in a text block"));
    };
    let parent_len = editor
        .doc()
        .children_at(parent_path)
        .map_or(0, <[Node]>::len);

    let table_ix = if replace { block_ix } else { block_ix + 1 };
    let mut table_path = parent_path.to_vec();
    table_path.push(table_ix);

    let mut ops: Vec<Op> = Vec::new();
    if replace {
        ops.push(Op::RemoveNode {
            path: block_path.clone(),
        });
    }
    ops.push(Op::InsertNode {
        path: table_path.clone(),
        node: table_node(rows, cols, width),
    });
    let len_after = if replace { parent_len } else { parent_len + 1 };
    if table_ix + 1 == len_after {
        let mut paragraph_path = parent_path.to_vec();
        paragraph_path.push(table_ix + 1);
        ops.push(Op::InsertNode {
            path: paragraph_path,
            node: Node::paragraph(""),
        });
    }

    let mut caret_path = table_path;
    caret_path.extend([0, 0, 0, 0]);
    editor.apply(
        Transaction::new(ops)
            .selection_after(Selection::collapsed(Point::new(caret_path, 0)))
            .source("command:table.insert"),
    )?;
    Ok(Outcome::Applied)
}

/// Inserts a grid row above or below the current cell's region. Cells
/// spanning across the new boundary grow instead of gaining a neighbour.
pub fn insert_row(editor: &mut Editor, above: bool) -> Result<Outcome, EditError> {
    let Some(ctx) = table_context(editor)? else {
        return Ok(declined("insert row", "no table at the caret"));
    };
    let at = if above { ctx.rect.row } else { ctx.rect.bottom() };
    let mut layout = Layout::from_table(&ctx.table, &ctx.grid)?;
    layout.insert_row(at);

    let source = if above {
        "command:table.insert_row_above"
    } else {
        "command:table.insert_row_below"
    };
    replace_table(
        editor,
        &ctx.table_path,
        layout.into_table(),
        (at, ctx.rect.col),
        source,
    )
}

/// Inserts a grid column left or right of the current cell's region, as wide
/// as the neighbouring column.
pub fn insert_column(editor: &mut Editor, before: bool) -> Result<Outcome, EditError> {
    let Some(ctx) = table_context(editor)? else {
        return Ok(declined("insert column", "no table at the caret"));
    };
    let (at, neighbour) = if before {
        (ctx.rect.col, ctx.rect.col)
    } else {
        (ctx.rect.right(), ctx.rect.right() - 1)
    };
    let width = ctx
        .table
        .kind
        .as_table()
        .and_then(|attrs| attrs.col_sizes.get(neighbour).copied())
        .unwrap_or(editor.config().default_col_width);

    let mut layout = Layout::from_table(&ctx.table, &ctx.grid)?;
    layout.insert_column(at, width);

    let source = if before {
        "command:table.insert_col_left"
    } else {
        "command:table.insert_col_right"
    };
    replace_table(
        editor,
        &ctx.table_path,
        layout.into_table(),
        (ctx.rect.row, at),
        source,
    )
}

/// Removes the grid row the caret's cell starts on. The last row takes the table with it.
pub fn delete_row(editor: &mut Editor) -> Result<Outcome, EditError> {
    let Some(ctx) = table_context(editor)? else {
        return Ok(declined("delete row", "no table at the caret"));
    };
    if ctx.grid.rows() <= 1 {
        return remove_table(editor, &ctx.table_path, "command:table.delete_row");
    }
    let mut layout = Layout::from_table(&ctx.table, &ctx.grid)?;
    layout.delete_row(ctx.rect.row);
    replace_table(
        editor,
        &ctx.table_path,
        layout.into_table(),
        (ctx.rect.row, ctx.rect.col),
        "command:table.delete_row",
    )
}

/// Removes the grid column the caret's cell starts on. The last column takes the table with it.
pub fn delete_column(editor: &mut Editor) -> Result<Outcome, EditError> {
    let Some(ctx) = table_context(editor)? else {
        return Ok(declined("delete column", "no table at the caret"));
    };
    if ctx.grid.cols() <= 1 {
        return remove_table(editor, &ctx.table_path, "command:table.delete_col");
    }
    let mut layout = Layout::from_table(&ctx.table, &ctx.grid)?;
    layout.delete_column(ctx.rect.col);
    replace_table(
        editor,
        &ctx.table_path,
        layout.into_table(),
        (ctx.rect.row, ctx.rect.col),
        "command:table.delete_col",
    )
}

pub fn delete_table(editor: &mut Editor) -> Result<Outcome, EditError> {
    let Some((_, table_path)) = context_cell_path(editor) else {
        return Ok(declined("delete table", "no table at the caret"));
    };
    remove_table(editor, &table_path, "command:table.delete_table")
}

fn remove_table(editor: &mut Editor, table_path: &[usize], source: &str) -> Result<Outcome, EditError> {
    let Some((&table_ix, parent_path)) = table_path.split_last() else {
        return Ok(declined("delete table", "invalid table path"));
    };
    let siblings = editor.doc().children_at(parent_path).unwrap_or(&[]);

    // The next sibling moves into the table's index once the table is gone.
    let caret = siblings
        .get(table_ix + 1)
        .and_then(|next| first_text_point_in(next, table_path))
        .or_else(|| {
            let prev_ix = table_ix.checked_sub(1)?;
            let mut prev_path = parent_path.to_vec();
            prev_path.push(prev_ix);
            last_text_point_in(siblings.get(prev_ix)?, &prev_path)
        });

    let mut tx = Transaction::new(vec![Op::RemoveNode {
        path: table_path.to_vec(),
    }])
    .source(source);
    if let Some(caret) = caret {
        tx = tx.selection_after(Selection::collapsed(caret));
    }
    editor.apply(tx)?;
    editor.clear_cell_selection();
    Ok(Outcome::Applied)
}

/// Merges the selected cells into the top-left one.
///
/// Requires a multi-cell selection whose cells are exactly the regions of a
/// closed rectangle.
pub fn merge_cells(editor: &mut Editor) -> Result<Outcome, EditError> {
    let sel = editor.cell_selection();
    if !sel.has_selection() {
        return Ok(declined("merge cells", "fewer than two cells selected"));
    }
    let Some(SelectionShape::Rectangle(rect)) = sel.shape() else {
        return Ok(declined("merge cells", "selection is not rectangular"));
    };
    let Some(table_path) = sel.table_path().cloned() else {
        return Ok(declined("merge cells", "selection has no table"));
    };
    let selected: BTreeSet<Path> = sel.selected_cells().iter().cloned().collect();

    let Some(table) = editor
        .doc()
        .element(&table_path)
        .filter(|el| el.kind.as_table().is_some())
        .cloned()
    else {
        return Ok(declined("merge cells", "selection has no table"));
    };
    let grid = TableGrid::resolve(&table)?;
    let expected: BTreeSet<Path> = grid
        .anchors()
        .filter(|(_, region)| rect.contains(region))
        .map(|(addr, _)| TableGrid::cell_path(&table_path, addr))
        .collect();
    if expected.len() < 2 || expected != selected {
        return Ok(declined("merge cells", "selection does not match its rectangle"));
    }

    let mut layout = Layout::from_table(&table, &grid)?;
    if !layout.merge(rect) {
        return Ok(declined("merge cells", "nothing inside the rectangle"));
    }
    let outcome = replace_table(
        editor,
        &table_path,
        layout.into_table(),
        (rect.row, rect.col),
        "command:table.merge_cells",
    )?;
    editor.clear_cell_selection();
    Ok(outcome)
}

/// Whether the caret's cell spans more than one grid position.
pub fn can_split(editor: &Editor) -> bool {
    matches!(table_context(editor), Ok(Some(ctx)) if ctx.rect.area() > 1)
}

/// Splits the caret's merged cell back into plain cells; content stays top-left.
pub fn split_cell(editor: &mut Editor) -> Result<Outcome, EditError> {
    let Some(ctx) = table_context(editor)? else {
        return Ok(declined("split cell", "no table at the caret"));
    };
    if ctx.rect.area() <= 1 {
        return Ok(declined("split cell", "cell is not merged"));
    }
    let mut layout = Layout::from_table(&ctx.table, &ctx.grid)?;
    if !layout.split(ctx.rect) {
        return Ok(declined("split cell", "cell is not in the layout"));
    }
    let outcome = replace_table(
        editor,
        &ctx.table_path,
        layout.into_table(),
        (ctx.rect.row, ctx.rect.col),
        "command:table.split_cell",
    )?;
    editor.clear_cell_selection();
    Ok(outcome)
}

/// Sets the width of column `index` in pixels.
pub fn set_column_width(editor: &mut Editor, index: usize, px: f64) -> Result<Outcome, EditError> {
    if !(px.is_finite() && px > 0.0) {
        return Ok(declined("set column width", "width must be positive"));
    }
    let Some((_, table_path)) = context_cell_path(editor) else {
        return Ok(declined("set column width", "no table at the caret"));
    };
    let Some(attrs) = editor
        .doc()
        .element(&table_path)
        .and_then(|el| el.kind.as_table())
    else {
        return Ok(declined("set column width", "no table at the caret"));
    };
    if index >= attrs.col_sizes.len() {
        return Ok(declined("set column width", "column index out of range"));
    }

    let mut col_sizes = attrs.col_sizes.clone();
    col_sizes[index] = px;
    let selection = editor.selection().clone();
    editor.apply(
        Transaction::new(vec![Op::SetNodeKind {
            path: table_path,
            kind: ElementKind::Table(TableAttrs { col_sizes }),
        }])
        .selection_after(selection)
        .source("command:table.set_column_width"),
    )?;
    Ok(Outcome::Applied)
}

/// Updates the selected cells, or the caret's cell when no cells are selected.
fn update_cells(
    editor: &mut Editor,
    source: &str,
    update: impl Fn(&mut CellAttrs),
) -> Result<Outcome, EditError> {
    let targets: Vec<Path> = if editor.has_cell_selection() {
        editor.selected_cells().to_vec()
    } else {
        match context_cell_path(editor) {
            Some((cell_path, _)) => vec![cell_path],
            None => return Ok(declined(source, "no cell at the caret")),
        }
    };

    let mut ops: Vec<Op> = Vec::new();
    for path in targets {
        let Some(attrs) = editor.doc().element(&path).and_then(|el| el.kind.as_cell()) else {
            continue;
        };
        let mut next = attrs.clone();
        update(&mut next);
        if next != *attrs {
            ops.push(Op::SetNodeKind {
                path,
                kind: ElementKind::TableCell(next),
            });
        }
    }
    if ops.is_empty() {
        return Ok(declined(source, "cells already up to date"));
    }

    let selection = editor.selection().clone();
    editor.apply(
        Transaction::new(ops)
            .selection_after(selection)
            .source(source),
    )?;
    Ok(Outcome::Applied)
}

pub fn set_cell_align(editor: &mut Editor, align: Option<CellAlign>) -> Result<Outcome, EditError> {
    update_cells(editor, "command:table.set_cell_align", |attrs| {
        attrs.align = align;
    })
}

pub fn set_cell_background(
    editor: &mut Editor,
    background: Option<String>,
) -> Result<Outcome, EditError> {
    update_cells(editor, "command:table.set_cell_background", |attrs| {
        attrs.background = background.clone();
    })
}

pub fn set_cell_borders(
    editor: &mut Editor,
    borders: Option<CellBorders>,
) -> Result<Outcome, EditError> {
    update_cells(editor, "command:table.set_cell_borders", |attrs| {
        attrs.borders = borders.clone();
    })
}
