use std::collections::HashMap;
use std::sync::Arc;

use log::{error, warn};
use serde_json::Value;

use crate::core::{
    CellAlign, CellBorders, Document, EditError, Editor, EditorConfig, ElementKind, ElementNode,
    Marks, Node, Outcome, TableAttrs, TextNode,
};
use crate::list::{IndentDirection, adjust_indent, marker, ordinal};
use crate::marks::{MarkKind, active_marks, toggle_mark};
use crate::ops::{Op, Path};
use crate::table::{self, TableGrid, plain_cell};

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<EditError> for CommandError {
    fn from(err: EditError) -> Self {
        Self::new(err.to_string())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type CommandHandler =
    Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>;

pub type QueryHandler = Arc<dyn Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: QueryHandler,
}

impl QuerySpec {
    pub fn new(
        id: impl Into<String>,
        handler: impl Fn(&Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
        }
    }
}

/// A structural fix-up run after every transaction until none emits ops.
///
/// The returned ops are applied in order, so a pass must emit them such that
/// earlier ops never invalidate the paths of later ones.
pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, config: &EditorConfig) -> Vec<Op>;
}

pub trait EditorPlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn EditorPlugin>>) -> Result<Self, String> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    pub fn core() -> Self {
        let plugins: Vec<Box<dyn EditorPlugin>> = vec![Box::new(CoreNormalizePlugin)];
        Self::new(plugins).unwrap_or_else(|err| {
            error!("core registry rejected: {err}");
            Self::default()
        })
    }

    pub fn richtext() -> Self {
        let plugins: Vec<Box<dyn EditorPlugin>> = vec![
            Box::new(CoreNormalizePlugin),
            Box::new(BlockAttrsPlugin),
            Box::new(MarksPlugin),
            Box::new(ListPlugin),
            Box::new(TablePlugin),
        ];
        Self::new(plugins).unwrap_or_else(|err| {
            error!("richtext registry rejected: {err}");
            Self::default()
        })
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn EditorPlugin>) -> Result<(), String> {
        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(format!("Duplicate command id: {}", cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(format!("Duplicate query id: {}", query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        Ok(())
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn normalize(&self, doc: &Document, config: &EditorConfig) -> Vec<Op> {
        let mut ops: Vec<Op> = Vec::new();
        for pass in &self.normalize_passes {
            ops.extend(pass.run(doc, config));
        }
        ops
    }
}

/// Calls `visit` for every element in pre-order with its path.
fn walk_elements<'a>(
    children: &'a [Node],
    path: &mut Vec<usize>,
    visit: &mut dyn FnMut(&[usize], &'a ElementNode),
) {
    for (ix, node) in children.iter().enumerate() {
        let Node::Element(el) = node else {
            continue;
        };
        path.push(ix);
        visit(path, el);
        walk_elements(&el.children, path, visit);
        path.pop();
    }
}

fn child_path(parent: &[usize], ix: usize) -> Path {
    let mut path = parent.to_vec();
    path.push(ix);
    path
}

struct CoreNormalizePlugin;

impl EditorPlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(EnsureTextBlockHasTextLeaf),
            Box::new(MergeAdjacentTextLeaves),
        ]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document, _config: &EditorConfig) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

struct EnsureTextBlockHasTextLeaf;

impl NormalizePass for EnsureTextBlockHasTextLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_text_blocks_have_text_leaf"
    }

    fn run(&self, doc: &Document, _config: &EditorConfig) -> Vec<Op> {
        let mut ops = Vec::new();
        walk_elements(&doc.children, &mut Vec::new(), &mut |path, el| {
            if el.kind.is_text_block() && !el.children.iter().any(|n| matches!(n, Node::Text(_))) {
                ops.push(Op::InsertNode {
                    path: child_path(path, 0),
                    node: Node::Text(TextNode {
                        text: String::new(),
                        marks: Marks::default(),
                    }),
                });
            }
        });
        ops
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document, _config: &EditorConfig) -> Vec<Op> {
        let mut ops = Vec::new();
        walk_elements(&doc.children, &mut Vec::new(), &mut |path, el| {
            if !el.kind.is_text_block() || el.children.len() < 2 {
                return;
            }

            // Right to left so removals never shift a run still to be merged.
            let mut ix = el.children.len();
            while ix > 0 {
                ix -= 1;
                let Node::Text(right) = &el.children[ix] else {
                    continue;
                };

                let mut start = ix;
                while start > 0 {
                    let Some(Node::Text(left)) = el.children.get(start - 1) else {
                        break;
                    };
                    if left.marks != right.marks {
                        break;
                    }
                    start -= 1;
                }
                if start == ix {
                    continue;
                }

                let Some(Node::Text(first)) = el.children.get(start) else {
                    continue;
                };
                let mut appended = String::new();
                for node in el.children.iter().take(ix + 1).skip(start + 1) {
                    if let Node::Text(t) = node {
                        appended.push_str(&t.text);
                    }
                }

                if !appended.is_empty() {
                    ops.push(Op::InsertText {
                        path: child_path(path, start),
                        offset: first.text.len(),
                        text: appended,
                    });
                }
                for remove_ix in (start + 1..=ix).rev() {
                    ops.push(Op::RemoveNode {
                        path: child_path(path, remove_ix),
                    });
                }

                ix = start;
            }
        });
        ops
    }
}

struct BlockAttrsPlugin;

impl EditorPlugin for BlockAttrsPlugin {
    fn id(&self) -> &'static str {
        "blocks"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeBlockAttrs)]
    }
}

/// Clamps heading levels to 1..=6 and list indents to the configured maximum.
struct NormalizeBlockAttrs;

impl NormalizePass for NormalizeBlockAttrs {
    fn id(&self) -> &'static str {
        "blocks.normalize_attrs"
    }

    fn run(&self, doc: &Document, config: &EditorConfig) -> Vec<Op> {
        let mut ops = Vec::new();
        walk_elements(&doc.children, &mut Vec::new(), &mut |path, el| {
            let kind = match &el.kind {
                ElementKind::Heading { level } if !(1..=6).contains(level) => {
                    ElementKind::Heading {
                        level: (*level).clamp(1, 6),
                    }
                }
                ElementKind::ListItem(attrs) if attrs.indent > config.max_list_indent => {
                    let mut attrs = attrs.clone();
                    attrs.indent = config.max_list_indent;
                    ElementKind::ListItem(attrs)
                }
                _ => return,
            };
            ops.push(Op::SetNodeKind {
                path: path.to_vec(),
                kind,
            });
        });
        ops
    }
}

struct MarksPlugin;

impl EditorPlugin for MarksPlugin {
    fn id(&self) -> &'static str {
        "marks"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        [
            (MarkKind::Bold, "marks.toggle_bold", "Toggle bold", ["bold", "strong"]),
            (MarkKind::Italic, "marks.toggle_italic", "Toggle italic", ["italic", "emphasis"]),
            (MarkKind::Underline, "marks.toggle_underline", "Toggle underline", ["underline", "mark"]),
            (MarkKind::Code, "marks.toggle_code", "Toggle code", ["code", "monospace"]),
        ]
        .into_iter()
        .map(|(mark, id, label, keywords)| {
            CommandSpec::new(id, label, move |editor, _args| {
                finish(toggle_mark(editor, mark))
            })
            .description("Toggle the mark on the current selection or caret.")
            .keywords(keywords)
        })
        .collect()
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec::new("marks.get_active", |editor, _args| {
            serde_json::to_value(active_marks(editor))
                .map_err(|err| QueryError::new(format!("Failed to encode marks: {err}")))
        })]
    }
}

struct ListPlugin;

impl EditorPlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "list"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("list.indent_increase", "Indent list item", |editor, _args| {
                finish(adjust_indent(editor, IndentDirection::Increase))
            })
            .description("Indent the selected list items one level.")
            .keywords(["list", "indent", "nest"]),
            CommandSpec::new("list.indent_decrease", "Outdent list item", |editor, _args| {
                finish(adjust_indent(editor, IndentDirection::Decrease))
            })
            .description("Outdent the selected list items one level.")
            .keywords(["list", "outdent", "unnest"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("list.ordinal", |editor, args| {
                let path = parse_path_arg(args.as_ref()).map_err(QueryError::new)?;
                Ok(ordinal(editor.doc(), &path).map_or(Value::Null, Value::from))
            }),
            QuerySpec::new("list.marker", |editor, args| {
                let path = parse_path_arg(args.as_ref()).map_err(QueryError::new)?;
                Ok(marker(editor.doc(), &path).map_or(Value::Null, Value::String))
            }),
        ]
    }
}

struct TablePlugin;

impl EditorPlugin for TablePlugin {
    fn id(&self) -> &'static str {
        "table"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(NormalizeTableStructure)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("table.insert", "Insert table", |editor, args| {
                let rows = usize_arg(args.as_ref(), "rows")?.unwrap_or(3);
                let cols = usize_arg(args.as_ref(), "cols")?.unwrap_or(3);
                let col_width = args
                    .as_ref()
                    .and_then(|v| v.get("col_width"))
                    .and_then(Value::as_f64);
                finish(table::insert_table(editor, rows, cols, col_width))
            })
            .description("Insert a table at the caret.")
            .keywords(["table", "grid"])
            .args_example(serde_json::json!({ "rows": 3, "cols": 3 })),
            CommandSpec::new("table.insert_row_above", "Insert row above", |editor, _args| {
                finish(table::insert_row(editor, true))
            })
            .keywords(["table", "row", "above"]),
            CommandSpec::new("table.insert_row_below", "Insert row below", |editor, _args| {
                finish(table::insert_row(editor, false))
            })
            .keywords(["table", "row", "below"]),
            CommandSpec::new("table.insert_col_left", "Insert column left", |editor, _args| {
                finish(table::insert_column(editor, true))
            })
            .keywords(["table", "column", "left"]),
            CommandSpec::new("table.insert_col_right", "Insert column right", |editor, _args| {
                finish(table::insert_column(editor, false))
            })
            .keywords(["table", "column", "right"]),
            CommandSpec::new("table.delete_row", "Delete row", |editor, _args| {
                finish(table::delete_row(editor))
            })
            .description("Delete the rows of the caret's cell. The last row deletes the table.")
            .keywords(["table", "row", "delete"]),
            CommandSpec::new("table.delete_col", "Delete column", |editor, _args| {
                finish(table::delete_column(editor))
            })
            .description("Delete the columns of the caret's cell. The last column deletes the table.")
            .keywords(["table", "column", "delete"]),
            CommandSpec::new("table.delete_table", "Delete table", |editor, _args| {
                finish(table::delete_table(editor))
            })
            .keywords(["table", "delete", "remove"]),
            CommandSpec::new("table.merge_cells", "Merge cells", |editor, _args| {
                finish(table::merge_cells(editor))
            })
            .description("Merge the selected rectangle of cells into one.")
            .keywords(["table", "merge", "cells"]),
            CommandSpec::new("table.split_cell", "Split cell", |editor, _args| {
                finish(table::split_cell(editor))
            })
            .description("Split a merged cell back into single cells.")
            .keywords(["table", "split", "unmerge"]),
            CommandSpec::new("table.set_column_width", "Set column width", |editor, args| {
                let index = usize_arg(args.as_ref(), "index")?
                    .ok_or_else(|| CommandError::new("Missing args.index"))?;
                let width = args
                    .as_ref()
                    .and_then(|v| v.get("width"))
                    .and_then(Value::as_f64)
                    .ok_or_else(|| CommandError::new("Missing args.width"))?;
                finish(table::set_column_width(editor, index, width))
            })
            .keywords(["table", "column", "width", "resize"])
            .args_example(serde_json::json!({ "index": 0, "width": 200.0 })),
            CommandSpec::new("table.set_cell_align", "Set cell alignment", |editor, args| {
                let align: Option<CellAlign> = nullable_arg(args.as_ref(), "align")?;
                finish(table::set_cell_align(editor, align))
            })
            .keywords(["table", "cell", "align"])
            .args_example(serde_json::json!({ "align": "center" })),
            CommandSpec::new("table.set_cell_background", "Set cell background", |editor, args| {
                let color: Option<String> = nullable_arg(args.as_ref(), "color")?;
                finish(table::set_cell_background(editor, color))
            })
            .keywords(["table", "cell", "background", "color"])
            .args_example(serde_json::json!({ "color": "#fff59d" })),
            CommandSpec::new("table.set_cell_borders", "Set cell borders", |editor, args| {
                let borders: Option<CellBorders> = nullable_arg(args.as_ref(), "borders")?;
                finish(table::set_cell_borders(editor, borders))
            })
            .keywords(["table", "cell", "border"])
            .args_example(serde_json::json!({
                "borders": { "top": { "size": 1, "style": "solid", "color": "#000000" } }
            })),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec::new("table.is_active", |editor, _args| {
                let in_table = editor
                    .doc()
                    .ancestor_path(&editor.selection().focus.path, |kind| {
                        matches!(kind, ElementKind::Table(_))
                    })
                    .is_some();
                Ok(Value::Bool(in_table))
            }),
            QuerySpec::new("table.has_cell_selection", |editor, _args| {
                Ok(Value::Bool(editor.has_cell_selection()))
            }),
            QuerySpec::new("table.selected_cells", |editor, _args| {
                serde_json::to_value(editor.selected_cells())
                    .map_err(|err| QueryError::new(format!("Failed to encode cells: {err}")))
            }),
            QuerySpec::new("table.can_merge", |editor, _args| {
                Ok(Value::Bool(editor.cell_selection().is_mergeable()))
            }),
            QuerySpec::new("table.can_split", |editor, _args| {
                Ok(Value::Bool(table::can_split(editor)))
            }),
        ]
    }
}

/// Repairs table shape so the occupancy grid is a full partition and
/// `col_sizes` matches the column count.
struct NormalizeTableStructure;

impl NormalizePass for NormalizeTableStructure {
    fn id(&self) -> &'static str {
        "table.normalize_structure"
    }

    fn run(&self, doc: &Document, config: &EditorConfig) -> Vec<Op> {
        let mut ops = Vec::new();
        walk_elements(&doc.children, &mut Vec::new(), &mut |path, el| {
            match &el.kind {
                ElementKind::Table(attrs) => normalize_table(path, el, attrs, config, &mut ops),
                ElementKind::TableCell(_) if el.children.is_empty() => ops.push(Op::InsertNode {
                    path: child_path(path, 0),
                    node: Node::paragraph(""),
                }),
                _ => {}
            }
        });
        ops
    }
}

fn normalize_table(
    path: &[usize],
    table: &ElementNode,
    attrs: &TableAttrs,
    config: &EditorConfig,
    ops: &mut Vec<Op>,
) {
    if table.children.is_empty() {
        ops.push(Op::InsertNode {
            path: child_path(path, 0),
            node: Node::element(ElementKind::TableRow, vec![Node::Element(plain_cell())]),
        });
        return;
    }

    let grid = match TableGrid::resolve(table) {
        Ok(grid) => grid,
        Err(err) => {
            warn!("skipping table at {path:?}: {err}");
            return;
        }
    };

    if grid.cols() == 0 {
        for row_ix in 0..table.children.len() {
            ops.push(Op::InsertNode {
                path: child_path(&child_path(path, row_ix), 0),
                node: Node::Element(plain_cell()),
            });
        }
        return;
    }

    // Gaps only trail a row's cells, so appended plain cells fill them in order.
    let mut missing: Vec<usize> = vec![0; grid.rows()];
    for (row, _) in grid.gaps() {
        missing[row] += 1;
    }
    for (row_ix, count) in missing.into_iter().enumerate() {
        let Some(row) = table.children.get(row_ix).and_then(Node::as_element) else {
            continue;
        };
        let end = child_path(&child_path(path, row_ix), row.children.len());
        for _ in 0..count {
            ops.push(Op::InsertNode {
                path: end.clone(),
                node: Node::Element(plain_cell()),
            });
        }
    }

    if attrs.col_sizes.len() != grid.cols() {
        let fill = attrs
            .col_sizes
            .last()
            .copied()
            .unwrap_or(config.default_col_width);
        let mut col_sizes = attrs.col_sizes.clone();
        col_sizes.resize(grid.cols(), fill);
        ops.push(Op::SetNodeKind {
            path: path.to_vec(),
            kind: ElementKind::Table(TableAttrs { col_sizes }),
        });
    }
}

fn finish(result: Result<Outcome, EditError>) -> Result<(), CommandError> {
    result.map(|_| ()).map_err(CommandError::from)
}

fn usize_arg(args: Option<&Value>, key: &str) -> Result<Option<usize>, CommandError> {
    let Some(value) = args.and_then(|v| v.get(key)) else {
        return Ok(None);
    };
    value
        .as_u64()
        .map(|n| Some(n as usize))
        .ok_or_else(|| CommandError::new(format!("args.{key} must be a non-negative integer")))
}

/// Reads `args.<key>`, which must be present and may be `null`.
fn nullable_arg<T>(args: Option<&Value>, key: &str) -> Result<Option<T>, CommandError>
where
    T: serde::de::DeserializeOwned,
{
    let value = args
        .and_then(|v| v.get(key))
        .ok_or_else(|| CommandError::new(format!("Missing args.{key}")))?;
    serde_json::from_value(value.clone())
        .map_err(|err| CommandError::new(format!("Invalid args.{key}: {err}")))
}

fn parse_path_arg(args: Option<&Value>) -> Result<Path, String> {
    let raw = args
        .and_then(|v| v.get("path"))
        .and_then(Value::as_array)
        .ok_or_else(|| "Missing args.path".to_string())?;
    raw.iter()
        .map(|v| {
            v.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| "args.path must hold non-negative integers".to_string())
        })
        .collect()
}
