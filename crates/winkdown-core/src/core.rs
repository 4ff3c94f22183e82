use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ops::{Op, Path, Transaction};
use crate::plugin::{CommandError, PluginRegistry, QueryError};
use crate::table::{GridError, TableSelection};
use crate::text::{clamp_to_char_boundary, normalize_selection};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Document {
    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get(*first)?;
        for &ix in rest {
            node = match node {
                Node::Element(el) => el.children.get(ix)?,
                Node::Text(_) => return None,
            };
        }
        Some(node)
    }

    pub fn element(&self, path: &[usize]) -> Option<&ElementNode> {
        match self.node(path)? {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    /// Children of the node at `parent`, or the top-level blocks for an empty path.
    pub fn children_at(&self, parent: &[usize]) -> Option<&[Node]> {
        if parent.is_empty() {
            return Some(&self.children);
        }
        self.element(parent).map(|el| el.children.as_slice())
    }

    /// Nearest element on `path` (itself included) whose kind matches.
    pub fn ancestor_path(&self, path: &[usize], matches: impl Fn(&ElementKind) -> bool) -> Option<Path> {
        (1..=path.len()).rev().find_map(|len| {
            let candidate = &path[..len];
            match self.node(candidate) {
                Some(Node::Element(el)) if matches(&el.kind) => Some(candidate.to_vec()),
                _ => None,
            }
        })
    }

    /// Paths of every element under `root` (an empty root is the whole document)
    /// whose kind matches, in document order.
    pub fn find_paths(&self, root: &[usize], matches: impl Fn(&ElementKind) -> bool) -> Vec<Path> {
        fn walk(
            nodes: &[Node],
            path: &mut Vec<usize>,
            matches: &dyn Fn(&ElementKind) -> bool,
            out: &mut Vec<Path>,
        ) {
            for (ix, node) in nodes.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };
                path.push(ix);
                if matches(&el.kind) {
                    out.push(path.clone());
                }
                walk(&el.children, path, matches, out);
                path.pop();
            }
        }

        let mut out = Vec::new();
        let mut path = root.to_vec();
        if let Some(children) = self.children_at(root) {
            walk(children, &mut path, &matches, &mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks: Marks::default(),
        })
    }

    pub fn element(kind: ElementKind, children: Vec<Node>) -> Self {
        Node::Element(ElementNode { kind, children })
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::element(ElementKind::Paragraph, vec![Self::text(text)])
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::element(ElementKind::Heading { level }, vec![Self::text(text)])
    }

    /// A list item with a freshly minted stable id.
    pub fn list_item(list_type: ListType, indent: u8, text: impl Into<String>) -> Self {
        Self::element(
            ElementKind::ListItem(ListItemAttrs::new(list_type, indent)),
            vec![Self::text(text)],
        )
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub kind: ElementKind,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl ElementNode {
    /// Concatenated text of every leaf below this element.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(&t.text),
                Node::Element(el) => out.push_str(&el.text()),
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Paragraph,
    Heading { level: u8 },
    Quote,
    Code,
    ListItem(ListItemAttrs),
    Table(TableAttrs),
    TableRow,
    TableCell(CellAttrs),
}

impl ElementKind {
    /// Blocks whose children are text leaves.
    pub fn is_text_block(&self) -> bool {
        matches!(
            self,
            ElementKind::Paragraph
                | ElementKind::Heading { .. }
                | ElementKind::Quote
                | ElementKind::Code
                | ElementKind::ListItem(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Paragraph => "paragraph",
            ElementKind::Heading { .. } => "heading",
            ElementKind::Quote => "quote",
            ElementKind::Code => "code",
            ElementKind::ListItem(_) => "list_item",
            ElementKind::Table(_) => "table",
            ElementKind::TableRow => "table_row",
            ElementKind::TableCell(_) => "table_cell",
        }
    }

    pub fn as_list_item(&self) -> Option<&ListItemAttrs> {
        match self {
            ElementKind::ListItem(attrs) => Some(attrs),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableAttrs> {
        match self {
            ElementKind::Table(attrs) => Some(attrs),
            _ => None,
        }
    }

    pub fn as_cell(&self) -> Option<&CellAttrs> {
        match self {
            ElementKind::TableCell(attrs) => Some(attrs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListType {
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItemAttrs {
    pub list_type: ListType,
    #[serde(default)]
    pub indent: u8,
    pub id: Uuid,
}

impl ListItemAttrs {
    pub fn new(list_type: ListType, indent: u8) -> Self {
        Self {
            list_type,
            indent,
            id: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableAttrs {
    #[serde(default)]
    pub col_sizes: Vec<f64>,
}

fn default_span() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellAttrs {
    #[serde(default = "default_span")]
    pub col_span: usize,
    #[serde(default = "default_span")]
    pub row_span: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub borders: Option<CellBorders>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<CellAlign>,
}

impl Default for CellAttrs {
    fn default() -> Self {
        Self {
            col_span: 1,
            row_span: 1,
            background: None,
            borders: None,
            align: None,
        }
    }
}

impl CellAttrs {
    pub fn spanned(row_span: usize, col_span: usize) -> Self {
        Self {
            col_span,
            row_span,
            ..Self::default()
        }
    }

    pub fn is_plain(&self) -> bool {
        self.col_span == 1 && self.row_span == 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellBorders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<BorderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<BorderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<BorderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<BorderSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderSpec {
    pub size: u32,
    #[serde(default)]
    pub style: BorderStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub marks: Marks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Marks {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Result of an engine operation that may decline for lack of context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Noop,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        self == Outcome::Applied
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("normalization did not converge after {0} iterations")]
    NormalizeDidNotConverge(usize),
    #[error(transparent)]
    Grid(#[from] GridError),
}

impl From<PathError> for EditError {
    fn from(value: PathError) -> Self {
        EditError::InvalidPath(value.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PathError(pub String);

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

#[derive(Debug, Clone)]
pub struct TransactionPreview {
    pub doc: Document,
    pub selection: Selection,
}

/// Editor tunables. A zero (or non-positive width) falls back to the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
    pub default_col_width: f64,
    pub max_list_indent: u8,
    pub autoformat_max_prefix_chars: usize,
}

impl EditorConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        if !(self.default_col_width.is_finite() && self.default_col_width > 0.0) {
            self.default_col_width = 150.0;
        }
        if self.max_list_indent == 0 {
            self.max_list_indent = 10;
        }
        if self.autoformat_max_prefix_chars == 0 {
            self.autoformat_max_prefix_chars = 10;
        }
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(s).map(Self::with_defaults)
    }
}

pub struct Editor {
    doc: Document,
    selection: Selection,
    registry: PluginRegistry,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    cell_selection: TableSelection,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection, registry: PluginRegistry) -> Self {
        let config = EditorConfig::default().with_defaults();
        let mut editor = Self {
            doc,
            selection,
            registry,
            config,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            cell_selection: TableSelection::default(),
        };
        editor.normalize_in_place();
        editor
    }

    pub fn with_core_plugins() -> Self {
        Self::new(empty_document(), caret_at_start(), PluginRegistry::core())
    }

    pub fn with_richtext_plugins() -> Self {
        Self::new(empty_document(), caret_at_start(), PluginRegistry::richtext())
    }

    pub fn with_config(mut self, config: EditorConfig) -> Self {
        self.config = config.with_defaults();
        self.normalize_in_place();
        self
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
        self.normalize_selection_in_place();
        self.drop_cell_selection_outside_caret();
    }

    fn drop_cell_selection_outside_caret(&mut self) {
        let left_table = self
            .cell_selection
            .table_path()
            .is_some_and(|table| !self.selection.focus.path.starts_with(table));
        if left_table {
            self.cell_selection.clear_selection();
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn cell_selection(&self) -> &TableSelection {
        &self.cell_selection
    }

    pub fn start_cell_selection(&mut self, cell_path: &[usize]) -> Result<(), EditError> {
        Ok(self.cell_selection.start_selection(&self.doc, cell_path)?)
    }

    pub fn update_cell_selection(&mut self, cell_path: &[usize]) -> Result<(), EditError> {
        Ok(self.cell_selection.update_selection(&self.doc, cell_path)?)
    }

    pub fn end_cell_selection(&mut self) {
        self.cell_selection.end_selection();
    }

    pub fn clear_cell_selection(&mut self) {
        self.cell_selection.clear_selection();
    }

    pub fn select_cells(&mut self, cell_paths: &[Path]) -> Result<(), EditError> {
        Ok(self.cell_selection.select_cells(&self.doc, cell_paths)?)
    }

    pub fn has_cell_selection(&self) -> bool {
        self.cell_selection.has_selection()
    }

    pub fn selected_cells(&self) -> &[Path] {
        self.cell_selection.selected_cells()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let redo_ops = self.replay(inverse_ops);

        self.selection = selection_before.clone();
        self.normalize_in_place();
        self.cell_selection.clear_selection();

        self.redo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: redo_ops,
        });
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let undo_ops = self.replay(inverse_ops);

        self.selection = selection_after.clone();
        self.normalize_in_place();
        self.cell_selection.clear_selection();

        self.undo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: undo_ops,
        });
        true
    }

    fn replay(&mut self, ops: Vec<Op>) -> Vec<Op> {
        let mut inverse: Vec<Op> = Vec::new();
        for op in ops {
            let path = op.path().to_vec();
            match self.apply_op(op) {
                Ok(inv) => inverse.push(inv),
                Err(err) => {
                    // Stop mutating once the history no longer fits the tree.
                    warn!("history replay stopped at {path:?}: {err}");
                    break;
                }
            }
        }
        inverse.reverse();
        inverse
    }

    /// Applies every op of `tx` and normalizes, or leaves the editor untouched on error.
    pub fn apply(&mut self, tx: Transaction) -> Result<(), EditError> {
        let selection_before = self.selection.clone();
        let structural = tx.is_structural();
        let op_count = tx.ops.len();

        let mut inverse_ops: Vec<Op> = Vec::new();
        for op in tx.ops {
            match self.apply_op(op) {
                Ok(inv) => inverse_ops.push(inv),
                Err(err) => {
                    self.rollback(inverse_ops, selection_before);
                    return Err(err);
                }
            }
        }

        if let Some(sel) = tx.selection_after {
            self.selection = sel;
        }

        if let Err(err) = self.normalize_with_inverse_ops(&mut inverse_ops) {
            self.rollback(inverse_ops, selection_before);
            return Err(err);
        }
        inverse_ops.reverse();

        self.normalize_selection_in_place();

        let selection_after = self.selection.clone();

        self.undo_stack.push(UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        });
        self.redo_stack.clear();
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }

        if structural {
            self.cell_selection.clear_selection();
        } else if let Err(err) = self.cell_selection.refresh(&self.doc) {
            warn!("cell selection dropped: {err}");
            self.cell_selection.clear_selection();
        } else {
            self.drop_cell_selection_outside_caret();
        }

        debug!(
            "applied transaction from {} ({op_count} ops)",
            tx.meta.source.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    fn rollback(&mut self, applied_inverse: Vec<Op>, selection_before: Selection) {
        warn!("rolling back {} ops", applied_inverse.len());
        for op in applied_inverse.into_iter().rev() {
            if let Err(err) = self.apply_op(op) {
                warn!("rollback op failed: {err}");
            }
        }
        self.selection = selection_before;
    }

    pub fn preview_transaction(&self, tx: &Transaction) -> Result<TransactionPreview, EditError> {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();

        for op in tx.ops.iter().cloned() {
            apply_op_to(&mut doc, &mut selection, op)?;
        }

        if let Some(sel) = &tx.selection_after {
            selection = sel.clone();
        }

        let mut converged = false;
        for _ in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(&doc, &self.config);
            if ops.is_empty() {
                converged = true;
                break;
            }
            for op in ops {
                apply_op_to(&mut doc, &mut selection, op)?;
            }
        }

        if !converged {
            return Err(EditError::NormalizeDidNotConverge(
                self.config.max_normalize_iterations,
            ));
        }

        selection = normalize_selection(&doc, &selection);

        Ok(TransactionPreview { doc, selection })
    }

    /// Types `text` at a collapsed caret.
    pub fn insert_text(&mut self, text: &str) -> Result<Outcome, EditError> {
        if text.is_empty() || !self.selection.is_collapsed() {
            return Ok(Outcome::Noop);
        }
        let focus = self.selection.focus.clone();
        let Some(Node::Text(leaf)) = self.doc.node(&focus.path) else {
            return Ok(Outcome::Noop);
        };
        let offset = clamp_to_char_boundary(&leaf.text, focus.offset);

        let tx = Transaction::new(vec![Op::InsertText {
            path: focus.path.clone(),
            offset,
            text: text.to_string(),
        }])
        .selection_after(Selection::collapsed(Point::new(
            focus.path,
            offset + text.len(),
        )))
        .source("editor.insert_text");
        self.apply(tx)?;
        Ok(Outcome::Applied)
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::new(format!("Unknown command: {id}")));
        };
        (command.handler)(self, args)
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::new(format!("Unknown query: {id}")));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::new(format!("Failed to decode query result: {err}")))
    }

    fn normalize_in_place(&mut self) {
        let mut discarded = Vec::new();
        if let Err(err) = self.normalize_with_inverse_ops(&mut discarded) {
            warn!("initial normalization failed: {err}");
        }
        self.normalize_selection_in_place();
    }

    fn normalize_selection_in_place(&mut self) {
        self.selection = normalize_selection(&self.doc, &self.selection);
    }

    fn normalize_with_inverse_ops(&mut self, inverse_ops: &mut Vec<Op>) -> Result<(), EditError> {
        for _ in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(&self.doc, &self.config);
            if ops.is_empty() {
                return Ok(());
            }
            for op in ops {
                let inv = self.apply_op(op)?;
                inverse_ops.push(inv);
            }
        }
        Err(EditError::NormalizeDidNotConverge(
            self.config.max_normalize_iterations,
        ))
    }

    fn apply_op(&mut self, op: Op) -> Result<Op, EditError> {
        apply_op_to(&mut self.doc, &mut self.selection, op)
    }
}

fn empty_document() -> Document {
    Document {
        children: vec![Node::paragraph("")],
    }
}

fn caret_at_start() -> Selection {
    Selection::collapsed(Point::new(vec![0, 0], 0))
}

fn apply_op_to(doc: &mut Document, selection: &mut Selection, op: Op) -> Result<Op, EditError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            transform_selection_insert_text(selection, &path, offset, text.len());
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start = clamp_to_char_boundary(&text_node.text, range.start);
            let end = clamp_to_char_boundary(&text_node.text, range.end);
            if start >= end {
                return Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: String::new(),
                });
            }
            let removed = text_node.text[start..end].to_string();
            text_node.text.replace_range(start..end, "");
            transform_selection_remove_text(selection, &path, start..end);
            Ok(Op::InsertText {
                path,
                offset: start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            transform_selection_insert_node(selection, &path);
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            transform_selection_remove_node(selection, &path, &removed, doc);
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::SetNodeKind { path, kind } => {
            let Node::Element(el) = node_in_mut(&mut doc.children, &path)? else {
                return Err(EditError::InvalidPath("Text has no element kind".into()));
            };
            let old = std::mem::replace(&mut el.kind, kind);
            Ok(Op::SetNodeKind { path, kind: old })
        }
        Op::SetTextMarks { path, marks } => {
            let text_node = node_text_mut(doc, &path)?;
            let old = std::mem::replace(&mut text_node.marks, marks);
            Ok(Op::SetTextMarks { path, marks: old })
        }
    }
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(
    selection: &mut Selection,
    path: &[usize],
    range: std::ops::Range<usize>,
) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path || point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Selection, path: &[usize]) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() || !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        if point.path[depth] >= index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(
    selection: &mut Selection,
    path: &[usize],
    removed: &Node,
    doc_after_remove: &Document,
) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    // A removed leaf whose text was folded into its left sibling keeps the caret in place.
    let merge_prefix_len = match (removed, index.checked_sub(1)) {
        (Node::Text(removed_text), Some(left_index)) => {
            let mut left_path = parent_path.to_vec();
            left_path.push(left_index);
            match doc_after_remove.node(&left_path) {
                Some(Node::Text(left_text))
                    if left_text.marks == removed_text.marks
                        && left_text.text.ends_with(&removed_text.text) =>
                {
                    Some(left_text.text.len().saturating_sub(removed_text.text.len()))
                }
                _ => None,
            }
        }
        _ => None,
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() || !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        if let (Some(prefix), Node::Text(removed_text), Some(left_index)) =
            (merge_prefix_len, removed, index.checked_sub(1))
        {
            point.path.truncate(depth + 1);
            point.path[depth] = left_index;
            point.offset = (prefix + point.offset).min(prefix + removed_text.text.len());
        } else {
            point.path.truncate(depth + 1);
            point.path[depth] = index.saturating_sub(1);
            point.offset = 0;
        }
    }
}

fn node_in_mut<'a>(children: &'a mut [Node], path: &[usize]) -> Result<&'a mut Node, PathError> {
    let Some((&ix, rest)) = path.split_first() else {
        return Err(PathError("Empty path".into()));
    };
    let len = children.len();
    let Some(node) = children.get_mut(ix) else {
        return Err(PathError(format!("Path out of bounds: {ix} >= {len}")));
    };
    if rest.is_empty() {
        return Ok(node);
    }
    match node {
        Node::Element(el) => node_in_mut(&mut el.children, rest),
        Node::Text(_) => Err(PathError("Text node on path".into())),
    }
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_in_mut(&mut doc.children, path)? {
        Node::Text(t) => Ok(t),
        Node::Element(_) => Err(PathError("Expected Text node".into())),
    }
}

fn children_mut<'a>(doc: &'a mut Document, parent_path: &[usize]) -> Result<&'a mut Vec<Node>, PathError> {
    if parent_path.is_empty() {
        return Ok(&mut doc.children);
    }
    match node_in_mut(&mut doc.children, parent_path)? {
        Node::Element(el) => Ok(&mut el.children),
        Node::Text(_) => Err(PathError("Parent is not a container".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty insert path".into()));
    };
    let children = children_mut(doc, parent_path)?;
    if index > children.len() {
        return Err(PathError(format!(
            "Insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty remove path".into()));
    };
    let children = children_mut(doc, parent_path)?;
    if index >= children.len() {
        return Err(PathError(format!(
            "Remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(index))
}
