use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::{
    EditError, Editor, ElementKind, ElementNode, ListItemAttrs, ListType, Node, Point, Selection,
};
use crate::list::{IndentDirection, adjust_indent, selected_list_items};
use crate::marks::{MarkKind, toggle_mark};
use crate::ops::{Op, Path, Transaction};
use crate::text::{
    block_of_point, leaves_text, point_global_offset, remove_global_range, split_children_at,
};

static HEADING_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})$").expect("heading prefix pattern"));
static ORDERED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\.$").expect("ordered list prefix pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Tab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub alt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: Key,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::default(),
        }
    }

    pub fn char(c: char) -> Self {
        Self::new(Key::Char(c))
    }

    pub fn space() -> Self {
        Self::char(' ')
    }

    pub fn enter() -> Self {
        Self::new(Key::Enter)
    }

    pub fn backspace() -> Self {
        Self::new(Key::Backspace)
    }

    pub fn tab() -> Self {
        Self::new(Key::Tab)
    }

    pub fn shift(mut self) -> Self {
        self.modifiers.shift = true;
        self
    }

    pub fn ctrl(mut self) -> Self {
        self.modifiers.ctrl = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.modifiers.meta = true;
        self
    }

    fn is_chord(&self) -> bool {
        self.modifiers.ctrl || self.modifiers.meta
    }
}

/// Block kind a trimmed prefix typed before a space turns a paragraph into.
fn block_for_prefix(prefix: &str) -> Option<ElementKind> {
    if let Some(caps) = HEADING_PREFIX.captures(prefix) {
        return Some(ElementKind::Heading {
            level: caps[1].len() as u8,
        });
    }
    if ORDERED_PREFIX.is_match(prefix) {
        return Some(ElementKind::ListItem(ListItemAttrs::new(ListType::Ordered, 0)));
    }
    match prefix {
        ">" => Some(ElementKind::Quote),
        "```" => Some(ElementKind::Code),
        "-" | "*" => Some(ElementKind::ListItem(ListItemAttrs::new(ListType::Unordered, 0))),
        _ => None,
    }
}

impl Editor {
    /// Handles one key press. Returns `true` when the key was consumed and must
    /// not reach the default text input.
    pub fn handle_key(&mut self, event: &KeyEvent) -> Result<bool, EditError> {
        match event.key {
            Key::Tab if !event.is_chord() => self.on_tab(event.modifiers.shift),
            Key::Enter if !event.is_chord() => self.on_enter(),
            Key::Backspace if !event.is_chord() => self.on_backspace(),
            Key::Char(' ') if !event.is_chord() && !event.modifiers.alt => self.on_space(),
            Key::Char(c) if event.is_chord() => match MarkKind::from_chord_key(c) {
                Some(mark) => {
                    toggle_mark(self, mark)?;
                    Ok(true)
                }
                None => Ok(false),
            },
            _ => Ok(false),
        }
    }

    fn on_tab(&mut self, outdent: bool) -> Result<bool, EditError> {
        if selected_list_items(self).is_empty() {
            return Ok(false);
        }
        let direction = if outdent {
            IndentDirection::Decrease
        } else {
            IndentDirection::Increase
        };
        // Consumed even at the indent bounds so focus stays in the editor.
        adjust_indent(self, direction)?;
        Ok(true)
    }

    /// The collapsed caret with its text block, or `None` for a range selection.
    fn caret_block(&self) -> Option<(Point, Path, ElementNode)> {
        let selection = self.selection();
        if !selection.is_collapsed() {
            return None;
        }
        let focus = selection.focus.clone();
        let (block_path, block) = block_of_point(self.doc(), &focus)?;
        let block = block.clone();
        Some((focus, block_path, block))
    }

    fn on_enter(&mut self) -> Result<bool, EditError> {
        let Some((focus, block_path, block)) = self.caret_block() else {
            return Ok(false);
        };
        let ElementKind::ListItem(attrs) = &block.kind else {
            return Ok(false);
        };

        if leaves_text(&block.children).trim().is_empty() {
            let tx = Transaction::new(vec![Op::SetNodeKind {
                path: block_path,
                kind: ElementKind::Paragraph,
            }])
            .source("autoformat.end_list");
            self.apply(tx)?;
            return Ok(true);
        }

        let caret = point_global_offset(
            &block.children,
            focus.path.last().copied().unwrap_or(0),
            focus.offset,
        );
        let (head, tail) = split_children_at(&block.children, caret);

        let Some((&block_ix, parent_path)) = block_path.split_last() else {
            return Ok(false);
        };
        let mut next_path = parent_path.to_vec();
        next_path.push(block_ix + 1);

        let mut ops: Vec<Op> = Vec::new();
        if head != block.children {
            ops.push(Op::RemoveNode {
                path: block_path.clone(),
            });
            ops.push(Op::InsertNode {
                path: block_path.clone(),
                node: Node::element(block.kind.clone(), head),
            });
        }
        ops.push(Op::InsertNode {
            path: next_path.clone(),
            node: Node::element(
                ElementKind::ListItem(ListItemAttrs::new(attrs.list_type, attrs.indent)),
                tail,
            ),
        });

        let mut caret_path = next_path;
        caret_path.push(0);
        let tx = Transaction::new(ops)
            .selection_after(Selection::collapsed(Point::new(caret_path, 0)))
            .source("autoformat.continue_list");
        self.apply(tx)?;
        Ok(true)
    }

    fn on_backspace(&mut self) -> Result<bool, EditError> {
        let Some((focus, block_path, block)) = self.caret_block() else {
            return Ok(false);
        };
        let at_start = point_global_offset(
            &block.children,
            focus.path.last().copied().unwrap_or(0),
            focus.offset,
        ) == 0;
        if !at_start {
            return Ok(false);
        }

        let unwrap = match &block.kind {
            ElementKind::ListItem(_) => true,
            ElementKind::Heading { .. } | ElementKind::Quote | ElementKind::Code => {
                leaves_text(&block.children).trim().is_empty()
            }
            _ => false,
        };
        if !unwrap {
            return Ok(false);
        }

        let tx = Transaction::new(vec![Op::SetNodeKind {
            path: block_path,
            kind: ElementKind::Paragraph,
        }])
        .selection_after(Selection::collapsed(focus))
        .source("autoformat.unwrap_block");
        self.apply(tx)?;
        Ok(true)
    }

    fn on_space(&mut self) -> Result<bool, EditError> {
        let Some((focus, block_path, block)) = self.caret_block() else {
            return Ok(false);
        };
        if block.kind != ElementKind::Paragraph {
            return Ok(false);
        }

        let caret = point_global_offset(
            &block.children,
            focus.path.last().copied().unwrap_or(0),
            focus.offset,
        );
        let text = leaves_text(&block.children);
        let before = &text[..caret];
        let prefix = before.trim();

        // Only a prefix ending right at the caret, and short enough to be markup.
        let max_chars = self.config().autoformat_max_prefix_chars;
        if prefix.is_empty() || prefix.chars().count() > max_chars || !before.ends_with(prefix) {
            return Ok(false);
        }
        let Some(kind) = block_for_prefix(prefix) else {
            return Ok(false);
        };

        debug!("autoformat {prefix:?} -> {}", kind.name());
        let mut ops = remove_global_range(
            &block_path,
            &block.children,
            caret - prefix.len(),
            caret,
        );
        ops.push(Op::SetNodeKind {
            path: block_path,
            kind,
        });
        self.apply(Transaction::new(ops).source("autoformat.block_prefix"))?;
        Ok(true)
    }
}
