use crate::core::{Document, ElementNode, Marks, Node, Point, Selection, TextNode};
use crate::ops::{Op, Path};

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

pub(crate) fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else {
            continue;
        };
        if ix < child_ix {
            global += t.text.len();
            continue;
        }
        if ix == child_ix {
            global += clamp_to_char_boundary(&t.text, offset);
        }
        break;
    }
    global
}

pub(crate) fn point_for_global_offset(
    block_path: &[usize],
    children: &[Node],
    global_offset: usize,
) -> Point {
    let mut remaining = global_offset;
    for (child_ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else {
            continue;
        };
        if remaining < t.text.len() {
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, clamp_to_char_boundary(&t.text, remaining));
        }
        if remaining == t.text.len() {
            if matches!(children.get(child_ix + 1), Some(Node::Text(_))) {
                let mut path = block_path.to_vec();
                path.push(child_ix + 1);
                return Point::new(path, 0);
            }
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, t.text.len());
        }
        remaining -= t.text.len();
    }

    // Past the end: clamp to the last leaf.
    for (child_ix, node) in children.iter().enumerate().rev() {
        if let Node::Text(t) = node {
            let mut path = block_path.to_vec();
            path.push(child_ix);
            return Point::new(path, t.text.len());
        }
    }

    let mut path = block_path.to_vec();
    path.push(0);
    Point::new(path, 0)
}

pub(crate) fn is_point_in_block(point: &Point, block_path: &[usize]) -> bool {
    point.path.len() == block_path.len() + 1 && point.path.starts_with(block_path)
}

pub(crate) fn total_text_len(children: &[Node]) -> usize {
    children
        .iter()
        .map(|n| match n {
            Node::Text(t) => t.text.len(),
            Node::Element(_) => 0,
        })
        .sum()
}

pub(crate) fn leaves_text(children: &[Node]) -> String {
    let mut out = String::new();
    for node in children {
        if let Node::Text(t) = node {
            out.push_str(&t.text);
        }
    }
    out
}

pub(crate) struct TextBlock<'a> {
    pub path: Path,
    pub el: &'a ElementNode,
}

pub(crate) fn text_blocks_in_order(doc: &Document) -> Vec<TextBlock<'_>> {
    fn walk<'a>(nodes: &'a [Node], path: &mut Vec<usize>, out: &mut Vec<TextBlock<'a>>) {
        for (ix, node) in nodes.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };

            path.push(ix);
            if el.kind.is_text_block() {
                out.push(TextBlock {
                    path: path.clone(),
                    el,
                });
            } else {
                walk(&el.children, path, out);
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut out);
    out
}

/// The text block holding `point`, with its path.
pub(crate) fn block_of_point<'a>(doc: &'a Document, point: &Point) -> Option<(Path, &'a ElementNode)> {
    let (_, block_path) = point.path.split_last()?;
    let el = doc.element(block_path)?;
    el.kind
        .is_text_block()
        .then(|| (block_path.to_vec(), el))
}

/// Rewrites leaves so that `[start_global, end_global)` carries `apply(marks)`.
pub(crate) fn apply_marks_in_block(
    children: &[Node],
    start_global: usize,
    end_global: usize,
    apply: &dyn Fn(Marks) -> Marks,
) -> Vec<Node> {
    if start_global >= end_global {
        return children.to_vec();
    }

    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let Node::Text(t) = node else {
            out.push(node.clone());
            continue;
        };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;

        if end_global <= node_start || start_global >= node_end {
            out.push(node.clone());
            continue;
        }

        let sel_start = clamp_to_char_boundary(&t.text, start_global.saturating_sub(node_start));
        let sel_end = clamp_to_char_boundary(&t.text, end_global.saturating_sub(node_start));

        if sel_start == 0 && sel_end == t.text.len() {
            let mut next = t.clone();
            next.marks = apply(next.marks);
            out.push(Node::Text(next));
            continue;
        }

        let prefix = &t.text[..sel_start];
        let middle = &t.text[sel_start..sel_end];
        let suffix = &t.text[sel_end..];

        if !prefix.is_empty() {
            out.push(leaf(prefix, t.marks.clone()));
        }
        if !middle.is_empty() {
            out.push(leaf(middle, apply(t.marks.clone())));
        }
        if !suffix.is_empty() {
            out.push(leaf(suffix, t.marks.clone()));
        }
    }

    if out.is_empty() {
        out.push(leaf("", Marks::default()));
    }

    out
}

/// Splits leaves at a global offset. Both halves keep at least one leaf.
pub(crate) fn split_children_at(children: &[Node], global: usize) -> (Vec<Node>, Vec<Node>) {
    let mut left: Vec<Node> = Vec::new();
    let mut right: Vec<Node> = Vec::new();
    let mut cursor = 0usize;
    let mut boundary_marks = Marks::default();

    for node in children {
        let Node::Text(t) = node else {
            continue;
        };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;

        if node_end <= global {
            boundary_marks = t.marks.clone();
            left.push(node.clone());
        } else if node_start >= global {
            right.push(node.clone());
        } else {
            let at = clamp_to_char_boundary(&t.text, global - node_start);
            boundary_marks = t.marks.clone();
            left.push(leaf(&t.text[..at], t.marks.clone()));
            right.push(leaf(&t.text[at..], t.marks.clone()));
        }
    }

    if left.is_empty() {
        left.push(leaf("", boundary_marks.clone()));
    }
    if right.is_empty() {
        right.push(leaf("", boundary_marks));
    }
    (left, right)
}

/// `RemoveText` ops deleting `[start, end)` of a block, last leaf first.
pub(crate) fn remove_global_range(
    block_path: &[usize],
    children: &[Node],
    start: usize,
    end: usize,
) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut cursor = 0usize;
    for (child_ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else {
            continue;
        };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;
        if end <= node_start || start >= node_end {
            continue;
        }
        let mut path = block_path.to_vec();
        path.push(child_ix);
        ops.push(Op::RemoveText {
            path,
            range: start.saturating_sub(node_start)..(end - node_start).min(t.text.len()),
        });
    }
    ops.reverse();
    ops
}

pub(crate) fn leaf(text: &str, marks: Marks) -> Node {
    Node::Text(TextNode {
        text: text.to_string(),
        marks,
    })
}

pub(crate) fn ordered_selection_points(sel: &Selection) -> (Point, Point) {
    let mut start = sel.anchor.clone();
    let mut end = sel.focus.clone();

    if start.path == end.path {
        if end.offset < start.offset {
            std::mem::swap(&mut start, &mut end);
        }
        return (start, end);
    }
    if end.path < start.path {
        std::mem::swap(&mut start, &mut end);
    }
    (start, end)
}

fn first_text_descendant(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
    for (ix, node) in children.iter().enumerate() {
        path.push(ix);
        let found = match node {
            Node::Text(_) => Some(Point::new(path.clone(), 0)),
            Node::Element(el) => first_text_descendant(&el.children, path),
        };
        path.pop();
        if found.is_some() {
            return found;
        }
    }
    None
}

pub(crate) fn first_text_point(doc: &Document) -> Option<Point> {
    first_text_descendant(&doc.children, &mut Vec::new())
}

/// First caret position inside `node`, which sits at `path`.
pub(crate) fn first_text_point_in(node: &Node, path: &[usize]) -> Option<Point> {
    match node {
        Node::Text(_) => Some(Point::new(path.to_vec(), 0)),
        Node::Element(el) => first_text_descendant(&el.children, &mut path.to_vec()),
    }
}

/// Caret position at the end of the last leaf inside `node`, which sits at `path`.
pub(crate) fn last_text_point_in(node: &Node, path: &[usize]) -> Option<Point> {
    match node {
        Node::Text(t) => Some(Point::new(path.to_vec(), t.text.len())),
        Node::Element(el) => el.children.iter().enumerate().rev().find_map(|(ix, child)| {
            let mut child_path = path.to_vec();
            child_path.push(ix);
            last_text_point_in(child, &child_path)
        }),
    }
}

fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() || doc.children.is_empty() {
        return None;
    }

    let mut resolved_path: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved_path.push(ix);
        match &children[ix] {
            Node::Text(t) => {
                return Some(Point {
                    path: resolved_path,
                    offset: clamp_to_char_boundary(&t.text, point.offset),
                });
            }
            Node::Element(el) => children = &el.children,
        }
    }

    match doc.node(&resolved_path)? {
        Node::Text(t) => Some(Point {
            offset: clamp_to_char_boundary(&t.text, point.offset),
            path: resolved_path,
        }),
        Node::Element(el) => first_text_descendant(&el.children, &mut resolved_path),
    }
}

/// Moves both points of `selection` onto existing text leaves.
pub(crate) fn normalize_selection(doc: &Document, selection: &Selection) -> Selection {
    let fallback = first_text_point(doc).unwrap_or(Point {
        path: vec![0],
        offset: 0,
    });

    let anchor = normalize_point_to_existing_text(doc, &selection.anchor).unwrap_or_else(|| {
        normalize_point_to_existing_text(doc, &selection.focus).unwrap_or_else(|| fallback.clone())
    });
    let focus =
        normalize_point_to_existing_text(doc, &selection.focus).unwrap_or_else(|| anchor.clone());

    Selection { anchor, focus }
}
