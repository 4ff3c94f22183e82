use std::collections::BTreeMap;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::core::{CellAttrs, Document, ElementKind, ElementNode, Node, TableAttrs};
use crate::ops::Path;

/// Materialized position of a cell: row index and index within the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellAddr {
    pub row: usize,
    pub cell: usize,
}

/// Rectangle in grid coordinates. `bottom` and `right` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRect {
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
}

impl GridRect {
    pub fn new(row: usize, col: usize, row_span: usize, col_span: usize) -> Self {
        Self {
            row,
            col,
            row_span,
            col_span,
        }
    }

    pub fn single(row: usize, col: usize) -> Self {
        Self::new(row, col, 1, 1)
    }

    pub fn bottom(&self) -> usize {
        self.row + self.row_span
    }

    pub fn right(&self) -> usize {
        self.col + self.col_span
    }

    pub fn area(&self) -> usize {
        self.row_span * self.col_span
    }

    pub fn contains_pos(&self, row: usize, col: usize) -> bool {
        (self.row..self.bottom()).contains(&row) && (self.col..self.right()).contains(&col)
    }

    pub fn contains(&self, other: &GridRect) -> bool {
        other.row >= self.row
            && other.col >= self.col
            && other.bottom() <= self.bottom()
            && other.right() <= self.right()
    }

    pub fn intersects(&self, other: &GridRect) -> bool {
        self.row < other.bottom()
            && other.row < self.bottom()
            && self.col < other.right()
            && other.col < self.right()
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &GridRect) -> GridRect {
        let row = self.row.min(other.row);
        let col = self.col.min(other.col);
        let bottom = self.bottom().max(other.bottom());
        let right = self.right().max(other.right());
        GridRect::new(row, col, bottom - row, right - col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    /// Top-left position of the cell's region.
    Anchor(CellAddr),
    /// Any other position of a region.
    Covered(CellAddr),
}

impl Slot {
    pub fn owner(&self) -> CellAddr {
        match self {
            Slot::Anchor(addr) | Slot::Covered(addr) => *addr,
        }
    }
}

/// A table whose rows and cells do not form a valid grid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("node is not a table")]
    NotATable,
    #[error("table child {row} is not a row")]
    NotARow { row: usize },
    #[error("row {row} child {cell} is not a cell")]
    NotACell { row: usize, cell: usize },
    #[error("cell {row}/{cell} has a zero span")]
    ZeroSpan { row: usize, cell: usize },
    #[error("cell {row}/{cell} overlaps a spanning cell at column {col}")]
    Overlap { row: usize, cell: usize, col: usize },
    #[error("cell {row}/{cell} spans past the last row")]
    RowSpanOverflow { row: usize, cell: usize },
    #[error("no cell covers grid position {row}/{col}")]
    Gap { row: usize, col: usize },
}

/// Occupancy grid of a table. Rows hold their cells left to right, skipping
/// the columns a cell from an earlier row still covers through its `row_span`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableGrid {
    rows: usize,
    cols: usize,
    slots: Vec<Vec<Option<Slot>>>,
    rects: BTreeMap<CellAddr, GridRect>,
}

fn put(line: &mut Vec<Option<Slot>>, col: usize, slot: Slot) {
    if line.len() <= col {
        line.resize(col + 1, None);
    }
    line[col] = Some(slot);
}

fn cell_attrs(node: &Node) -> Option<&CellAttrs> {
    node.as_element()?.kind.as_cell()
}

impl TableGrid {
    /// Resolves the grid of a table element. Never mutates the table.
    pub fn resolve(table: &ElementNode) -> Result<Self, GridError> {
        if !matches!(table.kind, ElementKind::Table(_)) {
            return Err(GridError::NotATable);
        }

        // Per column: the cell still covering it and how many more rows it covers.
        let mut carries: Vec<Option<(CellAddr, usize)>> = Vec::new();
        let mut slots: Vec<Vec<Option<Slot>>> = Vec::with_capacity(table.children.len());
        let mut rects: BTreeMap<CellAddr, GridRect> = BTreeMap::new();

        for (row_ix, row_node) in table.children.iter().enumerate() {
            let row = match row_node {
                Node::Element(el) if el.kind == ElementKind::TableRow => el,
                _ => return Err(GridError::NotARow { row: row_ix }),
            };

            let carried = |carries: &[Option<(CellAddr, usize)>], col: usize| {
                carries.get(col).copied().flatten().map(|(owner, _)| owner)
            };

            let mut line: Vec<Option<Slot>> = Vec::new();
            let mut started: Vec<(usize, CellAddr, usize)> = Vec::new();
            let mut col = 0usize;

            for (cell_ix, cell_node) in row.children.iter().enumerate() {
                let attrs = cell_attrs(cell_node).ok_or(GridError::NotACell {
                    row: row_ix,
                    cell: cell_ix,
                })?;
                if attrs.col_span == 0 || attrs.row_span == 0 {
                    return Err(GridError::ZeroSpan {
                        row: row_ix,
                        cell: cell_ix,
                    });
                }

                while let Some(owner) = carried(&carries, col) {
                    put(&mut line, col, Slot::Covered(owner));
                    col += 1;
                }

                let addr = CellAddr {
                    row: row_ix,
                    cell: cell_ix,
                };
                for c in col..col + attrs.col_span {
                    if carried(&carries, c).is_some() {
                        return Err(GridError::Overlap {
                            row: row_ix,
                            cell: cell_ix,
                            col: c,
                        });
                    }
                    let slot = if c == col {
                        Slot::Anchor(addr)
                    } else {
                        Slot::Covered(addr)
                    };
                    put(&mut line, c, slot);
                    if attrs.row_span > 1 {
                        started.push((c, addr, attrs.row_span - 1));
                    }
                }

                rects.insert(
                    addr,
                    GridRect::new(row_ix, col, attrs.row_span, attrs.col_span),
                );
                col += attrs.col_span;
            }

            for c in col..carries.len() {
                if let Some(owner) = carried(&carries, c) {
                    put(&mut line, c, Slot::Covered(owner));
                }
            }

            for carry in carries.iter_mut() {
                *carry = carry.and_then(|(owner, left)| (left > 1).then_some((owner, left - 1)));
            }
            for (c, addr, left) in started {
                if carries.len() <= c {
                    carries.resize(c + 1, None);
                }
                carries[c] = Some((addr, left));
            }

            slots.push(line);
        }

        if let Some((owner, _)) = carries.iter().flatten().next() {
            return Err(GridError::RowSpanOverflow {
                row: owner.row,
                cell: owner.cell,
            });
        }

        let rows = slots.len();
        let cols = slots.iter().map(Vec::len).max().unwrap_or(0);
        for line in &mut slots {
            line.resize(cols, None);
        }

        trace!("resolved table grid {rows}x{cols} with {} cells", rects.len());
        Ok(Self {
            rows,
            cols,
            slots,
            rects,
        })
    }

    /// Resolves the table element at `table_path`.
    pub fn resolve_at(doc: &Document, table_path: &[usize]) -> Result<Self, GridError> {
        let table = doc.element(table_path).ok_or(GridError::NotATable)?;
        Self::resolve(table)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn slot(&self, row: usize, col: usize) -> Option<Slot> {
        self.slots.get(row)?.get(col).copied().flatten()
    }

    pub fn owner_at(&self, row: usize, col: usize) -> Option<CellAddr> {
        self.slot(row, col).map(|slot| slot.owner())
    }

    pub fn rect(&self, addr: CellAddr) -> Option<GridRect> {
        self.rects.get(&addr).copied()
    }

    /// Every materialized cell with its region, in row then cell order.
    pub fn anchors(&self) -> impl Iterator<Item = (CellAddr, GridRect)> + '_ {
        self.rects.iter().map(|(addr, rect)| (*addr, *rect))
    }

    /// Grid positions no cell covers; only ragged or broken tables have any.
    pub fn gaps(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (row, line) in self.slots.iter().enumerate() {
            for (col, slot) in line.iter().enumerate() {
                if slot.is_none() {
                    out.push((row, col));
                }
            }
        }
        out
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().flatten().all(Option::is_some)
    }

    /// Address of the cell at `cell_path` when it is a cell of the table at `table_path`.
    pub fn addr_of(&self, table_path: &[usize], cell_path: &[usize]) -> Option<CellAddr> {
        if cell_path.len() != table_path.len() + 2 || !cell_path.starts_with(table_path) {
            return None;
        }
        let addr = CellAddr {
            row: cell_path[table_path.len()],
            cell: cell_path[table_path.len() + 1],
        };
        self.rects.contains_key(&addr).then_some(addr)
    }

    pub fn cell_path(table_path: &[usize], addr: CellAddr) -> Path {
        let mut path = table_path.to_vec();
        path.extend([addr.row, addr.cell]);
        path
    }
}

/// One cell of an editable layout: its region and its element.
#[derive(Debug, Clone)]
pub(crate) struct Region {
    pub rect: GridRect,
    pub cell: ElementNode,
}

/// A table taken apart into positioned regions, edited in grid coordinates
/// and written back as rows of cells.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub rows: usize,
    pub cols: usize,
    pub regions: Vec<Region>,
    pub col_sizes: Vec<f64>,
}

pub(crate) fn plain_cell() -> ElementNode {
    ElementNode {
        kind: ElementKind::TableCell(CellAttrs::default()),
        children: vec![Node::paragraph("")],
    }
}

fn cell_is_blank(cell: &ElementNode) -> bool {
    cell.text().trim().is_empty()
}

impl Layout {
    /// Fails on tables whose grid is not a complete partition.
    pub fn from_table(table: &ElementNode, grid: &TableGrid) -> Result<Self, GridError> {
        if let Some(&(row, col)) = grid.gaps().first() {
            return Err(GridError::Gap { row, col });
        }

        let mut regions = Vec::with_capacity(grid.rects.len());
        for (addr, rect) in grid.anchors() {
            let Some(Node::Element(cell)) = table
                .children
                .get(addr.row)
                .and_then(|row| row.as_element())
                .and_then(|row| row.children.get(addr.cell))
            else {
                return Err(GridError::NotACell {
                    row: addr.row,
                    cell: addr.cell,
                });
            };
            regions.push(Region {
                rect,
                cell: cell.clone(),
            });
        }

        let col_sizes = table
            .kind
            .as_table()
            .map(|attrs| attrs.col_sizes.clone())
            .unwrap_or_default();

        Ok(Self {
            rows: grid.rows(),
            cols: grid.cols(),
            regions,
            col_sizes,
        })
    }

    pub fn region_at(&self, row: usize, col: usize) -> Option<&Region> {
        self.regions.iter().find(|r| r.rect.contains_pos(row, col))
    }

    /// Writes the regions back as rows, each row's cells in column order.
    pub fn into_table(mut self) -> ElementNode {
        self.regions
            .sort_by_key(|region| (region.rect.row, region.rect.col));

        let mut rows: Vec<Vec<Node>> = vec![Vec::new(); self.rows];
        for Region { rect, mut cell } in self.regions {
            if let ElementKind::TableCell(attrs) = &mut cell.kind {
                attrs.row_span = rect.row_span;
                attrs.col_span = rect.col_span;
            }
            if let Some(row) = rows.get_mut(rect.row) {
                row.push(Node::Element(cell));
            }
        }

        ElementNode {
            kind: ElementKind::Table(TableAttrs {
                col_sizes: self.col_sizes,
            }),
            children: rows
                .into_iter()
                .map(|cells| Node::element(ElementKind::TableRow, cells))
                .collect(),
        }
    }

    /// Inserts a grid row before row `at`. Regions crossing the boundary grow.
    pub fn insert_row(&mut self, at: usize) {
        let mut covered = vec![false; self.cols];
        for region in &mut self.regions {
            let rect = &mut region.rect;
            if rect.row >= at {
                rect.row += 1;
            } else if rect.bottom() > at {
                rect.row_span += 1;
                for flag in covered.iter_mut().skip(rect.col).take(rect.col_span) {
                    *flag = true;
                }
            }
        }
        self.rows += 1;
        for (col, covered) in covered.into_iter().enumerate() {
            if !covered {
                self.regions.push(Region {
                    rect: GridRect::single(at, col),
                    cell: plain_cell(),
                });
            }
        }
    }

    /// Inserts a grid column before column `at` with the given width.
    pub fn insert_column(&mut self, at: usize, width: f64) {
        let mut covered = vec![false; self.rows];
        for region in &mut self.regions {
            let rect = &mut region.rect;
            if rect.col >= at {
                rect.col += 1;
            } else if rect.right() > at {
                rect.col_span += 1;
                for flag in covered.iter_mut().skip(rect.row).take(rect.row_span) {
                    *flag = true;
                }
            }
        }
        self.cols += 1;
        for (row, covered) in covered.into_iter().enumerate() {
            if !covered {
                self.regions.push(Region {
                    rect: GridRect::single(row, at),
                    cell: plain_cell(),
                });
            }
        }
        let at = at.min(self.col_sizes.len());
        self.col_sizes.insert(at, width);
    }

    /// Removes grid row `at`. Spanning regions shrink; a region anchored on
    /// the removed row continues from the row below.
    pub fn delete_row(&mut self, at: usize) {
        self.regions.retain_mut(|region| {
            let rect = &mut region.rect;
            if rect.row > at {
                rect.row -= 1;
            } else if rect.bottom() > at {
                if rect.row_span == 1 {
                    return false;
                }
                rect.row_span -= 1;
            }
            true
        });
        self.rows = self.rows.saturating_sub(1);
    }

    pub fn delete_column(&mut self, at: usize) {
        self.regions.retain_mut(|region| {
            let rect = &mut region.rect;
            if rect.col > at {
                rect.col -= 1;
            } else if rect.right() > at {
                if rect.col_span == 1 {
                    return false;
                }
                rect.col_span -= 1;
            }
            true
        });
        self.cols = self.cols.saturating_sub(1);
        if at < self.col_sizes.len() {
            self.col_sizes.remove(at);
        }
    }

    /// Merges every region inside `rect` into its top-left region.
    ///
    /// Content is concatenated in row then column order; blank cells add nothing.
    /// Rows left without cells stay in place, covered by the merged region.
    pub fn merge(&mut self, rect: GridRect) -> bool {
        let (mut inside, rest): (Vec<Region>, Vec<Region>) = std::mem::take(&mut self.regions)
            .into_iter()
            .partition(|region| rect.contains(&region.rect));
        self.regions = rest;
        if inside.is_empty() {
            return false;
        }
        inside.sort_by_key(|region| (region.rect.row, region.rect.col));

        let mut blocks: Vec<Node> = Vec::new();
        for region in &inside {
            if !cell_is_blank(&region.cell) {
                blocks.extend(region.cell.children.iter().cloned());
            }
        }
        if blocks.is_empty() {
            blocks.push(Node::paragraph(""));
        }

        let mut survivor = inside.swap_remove(0);
        survivor.rect = rect;
        survivor.cell.children = blocks;
        self.regions.push(survivor);
        true
    }

    /// Resets the region anchored at `rect` to one grid cell and refills the
    /// rest of `rect` with plain cells.
    pub fn split(&mut self, rect: GridRect) -> bool {
        let Some(region) = self.regions.iter_mut().find(|r| r.rect == rect) else {
            return false;
        };
        region.rect = GridRect::single(rect.row, rect.col);
        for row in rect.row..rect.bottom() {
            for col in rect.col..rect.right() {
                if (row, col) == (rect.row, rect.col) {
                    continue;
                }
                self.regions.push(Region {
                    rect: GridRect::single(row, col),
                    cell: plain_cell(),
                });
            }
        }
        true
    }
}
