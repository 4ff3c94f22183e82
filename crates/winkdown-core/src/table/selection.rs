use std::collections::BTreeSet;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::core::{Document, ElementKind};
use crate::ops::Path;
use crate::table::grid::{CellAddr, GridError, GridRect, TableGrid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    Idle,
    /// Pointer is down and the focus cell still moves.
    Selecting,
    Selected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionShape {
    /// The selected regions tile exactly this rectangle.
    Rectangle(GridRect),
    Irregular,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Drag { anchor: GridRect, focus: GridRect },
    Cells(Vec<Path>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSelection {
    mode: SelectionMode,
    table_path: Option<Path>,
    source: Option<Source>,
    rect: Option<GridRect>,
    shape: Option<SelectionShape>,
    cells: Vec<Path>,
}

/// Grows `rect` until every region it touches lies fully inside it.
pub fn expand_to_closed(grid: &TableGrid, rect: GridRect) -> GridRect {
    let mut rect = rect;
    let mut passes = 0usize;
    loop {
        passes += 1;
        let mut grown = rect;
        for (_, region) in grid.anchors() {
            if region.intersects(&grown) && !grown.contains(&region) {
                grown = grown.union(&region);
            }
        }
        if grown == rect {
            trace!("selection closed after {passes} passes: {rect:?}");
            return rect;
        }
        rect = grown;
    }
}

/// Whether the regions of `cells` tile their bounding rectangle.
pub fn classify(grid: &TableGrid, cells: &[CellAddr]) -> SelectionShape {
    let rects: Vec<GridRect> = cells.iter().filter_map(|addr| grid.rect(*addr)).collect();
    if rects.is_empty() || rects.len() != cells.len() {
        return SelectionShape::Irregular;
    }
    let bbox = rects[1..]
        .iter()
        .fold(rects[0], |acc, rect| acc.union(rect));
    // Regions never overlap, so equal area means the bounding box is tiled.
    let area: usize = rects.iter().map(GridRect::area).sum();
    if area == bbox.area() {
        SelectionShape::Rectangle(bbox)
    } else {
        SelectionShape::Irregular
    }
}

/// Innermost cell containing `path` and the table holding that cell.
fn cell_and_table(doc: &Document, path: &[usize]) -> Option<(Path, Path)> {
    let cell_path = doc.ancestor_path(path, |kind| matches!(kind, ElementKind::TableCell(_)))?;
    let table_path = cell_path.get(..cell_path.len().checked_sub(2)?)?.to_vec();
    doc.element(&table_path)?.kind.as_table()?;
    Some((cell_path, table_path))
}

impl TableSelection {
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn table_path(&self) -> Option<&Path> {
        self.table_path.as_ref()
    }

    /// Closed rectangle of a drag, or the bounding box of an explicit set.
    pub fn rect(&self) -> Option<GridRect> {
        self.rect
    }

    pub fn shape(&self) -> Option<SelectionShape> {
        self.shape
    }

    /// Selected cell paths in row then cell order.
    pub fn selected_cells(&self) -> &[Path] {
        &self.cells
    }

    /// A single cell is a click, not a selection.
    pub fn has_selection(&self) -> bool {
        self.mode != SelectionMode::Idle && self.cells.len() > 1
    }

    pub fn is_mergeable(&self) -> bool {
        self.has_selection() && matches!(self.shape, Some(SelectionShape::Rectangle(_)))
    }

    /// Starts a drag on the cell containing `path`; outside a table it only clears.
    pub fn start_selection(&mut self, doc: &Document, path: &[usize]) -> Result<(), GridError> {
        self.clear_selection();
        let Some((cell_path, table_path)) = cell_and_table(doc, path) else {
            return Ok(());
        };
        let grid = TableGrid::resolve_at(doc, &table_path)?;
        let Some(addr) = grid.addr_of(&table_path, &cell_path) else {
            return Ok(());
        };
        let Some(rect) = grid.rect(addr) else {
            return Ok(());
        };

        self.mode = SelectionMode::Selecting;
        self.table_path = Some(table_path);
        self.source = Some(Source::Drag {
            anchor: rect,
            focus: rect,
        });
        self.recompute(&grid);
        Ok(())
    }

    /// Moves the drag focus. Ignored unless a drag is in progress in the same table.
    pub fn update_selection(&mut self, doc: &Document, path: &[usize]) -> Result<(), GridError> {
        if self.mode != SelectionMode::Selecting {
            return Ok(());
        }
        let Some((cell_path, table_path)) = cell_and_table(doc, path) else {
            return Ok(());
        };
        if self.table_path.as_ref() != Some(&table_path) {
            return Ok(());
        }
        let grid = TableGrid::resolve_at(doc, &table_path)?;
        let Some(focus) = grid
            .addr_of(&table_path, &cell_path)
            .and_then(|addr| grid.rect(addr))
        else {
            return Ok(());
        };
        if let Some(Source::Drag { focus: current, .. }) = &mut self.source {
            *current = focus;
        }
        self.recompute(&grid);
        Ok(())
    }

    /// Finishes a drag. A drag that never left its first cell selects nothing.
    pub fn end_selection(&mut self) {
        if self.mode != SelectionMode::Selecting {
            return;
        }
        if self.cells.len() > 1 {
            self.mode = SelectionMode::Selected;
        } else {
            self.clear_selection();
        }
    }

    pub fn clear_selection(&mut self) {
        *self = Self::default();
    }

    /// Selects an explicit set of cells of one table, which need not be rectangular.
    pub fn select_cells(&mut self, doc: &Document, paths: &[Path]) -> Result<(), GridError> {
        self.clear_selection();
        let mut table: Option<Path> = None;
        let mut cells: BTreeSet<Path> = BTreeSet::new();
        for path in paths {
            let Some((cell_path, table_path)) = cell_and_table(doc, path) else {
                return Ok(());
            };
            if *table.get_or_insert_with(|| table_path.clone()) != table_path {
                return Ok(());
            }
            cells.insert(cell_path);
        }
        let Some(table_path) = table else {
            return Ok(());
        };

        let grid = TableGrid::resolve_at(doc, &table_path)?;
        self.mode = SelectionMode::Selected;
        self.table_path = Some(table_path);
        self.source = Some(Source::Cells(cells.into_iter().collect()));
        self.recompute(&grid);
        Ok(())
    }

    /// Re-resolves the selection against an edited document.
    pub fn refresh(&mut self, doc: &Document) -> Result<(), GridError> {
        let Some(table_path) = self.table_path.clone() else {
            return Ok(());
        };
        if doc
            .element(&table_path)
            .and_then(|el| el.kind.as_table())
            .is_none()
        {
            self.clear_selection();
            return Ok(());
        }
        let grid = TableGrid::resolve_at(doc, &table_path)?;
        self.recompute(&grid);
        Ok(())
    }

    fn recompute(&mut self, grid: &TableGrid) {
        let Some(table_path) = self.table_path.clone() else {
            return;
        };
        match &self.source {
            Some(Source::Drag { anchor, focus }) => {
                let rect = expand_to_closed(grid, anchor.union(focus));
                self.cells = grid
                    .anchors()
                    .filter(|(_, region)| rect.contains(region))
                    .map(|(addr, _)| TableGrid::cell_path(&table_path, addr))
                    .collect();
                self.rect = Some(rect);
                self.shape = Some(SelectionShape::Rectangle(rect));
            }
            Some(Source::Cells(paths)) => {
                let addrs: Vec<CellAddr> = paths
                    .iter()
                    .filter_map(|path| grid.addr_of(&table_path, path))
                    .collect();
                self.cells = addrs
                    .iter()
                    .map(|addr| TableGrid::cell_path(&table_path, *addr))
                    .collect();
                self.shape = Some(classify(grid, &addrs));
                self.rect = addrs
                    .iter()
                    .filter_map(|addr| grid.rect(*addr))
                    .reduce(|acc, rect| acc.union(&rect));
            }
            None => {}
        }
    }
}
